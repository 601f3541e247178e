//! Temporal aggregator circuit
//!
//! Takes a padded timeline of `N` (day, size) events where the first
//! `event_count` slots are real, proves the timeline is strictly increasing,
//! and exposes statistics over it without revealing the days themselves.
//!
//! With `k` events, gaps `g_i = t_i - t_{i-1}` and gap bound `B`:
//!
//! | output            | definition                                             | range      |
//! |-------------------|--------------------------------------------------------|------------|
//! | event_count       | k                                                      | [2, N]     |
//! | activity_periods  | 1 + #{g_i > B}                                         | [1, N]     |
//! | frequency         | floor(30k / span)                                      | [0, 60]    |
//! | consistency_index | floor(10000 / (100 + var(g)))                          | [0, 100]   |
//! | quality_trend     | floor(100 · #{s_i >= s_{i-1}} / (k - 1))               | [0, 100]   |
//! | sustainability    | floor((w_g · within + w_s · nonzero) / 100)            | [0, 100]   |
//! | gap_score         | floor(100B / (B + mean gap))                           | [0, 100]   |
//!
//! followed by `timeline_commitment`, a Poseidon chain over `H(t_i, s_i)`.
//! `TemporalStatistics::compute` performs the same integer arithmetic natively.

use super::gadgets::{count, enforce_bits, enforce_in_range, is_le, is_nonzero, safe_div, safe_sub};
use super::poseidon;
use super::types::{encode_field, CircuitError};
use crate::aggregation::TimelineEvent;
use ark_bn254::Fr;
use ark_r1cs_std::prelude::*;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use serde::{Deserialize, Serialize};

pub const DAY_BITS: usize = 32;
pub const GAP_BITS: usize = 16;
pub const SIZE_BITS: usize = 32;
pub const WIDE_BITS: usize = 56;

/// Number of public inputs.
pub const PUBLIC_INPUTS: usize = 8;

const FREQUENCY_WINDOW_DAYS: u64 = 30;
const MAX_FREQUENCY: u64 = 2 * FREQUENCY_WINDOW_DAYS;

/// Fixed parameters; they are baked into the constraint system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalParameters {
    /// A gap longer than this many days starts a new activity period.
    pub gap_bound_days: u64,
    pub gap_weight: u64,
    pub size_weight: u64,
}

impl Default for TemporalParameters {
    fn default() -> Self {
        Self {
            gap_bound_days: 7,
            gap_weight: 60,
            size_weight: 40,
        }
    }
}

impl TemporalParameters {
    pub fn validate(&self) -> Result<(), CircuitError> {
        if self.gap_bound_days == 0 || self.gap_bound_days >> GAP_BITS != 0 {
            return Err(CircuitError::InvalidParameters(format!(
                "gap bound {} must be in [1, 2^{})",
                self.gap_bound_days, GAP_BITS
            )));
        }
        if self.gap_weight + self.size_weight != 100 {
            return Err(CircuitError::InvalidParameters(format!(
                "weights {}/{} must sum to 100",
                self.gap_weight, self.size_weight
            )));
        }
        Ok(())
    }
}

/// The circuit's public outputs, computed natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalStatistics {
    pub event_count: u64,
    pub activity_periods: u64,
    pub frequency: u64,
    pub consistency_index: u64,
    pub quality_trend: u64,
    pub sustainability: u64,
    pub gap_score: u64,
    pub timeline_commitment: Fr,
}

impl TemporalStatistics {
    /// Statistics for `events` padded to `capacity` slots.
    pub fn compute(
        events: &[TimelineEvent],
        capacity: usize,
        params: &TemporalParameters,
    ) -> Result<Self, CircuitError> {
        params.validate()?;
        let k = events.len();
        if k < 2 {
            return Err(CircuitError::TooFewEvents(k));
        }
        if k > capacity {
            return Err(CircuitError::TooManyValues { got: k, capacity });
        }
        for e in events {
            if e.day >> DAY_BITS != 0 {
                return Err(CircuitError::ValueTooLarge { value: e.day, bits: DAY_BITS });
            }
            if e.size >> SIZE_BITS != 0 {
                return Err(CircuitError::ValueTooLarge { value: e.size, bits: SIZE_BITS });
            }
        }
        let mut gaps = Vec::with_capacity(k - 1);
        for (i, pair) in events.windows(2).enumerate() {
            if pair[1].day <= pair[0].day {
                return Err(CircuitError::UnorderedTimeline(i + 1));
            }
            let gap = pair[1].day - pair[0].day;
            if gap >> GAP_BITS != 0 {
                return Err(CircuitError::ValueTooLarge { value: gap, bits: GAP_BITS });
            }
            gaps.push(gap);
        }

        let k = k as u64;
        let bound = params.gap_bound_days;
        let span: u64 = gaps.iter().sum();
        let mean_gap = span / (k - 1);
        let sum_sq: u64 = gaps.iter().map(|g| g.abs_diff(mean_gap).pow(2)).sum();
        let variance = sum_sq / (k - 1);
        let long_gaps = gaps.iter().filter(|g| **g > bound).count() as u64;
        let activity_periods = 1 + long_gaps;
        let within = k - activity_periods;
        let non_decreasing = events.windows(2).filter(|p| p[1].size >= p[0].size).count() as u64;
        let nonzero = events.iter().filter(|e| e.size > 0).count() as u64;

        let within_ratio = 100 * within / (k - 1);
        let nonzero_ratio = 100 * nonzero / k;

        Ok(Self {
            event_count: k,
            activity_periods,
            frequency: FREQUENCY_WINDOW_DAYS * k / span,
            consistency_index: 10_000 / (100 + variance),
            quality_trend: 100 * non_decreasing / (k - 1),
            sustainability: (params.gap_weight * within_ratio + params.size_weight * nonzero_ratio) / 100,
            gap_score: 100 * bound / (bound + mean_gap),
            timeline_commitment: timeline_commitment(events, capacity)?,
        })
    }

    pub fn outputs(&self) -> Vec<Fr> {
        vec![
            Fr::from(self.event_count),
            Fr::from(self.activity_periods),
            Fr::from(self.frequency),
            Fr::from(self.consistency_index),
            Fr::from(self.quality_trend),
            Fr::from(self.sustainability),
            Fr::from(self.gap_score),
            self.timeline_commitment,
        ]
    }
}

fn timeline_commitment(events: &[TimelineEvent], capacity: usize) -> Result<Fr, CircuitError> {
    let leaves = (0..capacity)
        .map(|i| {
            let (day, size) = events.get(i).map_or((0, 0), |e| (e.day, e.size));
            poseidon::hash(&[Fr::from(day), Fr::from(size)])
        })
        .collect::<Result<Vec<_>, _>>()?;
    poseidon::chain(&leaves)
}

#[derive(Debug, Clone)]
pub struct TemporalAggregatorCircuit<const N: usize> {
    pub params: TemporalParameters,
    pub days: [u64; N],
    pub sizes: [u64; N],
    pub enabled: [bool; N],
    /// Claimed outputs, exposed as public inputs.
    pub statistics: TemporalStatistics,
}

impl<const N: usize> TemporalAggregatorCircuit<N> {
    pub fn new(events: &[TimelineEvent], params: TemporalParameters) -> Result<Self, CircuitError> {
        let statistics = TemporalStatistics::compute(events, N, &params)?;
        let mut days = [0u64; N];
        let mut sizes = [0u64; N];
        let mut enabled = [false; N];
        for (i, e) in events.iter().enumerate() {
            days[i] = e.day;
            sizes[i] = e.size;
            enabled[i] = true;
        }
        Ok(Self {
            params,
            days,
            sizes,
            enabled,
            statistics,
        })
    }

    /// Shape-only instance for key generation.
    pub fn blank(params: TemporalParameters) -> Self {
        Self {
            params,
            days: [0; N],
            sizes: [0; N],
            enabled: [false; N],
            statistics: TemporalStatistics {
                event_count: 0,
                activity_periods: 0,
                frequency: 0,
                consistency_index: 0,
                quality_trend: 0,
                sustainability: 0,
                gap_score: 0,
                timeline_commitment: Fr::from(0u64),
            },
        }
    }

    pub fn circuit_id(params: &TemporalParameters) -> String {
        format!(
            "temporal/{}/b{}-w{}-{}",
            N, params.gap_bound_days, params.gap_weight, params.size_weight
        )
    }

    pub fn public_inputs(&self) -> Vec<Fr> {
        self.statistics.outputs()
    }

    pub fn encoded_public_inputs(&self) -> Vec<[u8; 32]> {
        self.public_inputs().into_iter().map(encode_field).collect()
    }
}

impl<const N: usize> ConstraintSynthesizer<Fr> for TemporalAggregatorCircuit<N> {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let outputs = self
            .statistics
            .outputs()
            .into_iter()
            .map(|v| FpVar::new_input(cs.clone(), || Ok(v)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut days = Vec::with_capacity(N);
        let mut sizes = Vec::with_capacity(N);
        let mut enabled = Vec::with_capacity(N);
        let mut leaves = Vec::with_capacity(N);
        for i in 0..N {
            let t = FpVar::new_witness(cs.clone(), || Ok(Fr::from(self.days[i])))?;
            let s = FpVar::new_witness(cs.clone(), || Ok(Fr::from(self.sizes[i])))?;
            let e = Boolean::new_witness(cs.clone(), || Ok(self.enabled[i]))?;
            enforce_bits(&t, DAY_BITS)?;
            enforce_bits(&s, SIZE_BITS)?;
            leaves.push(poseidon::hash_var(&[t.clone(), s.clone()])?);
            days.push(t);
            sizes.push(s);
            enabled.push(e);
        }

        let one = FpVar::one();
        let bound = FpVar::constant(Fr::from(self.params.gap_bound_days));
        let k = count(&enabled);

        let mut gaps = Vec::with_capacity(N.saturating_sub(1));
        let mut short_gaps = Vec::with_capacity(N.saturating_sub(1));
        let mut non_decreasing = Vec::with_capacity(N.saturating_sub(1));
        for i in 1..N {
            let e = FpVar::from(enabled[i].clone());
            let prev = FpVar::from(enabled[i - 1].clone());
            // enabled slots form a prefix
            e.mul_equals(&(&one - &prev), &FpVar::zero())?;

            // strictly increasing where enabled: e·(t_i - t_{i-1}) - e >= 0
            let gap = &e * (&days[i] - &days[i - 1]);
            safe_sub(&gap, &e, GAP_BITS)?;

            let short = is_le(&gap, &bound, GAP_BITS)?;
            short_gaps.push(&e * FpVar::from(short));
            let grew = is_le(&sizes[i - 1], &sizes[i], SIZE_BITS)?;
            non_decreasing.push(&e * FpVar::from(grew));
            gaps.push((e, gap));
        }

        let gap_count = safe_sub(&k, &one, WIDE_BITS)?;
        let within: FpVar<Fr> = short_gaps.iter().fold(FpVar::zero(), |acc, v| acc + v);
        let periods = safe_sub(&k, &within, WIDE_BITS)?;

        let span: FpVar<Fr> = gaps.iter().fold(FpVar::zero(), |acc, (_, g)| acc + g);
        let (mean_gap, _) = safe_div(&span, &gap_count, WIDE_BITS)?;
        let sum_sq = gaps.iter().fold(FpVar::zero(), |acc, (e, g)| {
            let dev = g - &mean_gap;
            acc + e * (&dev * &dev)
        });
        let (variance, _) = safe_div(&sum_sq, &gap_count, WIDE_BITS)?;

        let c = |v: u64| FpVar::constant(Fr::from(v));
        let (frequency, _) = safe_div(&(&k * Fr::from(FREQUENCY_WINDOW_DAYS)), &span, WIDE_BITS)?;
        let (consistency, _) = safe_div(&c(10_000), &(variance + Fr::from(100u64)), WIDE_BITS)?;
        let nd_count: FpVar<Fr> = non_decreasing.iter().fold(FpVar::zero(), |acc, v| acc + v);
        let (quality, _) = safe_div(&(nd_count * Fr::from(100u64)), &gap_count, WIDE_BITS)?;

        let nonzero = sizes
            .iter()
            .map(is_nonzero)
            .collect::<Result<Vec<_>, _>>()?;
        let nonzero_count = nonzero
            .iter()
            .zip(&enabled)
            .fold(FpVar::zero(), |acc, (nz, e)| acc + FpVar::from(nz.clone()) * FpVar::from(e.clone()));
        let (within_ratio, _) = safe_div(&(&within * Fr::from(100u64)), &gap_count, WIDE_BITS)?;
        let (nonzero_ratio, _) = safe_div(&(nonzero_count * Fr::from(100u64)), &k, WIDE_BITS)?;
        let blended = within_ratio * Fr::from(self.params.gap_weight)
            + nonzero_ratio * Fr::from(self.params.size_weight);
        let (sustainability, _) = safe_div(&blended, &c(100), WIDE_BITS)?;
        let (gap_score, _) = safe_div(
            &c(100 * self.params.gap_bound_days),
            &(&bound + &mean_gap),
            WIDE_BITS,
        )?;
        let commitment = poseidon::chain_var(&leaves)?;

        let n = N as u64;
        let checked: [(FpVar<Fr>, u64, u64); 7] = [
            (k, 2, n),
            (periods, 1, n),
            (frequency, 0, MAX_FREQUENCY),
            (consistency, 0, 100),
            (quality, 0, 100),
            (sustainability, 0, 100),
            (gap_score, 0, 100),
        ];
        for ((value, lo, hi), output) in checked.iter().zip(&outputs) {
            enforce_in_range(value, *lo, *hi, WIDE_BITS)?;
            value.enforce_equal(output)?;
        }
        commitment.enforce_equal(&outputs[PUBLIC_INPUTS - 1])?;
        Ok(())
    }
}
