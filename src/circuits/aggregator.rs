//! Aggregator circuit
//!
//! Proves facts about the sum of a fixed-size array of per-repository values
//! without revealing the values:
//!
//! - every value is a committed 32-bit integer, `c_i = Poseidon(v_i, b_i)`
//! - the commitments fold into one public `aggregate_commitment`
//! - the number of nonzero values equals the public `valid_count`
//! - the sum lies in the kind's plausible interval and in `[claim_min, claim_max]`
//! - `floor(sum / valid_count) >= min_average`
//!
//! Public inputs, in order: `claim_min`, `claim_max`, `min_average`,
//! `valid_count`, `aggregate_commitment`.

use super::gadgets::{count, enforce_bits, enforce_in_range, is_nonzero, safe_div, safe_sub};
use super::poseidon;
use super::types::{encode_field, CircuitError, MetricKind};
use ark_bn254::Fr;
use ark_ff::{UniformRand, Zero};
use ark_r1cs_std::prelude::*;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use rand::{CryptoRng, RngCore};

/// Bit width of a single per-repository value.
pub const VALUE_BITS: usize = 32;
/// Bit width for sums, quotients and claim bounds.
pub const SUM_BITS: usize = 48;

/// Number of public inputs.
pub const PUBLIC_INPUTS: usize = 5;

/// Inclusive range a claim asserts about the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRange {
    pub min: u64,
    pub max: u64,
}

impl ClaimRange {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorCircuit<const N: usize> {
    pub kind: MetricKind,
    pub values: [u64; N],
    pub blindings: [Fr; N],
    pub claim: ClaimRange,
    pub min_average: u64,
    /// Claimed number of nonzero values.
    pub valid_count: u64,
}

impl<const N: usize> AggregatorCircuit<N> {
    /// Pad `values` to `N` with zeros and draw fresh blindings.
    pub fn new<R: RngCore + CryptoRng>(
        kind: MetricKind,
        values: &[u64],
        claim: ClaimRange,
        min_average: u64,
        rng: &mut R,
    ) -> Result<Self, CircuitError> {
        if values.len() > N {
            return Err(CircuitError::TooManyValues {
                got: values.len(),
                capacity: N,
            });
        }
        if let Some(v) = values.iter().find(|v| **v >> VALUE_BITS != 0) {
            return Err(CircuitError::ValueTooLarge {
                value: *v,
                bits: VALUE_BITS,
            });
        }
        let mut padded = [0u64; N];
        padded[..values.len()].copy_from_slice(values);
        let blindings = std::array::from_fn(|_| Fr::rand(rng));
        Ok(Self {
            kind,
            values: padded,
            blindings,
            claim,
            min_average,
            valid_count: values.iter().filter(|v| **v > 0).count() as u64,
        })
    }

    /// Shape-only instance for key generation.
    pub fn blank(kind: MetricKind) -> Self {
        Self {
            kind,
            values: [0; N],
            blindings: [Fr::zero(); N],
            claim: ClaimRange::new(0, 0),
            min_average: 0,
            valid_count: 0,
        }
    }

    pub fn circuit_id(kind: MetricKind) -> String {
        format!("aggregator/{}/{}", kind, N)
    }

    pub fn sum(&self) -> u64 {
        self.values.iter().sum()
    }

    pub fn aggregate_commitment(&self) -> Result<Fr, CircuitError> {
        let commitments = self
            .values
            .iter()
            .zip(&self.blindings)
            .map(|(v, b)| poseidon::commit(*v, *b))
            .collect::<Result<Vec<_>, _>>()?;
        poseidon::chain(&commitments)
    }

    pub fn public_inputs(&self) -> Result<Vec<Fr>, CircuitError> {
        Ok(vec![
            Fr::from(self.claim.min),
            Fr::from(self.claim.max),
            Fr::from(self.min_average),
            Fr::from(self.valid_count),
            self.aggregate_commitment()?,
        ])
    }

    pub fn encoded_public_inputs(&self) -> Result<Vec<[u8; 32]>, CircuitError> {
        Ok(self.public_inputs()?.into_iter().map(encode_field).collect())
    }
}

impl<const N: usize> ConstraintSynthesizer<Fr> for AggregatorCircuit<N> {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let aggregate_commitment = self.aggregate_commitment().unwrap_or_default();

        // Public inputs first, in their declared order.
        let claim_min = FpVar::new_input(cs.clone(), || Ok(Fr::from(self.claim.min)))?;
        let claim_max = FpVar::new_input(cs.clone(), || Ok(Fr::from(self.claim.max)))?;
        let min_average = FpVar::new_input(cs.clone(), || Ok(Fr::from(self.min_average)))?;
        let valid_count = FpVar::new_input(cs.clone(), || Ok(Fr::from(self.valid_count)))?;
        let commitment_input = FpVar::new_input(cs.clone(), || Ok(aggregate_commitment))?;

        let mut sum = FpVar::zero();
        let mut flags = Vec::with_capacity(N);
        let mut commitments = Vec::with_capacity(N);
        for (value, blinding) in self.values.iter().zip(&self.blindings) {
            let v = FpVar::new_witness(cs.clone(), || Ok(Fr::from(*value)))?;
            let b = FpVar::new_witness(cs.clone(), || Ok(*blinding))?;
            enforce_bits(&v, VALUE_BITS)?;
            flags.push(is_nonzero(&v)?);
            commitments.push(poseidon::hash_var(&[v.clone(), b])?);
            sum += v;
        }

        count(&flags).enforce_equal(&valid_count)?;
        poseidon::chain_var(&commitments)?.enforce_equal(&commitment_input)?;

        let (lo, hi) = self.kind.plausible_range();
        enforce_in_range(&sum, lo, hi, SUM_BITS)?;
        enforce_bits(&claim_min, SUM_BITS)?;
        enforce_bits(&claim_max, SUM_BITS)?;
        safe_sub(&sum, &claim_min, SUM_BITS)?;
        safe_sub(&claim_max, &sum, SUM_BITS)?;

        let (average, _) = safe_div(&sum, &valid_count, SUM_BITS)?;
        safe_sub(&average, &min_average, SUM_BITS)?;
        Ok(())
    }
}
