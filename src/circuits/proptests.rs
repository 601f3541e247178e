//! Property-based tests for the constraint circuits
//!
//! Tests for:
//! - Completeness: any in-bounds values satisfy the aggregator circuit
//! - Soundness: a claimed valid-count that differs from the real one is rejected
//! - Native/circuit agreement for temporal statistics

use super::aggregator::{AggregatorCircuit, ClaimRange};
use super::temporal::{TemporalAggregatorCircuit, TemporalParameters};
use super::types::MetricKind;
use crate::aggregation::TimelineEvent;
use ark_bn254::Fr;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn satisfied<C: ConstraintSynthesizer<Fr>>(circuit: C) -> bool {
    let cs = ConstraintSystem::<Fr>::new_ref();
    circuit.generate_constraints(cs.clone()).unwrap();
    cs.is_satisfied().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: nonnegative values whose sum is inside the plausible bound are accepted
    #[test]
    fn prop_in_bounds_values_accepted(
        values in prop::collection::vec(0u64..250_000, 1..=4),
        seed in any::<u64>(),
    ) {
        let sum: u64 = values.iter().sum();
        prop_assume!(sum >= 1);
        let mut rng = StdRng::seed_from_u64(seed);
        let circuit = AggregatorCircuit::<4>::new(
            MetricKind::Commits,
            &values,
            ClaimRange::new(1, 1_000_000),
            0,
            &mut rng,
        ).unwrap();
        prop_assert!(satisfied(circuit));
    }

    /// Property: a valid-count that is not the number of positive entries is rejected
    #[test]
    fn prop_wrong_valid_count_rejected(
        values in prop::collection::vec(0u64..1_000, 1..=4),
        claimed in 0u64..=4,
        seed in any::<u64>(),
    ) {
        let actual = values.iter().filter(|v| **v > 0).count() as u64;
        prop_assume!(claimed != actual);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut circuit = AggregatorCircuit::<4>::new(
            MetricKind::Commits,
            &values,
            ClaimRange::new(0, 1_000_000),
            0,
            &mut rng,
        ).unwrap();
        circuit.valid_count = claimed;
        prop_assert!(!satisfied(circuit));
    }

    /// Property: the natively computed statistics always satisfy the temporal circuit
    #[test]
    fn prop_temporal_statistics_agree(
        gaps in prop::collection::vec(1u64..60, 1..6),
        sizes in prop::collection::vec(0u64..500, 7),
        start in 18_000u64..20_000,
    ) {
        let mut day = start;
        let mut timeline = vec![TimelineEvent { day, size: sizes[0] }];
        for (i, gap) in gaps.iter().enumerate() {
            day += gap;
            timeline.push(TimelineEvent { day, size: sizes[i + 1] });
        }
        let circuit = TemporalAggregatorCircuit::<8>::new(&timeline, TemporalParameters::default()).unwrap();
        prop_assert!(satisfied(circuit));
    }
}
