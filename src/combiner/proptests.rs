//! Property-based tests for the proof combiner
//!
//! Tests for:
//! - Soundness: any included invalid proof makes the bundle invalid
//! - The "at least one proof" invariant for empty and all-excluded bundles

use super::{CombinationMode, ProofCombiner};
use crate::aggregation::ClaimType;
use crate::circuits::{AggregatorCircuit, CircuitKeyring, CircuitProof, ClaimRange, MetricKind};
use crate::clock::ManualTimeSource;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, OnceLock};

fn valid_proof() -> &'static CircuitProof {
    static PROOF: OnceLock<CircuitProof> = OnceLock::new();
    PROOF.get_or_init(|| {
        let keyring = CircuitKeyring::from_seed(5);
        let mut rng = StdRng::seed_from_u64(5);
        let circuit =
            AggregatorCircuit::<2>::new(MetricKind::Commits, &[3, 4], ClaimRange::new(1, 10), 0, &mut rng).unwrap();
        keyring.prove_aggregate(circuit, 0).unwrap()
    })
}

fn mode() -> impl Strategy<Value = CombinationMode> {
    prop_oneof![
        Just(CombinationMode::Aggregate),
        Just(CombinationMode::Batch),
        Just(CombinationMode::Recursive),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: valid iff at least one proof is included and every included proof is valid
    #[test]
    fn prop_bundle_validity(
        slots in prop::collection::vec((any::<bool>(), any::<bool>()), 0..6),
        mode in mode(),
    ) {
        let proofs: Vec<CircuitProof> = slots
            .iter()
            .map(|(valid, include)| {
                let mut p = valid_proof().clone();
                if !valid {
                    p.proof.truncate(8);
                }
                p.include = *include;
                p
            })
            .collect();
        let expected = slots.iter().any(|(_, inc)| *inc) && slots.iter().all(|(v, inc)| *v || !*inc);

        let combiner = ProofCombiner::new(Arc::new(ManualTimeSource::new(0)));
        let bundle = combiner.combine(ClaimType::Repository, proofs, mode).unwrap();
        prop_assert_eq!(bundle.valid, expected);
        if !bundle.valid {
            prop_assert!(bundle.rejection.is_some());
        }
    }
}
