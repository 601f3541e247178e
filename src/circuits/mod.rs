//! Zero-knowledge constraint circuits for contribution claims
//!
//! R1CS circuits over BN254, proven with Groth16:
//! - Aggregator circuits: committed per-repository scalars summed into a
//!   claim range, with a valid-count check and an integer average bound
//! - Temporal aggregator circuits: an ordered, committed activity timeline
//!   reduced to range-checked consistency statistics
//!
//! ## Soundness Notes
//! - All subtraction and division goes through the range-checked gadgets in
//!   [`gadgets`]; nothing relies on field arithmetic not wrapping
//! - Commitments use Poseidon over the proving field, so they are checked
//!   inside the circuit at native cost
//! - A witness that does not satisfy the circuit is rejected before proving

pub mod aggregator;
pub mod gadgets;
pub mod poseidon;
pub mod prover;
pub mod temporal;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod proptests;

pub use aggregator::{AggregatorCircuit, ClaimRange};
pub use prover::{CircuitKeyring, CircuitKeys};
pub use temporal::{TemporalAggregatorCircuit, TemporalParameters, TemporalStatistics};
pub use types::{
    decode_field, encode_field, field_to_u64, CircuitError, CircuitProof, MetricKind, ProofKind, ProofSystem,
};
pub use verifier::verify_proof;

/// Repository slots in the aggregator circuits used for credentials.
pub const REPOSITORY_CAPACITY: usize = 8;

/// Timeline slots in the temporal circuit used for credentials.
pub const TIMELINE_CAPACITY: usize = 16;
