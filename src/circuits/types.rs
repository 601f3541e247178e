//! Types shared by the circuit provers, verifiers and the proof combiner

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use ark_relations::r1cs::SynthesisError;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Circuit construction, proving and verification errors.
#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("{got} values exceed circuit capacity {capacity}")]
    TooManyValues { got: usize, capacity: usize },

    #[error("Value {value} does not fit in {bits} bits")]
    ValueTooLarge { value: u64, bits: usize },

    #[error("Timeline needs at least two events, got {0}")]
    TooFewEvents(usize),

    #[error("Timeline is not strictly increasing at event {0}")]
    UnorderedTimeline(usize),

    #[error("Invalid circuit parameters: {0}")]
    InvalidParameters(String),

    #[error("Witness does not satisfy the circuit: {0}")]
    Unsatisfied(String),

    #[error("Constraint synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Poseidon hash failed: {0}")]
    Hash(String),

    #[error("Malformed proof encoding: {0}")]
    Encoding(String),

    #[error("Key generation lock poisoned")]
    LockPoisoned,
}

/// Encoding of a Groth16 proof and its verifying key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofSystem {
    Groth16Bn254Compressed,
    Groth16Bn254Uncompressed,
}

impl ProofSystem {
    pub fn name(self) -> &'static str {
        match self {
            ProofSystem::Groth16Bn254Compressed => "groth16-bn254-compressed",
            ProofSystem::Groth16Bn254Uncompressed => "groth16-bn254-uncompressed",
        }
    }

    pub(crate) fn serialize<T: CanonicalSerialize>(self, value: &T) -> Result<Vec<u8>, CircuitError> {
        let mut bytes = Vec::new();
        let result = match self {
            ProofSystem::Groth16Bn254Compressed => value.serialize_compressed(&mut bytes),
            ProofSystem::Groth16Bn254Uncompressed => value.serialize_uncompressed(&mut bytes),
        };
        result.map_err(|e| CircuitError::Encoding(e.to_string()))?;
        Ok(bytes)
    }

    /// Decode with full validation: points must be on the curve and in the subgroup.
    pub(crate) fn deserialize<T: CanonicalDeserialize>(self, bytes: &[u8]) -> Result<T, CircuitError> {
        let result = match self {
            ProofSystem::Groth16Bn254Compressed => T::deserialize_compressed(bytes),
            ProofSystem::Groth16Bn254Uncompressed => T::deserialize_uncompressed(bytes),
        };
        result.map_err(|e| CircuitError::Encoding(e.to_string()))
    }
}

impl fmt::Display for ProofSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which scalar an aggregator circuit sums, and its plausible total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Commits,
    LinesOfCode,
    Collaborators,
    /// Per-language line counts; the valid count is the language count.
    Languages,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Commits,
        MetricKind::LinesOfCode,
        MetricKind::Collaborators,
        MetricKind::Languages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Commits => "commits",
            MetricKind::LinesOfCode => "lines_of_code",
            MetricKind::Collaborators => "collaborators",
            MetricKind::Languages => "languages",
        }
    }

    /// Inclusive interval the total must fall in, independent of any claim.
    pub fn plausible_range(self) -> (u64, u64) {
        match self {
            MetricKind::Commits => (1, 1_000_000),
            MetricKind::LinesOfCode | MetricKind::Languages => (1, 100_000_000),
            MetricKind::Collaborators => (1, 10_000),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a proof attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", content = "metric", rename_all = "snake_case")]
pub enum ProofKind {
    Aggregate(MetricKind),
    Temporal,
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofKind::Aggregate(metric) => write!(f, "aggregate/{}", metric),
            ProofKind::Temporal => f.write_str("temporal"),
        }
    }
}

/// A proof together with everything needed to verify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitProof {
    /// Identifies the constraint system, and therefore the verifying key.
    pub circuit_id: String,
    pub kind: ProofKind,
    pub proof_system: ProofSystem,
    pub proof: Vec<u8>,
    /// Field elements, 32 bytes little-endian each, in circuit order.
    pub public_inputs: Vec<[u8; 32]>,
    pub verifying_key: Vec<u8>,
    pub timestamp_ms: u64,
    /// Excluded proofs are carried in a bundle but given zero weight.
    pub include: bool,
}

impl CircuitProof {
    /// Public inputs as field elements, rejecting non-canonical encodings.
    pub fn public_inputs_fr(&self) -> Result<Vec<Fr>, CircuitError> {
        self.public_inputs.iter().map(|b| decode_field(b)).collect()
    }

    /// Public input `i` as an integer, when it fits in a u64.
    pub fn public_u64(&self, i: usize) -> Option<u64> {
        let bytes = self.public_inputs.get(i)?;
        let value = decode_field(bytes).ok()?;
        field_to_u64(value)
    }

    /// SHA-256 over the circuit id and public inputs.
    ///
    /// This is the identity used for replay protection. Proof bytes and their
    /// encoding are left out: a Groth16 proof can be re-randomized into new
    /// bytes that verify against the same inputs.
    pub fn proof_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.circuit_id.as_bytes());
        hasher.update([0u8]);
        hasher.update((self.public_inputs.len() as u64).to_le_bytes());
        for input in &self.public_inputs {
            hasher.update(input);
        }
        hasher.finalize().into()
    }

    pub fn proof_hash_hex(&self) -> String {
        hex::encode(self.proof_hash())
    }
}

/// Canonical 32-byte little-endian encoding.
pub fn encode_field(value: Fr) -> [u8; 32] {
    let mut out = [0u8; 32];
    let bytes = value.into_bigint().to_bytes_le();
    out[..bytes.len()].copy_from_slice(&bytes);
    out
}

/// Decode a field element, rejecting values at or above the modulus.
pub fn decode_field(bytes: &[u8; 32]) -> Result<Fr, CircuitError> {
    Fr::deserialize_compressed(&bytes[..]).map_err(|e| CircuitError::Encoding(e.to_string()))
}

/// The element as an integer, if it is below 2^64.
pub fn field_to_u64(value: Fr) -> Option<u64> {
    let bigint = value.into_bigint();
    let limbs = bigint.as_ref();
    if limbs[1..].iter().all(|l| *l == 0) {
        Some(limbs[0])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_encoding_roundtrip() {
        let value = Fr::from(123_456_789u64);
        let bytes = encode_field(value);
        assert_eq!(bytes[0], (123_456_789u64 & 0xff) as u8);
        assert_eq!(decode_field(&bytes).unwrap(), value);
        assert_eq!(field_to_u64(value), Some(123_456_789));
        assert_eq!(field_to_u64(-Fr::from(1u64)), None);
    }

    #[test]
    fn test_non_canonical_field_rejected() {
        assert!(decode_field(&[0xff; 32]).is_err());
    }

    #[test]
    fn test_proof_hash_covers_inputs() {
        let proof = CircuitProof {
            circuit_id: "aggregator/commits/4".into(),
            kind: ProofKind::Aggregate(MetricKind::Commits),
            proof_system: ProofSystem::Groth16Bn254Compressed,
            proof: vec![1, 2, 3],
            public_inputs: vec![encode_field(Fr::from(5u64))],
            verifying_key: vec![],
            timestamp_ms: 0,
            include: true,
        };
        let mut other = proof.clone();
        other.public_inputs = vec![encode_field(Fr::from(6u64))];
        assert_ne!(proof.proof_hash(), other.proof_hash());

        let mut excluded = proof.clone();
        excluded.include = false;
        excluded.timestamp_ms = 99;
        assert_eq!(proof.proof_hash(), excluded.proof_hash());

        // Same statement under different proof bytes or encoding.
        let mut reencoded = proof.clone();
        reencoded.proof = vec![9, 9, 9, 9];
        reencoded.proof_system = ProofSystem::Groth16Bn254Uncompressed;
        assert_eq!(proof.proof_hash(), reencoded.proof_hash());

        let mut other_circuit = proof.clone();
        other_circuit.circuit_id = "aggregator/commits/8".into();
        assert_ne!(proof.proof_hash(), other_circuit.proof_hash());
        assert_eq!(proof.public_u64(0), Some(5));
    }
}
