//! Proof Combiner
//!
//! Folds up to [`MAX_PROOFS`] independently produced circuit proofs into one
//! [`ProofBundle`] with a single integrity root and a single validity bit.
//!
//! ## Pipeline
//!
//! 1. Per proof, in parallel: decode and range-validate every element,
//!    re-encode to the canonical compressed form, verify, and digest the
//!    canonical bytes together with the circuit id and timestamp
//! 2. Weight each proof by proof system and freshness; excluded or invalid
//!    proofs get weight zero
//! 3. Fold the digests of included proofs into the integrity root
//! 4. Merge weighted public inputs according to the [`CombinationMode`]
//!
//! A bundle is valid only if at least one proof is included, every included
//! proof verified, and the integrity root is nonzero.

pub mod modes;

#[cfg(test)]
mod proptests;

pub use modes::{CombinationMode, COMBINED_WIDTH};

use crate::aggregation::ClaimType;
use crate::circuits::{
    encode_field, poseidon, verify_proof, CircuitError, CircuitProof, ProofSystem,
};
use crate::clock::{TimeSource, DAY_MS};
use ark_bn254::{Bn254, Fr};
use ark_ff::{PrimeField, Zero};
use ark_groth16::Proof;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Largest bundle accepted.
pub const MAX_PROOFS: usize = 16;

const FRESH_WITHIN_MS: u64 = 30 * DAY_MS;
const RECENT_WITHIN_MS: u64 = 180 * DAY_MS;

#[derive(Debug, Error)]
pub enum CombinerError {
    #[error("Bundle of {0} proofs exceeds the maximum of {MAX_PROOFS}")]
    TooManyProofs(usize),

    #[error("Circuit error: {0}")]
    Circuit(#[from] CircuitError),
}

/// Why a bundle is not valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BundleRejection {
    NoProofsIncluded,
    InvalidProofs { indices: Vec<usize> },
    ZeroIntegrityRoot,
}

/// Merged public inputs and a digest over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedProof {
    pub public_inputs: Vec<[u8; 32]>,
    pub digest: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub claim: ClaimType,
    pub mode: CombinationMode,
    pub proofs: Vec<CircuitProof>,
    /// Per proof: decoded, canonical and verified.
    pub validity: Vec<bool>,
    pub weights: Vec<u64>,
    pub integrity_hash: [u8; 32],
    pub combined: CombinedProof,
    pub valid: bool,
    pub rejection: Option<BundleRejection>,
}

impl ProofBundle {
    pub fn included(&self) -> impl Iterator<Item = &CircuitProof> {
        self.proofs.iter().filter(|p| p.include)
    }

    /// Replay identities of the included proofs.
    pub fn proof_hashes(&self) -> Vec<String> {
        self.included().map(CircuitProof::proof_hash_hex).collect()
    }
}

/// Result of checking one proof in isolation.
#[derive(Debug, Clone)]
struct Inspection {
    valid: bool,
    digest: Fr,
    inputs: Vec<Fr>,
}

/// Base weight by encoding; compressed proofs are the canonical form.
fn system_weight(system: ProofSystem) -> u64 {
    match system {
        ProofSystem::Groth16Bn254Compressed => 2,
        ProofSystem::Groth16Bn254Uncompressed => 1,
    }
}

fn freshness_weight(timestamp_ms: u64, now_ms: u64) -> u64 {
    match now_ms.saturating_sub(timestamp_ms) {
        age if age <= FRESH_WITHIN_MS => 3,
        age if age <= RECENT_WITHIN_MS => 2,
        _ => 1,
    }
}

/// Composes proofs into bundles.
pub struct ProofCombiner {
    clock: Arc<dyn TimeSource>,
}

impl ProofCombiner {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self { clock }
    }

    pub fn combine(
        &self,
        claim: ClaimType,
        proofs: Vec<CircuitProof>,
        mode: CombinationMode,
    ) -> Result<ProofBundle, CombinerError> {
        if proofs.len() > MAX_PROOFS {
            return Err(CombinerError::TooManyProofs(proofs.len()));
        }
        let now = self.clock.now_ms();

        let inspections: Vec<Inspection> = proofs.par_iter().map(inspect).collect();

        let weights: Vec<u64> = proofs
            .iter()
            .zip(&inspections)
            .map(|(p, i)| {
                if p.include && i.valid {
                    system_weight(p.proof_system) * freshness_weight(p.timestamp_ms, now)
                } else {
                    0
                }
            })
            .collect();

        // Included proofs fold in with their validity bit, so an invalid one
        // contributes H(acc, 0) and the root still records its position.
        let mut root = Fr::zero();
        for (proof, inspection) in proofs.iter().zip(&inspections) {
            if proof.include {
                let flagged = if inspection.valid { inspection.digest } else { Fr::zero() };
                root = poseidon::hash(&[root, flagged])?;
            }
        }

        let entries: Vec<(u64, [Fr; COMBINED_WIDTH])> = weights
            .iter()
            .zip(&inspections)
            .map(|(w, i)| (*w, modes::pad(&i.inputs)))
            .collect();
        let combined = modes::combine(mode, &entries, root)?;
        let digest = modes::combined_digest(mode, &combined, root)?;

        let invalid: Vec<usize> = proofs
            .iter()
            .zip(&inspections)
            .enumerate()
            .filter(|(_, (p, i))| p.include && !i.valid)
            .map(|(idx, _)| idx)
            .collect();
        let rejection = if !proofs.iter().any(|p| p.include) {
            Some(BundleRejection::NoProofsIncluded)
        } else if !invalid.is_empty() {
            Some(BundleRejection::InvalidProofs { indices: invalid })
        } else if root.is_zero() {
            Some(BundleRejection::ZeroIntegrityRoot)
        } else {
            None
        };

        match &rejection {
            Some(reason) => warn!(claim = %claim, mode = %mode, ?reason, "proof bundle rejected"),
            None => debug!(claim = %claim, mode = %mode, proofs = proofs.len(), "proof bundle combined"),
        }

        Ok(ProofBundle {
            claim,
            mode,
            validity: inspections.iter().map(|i| i.valid).collect(),
            proofs,
            weights,
            integrity_hash: encode_field(root),
            combined: CombinedProof {
                public_inputs: combined.iter().copied().map(encode_field).collect(),
                digest: encode_field(digest),
            },
            valid: rejection.is_none(),
            rejection,
        })
    }
}

fn inspect(proof: &CircuitProof) -> Inspection {
    let invalid = Inspection {
        valid: false,
        digest: Fr::zero(),
        inputs: Vec::new(),
    };
    let Ok(inputs) = proof.public_inputs_fr() else {
        return invalid;
    };
    if inputs.len() > COMBINED_WIDTH {
        return invalid;
    }
    // Canonical form: compressed encoding regardless of the declared system.
    let canonical = proof
        .proof_system
        .deserialize::<Proof<Bn254>>(&proof.proof)
        .and_then(|p| ProofSystem::Groth16Bn254Compressed.serialize(&p));
    let Ok(canonical) = canonical else {
        return invalid;
    };
    let valid = match verify_proof(proof) {
        Ok(valid) => valid,
        Err(e) => {
            debug!(circuit = %proof.circuit_id, error = %e, "proof failed to decode");
            false
        }
    };

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hasher.update(proof.circuit_id.as_bytes());
    hasher.update(proof.timestamp_ms.to_le_bytes());
    let digest = Fr::from_le_bytes_mod_order(&hasher.finalize());

    Inspection {
        valid,
        digest,
        inputs,
    }
}
