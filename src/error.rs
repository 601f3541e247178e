//! Top-level error taxonomy for the credential pipeline.
//!
//! Callers decide between retrying and abandoning on the variant alone:
//! an invalid submission, a replayed proof and an unavailable backend are
//! never folded into one another.

use crate::activity::ActivityError;
use crate::aggregation::AggregationError;
use crate::cache::CacheError;
use crate::circuits::CircuitError;
use crate::combiner::CombinerError;
use crate::config::ConfigError;
use crate::privacy::PrivacyError;
use crate::registry::{RejectionReason, VerificationError};
use crate::validation::ValidationError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CredentialError {
    /// Missing or malformed activity, or no access to a repository.
    #[error("Input error: {0}")]
    Input(String),

    #[error("Aggregation {aggregation_id} failed validation {validation_id}")]
    ValidationFailed { validation_id: Uuid, aggregation_id: Uuid },

    #[error("Privacy violation: {0}")]
    PrivacyViolation(#[from] PrivacyError),

    #[error("Proof error: {0}")]
    Proof(String),

    #[error("Submission rejected: {0}")]
    Rejected(RejectionReason),

    #[error("Proof {proof_hash} was already used")]
    Replay { proof_hash: String },

    /// Registry state that is neither a rejection nor a replay (paused, not owner, ...).
    #[error("Registry refused: {0}")]
    Registry(VerificationError),

    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ActivityError> for CredentialError {
    fn from(err: ActivityError) -> Self {
        CredentialError::Input(err.to_string())
    }
}

impl From<AggregationError> for CredentialError {
    fn from(err: AggregationError) -> Self {
        match err {
            AggregationError::Privacy(e) => CredentialError::PrivacyViolation(e),
            AggregationError::Serialization(e) => CredentialError::Input(e.to_string()),
        }
    }
}

impl From<ValidationError> for CredentialError {
    fn from(err: ValidationError) -> Self {
        CredentialError::Config(ConfigError::Invalid(err.to_string()))
    }
}

impl From<CacheError> for CredentialError {
    fn from(err: CacheError) -> Self {
        CredentialError::Storage(err.to_string())
    }
}

impl From<CircuitError> for CredentialError {
    fn from(err: CircuitError) -> Self {
        CredentialError::Proof(err.to_string())
    }
}

impl From<CombinerError> for CredentialError {
    fn from(err: CombinerError) -> Self {
        CredentialError::Proof(err.to_string())
    }
}

impl From<VerificationError> for CredentialError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Rejected(reason) => CredentialError::Rejected(reason),
            VerificationError::Replay { proof_hash } => CredentialError::Replay { proof_hash },
            VerificationError::BackendUnavailable(reason) => CredentialError::Storage(reason),
            other => CredentialError::Registry(other),
        }
    }
}
