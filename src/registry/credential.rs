//! Issued credentials and their lifecycle.

use super::statement::ClaimStatement;
use crate::activity::SubjectId;
use crate::aggregation::ClaimType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Lifecycle of a credential id.
///
/// `Unissued -> Verified -> Revoked` is one-way; `Expired` is derived from the
/// clock and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialState {
    Unissued,
    Verified,
    Revoked,
    Expired,
}

impl fmt::Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialState::Unissued => "unissued",
            CredentialState::Verified => "verified",
            CredentialState::Revoked => "revoked",
            CredentialState::Expired => "expired",
        })
    }
}

/// A verified claim about a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub subject: SubjectId,
    /// Only the submitter may revoke.
    pub submitter: SubjectId,
    pub statement: ClaimStatement,
    pub proof_hashes: Vec<String>,
    pub integrity_hash: String,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
    pub revoked_at_ms: Option<u64>,
}

impl Credential {
    pub fn claim_type(&self) -> ClaimType {
        self.statement.claim_type()
    }

    pub fn state(&self, now_ms: u64) -> CredentialState {
        if self.revoked_at_ms.is_some() {
            CredentialState::Revoked
        } else if now_ms >= self.expires_at_ms {
            CredentialState::Expired
        } else {
            CredentialState::Verified
        }
    }
}

/// Deterministic credential id over subject, statement time, claim type and the
/// public inputs of every included proof.
pub fn credential_id<'a, I>(subject: &SubjectId, statement: &ClaimStatement, public_inputs: I) -> String
where
    I: IntoIterator<Item = &'a [u8; 32]>,
{
    let mut hasher = Sha256::new();
    hasher.update(subject.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(statement.timestamp_ms().to_be_bytes());
    hasher.update(statement.claim_type().to_string().as_bytes());
    for input in public_inputs {
        hasher.update(input);
    }
    hex::encode(hasher.finalize())
}
