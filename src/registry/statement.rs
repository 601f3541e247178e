//! Claim statements, their structural bounds, and how proofs bind to them.

use crate::aggregation::ClaimType;
use crate::circuits::{CircuitProof, MetricKind, ProofKind};
use crate::combiner::BundleRejection;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_COMMITS: u64 = 100_000;
pub const MAX_LINES_OF_CODE: u64 = 100_000_000;
pub const MAX_LANGUAGES: u64 = 50;
pub const MAX_COLLABORATORS: u64 = 10_000;
pub const MAX_SCORE: u64 = 100;

// Public input positions.
const CLAIM_MIN: usize = 0;
const CLAIM_MAX: usize = 1;
const VALID_COUNT: usize = 3;
const CONSISTENCY_INDEX: usize = 3;
const SUSTAINABILITY: usize = 5;

/// Why a submission was refused before or during verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    OutOfBounds { field: String, detail: String },
    FutureTimestamp { timestamp_ms: u64, now_ms: u64 },
    ClaimTypeMismatch { statement: ClaimType, bundle: ClaimType },
    MissingProof { kind: String },
    /// A proof whose kind or public inputs do not match the statement.
    UnboundProof { circuit_id: String, detail: String },
    UntrustedKey { circuit_id: String },
    InvalidBundle { rejection: BundleRejection },
    IntegrityMismatch,
    DuplicateCredential { credential_id: String },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::OutOfBounds { field, detail } => write!(f, "{} out of bounds: {}", field, detail),
            RejectionReason::FutureTimestamp { timestamp_ms, now_ms } => {
                write!(f, "timestamp {} is ahead of now ({})", timestamp_ms, now_ms)
            }
            RejectionReason::ClaimTypeMismatch { statement, bundle } => {
                write!(f, "statement is a {} claim but bundle proves {}", statement, bundle)
            }
            RejectionReason::MissingProof { kind } => write!(f, "no included proof of kind {}", kind),
            RejectionReason::UnboundProof { circuit_id, detail } => {
                write!(f, "proof {} does not bind to the statement: {}", circuit_id, detail)
            }
            RejectionReason::UntrustedKey { circuit_id } => {
                write!(f, "verifying key for {} is not trusted", circuit_id)
            }
            RejectionReason::InvalidBundle { rejection } => write!(f, "invalid bundle: {:?}", rejection),
            RejectionReason::IntegrityMismatch => f.write_str("bundle integrity hash does not match its proofs"),
            RejectionReason::DuplicateCredential { credential_id } => {
                write!(f, "credential {} was already issued", credential_id)
            }
        }
    }
}

/// Inclusive integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: u64,
    pub max: u64,
}

impl Bounds {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    fn check(&self, field: &str, ceiling: u64) -> Result<(), RejectionReason> {
        if self.min > self.max {
            return Err(out_of_bounds(field, format!("min {} > max {}", self.min, self.max)));
        }
        if self.max > ceiling {
            return Err(out_of_bounds(field, format!("max {} exceeds {}", self.max, ceiling)));
        }
        Ok(())
    }
}

fn out_of_bounds(field: &str, detail: String) -> RejectionReason {
    RejectionReason::OutOfBounds {
        field: field.to_string(),
        detail,
    }
}

fn check_count(field: &str, value: u64, lo: u64, hi: u64) -> Result<(), RejectionReason> {
    if value < lo || value > hi {
        return Err(out_of_bounds(field, format!("{} not in [{}, {}]", value, lo, hi)));
    }
    Ok(())
}

/// What a credential asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClaimStatement {
    Repository {
        commits: Bounds,
        lines_of_code: Bounds,
        /// Claimed only when a language proof backs it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language_count: Option<u64>,
        collaborators: Bounds,
        timestamp_ms: u64,
    },
    Language {
        language_count: u64,
        timestamp_ms: u64,
    },
    Collaboration {
        collaborators: Bounds,
        timestamp_ms: u64,
    },
    Consistency {
        min_consistency: u64,
        min_sustainability: u64,
        timestamp_ms: u64,
    },
}

impl ClaimStatement {
    pub fn claim_type(&self) -> ClaimType {
        match self {
            ClaimStatement::Repository { .. } => ClaimType::Repository,
            ClaimStatement::Language { .. } => ClaimType::Language,
            ClaimStatement::Collaboration { .. } => ClaimType::Collaboration,
            ClaimStatement::Consistency { .. } => ClaimType::Consistency,
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        match self {
            ClaimStatement::Repository { timestamp_ms, .. }
            | ClaimStatement::Language { timestamp_ms, .. }
            | ClaimStatement::Collaboration { timestamp_ms, .. }
            | ClaimStatement::Consistency { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    /// Structural bounds that hold regardless of any proof.
    pub fn check_bounds(&self, now_ms: u64, future_tolerance_ms: u64) -> Result<(), RejectionReason> {
        let timestamp_ms = self.timestamp_ms();
        if timestamp_ms > now_ms.saturating_add(future_tolerance_ms) {
            return Err(RejectionReason::FutureTimestamp { timestamp_ms, now_ms });
        }
        match self {
            ClaimStatement::Repository {
                commits,
                lines_of_code,
                language_count,
                collaborators,
                ..
            } => {
                commits.check("commits", MAX_COMMITS)?;
                lines_of_code.check("lines_of_code", MAX_LINES_OF_CODE)?;
                if let Some(count) = language_count {
                    check_count("language_count", *count, 1, MAX_LANGUAGES)?;
                }
                collaborators.check("collaborators", MAX_COLLABORATORS)
            }
            ClaimStatement::Language { language_count, .. } => {
                check_count("language_count", *language_count, 1, MAX_LANGUAGES)
            }
            ClaimStatement::Collaboration { collaborators, .. } => {
                collaborators.check("collaborators", MAX_COLLABORATORS)
            }
            ClaimStatement::Consistency {
                min_consistency,
                min_sustainability,
                ..
            } => {
                check_count("min_consistency", *min_consistency, 0, MAX_SCORE)?;
                check_count("min_sustainability", *min_sustainability, 0, MAX_SCORE)
            }
        }
    }

    /// Proof kinds that must be present.
    pub fn required_proofs(&self) -> Vec<ProofKind> {
        match self {
            ClaimStatement::Repository { language_count, .. } => {
                let mut kinds = vec![
                    ProofKind::Aggregate(MetricKind::Commits),
                    ProofKind::Aggregate(MetricKind::LinesOfCode),
                    ProofKind::Aggregate(MetricKind::Collaborators),
                ];
                if language_count.is_some() {
                    kinds.push(ProofKind::Aggregate(MetricKind::Languages));
                }
                kinds
            }
            ClaimStatement::Language { .. } => vec![ProofKind::Aggregate(MetricKind::Languages)],
            ClaimStatement::Collaboration { .. } => vec![ProofKind::Aggregate(MetricKind::Collaborators)],
            ClaimStatement::Consistency { .. } => vec![ProofKind::Temporal],
        }
    }

    /// Every required kind is present and every proof's public inputs match the statement.
    pub fn check_binding<'a, I>(&self, proofs: I) -> Result<(), RejectionReason>
    where
        I: IntoIterator<Item = &'a CircuitProof>,
    {
        let proofs: Vec<&CircuitProof> = proofs.into_iter().collect();
        for kind in self.required_proofs() {
            if !proofs.iter().any(|p| p.kind == kind) {
                return Err(RejectionReason::MissingProof { kind: kind.to_string() });
            }
        }
        proofs.iter().try_for_each(|p| self.bind(p))
    }

    fn bind(&self, proof: &CircuitProof) -> Result<(), RejectionReason> {
        let unbound = |detail: String| RejectionReason::UnboundProof {
            circuit_id: proof.circuit_id.clone(),
            detail,
        };
        let input = |i: usize| {
            proof
                .public_u64(i)
                .ok_or_else(|| unbound(format!("public input {} missing or not an integer", i)))
        };
        let range_matches = |bounds: &Bounds| -> Result<(), RejectionReason> {
            let (min, max) = (input(CLAIM_MIN)?, input(CLAIM_MAX)?);
            if (min, max) != (bounds.min, bounds.max) {
                return Err(unbound(format!(
                    "proves [{}, {}] but statement claims [{}, {}]",
                    min, max, bounds.min, bounds.max
                )));
            }
            Ok(())
        };
        let count_matches = |expected: u64| -> Result<(), RejectionReason> {
            let count = input(VALID_COUNT)?;
            if count != expected {
                return Err(unbound(format!("proves count {} but statement claims {}", count, expected)));
            }
            Ok(())
        };

        match (self, proof.kind) {
            (ClaimStatement::Repository { commits, .. }, ProofKind::Aggregate(MetricKind::Commits)) => {
                range_matches(commits)
            }
            (ClaimStatement::Repository { lines_of_code, .. }, ProofKind::Aggregate(MetricKind::LinesOfCode)) => {
                range_matches(lines_of_code)
            }
            (
                ClaimStatement::Repository { collaborators, .. } | ClaimStatement::Collaboration { collaborators, .. },
                ProofKind::Aggregate(MetricKind::Collaborators),
            ) => range_matches(collaborators),
            (
                ClaimStatement::Repository {
                    language_count: Some(language_count),
                    ..
                }
                | ClaimStatement::Language { language_count, .. },
                ProofKind::Aggregate(MetricKind::Languages),
            ) => count_matches(*language_count),
            (
                ClaimStatement::Consistency {
                    min_consistency,
                    min_sustainability,
                    ..
                },
                ProofKind::Temporal,
            ) => {
                let consistency = input(CONSISTENCY_INDEX)?;
                let sustainability = input(SUSTAINABILITY)?;
                if consistency < *min_consistency || sustainability < *min_sustainability {
                    return Err(unbound(format!(
                        "consistency {} / sustainability {} below claimed {} / {}",
                        consistency, sustainability, min_consistency, min_sustainability
                    )));
                }
                Ok(())
            }
            (_, kind) => Err(unbound(format!("{} proof has no place in a {} claim", kind, self.claim_type()))),
        }
    }
}
