//! Aggregation Validator
//!
//! Six independent checks run in a fixed order over one aggregation:
//! - Integrity: required fields, declared types, nested groups, freshness
//! - Range: percentages in [0, 100], counts inside configured bounds
//! - Consistency: cross-field arithmetic reconciles, no future timestamps
//! - Privacy: privacy metadata, anonymization threshold, prudent epsilon
//! - Security: subject format, content hash format and match
//! - Business logic: domain invariants plus operator custom rules
//!
//! A failed check is not an error. It is a [`ValidationReport`] with
//! `valid == false`, so callers can inspect everything that was evaluated.

pub mod audit;
pub mod history;
pub mod report;
pub mod rules;

mod business;
mod consistency;
mod integrity;
mod privacy;
mod range;
mod security;

pub use audit::{AuditTrail, CheckKind, RuleEvaluation, Severity, Verdict};
pub use history::ValidationHistory;
pub use report::{ValidationIssue, ValidationReport, ValidationResult};
pub use rules::{CompiledRule, CustomRule, Relation, RuleKind, Term};

use crate::aggregation::{Aggregation, AggregationContext};
use crate::clock::TimeSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Custom rule {rule} has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Validation history lock poisoned")]
    LockPoisoned,
}

/// Inclusive bounds for a count field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min: u64,
    pub max: u64,
}

impl CountRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Privacy violations and out-of-range percentages fail instead of warn.
    pub strict_mode: bool,
    pub privacy_preservation: bool,
    pub min_anonymization_level: u32,
    pub epsilon_warning_threshold: f64,
    /// Relative tolerance for cross-field reconciliation.
    pub consistency_tolerance: f64,
    pub stale_after_ms: u64,
    pub future_tolerance_ms: u64,
    pub min_commits: u64,
    pub commits: CountRange,
    pub repositories: CountRange,
    pub lines_of_code: CountRange,
    pub collaborators: CountRange,
    pub languages: CountRange,
    pub custom_rules: Vec<CustomRule>,
    pub history_capacity: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            privacy_preservation: true,
            min_anonymization_level: 5,
            epsilon_warning_threshold: 2.0,
            consistency_tolerance: 0.05,
            stale_after_ms: 24 * 60 * 60 * 1000,
            future_tolerance_ms: 5 * 60 * 1000,
            min_commits: 10,
            commits: CountRange::new(0, 1_000_000),
            repositories: CountRange::new(0, 10_000),
            lines_of_code: CountRange::new(0, 100_000_000),
            collaborators: CountRange::new(0, 10_000),
            languages: CountRange::new(0, 50),
            custom_rules: Vec::new(),
            history_capacity: 100,
        }
    }
}

/// Inputs shared by every check in one run.
pub(crate) struct CheckContext<'a> {
    pub config: &'a ValidationConfig,
    pub now_ms: u64,
}

/// Runs the six checks and keeps a bounded report history.
pub struct AggregationValidator {
    config: ValidationConfig,
    rules: Vec<CompiledRule>,
    clock: Arc<dyn TimeSource>,
    history: ValidationHistory,
}

impl AggregationValidator {
    pub fn new(config: ValidationConfig, clock: Arc<dyn TimeSource>) -> Result<Self, ValidationError> {
        let rules = config
            .custom_rules
            .iter()
            .cloned()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let history = ValidationHistory::new(config.history_capacity);
        Ok(Self {
            config,
            rules,
            clock,
            history,
        })
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn history(&self) -> &ValidationHistory {
        &self.history
    }

    /// Validate and record the report in history.
    pub fn validate(
        &self,
        aggregation: &Aggregation,
        context: &AggregationContext,
    ) -> Result<ValidationReport, ValidationError> {
        let report = self.evaluate(aggregation);
        if report.valid {
            info!(
                validation_id = %report.id,
                audit_id = %context.audit_id,
                score = report.score,
                "aggregation validated"
            );
        } else {
            warn!(
                validation_id = %report.id,
                audit_id = %context.audit_id,
                failed = ?report.failed_checks(),
                errors = report.errors.len(),
                "aggregation failed validation"
            );
        }
        self.history.insert(report.clone())?;
        Ok(report)
    }

    /// Validate without touching history.
    pub fn evaluate(&self, aggregation: &Aggregation) -> ValidationReport {
        let now_ms = self.clock.now_ms();
        let cx = CheckContext {
            config: &self.config,
            now_ms,
        };
        let mut trail = AuditTrail::new();

        integrity::run(aggregation, &cx, &mut trail);
        range::run(aggregation, &cx, &mut trail);
        consistency::run(aggregation, &cx, &mut trail);
        privacy::run(aggregation, &cx, &mut trail);
        security::run(aggregation, &cx, &mut trail);
        business::run(aggregation, &cx, &self.rules, &mut trail);

        ValidationReport::from_trail(aggregation.id, aggregation.subject.clone(), now_ms, trail)
    }
}
