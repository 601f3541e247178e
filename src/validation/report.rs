//! Validation reports, derived mechanically from the audit trail.

use super::audit::{AuditTrail, CheckKind, RuleEvaluation, Verdict};
use crate::activity::SubjectId;
use crate::aggregation::MetricField;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one of the six checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub check: CheckKind,
    pub passed: bool,
    /// 0-100.
    pub score: f64,
    pub checks: usize,
    pub failures: usize,
    pub warnings: usize,
}

impl ValidationResult {
    /// Summarise the trail entries belonging to `check`.
    ///
    /// Score is the share of evaluations that did not fail, or 100 when the
    /// check evaluated nothing.
    pub fn from_trail(check: CheckKind, trail: &AuditTrail) -> Self {
        let (mut checks, mut failures, mut warnings) = (0, 0, 0);
        for entry in trail.for_check(check) {
            checks += 1;
            if entry.verdict.is_failure() {
                failures += 1;
            } else if entry.verdict.is_warning() {
                warnings += 1;
            }
        }
        let score = if checks == 0 {
            100.0
        } else {
            100.0 * (checks - failures) as f64 / checks as f64
        };
        Self {
            check,
            passed: failures == 0,
            score,
            checks,
            failures,
            warnings,
        }
    }
}

/// A typed error or warning lifted from the trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub check: CheckKind,
    pub rule: String,
    pub field: Option<MetricField>,
    pub message: String,
    /// Position of the originating entry in the audit trail.
    pub sequence: usize,
}

impl ValidationIssue {
    fn from_entry(entry: &RuleEvaluation) -> Self {
        Self {
            check: entry.check,
            rule: entry.rule.clone(),
            field: entry.field,
            message: entry
                .message
                .clone()
                .unwrap_or_else(|| format!("rule {} reported {:?}", entry.rule, entry.verdict)),
            sequence: entry.sequence,
        }
    }
}

/// Result of one validator run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub id: Uuid,
    pub aggregation_id: Uuid,
    pub subject: SubjectId,
    pub created_at: u64,
    pub valid: bool,
    /// Unweighted mean of the six sub-scores.
    pub score: f64,
    pub integrity: ValidationResult,
    pub range: ValidationResult,
    pub consistency: ValidationResult,
    pub privacy: ValidationResult,
    pub security: ValidationResult,
    pub business_logic: ValidationResult,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
    pub audit_trail: Vec<RuleEvaluation>,
}

impl ValidationReport {
    pub fn from_trail(
        aggregation_id: Uuid,
        subject: SubjectId,
        created_at: u64,
        trail: AuditTrail,
    ) -> Self {
        let result = |check| ValidationResult::from_trail(check, &trail);
        let integrity = result(CheckKind::Integrity);
        let range = result(CheckKind::Range);
        let consistency = result(CheckKind::Consistency);
        let privacy = result(CheckKind::Privacy);
        let security = result(CheckKind::Security);
        let business_logic = result(CheckKind::BusinessLogic);

        let sub = [&integrity, &range, &consistency, &privacy, &security, &business_logic];
        let score = sub.iter().map(|r| r.score).sum::<f64>() / sub.len() as f64;
        let valid = sub.iter().all(|r| r.passed);

        let errors: Vec<ValidationIssue> = trail
            .entries()
            .iter()
            .filter(|e| e.verdict.is_failure())
            .map(ValidationIssue::from_entry)
            .collect();
        let warnings: Vec<ValidationIssue> = trail
            .entries()
            .iter()
            .filter(|e| e.verdict.is_warning())
            .map(ValidationIssue::from_entry)
            .collect();

        let mut recommendations: Vec<String> = Vec::new();
        for entry in trail.entries() {
            if let Some(text) = recommendation(entry.check, entry.verdict) {
                if !recommendations.iter().any(|r| r == text) {
                    recommendations.push(text.to_string());
                }
            }
        }

        Self {
            id: Uuid::new_v4(),
            aggregation_id,
            subject,
            created_at,
            valid,
            score,
            integrity,
            range,
            consistency,
            privacy,
            security,
            business_logic,
            errors,
            warnings,
            recommendations,
            audit_trail: trail.into_entries(),
        }
    }

    /// The six sub-results in evaluation order.
    pub fn results(&self) -> [&ValidationResult; 6] {
        [
            &self.integrity,
            &self.range,
            &self.consistency,
            &self.privacy,
            &self.security,
            &self.business_logic,
        ]
    }

    pub fn failed_checks(&self) -> Vec<CheckKind> {
        self.results()
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.check)
            .collect()
    }
}

fn recommendation(check: CheckKind, verdict: Verdict) -> Option<&'static str> {
    let failed = verdict.is_failure();
    if !failed && !verdict.is_warning() {
        return None;
    }
    Some(match (check, failed) {
        (CheckKind::Integrity, true) => "Rebuild the aggregation from source activity",
        (CheckKind::Integrity, false) => "Re-aggregate to refresh stale data before proving",
        (CheckKind::Range, true) => "Review out-of-range metrics before requesting a proof",
        (CheckKind::Range, false) => "Clamped values were accepted; verify the source data",
        (CheckKind::Consistency, _) => "Recompute derived metrics so totals and averages reconcile",
        (CheckKind::Privacy, true) => {
            "Enable differential privacy with an anonymization level at or above the threshold"
        }
        (CheckKind::Privacy, false) => "Lower epsilon or raise the anonymization level",
        (CheckKind::Security, _) => "Use a well-formed subject identifier and content hash",
        (CheckKind::BusinessLogic, true) => "Resolve business rule violations",
        (CheckKind::BusinessLogic, false) => "Review business rule warnings",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::FieldValue;

    fn report(trail: AuditTrail) -> ValidationReport {
        ValidationReport::from_trail(Uuid::nil(), SubjectId::from("0xabc"), 0, trail)
    }

    #[test]
    fn test_empty_trail_is_valid_and_perfect() {
        let r = report(AuditTrail::new());
        assert!(r.valid);
        assert_eq!(r.score, 100.0);
        assert!(r.recommendations.is_empty());
    }

    #[test]
    fn test_score_is_mean_of_sub_scores() {
        let mut trail = AuditTrail::new();
        trail.pass(CheckKind::Range, "a", None, None);
        trail.fail(CheckKind::Range, "b", Some(MetricField::TotalCommits), Some(FieldValue::Count(0)), "low");
        trail.warn(CheckKind::Integrity, "stale", None, None, "old");

        let r = report(trail);
        assert_eq!(r.range.score, 50.0);
        assert_eq!(r.integrity.score, 100.0);
        assert!(!r.valid);
        assert!((r.score - 550.0 / 6.0).abs() < 1e-9);
        assert_eq!(r.failed_checks(), vec![CheckKind::Range]);
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.warnings.len(), 1);
        assert_eq!(r.audit_trail.len(), 3);
    }

    #[test]
    fn test_warnings_never_block_validity() {
        let mut trail = AuditTrail::new();
        trail.warn(CheckKind::Privacy, "epsilon", None, None, "high");
        trail.warn(CheckKind::Privacy, "epsilon", None, None, "high");
        let r = report(trail);
        assert!(r.valid);
        assert_eq!(r.recommendations.len(), 1);
    }
}
