//! Validation audit trail
//!
//! - Every rule evaluation is appended, whatever its outcome
//! - Entries are never edited or removed once recorded
//! - Error lists, warning lists and recommendations are derived from the trail

use crate::aggregation::{FieldValue, MetricField};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The six independent checks, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Integrity,
    Range,
    Consistency,
    Privacy,
    Security,
    BusinessLogic,
}

impl CheckKind {
    pub const ALL: [CheckKind; 6] = [
        CheckKind::Integrity,
        CheckKind::Range,
        CheckKind::Consistency,
        CheckKind::Privacy,
        CheckKind::Security,
        CheckKind::BusinessLogic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Integrity => "integrity",
            CheckKind::Range => "range",
            CheckKind::Consistency => "consistency",
            CheckKind::Privacy => "privacy",
            CheckKind::Security => "security",
            CheckKind::BusinessLogic => "business_logic",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Warning,
    Failed,
    /// Out of range but accepted after clamping.
    Corrected,
}

impl Verdict {
    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Failed)
    }

    /// Warnings and corrections both surface as warnings.
    pub fn is_warning(&self) -> bool {
        matches!(self, Verdict::Warning | Verdict::Corrected)
    }
}

/// Severity attached to a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

/// One rule evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    /// Position in the trail, starting at zero.
    pub sequence: usize,
    pub check: CheckKind,
    pub rule: String,
    pub field: Option<MetricField>,
    pub original: Option<FieldValue>,
    pub accepted: Option<FieldValue>,
    pub verdict: Verdict,
    pub severity: Severity,
    pub message: Option<String>,
}

/// Append-only log of rule evaluations for one validation run.
#[derive(Debug, Clone, Default)]
pub struct AuditTrail {
    entries: Vec<RuleEvaluation>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        check: CheckKind,
        rule: &str,
        field: Option<MetricField>,
        original: Option<FieldValue>,
        accepted: Option<FieldValue>,
        verdict: Verdict,
        severity: Severity,
        message: Option<String>,
    ) {
        self.entries.push(RuleEvaluation {
            sequence: self.entries.len(),
            check,
            rule: rule.to_string(),
            field,
            original,
            accepted,
            verdict,
            severity,
            message,
        });
    }

    /// Record a passing evaluation; the value is accepted unchanged.
    pub fn pass(&mut self, check: CheckKind, rule: &str, field: Option<MetricField>, value: Option<FieldValue>) {
        self.push(check, rule, field, value.clone(), value, Verdict::Passed, Severity::Info, None);
    }

    pub fn fail(
        &mut self,
        check: CheckKind,
        rule: &str,
        field: Option<MetricField>,
        value: Option<FieldValue>,
        message: impl Into<String>,
    ) {
        self.push(check, rule, field, value, None, Verdict::Failed, Severity::Error, Some(message.into()));
    }

    pub fn warn(
        &mut self,
        check: CheckKind,
        rule: &str,
        field: Option<MetricField>,
        value: Option<FieldValue>,
        message: impl Into<String>,
    ) {
        self.push(
            check,
            rule,
            field,
            value.clone(),
            value,
            Verdict::Warning,
            Severity::Warning,
            Some(message.into()),
        );
    }

    /// Record an out-of-range value and the value accepted in its place.
    ///
    /// `fatal` records a failure that still carries the corrected value.
    pub fn correct(
        &mut self,
        check: CheckKind,
        rule: &str,
        field: MetricField,
        original: FieldValue,
        accepted: FieldValue,
        fatal: bool,
        message: impl Into<String>,
    ) {
        let (verdict, severity) = if fatal {
            (Verdict::Failed, Severity::Error)
        } else {
            (Verdict::Corrected, Severity::Warning)
        };
        self.push(
            check,
            rule,
            Some(field),
            Some(original),
            Some(accepted),
            verdict,
            severity,
            Some(message.into()),
        );
    }

    /// Record a custom rule outcome under the rule's own severity.
    pub fn custom(
        &mut self,
        rule: &str,
        field: Option<MetricField>,
        value: Option<FieldValue>,
        violated: bool,
        severity: Severity,
        message: impl Into<String>,
    ) {
        let verdict = match (violated, severity) {
            (false, _) => Verdict::Passed,
            (true, Severity::Error) => Verdict::Failed,
            (true, Severity::Warning | Severity::Info) => Verdict::Warning,
        };
        let message = violated.then(|| message.into());
        self.push(
            CheckKind::BusinessLogic,
            rule,
            field,
            value.clone(),
            value,
            verdict,
            severity,
            message,
        );
    }

    pub fn entries(&self) -> &[RuleEvaluation] {
        &self.entries
    }

    pub fn for_check(&self, check: CheckKind) -> impl Iterator<Item = &RuleEvaluation> {
        self.entries.iter().filter(move |e| e.check == check)
    }

    pub fn into_entries(self) -> Vec<RuleEvaluation> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trail_is_sequenced() {
        let mut trail = AuditTrail::new();
        trail.pass(CheckKind::Integrity, "subject_present", Some(MetricField::Subject), None);
        trail.fail(CheckKind::Range, "within_bounds", Some(MetricField::TotalCommits), Some(FieldValue::Count(0)), "too low");
        trail.warn(CheckKind::Privacy, "epsilon_prudent", None, None, "epsilon high");

        let seq: Vec<usize> = trail.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(seq, vec![0, 1, 2]);
        assert_eq!(trail.for_check(CheckKind::Range).count(), 1);
    }

    #[test]
    fn test_correction_keeps_both_values() {
        let mut trail = AuditTrail::new();
        trail.correct(
            CheckKind::Range,
            "percentage_bounds",
            MetricField::Reliability,
            FieldValue::Number(104.0),
            FieldValue::Number(100.0),
            false,
            "clamped",
        );
        let entry = &trail.entries()[0];
        assert_eq!(entry.verdict, Verdict::Corrected);
        assert!(entry.verdict.is_warning());
        assert_eq!(entry.original, Some(FieldValue::Number(104.0)));
        assert_eq!(entry.accepted, Some(FieldValue::Number(100.0)));
    }

    #[test]
    fn test_custom_rule_severity_decides_verdict() {
        let mut trail = AuditTrail::new();
        trail.custom("a", None, None, true, Severity::Error, "x");
        trail.custom("b", None, None, true, Severity::Info, "x");
        trail.custom("c", None, None, false, Severity::Error, "x");
        let verdicts: Vec<Verdict> = trail.entries().iter().map(|e| e.verdict).collect();
        assert_eq!(verdicts, vec![Verdict::Failed, Verdict::Warning, Verdict::Passed]);
        assert_eq!(trail.entries()[2].message, None);
    }
}
