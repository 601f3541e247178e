//! Operator-supplied business rules.
//!
//! Rules are declared in configuration and compiled once when the validator
//! is built, so a bad regular expression is a construction error rather than a
//! per-aggregation failure.

use super::audit::{AuditTrail, Severity};
use super::consistency::reconciles;
use super::ValidationError;
use crate::aggregation::{Aggregation, MetricField};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Comparison used by consistency and expression rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Le,
    Ge,
    Eq,
}

impl Relation {
    fn holds(&self, left: f64, right: f64, tolerance: f64) -> bool {
        match self {
            Relation::Le => left <= right + tolerance,
            Relation::Ge => left + tolerance >= right,
            Relation::Eq => reconciles(left, right, tolerance),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub coefficient: f64,
    pub field: MetricField,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Numeric field inside optional bounds.
    Range {
        field: MetricField,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Text field matches a regular expression.
    Pattern { field: MetricField, regex: String },
    /// When `field` is nonzero, `requires` must be nonzero too.
    Dependency {
        field: MetricField,
        requires: MetricField,
    },
    /// `left <relation> right`.
    Consistency {
        left: MetricField,
        relation: Relation,
        right: MetricField,
        #[serde(default)]
        tolerance: f64,
    },
    /// `sum(coefficient * field) <relation> constant`.
    Expression {
        terms: Vec<Term>,
        relation: Relation,
        constant: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRule {
    pub name: String,
    #[serde(default)]
    pub severity: Severity,
    pub rule: RuleKind,
}

/// A rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: CustomRule,
    pattern: Option<Regex>,
}

impl CompiledRule {
    pub fn compile(rule: CustomRule) -> Result<Self, ValidationError> {
        let pattern = match &rule.rule {
            RuleKind::Pattern { regex, .. } => Some(Regex::new(regex).map_err(|source| {
                ValidationError::InvalidPattern {
                    rule: rule.name.clone(),
                    source,
                }
            })?),
            _ => None,
        };
        Ok(Self { rule, pattern })
    }

    pub fn name(&self) -> &str {
        &self.rule.name
    }

    pub fn evaluate(&self, aggregation: &Aggregation, trail: &mut AuditTrail) {
        let name = self.rule.name.as_str();
        let severity = self.rule.severity;
        let number = |field: MetricField| aggregation.value(field).and_then(|v| v.as_f64());

        match &self.rule.rule {
            RuleKind::Range { field, min, max } => {
                let value = aggregation.value(*field);
                let violated = match value.as_ref().and_then(|v| v.as_f64()) {
                    Some(n) => min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m),
                    None => false,
                };
                trail.custom(name, Some(*field), value, violated, severity, format!("{} outside configured range", field));
            }
            RuleKind::Pattern { field, .. } => {
                let value = aggregation.value(*field);
                let violated = match (value.as_ref().and_then(|v| v.as_text()), &self.pattern) {
                    (Some(text), Some(re)) => !re.is_match(text),
                    _ => false,
                };
                trail.custom(name, Some(*field), value, violated, severity, format!("{} does not match pattern", field));
            }
            RuleKind::Dependency { field, requires } => {
                let value = aggregation.value(*field);
                let present = value.as_ref().is_some_and(|v| !v.is_zero());
                let satisfied = aggregation.value(*requires).is_some_and(|v| !v.is_zero());
                trail.custom(
                    name,
                    Some(*field),
                    value,
                    present && !satisfied,
                    severity,
                    format!("{} requires a nonzero {}", field, requires),
                );
            }
            RuleKind::Consistency {
                left,
                relation,
                right,
                tolerance,
            } => {
                let value = aggregation.value(*left);
                let violated = match (number(*left), number(*right)) {
                    (Some(l), Some(r)) => !relation.holds(l, r, *tolerance),
                    _ => false,
                };
                trail.custom(
                    name,
                    Some(*left),
                    value,
                    violated,
                    severity,
                    format!("{} {:?} {} does not hold", left, relation, right),
                );
            }
            RuleKind::Expression {
                terms,
                relation,
                constant,
            } => {
                let values: Option<Vec<f64>> = terms
                    .iter()
                    .map(|t| number(t.field).map(|v| v * t.coefficient))
                    .collect();
                let violated = match values {
                    Some(v) => !relation.holds(v.iter().sum(), *constant, 0.0),
                    None => false,
                };
                trail.custom(
                    name,
                    terms.first().map(|t| t.field),
                    None,
                    violated,
                    severity,
                    format!("expression {:?} {} does not hold", relation, constant),
                );
            }
        }
    }
}
