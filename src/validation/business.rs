//! Domain invariants and custom rules.

use super::audit::{AuditTrail, CheckKind};
use super::rules::CompiledRule;
use super::CheckContext;
use crate::aggregation::{Aggregation, ClaimMetrics, FieldValue, MetricField};

const CHECK: CheckKind = CheckKind::BusinessLogic;

pub(crate) fn run(
    aggregation: &Aggregation,
    _cx: &CheckContext<'_>,
    rules: &[CompiledRule],
    trail: &mut AuditTrail,
) {
    let repositories = aggregation.repository_count();
    let nonzero: Vec<MetricField> = aggregation
        .metrics
        .fields()
        .into_iter()
        .filter(|f| *f != MetricField::TotalRepositories)
        .filter(|f| aggregation.value(*f).is_some_and(|v| v.as_f64().is_some() && !v.is_zero()))
        .collect();

    let value = Some(FieldValue::Count(repositories));
    if repositories == 0 && !nonzero.is_empty() {
        trail.fail(
            CHECK,
            "metrics_require_repositories",
            Some(MetricField::TotalRepositories),
            value,
            format!("{} metrics reported without any repository", nonzero.len()),
        );
    } else {
        trail.pass(CHECK, "metrics_require_repositories", Some(MetricField::TotalRepositories), value);
    }

    if let ClaimMetrics::Language(m) = &aggregation.metrics {
        let value = Some(FieldValue::Number(m.proficiency_score));
        if m.languages.is_empty() && (m.proficiency_score > 0.0 || m.primary_language.is_some()) {
            trail.fail(
                CHECK,
                "proficiency_requires_languages",
                Some(MetricField::ProficiencyScore),
                value,
                "proficiency reported without any language",
            );
        } else {
            trail.pass(CHECK, "proficiency_requires_languages", Some(MetricField::ProficiencyScore), value);
        }
    }

    for rule in rules {
        rule.evaluate(aggregation, trail);
    }
}
