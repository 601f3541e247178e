//! Structural integrity: required fields, field types, nested groups, freshness.

use super::audit::{AuditTrail, CheckKind};
use super::CheckContext;
use crate::aggregation::{Aggregation, ClaimMetrics, FieldValue, MetricField};

const CHECK: CheckKind = CheckKind::Integrity;

/// Declared value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Count,
    Number,
    Text,
}

fn declared_kind(field: MetricField) -> FieldKind {
    use MetricField as F;
    match field {
        F::AggregationId | F::Subject | F::ContentHash | F::PrimaryLanguage => FieldKind::Text,
        F::CreatedAt
        | F::TotalRepositories
        | F::TotalCommits
        | F::TotalLinesOfCode
        | F::EarliestActivity
        | F::LatestActivity
        | F::LanguageCount
        | F::UniqueCollaborators
        | F::MaxCollaborators => FieldKind::Count,
        F::AverageCommitsPerRepository
        | F::ActiveRepositoryPercentage
        | F::ProficiencyScore
        | F::AverageCollaboratorsPerRepository
        | F::TeamRepositoryPercentage
        | F::OverallConsistency
        | F::Reliability
        | F::Commitment
        | F::Professionalism
        | F::Sustainability => FieldKind::Number,
    }
}

fn type_matches(field: MetricField, value: &FieldValue) -> bool {
    match (declared_kind(field), value) {
        (FieldKind::Count, FieldValue::Count(_)) => true,
        (FieldKind::Number, FieldValue::Number(n)) => n.is_finite(),
        (FieldKind::Text, FieldValue::Text(_)) => true,
        _ => false,
    }
}

/// Fields every aggregation of the given kind must carry.
fn required_fields(metrics: &ClaimMetrics) -> &'static [MetricField] {
    use MetricField as F;
    match metrics {
        ClaimMetrics::Repository(_) => &[
            F::TotalRepositories,
            F::TotalCommits,
            F::TotalLinesOfCode,
            F::AverageCommitsPerRepository,
            F::ActiveRepositoryPercentage,
        ],
        ClaimMetrics::Language(_) => &[F::TotalRepositories, F::LanguageCount, F::ProficiencyScore],
        ClaimMetrics::Collaboration(_) => &[
            F::TotalRepositories,
            F::UniqueCollaborators,
            F::AverageCollaboratorsPerRepository,
            F::MaxCollaborators,
            F::TeamRepositoryPercentage,
        ],
        ClaimMetrics::Consistency(_) => &[
            F::TotalRepositories,
            F::OverallConsistency,
            F::Reliability,
            F::Commitment,
            F::Professionalism,
            F::Sustainability,
        ],
    }
}

pub(crate) fn run(aggregation: &Aggregation, cx: &CheckContext<'_>, trail: &mut AuditTrail) {
    let envelope = [
        (MetricField::AggregationId, !aggregation.id.is_nil()),
        (MetricField::Subject, !aggregation.subject.as_str().is_empty()),
        (MetricField::CreatedAt, aggregation.created_at > 0),
    ];
    for (field, present) in envelope {
        let value = aggregation.value(field);
        if present {
            trail.pass(CHECK, "required_field", Some(field), value);
        } else {
            trail.fail(CHECK, "required_field", Some(field), value, format!("{} is missing", field));
        }
    }

    for &field in required_fields(&aggregation.metrics) {
        match aggregation.value(field) {
            Some(value) => trail.pass(CHECK, "required_field", Some(field), Some(value)),
            None => trail.fail(CHECK, "required_field", Some(field), None, format!("{} is missing", field)),
        }
    }

    for field in aggregation.metrics.fields() {
        let Some(value) = aggregation.value(field) else {
            continue;
        };
        if type_matches(field, &value) {
            trail.pass(CHECK, "field_type", Some(field), Some(value));
        } else {
            trail.fail(
                CHECK,
                "field_type",
                Some(field),
                Some(value),
                format!("{} does not hold a valid {:?}", field, declared_kind(field)),
            );
        }
    }

    nested_groups(aggregation, trail);
    freshness(aggregation, cx, trail);
}

fn nested_groups(aggregation: &Aggregation, trail: &mut AuditTrail) {
    let (expected, present) = match &aggregation.metrics {
        ClaimMetrics::Repository(m) => (m.total_repositories, m.repositories.len() as u64),
        ClaimMetrics::Collaboration(m) => (m.total_repositories, m.collaborators_per_repository.len() as u64),
        ClaimMetrics::Language(m) => {
            let named = m.languages.iter().all(|l| !l.name.trim().is_empty());
            if named {
                trail.pass(CHECK, "metric_group", Some(MetricField::LanguageCount), None);
            } else {
                trail.fail(
                    CHECK,
                    "metric_group",
                    Some(MetricField::LanguageCount),
                    None,
                    "language breakdown contains an unnamed entry",
                );
            }
            return;
        }
        ClaimMetrics::Consistency(_) => return,
    };
    let value = Some(FieldValue::Count(present));
    if expected == present {
        trail.pass(CHECK, "metric_group", Some(MetricField::TotalRepositories), value);
    } else {
        trail.fail(
            CHECK,
            "metric_group",
            Some(MetricField::TotalRepositories),
            value,
            format!("per-repository breakdown has {} entries for {} repositories", present, expected),
        );
    }
}

fn freshness(aggregation: &Aggregation, cx: &CheckContext<'_>, trail: &mut AuditTrail) {
    let age = cx.now_ms.saturating_sub(aggregation.created_at);
    let value = Some(FieldValue::Count(aggregation.created_at));
    if age > cx.config.stale_after_ms {
        trail.warn(
            CHECK,
            "freshness",
            Some(MetricField::CreatedAt),
            value,
            format!("aggregation is {} ms old", age),
        );
    } else {
        trail.pass(CHECK, "freshness", Some(MetricField::CreatedAt), value);
    }
}
