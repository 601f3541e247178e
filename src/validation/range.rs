//! Numeric range checks.
//!
//! Percentages and 0-100 scores must lie in `[0, 100]`; an out-of-range
//! percentage is recorded together with its clamped value. Counts are held to
//! the configured bounds without correction.

use super::audit::{AuditTrail, CheckKind};
use super::{CheckContext, CountRange};
use crate::aggregation::{Aggregation, ClaimMetrics, FieldValue, MetricField};

const CHECK: CheckKind = CheckKind::Range;

fn count_bounds(field: MetricField, cx: &CheckContext<'_>) -> Option<CountRange> {
    let config = cx.config;
    match field {
        MetricField::TotalRepositories => Some(config.repositories),
        MetricField::TotalCommits => Some(config.commits),
        MetricField::TotalLinesOfCode => Some(config.lines_of_code),
        MetricField::UniqueCollaborators | MetricField::MaxCollaborators => Some(config.collaborators),
        MetricField::LanguageCount => Some(config.languages),
        _ => None,
    }
}

pub(crate) fn run(aggregation: &Aggregation, cx: &CheckContext<'_>, trail: &mut AuditTrail) {
    for field in aggregation.metrics.fields() {
        let Some(value) = aggregation.value(field) else {
            continue;
        };

        if field.is_percentage() {
            percentage(field, value, cx, trail);
        } else if let Some(bounds) = count_bounds(field, cx) {
            count(field, value, bounds, trail);
        } else if let Some(n) = value.as_f64() {
            if n.is_nan() || n < 0.0 {
                trail.fail(CHECK, "non_negative", Some(field), Some(value), format!("{} must not be negative", field));
            } else {
                trail.pass(CHECK, "non_negative", Some(field), Some(value));
            }
        }
    }

    if let ClaimMetrics::Repository(m) = &aggregation.metrics {
        let value = Some(FieldValue::Count(m.total_commits));
        if m.total_commits >= cx.config.min_commits {
            trail.pass(CHECK, "minimum_commits", Some(MetricField::TotalCommits), value);
        } else {
            trail.fail(
                CHECK,
                "minimum_commits",
                Some(MetricField::TotalCommits),
                value,
                format!("{} commits is below the minimum of {}", m.total_commits, cx.config.min_commits),
            );
        }
    }
}

fn percentage(field: MetricField, value: FieldValue, cx: &CheckContext<'_>, trail: &mut AuditTrail) {
    let Some(n) = value.as_f64() else {
        return;
    };
    if n.is_nan() {
        trail.fail(CHECK, "percentage_bounds", Some(field), Some(value), format!("{} is not a number", field));
    } else if (0.0..=100.0).contains(&n) {
        trail.pass(CHECK, "percentage_bounds", Some(field), Some(value));
    } else {
        trail.correct(
            CHECK,
            "percentage_bounds",
            field,
            value,
            FieldValue::Number(n.clamp(0.0, 100.0)),
            cx.config.strict_mode,
            format!("{} = {} lies outside [0, 100]", field, n),
        );
    }
}

fn count(field: MetricField, value: FieldValue, bounds: CountRange, trail: &mut AuditTrail) {
    let Some(n) = value.as_f64() else {
        return;
    };
    if n >= bounds.min as f64 && n <= bounds.max as f64 {
        trail.pass(CHECK, "count_bounds", Some(field), Some(value));
    } else {
        trail.fail(
            CHECK,
            "count_bounds",
            Some(field),
            Some(value),
            format!("{} = {} lies outside [{}, {}]", field, n, bounds.min, bounds.max),
        );
    }
}
