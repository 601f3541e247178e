//! Cross-field reconciliation and timestamp sanity.

use super::audit::{AuditTrail, CheckKind};
use super::CheckContext;
use crate::aggregation::{Aggregation, ClaimMetrics, FieldValue, MetricField};

const CHECK: CheckKind = CheckKind::Consistency;

/// `|actual - expected|` within `tolerance` of `expected` (at least one unit).
pub(crate) fn reconciles(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= tolerance * expected.abs().max(1.0)
}

pub(crate) fn run(aggregation: &Aggregation, cx: &CheckContext<'_>, trail: &mut AuditTrail) {
    let tolerance = cx.config.consistency_tolerance;
    let horizon = cx.now_ms.saturating_add(cx.config.future_tolerance_ms);

    not_future(trail, MetricField::CreatedAt, aggregation.created_at, horizon);

    match &aggregation.metrics {
        ClaimMetrics::Repository(m) => {
            let n = m.total_repositories as f64;
            let declared = m.total_commits as f64;
            expect(
                trail,
                "average_times_count",
                MetricField::AverageCommitsPerRepository,
                FieldValue::Number(m.average_commits_per_repository),
                reconciles(m.average_commits_per_repository * n, declared, tolerance),
                format!(
                    "{} commits per repository over {} repositories does not reconcile with {} total",
                    m.average_commits_per_repository, m.total_repositories, m.total_commits
                ),
            );

            let breakdown: u64 = m.repositories.iter().map(|r| r.commits).sum();
            expect(
                trail,
                "breakdown_sum",
                MetricField::TotalCommits,
                FieldValue::Count(m.total_commits),
                breakdown == m.total_commits,
                format!("per-repository commits sum to {}", breakdown),
            );

            let loc: u64 = m.repositories.iter().map(|r| r.lines_of_code).sum();
            expect(
                trail,
                "breakdown_sum",
                MetricField::TotalLinesOfCode,
                FieldValue::Count(m.total_lines_of_code),
                loc == m.total_lines_of_code,
                format!("per-repository lines of code sum to {}", loc),
            );

            if let (Some(earliest), Some(latest)) = (m.earliest_activity_ms, m.latest_activity_ms) {
                expect(
                    trail,
                    "activity_order",
                    MetricField::EarliestActivity,
                    FieldValue::Count(earliest),
                    earliest <= latest,
                    "earliest activity is after latest activity",
                );
            }
            if let Some(latest) = m.latest_activity_ms {
                not_future(trail, MetricField::LatestActivity, latest, horizon);
            }
        }
        ClaimMetrics::Language(m) => {
            if !m.languages.is_empty() {
                let total: f64 = m.languages.iter().map(|l| l.percentage).sum();
                expect(
                    trail,
                    "percentages_sum",
                    MetricField::LanguageCount,
                    FieldValue::Number(total),
                    reconciles(total, 100.0, tolerance),
                    format!("language percentages sum to {}", total),
                );
            }
            let max_lines = m.languages.iter().map(|l| l.lines).max();
            let primary_is_largest = match (&m.primary_language, max_lines) {
                (None, None) => true,
                (Some(p), Some(max)) => m.languages.iter().any(|l| &l.name == p && l.lines == max),
                _ => false,
            };
            expect(
                trail,
                "primary_is_largest",
                MetricField::PrimaryLanguage,
                FieldValue::Text(m.primary_language.clone().unwrap_or_default()),
                primary_is_largest,
                "primary language is not the language with the most lines",
            );
        }
        ClaimMetrics::Collaboration(m) => {
            let per_repo_sum: u64 = m.collaborators_per_repository.iter().sum();
            expect(
                trail,
                "average_times_count",
                MetricField::AverageCollaboratorsPerRepository,
                FieldValue::Number(m.average_collaborators_per_repository),
                reconciles(
                    m.average_collaborators_per_repository * m.total_repositories as f64,
                    per_repo_sum as f64,
                    tolerance,
                ),
                "average collaborators per repository does not reconcile with the breakdown",
            );
            let breakdown_max = m.collaborators_per_repository.iter().copied().max().unwrap_or(0);
            expect(
                trail,
                "maximum_matches",
                MetricField::MaxCollaborators,
                FieldValue::Count(m.max_collaborators),
                breakdown_max == m.max_collaborators,
                format!("largest repository has {} collaborators", breakdown_max),
            );
            expect(
                trail,
                "unique_covers_maximum",
                MetricField::UniqueCollaborators,
                FieldValue::Count(m.unique_collaborators),
                m.unique_collaborators >= m.max_collaborators,
                "fewer unique collaborators than in the largest repository",
            );
        }
        ClaimMetrics::Consistency(m) => {
            let ordered = m.timeline.windows(2).all(|w| w[0].day < w[1].day);
            expect(
                trail,
                "timeline_order",
                MetricField::OverallConsistency,
                FieldValue::Count(m.timeline.len() as u64),
                ordered,
                "timeline is not strictly increasing",
            );
            if let Some(last) = m.timeline.last() {
                not_future(
                    trail,
                    MetricField::LatestActivity,
                    last.day.saturating_mul(crate::clock::DAY_MS),
                    horizon,
                );
            }
        }
    }
}

fn expect(
    trail: &mut AuditTrail,
    rule: &str,
    field: MetricField,
    value: FieldValue,
    holds: bool,
    message: impl Into<String>,
) {
    if holds {
        trail.pass(CHECK, rule, Some(field), Some(value));
    } else {
        trail.fail(CHECK, rule, Some(field), Some(value), message);
    }
}

fn not_future(trail: &mut AuditTrail, field: MetricField, at_ms: u64, horizon_ms: u64) {
    expect(
        trail,
        "not_in_future",
        field,
        FieldValue::Count(at_ms),
        at_ms <= horizon_ms,
        format!("{} is in the future", field),
    );
}
