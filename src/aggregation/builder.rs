//! Builds aggregations from repository activity.

use super::{
    Aggregation, AggregationContext, ClaimMetrics, ClaimType, CollaborationMetrics,
    ConsistencyMetrics, LanguageMetrics, LanguageShare, RepositoryMetrics, RepositorySummary,
    TimelineEvent,
};
use crate::activity::RepositoryActivity;
use crate::analysis::{ConsistencyAnalysis, RawConsistencyMetrics, TemporalConsistencyAnalyzer};
use crate::clock::{TimeSource, DAY_MS};
use crate::privacy::{DifferentialPrivacyEngine, PrivacyError};
use crate::serialization::{content_digest, SerializationError};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// A repository counts as active with a commit in this many days before creation.
pub const ACTIVE_WINDOW_DAYS: u64 = 90;

/// Default number of active days kept as the temporal circuit witness.
pub const DEFAULT_TIMELINE_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Privacy engine refused release: {0}")]
    Privacy(#[from] PrivacyError),

    #[error("Failed to hash aggregation: {0}")]
    Serialization(#[from] SerializationError),
}

/// Turns repository activity into [`Aggregation`]s.
pub struct Aggregator {
    analyzer: TemporalConsistencyAnalyzer,
    engine: Arc<DifferentialPrivacyEngine>,
    clock: Arc<dyn TimeSource>,
    timeline_capacity: usize,
}

impl Aggregator {
    pub fn new(
        analyzer: TemporalConsistencyAnalyzer,
        engine: Arc<DifferentialPrivacyEngine>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            analyzer,
            engine,
            clock,
            timeline_capacity: DEFAULT_TIMELINE_CAPACITY,
        }
    }

    pub fn with_timeline_capacity(mut self, capacity: usize) -> Self {
        self.timeline_capacity = capacity;
        self
    }

    pub fn engine(&self) -> &Arc<DifferentialPrivacyEngine> {
        &self.engine
    }

    /// Per-repository consistency analyses.
    pub fn analyze(&self, repositories: &[RepositoryActivity]) -> Vec<ConsistencyAnalysis> {
        repositories.iter().map(|r| self.analyzer.analyze(r)).collect()
    }

    pub fn aggregate(
        &self,
        context: &AggregationContext,
        claim_type: ClaimType,
        repositories: &[RepositoryActivity],
    ) -> Result<Aggregation, AggregationError> {
        self.aggregate_with(context, claim_type, repositories, &mut rand::thread_rng())
    }

    /// Build an aggregation, drawing privacy noise from `rng`.
    pub fn aggregate_with<R: Rng + ?Sized>(
        &self,
        context: &AggregationContext,
        claim_type: ClaimType,
        repositories: &[RepositoryActivity],
        rng: &mut R,
    ) -> Result<Aggregation, AggregationError> {
        let now = self.clock.now_ms();
        let metrics = match claim_type {
            ClaimType::Repository => ClaimMetrics::Repository(repository_metrics(repositories, now)),
            ClaimType::Language => ClaimMetrics::Language(language_metrics(repositories)),
            ClaimType::Collaboration => {
                ClaimMetrics::Collaboration(collaboration_metrics(repositories))
            }
            ClaimType::Consistency => {
                let analyses = self.analyze(repositories);
                let raw = RawConsistencyMetrics::from_analyses(
                    &analyses,
                    self.analyzer.config().policy,
                );
                let scores = raw.release(&self.engine, &context.subject, &context.privacy, rng)?;
                ClaimMetrics::Consistency(ConsistencyMetrics {
                    scores,
                    timeline: timeline(repositories, self.timeline_capacity),
                })
            }
        };

        let content_hash = content_digest(&metrics)?;
        debug!(
            subject = %context.subject,
            correlation_id = %context.correlation_id,
            claim_type = %claim_type,
            repositories = repositories.len(),
            "built aggregation"
        );

        Ok(Aggregation {
            id: Uuid::new_v4(),
            subject: context.subject.clone(),
            created_at: now,
            metrics,
            privacy: Some(self.engine.metadata(&context.privacy)),
            content_hash: Some(content_hash),
        })
    }
}

fn timestamp_ms(ts: &chrono::DateTime<chrono::Utc>) -> u64 {
    ts.timestamp_millis().max(0) as u64
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

pub(crate) fn repository_metrics(repositories: &[RepositoryActivity], now_ms: u64) -> RepositoryMetrics {
    let window_start = now_ms.saturating_sub(ACTIVE_WINDOW_DAYS * DAY_MS);

    let repositories_summary: Vec<RepositorySummary> = repositories
        .iter()
        .map(|r| RepositorySummary {
            commits: r.commit_count(),
            lines_of_code: r.lines_of_code(),
            collaborators: r.collaborators().len() as u64,
            active: r
                .records
                .iter()
                .any(|c| timestamp_ms(&c.timestamp) >= window_start),
        })
        .collect();

    let all_times = repositories
        .iter()
        .flat_map(|r| r.records.iter().map(|c| timestamp_ms(&c.timestamp)));
    let earliest = all_times.clone().min();
    let latest = all_times.max();

    let total_repositories = repositories.len() as u64;
    let total_commits: u64 = repositories_summary.iter().map(|s| s.commits).sum();
    let active = repositories_summary.iter().filter(|s| s.active).count() as u64;

    RepositoryMetrics {
        total_repositories,
        total_commits,
        total_lines_of_code: repositories_summary.iter().map(|s| s.lines_of_code).sum(),
        average_commits_per_repository: if total_repositories == 0 {
            0.0
        } else {
            total_commits as f64 / total_repositories as f64
        },
        active_repository_percentage: percentage(active, total_repositories),
        earliest_activity_ms: earliest,
        latest_activity_ms: latest,
        repositories: repositories_summary,
    }
}

pub(crate) fn language_metrics(repositories: &[RepositoryActivity]) -> LanguageMetrics {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for usage in repositories.iter().flat_map(|r| r.languages.iter()) {
        *totals.entry(usage.name.as_str()).or_insert(0) += usage.lines;
    }
    let all_lines: u64 = totals.values().sum();

    let mut languages: Vec<LanguageShare> = totals
        .into_iter()
        .map(|(name, lines)| LanguageShare {
            name: name.to_string(),
            lines,
            percentage: percentage(lines, all_lines),
        })
        .collect();
    languages.sort_by(|a, b| b.lines.cmp(&a.lines).then_with(|| a.name.cmp(&b.name)));

    let primary = languages.first();
    let proficiency_score = primary
        .map(|p| (25.0 * (1.0 + p.lines as f64).log10()).min(100.0))
        .unwrap_or(0.0);

    LanguageMetrics {
        primary_language: primary.map(|p| p.name.clone()),
        proficiency_score,
        languages,
        total_repositories: repositories.len() as u64,
    }
}

pub(crate) fn collaboration_metrics(repositories: &[RepositoryActivity]) -> CollaborationMetrics {
    let per_repository: Vec<u64> = repositories
        .iter()
        .map(|r| r.collaborators().len() as u64)
        .collect();
    let unique: BTreeSet<&str> = repositories
        .iter()
        .flat_map(|r| r.records.iter().map(|c| c.author.as_str()))
        .collect();
    let total_repositories = repositories.len() as u64;
    let team = per_repository.iter().filter(|&&c| c > 1).count() as u64;

    CollaborationMetrics {
        total_repositories,
        unique_collaborators: unique.len() as u64,
        average_collaborators_per_repository: if total_repositories == 0 {
            0.0
        } else {
            per_repository.iter().sum::<u64>() as f64 / total_repositories as f64
        },
        max_collaborators: per_repository.iter().copied().max().unwrap_or(0),
        team_repository_percentage: percentage(team, total_repositories),
        collaborators_per_repository: per_repository,
    }
}

/// Merge all repositories into active days, keeping the most recent `capacity`.
pub(crate) fn timeline(repositories: &[RepositoryActivity], capacity: usize) -> Vec<TimelineEvent> {
    let mut days: BTreeMap<u64, u64> = BTreeMap::new();
    for record in repositories.iter().flat_map(|r| r.records.iter()) {
        let day = timestamp_ms(&record.timestamp) / DAY_MS;
        *days.entry(day).or_insert(0) += record.size();
    }
    let skip = days.len().saturating_sub(capacity);
    days.into_iter()
        .skip(skip)
        .map(|(day, size)| TimelineEvent { day, size })
        .collect()
}
