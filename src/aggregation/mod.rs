//! Aggregations: computed metrics for one subject, pre-proof.
//!
//! Metrics are a sum type per claim kind rather than a free-form map, so the
//! validator reaches fields through [`MetricField`] and an exhaustive match.
//!
//! Counts inside repository, language and collaboration aggregations are
//! exact: they only ever leave the trust boundary as circuit witnesses behind a
//! widened claim range. Consistency scores leave directly and are therefore
//! released through the privacy engine.

pub mod builder;
pub mod fields;

pub use builder::{AggregationError, Aggregator};
pub use fields::{FieldValue, MetricField};

use crate::activity::{AccessLevel, SubjectId};
use crate::analysis::AggregatedConsistencyMetrics;
use crate::privacy::{PrivacyConfig, PrivacyMetadata};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of statement a credential makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Repository,
    Language,
    Collaboration,
    Consistency,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Repository => "repository",
            ClaimType::Language => "language",
            ClaimType::Collaboration => "collaboration",
            ClaimType::Consistency => "consistency",
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repository" => Ok(ClaimType::Repository),
            "language" => Ok(ClaimType::Language),
            "collaboration" => Ok(ClaimType::Collaboration),
            "consistency" => Ok(ClaimType::Consistency),
            other => Err(format!("unknown claim type: {}", other)),
        }
    }
}

/// Per-repository figures, without the repository's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub commits: u64,
    pub lines_of_code: u64,
    pub collaborators: u64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMetrics {
    pub total_repositories: u64,
    pub total_commits: u64,
    pub total_lines_of_code: u64,
    pub average_commits_per_repository: f64,
    /// Share of repositories with a commit in the activity window.
    pub active_repository_percentage: f64,
    pub earliest_activity_ms: Option<u64>,
    pub latest_activity_ms: Option<u64>,
    pub repositories: Vec<RepositorySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageShare {
    pub name: String,
    pub lines: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageMetrics {
    /// Sorted by lines, largest first.
    pub languages: Vec<LanguageShare>,
    pub primary_language: Option<String>,
    pub proficiency_score: f64,
    pub total_repositories: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationMetrics {
    pub total_repositories: u64,
    pub unique_collaborators: u64,
    pub average_collaborators_per_repository: f64,
    pub max_collaborators: u64,
    /// Share of repositories with more than one author.
    pub team_repository_percentage: f64,
    pub collaborators_per_repository: Vec<u64>,
}

/// One active day on the merged timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Days since the unix epoch.
    pub day: u64,
    /// Changed lines on that day.
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyMetrics {
    pub scores: AggregatedConsistencyMetrics,
    /// Most recent active days, oldest first. Circuit witness only.
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
}

/// Metrics for one claim kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClaimMetrics {
    Repository(RepositoryMetrics),
    Language(LanguageMetrics),
    Collaboration(CollaborationMetrics),
    Consistency(ConsistencyMetrics),
}

impl ClaimMetrics {
    pub fn claim_type(&self) -> ClaimType {
        match self {
            ClaimMetrics::Repository(_) => ClaimType::Repository,
            ClaimMetrics::Language(_) => ClaimType::Language,
            ClaimMetrics::Collaboration(_) => ClaimType::Collaboration,
            ClaimMetrics::Consistency(_) => ClaimType::Consistency,
        }
    }
}

/// The computed metrics for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub id: Uuid,
    pub subject: SubjectId,
    /// Unix milliseconds.
    pub created_at: u64,
    pub metrics: ClaimMetrics,
    pub privacy: Option<PrivacyMetadata>,
    /// Hex SHA-256 over the encoded metrics.
    pub content_hash: Option<String>,
}

impl Aggregation {
    pub fn claim_type(&self) -> ClaimType {
        self.metrics.claim_type()
    }

    /// Number of repositories behind the metrics.
    pub fn repository_count(&self) -> u64 {
        match &self.metrics {
            ClaimMetrics::Repository(m) => m.total_repositories,
            ClaimMetrics::Language(m) => m.total_repositories,
            ClaimMetrics::Collaboration(m) => m.total_repositories,
            ClaimMetrics::Consistency(m) => m.scores.repositories_analyzed as u64,
        }
    }
}

/// Request-scoped state passed by value through every stage.
///
/// Stages never mutate a context; the `with_*` methods return a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationContext {
    pub subject: SubjectId,
    pub privacy: PrivacyConfig,
    pub correlation_id: Uuid,
    pub audit_id: Uuid,
    pub access: Option<AccessLevel>,
}

impl AggregationContext {
    pub fn new(subject: SubjectId, privacy: PrivacyConfig) -> Self {
        Self {
            subject,
            privacy,
            correlation_id: Uuid::new_v4(),
            audit_id: Uuid::new_v4(),
            access: None,
        }
    }

    pub fn with_privacy(&self, privacy: PrivacyConfig) -> Self {
        Self {
            privacy,
            ..self.clone()
        }
    }

    pub fn with_access(&self, access: AccessLevel) -> Self {
        Self {
            access: Some(access),
            ..self.clone()
        }
    }

    /// Fresh audit id for a new stage, keeping the correlation id.
    pub fn with_new_audit_id(&self) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}
