//! Typed field access into aggregations.

use super::{Aggregation, ClaimMetrics};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every field a validation rule can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    AggregationId,
    Subject,
    CreatedAt,
    ContentHash,

    TotalRepositories,
    TotalCommits,
    TotalLinesOfCode,
    AverageCommitsPerRepository,
    ActiveRepositoryPercentage,
    EarliestActivity,
    LatestActivity,

    LanguageCount,
    PrimaryLanguage,
    ProficiencyScore,

    UniqueCollaborators,
    AverageCollaboratorsPerRepository,
    MaxCollaborators,
    TeamRepositoryPercentage,

    OverallConsistency,
    Reliability,
    Commitment,
    Professionalism,
    Sustainability,
}

impl MetricField {
    pub const ALL: [MetricField; 23] = [
        MetricField::AggregationId,
        MetricField::Subject,
        MetricField::CreatedAt,
        MetricField::ContentHash,
        MetricField::TotalRepositories,
        MetricField::TotalCommits,
        MetricField::TotalLinesOfCode,
        MetricField::AverageCommitsPerRepository,
        MetricField::ActiveRepositoryPercentage,
        MetricField::EarliestActivity,
        MetricField::LatestActivity,
        MetricField::LanguageCount,
        MetricField::PrimaryLanguage,
        MetricField::ProficiencyScore,
        MetricField::UniqueCollaborators,
        MetricField::AverageCollaboratorsPerRepository,
        MetricField::MaxCollaborators,
        MetricField::TeamRepositoryPercentage,
        MetricField::OverallConsistency,
        MetricField::Reliability,
        MetricField::Commitment,
        MetricField::Professionalism,
        MetricField::Sustainability,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricField::AggregationId => "aggregation_id",
            MetricField::Subject => "subject",
            MetricField::CreatedAt => "created_at",
            MetricField::ContentHash => "content_hash",
            MetricField::TotalRepositories => "total_repositories",
            MetricField::TotalCommits => "total_commits",
            MetricField::TotalLinesOfCode => "total_lines_of_code",
            MetricField::AverageCommitsPerRepository => "average_commits_per_repository",
            MetricField::ActiveRepositoryPercentage => "active_repository_percentage",
            MetricField::EarliestActivity => "earliest_activity",
            MetricField::LatestActivity => "latest_activity",
            MetricField::LanguageCount => "language_count",
            MetricField::PrimaryLanguage => "primary_language",
            MetricField::ProficiencyScore => "proficiency_score",
            MetricField::UniqueCollaborators => "unique_collaborators",
            MetricField::AverageCollaboratorsPerRepository => "average_collaborators_per_repository",
            MetricField::MaxCollaborators => "max_collaborators",
            MetricField::TeamRepositoryPercentage => "team_repository_percentage",
            MetricField::OverallConsistency => "overall_consistency",
            MetricField::Reliability => "reliability",
            MetricField::Commitment => "commitment",
            MetricField::Professionalism => "professionalism",
            MetricField::Sustainability => "sustainability",
        }
    }

    /// Fields whose values are percentages or 0-100 scores.
    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            MetricField::ActiveRepositoryPercentage
                | MetricField::ProficiencyScore
                | MetricField::TeamRepositoryPercentage
                | MetricField::OverallConsistency
                | MetricField::Reliability
                | MetricField::Commitment
                | MetricField::Professionalism
                | MetricField::Sustainability
        )
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricField::ALL
            .iter()
            .find(|f| f.name() == s)
            .copied()
            .ok_or_else(|| format!("unknown metric field: {}", s))
    }
}

/// A field's value, typed by what it measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Count(u64),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view; text is not numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Count(c) => Some(*c as f64),
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            FieldValue::Count(c) => *c == 0,
            FieldValue::Number(n) => *n == 0.0,
            FieldValue::Text(t) => t.is_empty(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Count(c) => write!(f, "{}", c),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(t) => f.write_str(t),
        }
    }
}

impl ClaimMetrics {
    /// Value of a metric field, `None` when this claim kind has no such field.
    pub fn value(&self, field: MetricField) -> Option<FieldValue> {
        use FieldValue::{Count, Number, Text};
        use MetricField as F;

        match (self, field) {
            (_, F::AggregationId | F::Subject | F::CreatedAt | F::ContentHash) => None,

            (ClaimMetrics::Repository(m), F::TotalRepositories) => Some(Count(m.total_repositories)),
            (ClaimMetrics::Repository(m), F::TotalCommits) => Some(Count(m.total_commits)),
            (ClaimMetrics::Repository(m), F::TotalLinesOfCode) => Some(Count(m.total_lines_of_code)),
            (ClaimMetrics::Repository(m), F::AverageCommitsPerRepository) => {
                Some(Number(m.average_commits_per_repository))
            }
            (ClaimMetrics::Repository(m), F::ActiveRepositoryPercentage) => {
                Some(Number(m.active_repository_percentage))
            }
            (ClaimMetrics::Repository(m), F::EarliestActivity) => m.earliest_activity_ms.map(Count),
            (ClaimMetrics::Repository(m), F::LatestActivity) => m.latest_activity_ms.map(Count),
            (ClaimMetrics::Repository(_), _) => None,

            (ClaimMetrics::Language(m), F::TotalRepositories) => Some(Count(m.total_repositories)),
            (ClaimMetrics::Language(m), F::LanguageCount) => Some(Count(m.languages.len() as u64)),
            (ClaimMetrics::Language(m), F::PrimaryLanguage) => m.primary_language.clone().map(Text),
            (ClaimMetrics::Language(m), F::ProficiencyScore) => Some(Number(m.proficiency_score)),
            (ClaimMetrics::Language(_), _) => None,

            (ClaimMetrics::Collaboration(m), F::TotalRepositories) => Some(Count(m.total_repositories)),
            (ClaimMetrics::Collaboration(m), F::UniqueCollaborators) => {
                Some(Count(m.unique_collaborators))
            }
            (ClaimMetrics::Collaboration(m), F::AverageCollaboratorsPerRepository) => {
                Some(Number(m.average_collaborators_per_repository))
            }
            (ClaimMetrics::Collaboration(m), F::MaxCollaborators) => Some(Count(m.max_collaborators)),
            (ClaimMetrics::Collaboration(m), F::TeamRepositoryPercentage) => {
                Some(Number(m.team_repository_percentage))
            }
            (ClaimMetrics::Collaboration(_), _) => None,

            (ClaimMetrics::Consistency(m), F::TotalRepositories) => {
                Some(Count(m.scores.repositories_analyzed as u64))
            }
            (ClaimMetrics::Consistency(m), F::OverallConsistency) => {
                Some(Number(m.scores.overall_consistency))
            }
            (ClaimMetrics::Consistency(m), F::Reliability) => Some(Number(m.scores.reliability)),
            (ClaimMetrics::Consistency(m), F::Commitment) => Some(Number(m.scores.commitment)),
            (ClaimMetrics::Consistency(m), F::Professionalism) => Some(Number(m.scores.professionalism)),
            (ClaimMetrics::Consistency(m), F::Sustainability) => Some(Number(m.scores.sustainability)),
            (ClaimMetrics::Consistency(_), _) => None,
        }
    }

    /// Fields this claim kind carries.
    pub fn fields(&self) -> Vec<MetricField> {
        MetricField::ALL
            .iter()
            .copied()
            .filter(|f| self.value(*f).is_some())
            .collect()
    }
}

impl Aggregation {
    /// Value of any field, including the envelope fields.
    pub fn value(&self, field: MetricField) -> Option<FieldValue> {
        match field {
            MetricField::AggregationId => Some(FieldValue::Text(self.id.to_string())),
            MetricField::Subject => Some(FieldValue::Text(self.subject.to_string())),
            MetricField::CreatedAt => Some(FieldValue::Count(self.created_at)),
            MetricField::ContentHash => self.content_hash.clone().map(FieldValue::Text),
            other => self.metrics.value(other),
        }
    }
}
