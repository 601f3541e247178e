//! Temporal consistency analysis
//!
//! Turns one repository's ordered commit timeline into activity-pattern
//! metrics (streaks, gaps, seasonality, burnout risk), then rolls many
//! repositories up into reliability/commitment/sustainability scores that are
//! released through the differential privacy engine.
//!
//! ## Insufficient data
//!
//! Fewer commits than `min_commits` never produce an error or a computed
//! score. The analyzer returns [`ConsistencyAnalysis::minimal`] instead, so the
//! roll-up arithmetic stays total.

pub mod rollup;
pub mod temporal;

pub use rollup::{AggregatedConsistencyMetrics, AggregationPolicy, RawConsistencyMetrics};
pub use temporal::TemporalConsistencyAnalyzer;

use serde::{Deserialize, Serialize};

/// Categorical activity pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityPattern {
    Regular,
    Sporadic,
    Intensive,
    Declining,
    /// Below the minimum-commit threshold.
    Insufficient,
}

/// Per-repository analysis output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyAnalysis {
    pub repository: String,
    pub commit_count: u64,
    /// 0-100, rounded.
    pub consistency_score: f64,
    pub pattern: ActivityPattern,
    /// Longest run of events each at most `streak_gap_days` apart, in events.
    pub longest_streak: u32,
    pub average_streak: f64,
    pub average_gap_days: f64,
    /// 0-100.
    pub seasonality_score: f64,
    /// 0-100.
    pub burnout_risk: f64,
}

impl ConsistencyAnalysis {
    /// The zero-valued analysis returned for insufficient history.
    pub fn minimal(repository: impl Into<String>, commit_count: u64) -> Self {
        Self {
            repository: repository.into(),
            commit_count,
            consistency_score: 0.0,
            pattern: ActivityPattern::Insufficient,
            longest_streak: 0,
            average_streak: 0.0,
            average_gap_days: 0.0,
            seasonality_score: 0.0,
            burnout_risk: 0.0,
        }
    }

    pub fn is_minimal(&self) -> bool {
        self.pattern == ActivityPattern::Insufficient
    }
}

/// Analyzer tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub min_commits: usize,
    pub streak_gap_days: f64,
    /// Number of most recent events compared against the baseline for burnout.
    pub burnout_window: usize,
    pub policy: AggregationPolicy,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_commits: 10,
            streak_gap_days: 7.0,
            burnout_window: 30,
            policy: AggregationPolicy::Mean,
        }
    }
}
