//! Cross-repository roll-up of per-repository analyses.
//!
//! Every roll-up score lives in `[0, 100]` and is noised independently
//! before it is released. The averaging policy is configurable: the plain
//! mean treats a two-commit side project the same as a main project, while
//! `ActivityWeighted` weights each repository by its commit count.

use super::{ActivityPattern, ConsistencyAnalysis};
use crate::activity::SubjectId;
use crate::privacy::{DifferentialPrivacyEngine, PrivacyConfig, PrivacyError};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How per-repository scalars are averaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    #[default]
    Mean,
    /// Weight each repository by its commit count.
    ActivityWeighted,
}

/// Roll-up before noise. Never leaves the trust boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConsistencyMetrics {
    pub overall_consistency: f64,
    pub reliability: f64,
    pub commitment: f64,
    pub professionalism: f64,
    pub sustainability: f64,
    pub repositories_analyzed: usize,
}

/// Released roll-up; every score has been through the privacy engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedConsistencyMetrics {
    pub overall_consistency: f64,
    pub reliability: f64,
    pub commitment: f64,
    pub professionalism: f64,
    pub sustainability: f64,
    pub repositories_analyzed: usize,
}

impl RawConsistencyMetrics {
    /// Combine analyses under `policy`. An empty slice yields all zeros.
    pub fn from_analyses(analyses: &[ConsistencyAnalysis], policy: AggregationPolicy) -> Self {
        if analyses.is_empty() {
            return Self {
                overall_consistency: 0.0,
                reliability: 0.0,
                commitment: 0.0,
                professionalism: 0.0,
                sustainability: 0.0,
                repositories_analyzed: 0,
            };
        }

        let weights = weights(analyses, policy);
        let avg = |f: &dyn Fn(&ConsistencyAnalysis) -> f64| -> f64 {
            analyses.iter().zip(&weights).map(|(a, w)| f(a) * w).sum()
        };

        let consistency = avg(&|a| a.consistency_score);
        let burnout = avg(&|a| a.burnout_risk);
        let longest = avg(&|a| a.longest_streak as f64);
        let seasonality = avg(&|a| a.seasonality_score);
        let gap = avg(&|a| a.average_gap_days);
        let regular_share = avg(&|a| {
            if a.pattern == ActivityPattern::Regular {
                100.0
            } else {
                0.0
            }
        });

        Self {
            overall_consistency: bounded(consistency),
            reliability: bounded(0.5 * consistency + 0.5 * (100.0 - burnout)),
            commitment: bounded(5.0 * longest),
            professionalism: bounded(0.6 * regular_share + 0.4 * (100.0 - seasonality)),
            sustainability: bounded(
                0.7 * (100.0 - burnout) + 0.3 * (100.0 - f64::min(100.0, 5.0 * gap)),
            ),
            repositories_analyzed: analyses.len(),
        }
    }

    /// Noise every score independently and charge the subject's budget once per score.
    pub fn release<R: Rng + ?Sized>(
        &self,
        engine: &DifferentialPrivacyEngine,
        subject: &SubjectId,
        config: &PrivacyConfig,
        rng: &mut R,
    ) -> Result<AggregatedConsistencyMetrics, PrivacyError> {
        Ok(AggregatedConsistencyMetrics {
            overall_consistency: engine.release_with(subject, self.overall_consistency, config, rng)?,
            reliability: engine.release_with(subject, self.reliability, config, rng)?,
            commitment: engine.release_with(subject, self.commitment, config, rng)?,
            professionalism: engine.release_with(subject, self.professionalism, config, rng)?,
            sustainability: engine.release_with(subject, self.sustainability, config, rng)?,
            repositories_analyzed: self.repositories_analyzed,
        })
    }
}

/// Normalised weights summing to 1.
fn weights(analyses: &[ConsistencyAnalysis], policy: AggregationPolicy) -> Vec<f64> {
    let uniform = || vec![1.0 / analyses.len() as f64; analyses.len()];
    match policy {
        AggregationPolicy::Mean => uniform(),
        AggregationPolicy::ActivityWeighted => {
            let total: u64 = analyses.iter().map(|a| a.commit_count).sum();
            if total == 0 {
                return uniform();
            }
            analyses
                .iter()
                .map(|a| a.commit_count as f64 / total as f64)
                .collect()
        }
    }
}

fn bounded(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}
