//! Per-repository temporal consistency analysis.

use super::{ActivityPattern, AnalyzerConfig, ConsistencyAnalysis};
use crate::activity::{ActivityRecord, RepositoryActivity};
use chrono::{Datelike, Timelike};
use std::collections::BTreeMap;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Weight of gap regularity (1 - CV) in the consistency score.
const GAP_WEIGHT: f64 = 0.6;
/// Weight of hour-of-day evenness.
const HOUR_WEIGHT: f64 = 0.2;
/// Weight of day-of-week evenness.
const WEEKDAY_WEIGHT: f64 = 0.2;

const FREQUENCY_DROP_PENALTY: f64 = 40.0;
const SIZE_SHRINK_PENALTY: f64 = 30.0;
const FREQUENCY_SPIKE_PENALTY: f64 = 30.0;

/// Computes [`ConsistencyAnalysis`] for one repository.
#[derive(Debug, Clone, Default)]
pub struct TemporalConsistencyAnalyzer {
    config: AnalyzerConfig,
}

impl TemporalConsistencyAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn analyze(&self, repository: &RepositoryActivity) -> ConsistencyAnalysis {
        let records = repository.chronological();
        self.analyze_timeline(&repository.repository, &records)
    }

    /// Analyze records that are already sorted oldest first.
    pub fn analyze_timeline(&self, repository: &str, records: &[ActivityRecord]) -> ConsistencyAnalysis {
        let count = records.len() as u64;
        if records.len() < self.config.min_commits.max(2) {
            return ConsistencyAnalysis::minimal(repository, count);
        }

        let gaps = gap_days(records);
        let (mean_gap, std_gap) = mean_and_std(&gaps);
        let cv = if mean_gap > 0.0 { std_gap / mean_gap } else { 0.0 };

        let hours: Vec<usize> = records.iter().map(|r| r.timestamp.hour() as usize).collect();
        let weekdays: Vec<usize> = records
            .iter()
            .map(|r| r.timestamp.weekday().num_days_from_monday() as usize)
            .collect();
        let blend = GAP_WEIGHT * (1.0 - cv).max(0.0)
            + HOUR_WEIGHT * evenness(&hours, 24)
            + WEEKDAY_WEIGHT * evenness(&weekdays, 7);
        let consistency_score = (blend * 100.0).clamp(0.0, 100.0).round();

        let (longest_streak, average_streak) = streaks(&gaps, self.config.streak_gap_days);

        ConsistencyAnalysis {
            repository: repository.to_string(),
            commit_count: count,
            consistency_score,
            pattern: classify(cv, mean_gap),
            longest_streak,
            average_streak,
            average_gap_days: mean_gap,
            seasonality_score: seasonality(records),
            burnout_risk: self.burnout_risk(records),
        }
    }

    /// Burnout risk from the most recent window against the historical baseline.
    ///
    /// Zero unless the timeline holds at least `burnout_window` events.
    pub fn burnout_risk(&self, records: &[ActivityRecord]) -> f64 {
        let window = self.config.burnout_window.max(2);
        if records.len() < window {
            return 0.0;
        }

        let split = records.len() - window;
        let recent = &records[split..];
        let baseline = if split >= 2 { &records[..split] } else { records };

        let recent_freq = frequency_per_day(recent);
        let baseline_freq = frequency_per_day(baseline);
        let recent_size = average_size(recent);
        let baseline_size = average_size(baseline);

        let mut risk = 0.0;
        if baseline_freq > 0.0 && recent_freq < baseline_freq * 0.5 {
            risk += FREQUENCY_DROP_PENALTY;
        }
        if baseline_size > 0.0 && recent_size < baseline_size * 0.7 {
            risk += SIZE_SHRINK_PENALTY;
        }
        if baseline_freq > 0.0 && recent_freq > baseline_freq * 2.0 {
            risk += FREQUENCY_SPIKE_PENALTY;
        }
        f64::min(risk, 100.0)
    }
}

/// Decision table on (coefficient of variation, mean gap in days).
pub fn classify(cv: f64, mean_gap_days: f64) -> ActivityPattern {
    if cv < 0.5 && mean_gap_days < 7.0 {
        ActivityPattern::Regular
    } else if cv > 1.5 {
        ActivityPattern::Sporadic
    } else if mean_gap_days < 2.0 {
        ActivityPattern::Intensive
    } else {
        ActivityPattern::Declining
    }
}

fn gap_days(records: &[ActivityRecord]) -> Vec<f64> {
    records
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds() as f64 / SECONDS_PER_DAY)
        .collect()
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Normalised Shannon entropy of a histogram over `buckets` categories.
fn evenness(samples: &[usize], buckets: usize) -> f64 {
    if samples.is_empty() || buckets < 2 {
        return 0.0;
    }
    let mut counts = vec![0usize; buckets];
    for &s in samples {
        counts[s % buckets] += 1;
    }
    let n = samples.len() as f64;
    let entropy: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.ln()
        })
        .sum();
    entropy / (buckets as f64).ln()
}

/// (longest, average) run lengths in events.
fn streaks(gaps: &[f64], max_gap_days: f64) -> (u32, f64) {
    let mut runs = Vec::new();
    let mut current = 1u32;
    for &gap in gaps {
        if gap <= max_gap_days {
            current += 1;
        } else {
            runs.push(current);
            current = 1;
        }
    }
    runs.push(current);

    let longest = runs.iter().copied().max().unwrap_or(0);
    let average = runs.iter().map(|&r| r as f64).sum::<f64>() / runs.len() as f64;
    (longest, average)
}

/// Coefficient of variation of per-month counts, as a 0-100 score.
fn seasonality(records: &[ActivityRecord]) -> f64 {
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return 0.0;
    };
    let month_index = |r: &ActivityRecord| r.timestamp.year() as i64 * 12 + r.timestamp.month0() as i64;
    let start = month_index(first);
    let end = month_index(last);
    if end <= start {
        return 0.0;
    }

    let mut counts: BTreeMap<i64, f64> = (start..=end).map(|m| (m, 0.0)).collect();
    for r in records {
        *counts.entry(month_index(r)).or_insert(0.0) += 1.0;
    }
    let values: Vec<f64> = counts.into_values().collect();
    let (mean, std) = mean_and_std(&values);
    if mean == 0.0 {
        return 0.0;
    }
    (std / mean * 100.0).min(100.0).round()
}

fn frequency_per_day(records: &[ActivityRecord]) -> f64 {
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return 0.0;
    };
    let span = ((last.timestamp - first.timestamp).num_seconds() as f64 / SECONDS_PER_DAY).max(1.0);
    records.len() as f64 / span
}

fn average_size(records: &[ActivityRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.size() as f64).sum::<f64>() / records.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    fn repo(offsets_hours: &[i64], size: u64) -> RepositoryActivity {
        RepositoryActivity {
            repository: "org/repo".to_string(),
            records: offsets_hours
                .iter()
                .map(|&h| ActivityRecord::new("org/repo", "dev", start() + Duration::hours(h), size, 0))
                .collect(),
            languages: Vec::new(),
        }
    }

    fn every_n_days(count: i64, days: i64) -> Vec<i64> {
        (0..count).map(|i| i * days * 24).collect()
    }

    #[test]
    fn test_below_threshold_is_minimal() {
        let analyzer = TemporalConsistencyAnalyzer::default();
        let analysis = analyzer.analyze(&repo(&every_n_days(9, 1), 10));
        assert_eq!(analysis, ConsistencyAnalysis::minimal("org/repo", 9));
        assert!(analysis.is_minimal());
    }

    #[test]
    fn test_even_cadence_is_regular() {
        let analyzer = TemporalConsistencyAnalyzer::default();
        let analysis = analyzer.analyze(&repo(&every_n_days(12, 3), 40));

        assert_eq!(analysis.pattern, ActivityPattern::Regular);
        assert!(analysis.consistency_score > 70.0, "{}", analysis.consistency_score);
        assert_eq!(analysis.burnout_risk, 0.0);
        assert_eq!(analysis.longest_streak, 12);
        assert!((analysis.average_gap_days - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let analyzer = TemporalConsistencyAnalyzer::default();
        let mut offsets = every_n_days(12, 3);
        offsets.reverse();
        let analysis = analyzer.analyze(&repo(&offsets, 40));
        assert_eq!(analysis.pattern, ActivityPattern::Regular);
    }

    #[test]
    fn test_classification_table() {
        assert_eq!(classify(0.2, 3.0), ActivityPattern::Regular);
        assert_eq!(classify(2.0, 3.0), ActivityPattern::Sporadic);
        assert_eq!(classify(0.8, 1.0), ActivityPattern::Intensive);
        assert_eq!(classify(0.8, 10.0), ActivityPattern::Declining);
        // Low CV but long gaps falls through to declining
        assert_eq!(classify(0.1, 14.0), ActivityPattern::Declining);
    }

    #[test]
    fn test_streak_breaks_on_long_gap() {
        let analyzer = TemporalConsistencyAnalyzer::default();
        // five daily commits, a 30-day pause, then seven daily commits
        let mut offsets: Vec<i64> = (0..5).map(|d| d * 24).collect();
        offsets.extend((0..7).map(|d| (34 + d) * 24));
        let analysis = analyzer.analyze(&repo(&offsets, 10));
        assert_eq!(analysis.longest_streak, 7);
        assert!((analysis.average_streak - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_burnout_flags_frequency_drop_and_shrinking_commits() {
        let analyzer = TemporalConsistencyAnalyzer::default();
        // 40 daily commits of 100 lines, then 30 weekly commits of 10 lines
        let mut records: Vec<ActivityRecord> = (0..40)
            .map(|d| ActivityRecord::new("r", "dev", start() + Duration::days(d), 100, 0))
            .collect();
        records.extend(
            (0..30).map(|w| ActivityRecord::new("r", "dev", start() + Duration::days(40 + w * 7), 10, 0)),
        );
        let risk = analyzer.burnout_risk(&records);
        assert_eq!(risk, FREQUENCY_DROP_PENALTY + SIZE_SHRINK_PENALTY);
    }

    #[test]
    fn test_burnout_flags_spike() {
        let analyzer = TemporalConsistencyAnalyzer::default();
        let mut records: Vec<ActivityRecord> = (0..20)
            .map(|w| ActivityRecord::new("r", "dev", start() + Duration::days(w * 7), 50, 0))
            .collect();
        records.extend(
            (0..30).map(|h| ActivityRecord::new("r", "dev", start() + Duration::days(140) + Duration::hours(h * 4), 50, 0)),
        );
        assert_eq!(analyzer.burnout_risk(&records), FREQUENCY_SPIKE_PENALTY);
    }

    #[test]
    fn test_exact_window_has_no_baseline_penalty() {
        let analyzer = TemporalConsistencyAnalyzer::default();
        let records: Vec<ActivityRecord> = (0..30)
            .map(|d| ActivityRecord::new("r", "dev", start() + Duration::days(d), 20, 5))
            .collect();
        assert_eq!(analyzer.burnout_risk(&records), 0.0);
    }

    #[test]
    fn test_evenness_extremes() {
        assert_eq!(evenness(&[3, 3, 3, 3], 24), 0.0);
        let uniform: Vec<usize> = (0..7).collect();
        assert!((evenness(&uniform, 7) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_seasonality_single_month_is_zero() {
        let records: Vec<ActivityRecord> = (0..10)
            .map(|d| ActivityRecord::new("r", "dev", start() + Duration::days(d), 1, 0))
            .collect();
        assert_eq!(seasonality(&records), 0.0);
    }

    #[test]
    fn test_identical_timestamps_do_not_divide_by_zero() {
        let analyzer = TemporalConsistencyAnalyzer::default();
        let analysis = analyzer.analyze(&repo(&[0; 12], 5));
        assert!(analysis.consistency_score.is_finite());
        assert_eq!(analysis.pattern, ActivityPattern::Regular);
    }
}
