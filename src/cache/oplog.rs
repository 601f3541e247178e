//! Bounded operation log and the metrics computed from it.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Store,
    Retrieve,
    Update,
    Delete,
    Search,
    Cleanup,
    Evict,
    Replicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Hit,
    Miss,
    Success,
    Failure,
}

/// Where a retrieval was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Memory,
    Backend,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub op: Operation,
    pub key: Option<String>,
    pub outcome: Outcome,
    pub tier: Tier,
    pub latency_us: u64,
    pub bytes: u64,
    pub at_ms: u64,
}

/// Snapshot of cache health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub memory_hits: u64,
    pub average_retrieval_latency_us: f64,
    pub evictions: u64,
    pub failures: u64,
    pub entries: usize,
    pub resident_bytes: u64,
    pub budget_bytes: u64,
    /// Resident bytes over budget, 0-1.
    pub utilization: f64,
    pub operations_logged: usize,
}

/// Ring of recent operations plus lifetime counters.
#[derive(Debug)]
pub struct OperationLog {
    capacity: usize,
    records: Mutex<VecDeque<OperationRecord>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    failures: AtomicU64,
}

impl OperationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn record(&self, record: OperationRecord) {
        match (record.op, record.outcome) {
            (_, Outcome::Hit) => self.hits.fetch_add(1, Ordering::Relaxed),
            (_, Outcome::Miss) => self.misses.fetch_add(1, Ordering::Relaxed),
            (_, Outcome::Failure) => self.failures.fetch_add(1, Ordering::Relaxed),
            (Operation::Evict, Outcome::Success) => self.evictions.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
        // A poisoned log only loses history; counters above are still exact.
        if let Ok(mut records) = self.records.lock() {
            if records.len() == self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }
    }

    /// Most recent records, newest last.
    pub fn recent(&self, n: usize) -> Vec<OperationRecord> {
        self.records
            .lock()
            .map(|r| r.iter().rev().take(n).rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn metrics(&self, entries: usize, resident_bytes: u64, budget_bytes: u64) -> CacheMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let (memory_hits, latency_sum, retrievals, logged) = self
            .records
            .lock()
            .map(|records| {
                let retrievals: Vec<&OperationRecord> = records
                    .iter()
                    .filter(|r| r.op == Operation::Retrieve)
                    .collect();
                (
                    retrievals.iter().filter(|r| r.tier == Tier::Memory).count() as u64,
                    retrievals.iter().map(|r| r.latency_us).sum::<u64>(),
                    retrievals.len() as u64,
                    records.len(),
                )
            })
            .unwrap_or((0, 0, 0, 0));

        CacheMetrics {
            hits,
            misses,
            hit_rate: if hits + misses == 0 {
                0.0
            } else {
                hits as f64 / (hits + misses) as f64
            },
            memory_hits,
            average_retrieval_latency_us: if retrievals == 0 {
                0.0
            } else {
                latency_sum as f64 / retrievals as f64
            },
            evictions: self.evictions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            entries,
            resident_bytes,
            budget_bytes,
            utilization: if budget_bytes == 0 {
                0.0
            } else {
                resident_bytes as f64 / budget_bytes as f64
            },
            operations_logged: logged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(op: Operation, outcome: Outcome, tier: Tier, latency_us: u64) -> OperationRecord {
        OperationRecord {
            op,
            key: Some("k".into()),
            outcome,
            tier,
            latency_us,
            bytes: 0,
            at_ms: 0,
        }
    }

    #[test]
    fn test_log_is_bounded_but_counters_are_lifetime() {
        let log = OperationLog::new(2);
        log.record(rec(Operation::Retrieve, Outcome::Hit, Tier::Memory, 10));
        log.record(rec(Operation::Retrieve, Outcome::Miss, Tier::None, 20));
        log.record(rec(Operation::Retrieve, Outcome::Hit, Tier::Backend, 30));
        log.record(rec(Operation::Evict, Outcome::Success, Tier::None, 0));

        let m = log.metrics(1, 50, 100);
        assert_eq!(m.hits, 2);
        assert_eq!(m.misses, 1);
        assert!((m.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(m.evictions, 1);
        assert_eq!(m.operations_logged, 2);
        assert_eq!(m.average_retrieval_latency_us, 30.0);
        assert_eq!(m.utilization, 0.5);
        assert_eq!(log.recent(5).len(), 2);
    }
}
