//! Bounded history of validation reports, keyed by validation id.

use super::report::ValidationReport;
use super::ValidationError;
use std::collections::VecDeque;
use std::sync::RwLock;
use uuid::Uuid;

/// FIFO of the most recent reports; the oldest is dropped at capacity.
#[derive(Debug)]
pub struct ValidationHistory {
    capacity: usize,
    reports: RwLock<VecDeque<ValidationReport>>,
}

impl ValidationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            reports: RwLock::new(VecDeque::new()),
        }
    }

    pub fn insert(&self, report: ValidationReport) -> Result<(), ValidationError> {
        let mut reports = self.reports.write().map_err(|_| ValidationError::LockPoisoned)?;
        if reports.len() == self.capacity {
            reports.pop_front();
        }
        reports.push_back(report);
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<ValidationReport>, ValidationError> {
        let reports = self.reports.read().map_err(|_| ValidationError::LockPoisoned)?;
        Ok(reports.iter().find(|r| &r.id == id).cloned())
    }

    /// Up to `n` reports, most recent first.
    pub fn recent(&self, n: usize) -> Result<Vec<ValidationReport>, ValidationError> {
        let reports = self.reports.read().map_err(|_| ValidationError::LockPoisoned)?;
        Ok(reports.iter().rev().take(n).cloned().collect())
    }

    pub fn len(&self) -> Result<usize, ValidationError> {
        let reports = self.reports.read().map_err(|_| ValidationError::LockPoisoned)?;
        Ok(reports.len())
    }

    pub fn is_empty(&self) -> Result<bool, ValidationError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::SubjectId;
    use crate::validation::audit::AuditTrail;

    fn report() -> ValidationReport {
        ValidationReport::from_trail(Uuid::new_v4(), SubjectId::from("0xabc"), 0, AuditTrail::new())
    }

    #[test]
    fn test_history_is_bounded() {
        let history = ValidationHistory::new(2);
        let first = report();
        let first_id = first.id;
        history.insert(first).unwrap();
        history.insert(report()).unwrap();
        let third = report();
        let third_id = third.id;
        history.insert(third).unwrap();

        assert_eq!(history.len().unwrap(), 2);
        assert!(history.get(&first_id).unwrap().is_none());
        assert_eq!(history.recent(1).unwrap()[0].id, third_id);
    }

    #[test]
    fn test_poisoned_history_reports_error() {
        let history = std::sync::Arc::new(ValidationHistory::new(2));
        history.insert(report()).unwrap();
        let poisoner = history.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.reports.write().unwrap();
            panic!("poison the history lock");
        })
        .join();

        assert!(matches!(history.len(), Err(ValidationError::LockPoisoned)));
        assert!(matches!(history.is_empty(), Err(ValidationError::LockPoisoned)));
        assert!(matches!(history.recent(1), Err(ValidationError::LockPoisoned)));
    }
}
