//! Privacy budget accounting under basic (linear) composition.

use super::PrivacyError;
use serde::{Deserialize, Serialize};

/// Total epsilon a subject may spend across releases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyBudget {
    total: f64,
    spent: f64,
    releases: u64,
}

impl PrivacyBudget {
    pub fn new(total: f64) -> Self {
        Self {
            total,
            spent: 0.0,
            releases: 0,
        }
    }

    pub fn remaining(&self) -> f64 {
        (self.total - self.spent).max(0.0)
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn releases(&self) -> u64 {
        self.releases
    }

    /// Charge `epsilon` against the budget; nothing is charged on failure.
    pub fn try_spend(&mut self, epsilon: f64) -> Result<(), PrivacyError> {
        if !(epsilon > 0.0) {
            return Err(PrivacyError::InvalidEpsilon(epsilon));
        }
        // Tolerate float dust when the budget is spent in equal slices.
        if self.spent + epsilon > self.total + 1e-9 {
            return Err(PrivacyError::BudgetExhausted {
                requested: epsilon,
                remaining: self.remaining(),
            });
        }
        self.spent += epsilon;
        self.releases += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_until_exhausted() {
        let mut budget = PrivacyBudget::new(1.0);
        for _ in 0..4 {
            budget.try_spend(0.25).unwrap();
        }
        assert_eq!(budget.releases(), 4);
        assert!(budget.remaining() < 1e-9);
        let err = budget.try_spend(0.1).unwrap_err();
        assert!(matches!(err, PrivacyError::BudgetExhausted { .. }));
        assert_eq!(budget.releases(), 4);
    }

    #[test]
    fn test_rejects_non_positive_epsilon() {
        let mut budget = PrivacyBudget::new(1.0);
        assert!(matches!(
            budget.try_spend(0.0),
            Err(PrivacyError::InvalidEpsilon(_))
        ));
        assert!(budget.try_spend(f64::NAN).is_err());
    }
}
