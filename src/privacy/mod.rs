//! Differential privacy engine.
//!
//! Every scalar metric leaves the trust boundary through
//! [`DifferentialPrivacyEngine`]. The value is clamped to the configured
//! domain before noise (bounding sensitivity) and again after noise, so callers
//! may rely on the output staying inside `[lower, upper]` even though Laplace
//! and Gaussian noise are unbounded.
//!
//! Each draw uses the calling thread's own RNG; no generator state is shared
//! between concurrent releases.

pub mod budget;
pub mod mechanism;

#[cfg(test)]
mod proptests;

pub use budget::PrivacyBudget;
pub use mechanism::{gaussian_noise, laplace_noise, Mechanism};

use crate::activity::SubjectId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors raised by the privacy layer.
#[derive(Debug, Error, PartialEq)]
pub enum PrivacyError {
    #[error("Epsilon must be positive and finite, got {0}")]
    InvalidEpsilon(f64),

    #[error("Delta must lie in (0, 1), got {0}")]
    InvalidDelta(f64),

    #[error("Sensitivity must be positive and finite, got {0}")]
    InvalidSensitivity(f64),

    #[error("Clamping bounds are empty: lower {lower} >= upper {upper}")]
    InvalidBounds { lower: f64, upper: f64 },

    #[error("Privacy budget exhausted: requested {requested}, remaining {remaining}")]
    BudgetExhausted { requested: f64, remaining: f64 },

    #[error("Privacy budget lock poisoned")]
    LockPoisoned,
}

/// Noise configuration in force for a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    pub epsilon: f64,
    pub delta: f64,
    pub lower: f64,
    pub upper: f64,
    pub mechanism: Mechanism,
    pub sensitivity: f64,
    /// Total epsilon per subject across all releases.
    pub budget: f64,
    /// k-anonymity level claimed for released profiles.
    pub anonymization_level: u32,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            delta: 1e-5,
            lower: 0.0,
            upper: 100.0,
            mechanism: Mechanism::Laplace,
            sensitivity: 1.0,
            budget: 50.0,
            anonymization_level: 5,
        }
    }
}

impl PrivacyConfig {
    pub fn validate(&self) -> Result<(), PrivacyError> {
        if !(self.epsilon > 0.0) || !self.epsilon.is_finite() {
            return Err(PrivacyError::InvalidEpsilon(self.epsilon));
        }
        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(PrivacyError::InvalidDelta(self.delta));
        }
        if !(self.sensitivity > 0.0) || !self.sensitivity.is_finite() {
            return Err(PrivacyError::InvalidSensitivity(self.sensitivity));
        }
        if !(self.lower < self.upper) {
            return Err(PrivacyError::InvalidBounds {
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }

    /// Same configuration at a different privacy level.
    pub fn at_level(&self, level: PrivacyLevel) -> Self {
        Self {
            epsilon: level.epsilon(),
            ..self.clone()
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.lower;
        }
        value.clamp(self.lower, self.upper)
    }
}

/// Coarse privacy setting chosen by the credential holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    Low,
    Medium,
    High,
}

impl PrivacyLevel {
    pub fn epsilon(&self) -> f64 {
        match self {
            PrivacyLevel::Low => 2.0,
            PrivacyLevel::Medium => 1.0,
            PrivacyLevel::High => 0.5,
        }
    }

    /// Percentage by which a claim range is widened around the true value.
    pub fn widening_percent(&self) -> u64 {
        match self {
            PrivacyLevel::Low => 10,
            PrivacyLevel::Medium => 25,
            PrivacyLevel::High => 50,
        }
    }

    /// Claim range around `actual`, rounded outward.
    pub fn claim_range(&self, actual: u64) -> (u64, u64) {
        let delta = (actual * self.widening_percent()).div_ceil(100).max(1);
        (actual.saturating_sub(delta), actual.saturating_add(delta))
    }
}

/// Privacy facts attached to a released aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyMetadata {
    pub mechanism: Mechanism,
    pub epsilon: f64,
    pub delta: f64,
    pub anonymization_level: u32,
}

/// Adds calibrated noise to bounded scalars and tracks per-subject budgets.
#[derive(Debug)]
pub struct DifferentialPrivacyEngine {
    config: PrivacyConfig,
    budgets: Mutex<HashMap<SubjectId, PrivacyBudget>>,
}

impl DifferentialPrivacyEngine {
    pub fn new(config: PrivacyConfig) -> Result<Self, PrivacyError> {
        config.validate()?;
        Ok(Self {
            config,
            budgets: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &PrivacyConfig {
        &self.config
    }

    /// Noise `value` using the calling thread's RNG.
    pub fn add_noise(&self, value: f64) -> f64 {
        self.add_noise_with(value, &mut rand::thread_rng())
    }

    /// Noise `value` with an explicit RNG.
    pub fn add_noise_with<R: Rng + ?Sized>(&self, value: f64, rng: &mut R) -> f64 {
        noise_clamped(&self.config, value, rng)
    }

    /// Charge the subject's budget for one release, then noise `value`.
    pub fn release(&self, subject: &SubjectId, value: f64) -> Result<f64, PrivacyError> {
        self.release_with(subject, value, &self.config, &mut rand::thread_rng())
    }

    /// Release under a request-specific configuration (e.g. a privacy level).
    pub fn release_with<R: Rng + ?Sized>(
        &self,
        subject: &SubjectId,
        value: f64,
        config: &PrivacyConfig,
        rng: &mut R,
    ) -> Result<f64, PrivacyError> {
        config.validate()?;
        {
            let mut budgets = self
                .budgets
                .lock()
                .map_err(|_| PrivacyError::LockPoisoned)?;
            budgets
                .entry(subject.clone())
                .or_insert_with(|| PrivacyBudget::new(self.config.budget))
                .try_spend(config.epsilon)?;
        }
        let noised = noise_clamped(config, value, rng);
        debug!(subject = %subject, epsilon = config.epsilon, "released noised metric");
        Ok(noised)
    }

    /// Remaining epsilon for a subject.
    pub fn remaining_budget(&self, subject: &SubjectId) -> Result<f64, PrivacyError> {
        let budgets = self
            .budgets
            .lock()
            .map_err(|_| PrivacyError::LockPoisoned)?;
        Ok(budgets
            .get(subject)
            .map(PrivacyBudget::remaining)
            .unwrap_or(self.config.budget))
    }

    pub fn metadata(&self, config: &PrivacyConfig) -> PrivacyMetadata {
        PrivacyMetadata {
            mechanism: config.mechanism,
            epsilon: config.epsilon,
            delta: config.delta,
            anonymization_level: config.anonymization_level,
        }
    }
}

/// Clamp, add noise, clamp again.
pub fn noise_clamped<R: Rng + ?Sized>(config: &PrivacyConfig, value: f64, rng: &mut R) -> f64 {
    let bounded = config.clamp(value);
    let noise = match config.mechanism {
        Mechanism::Laplace => laplace_noise(config.sensitivity / config.epsilon, rng),
        Mechanism::Gaussian => gaussian_noise(config.epsilon, config.delta, config.sensitivity, rng),
    };
    config.clamp(bounded + noise)
}
