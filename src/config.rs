//! devcred configuration file handling
//!
//! One TOML file configures every component. Each section and every field
//! has a default, so an empty file is a valid configuration.

use crate::analysis::AnalyzerConfig;
use crate::cache::CacheConfig;
use crate::circuits::{ProofSystem, TemporalParameters};
use crate::combiner::CombinationMode;
use crate::privacy::{PrivacyConfig, PrivacyLevel};
use crate::registry::RegistryConfig;
use crate::validation::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevcredConfig {
    pub analysis: AnalyzerConfig,
    pub privacy: PrivacyConfig,
    pub validation: ValidationConfig,
    pub cache: CacheConfig,
    pub circuits: CircuitConfig,
    pub registry: RegistryConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Proving settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub proof_system: ProofSystem,
    pub combination_mode: CombinationMode,
    /// Widening applied to claim ranges when none is requested.
    pub privacy_level: PrivacyLevel,
    pub temporal: TemporalParameters,
    /// Deterministic setup, for reproducible local runs only.
    pub setup_seed: Option<u64>,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            proof_system: ProofSystem::Groth16Bn254Compressed,
            combination_mode: CombinationMode::Aggregate,
            privacy_level: PrivacyLevel::Medium,
            temporal: TemporalParameters::default(),
            setup_seed: None,
        }
    }
}

/// On-disk locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the durable cache backend.
    pub blob_dir: PathBuf,
    /// Registry state (consumed proofs and credentials).
    pub registry_path: PathBuf,
    /// File holding the hex-encoded 32-byte cache master key.
    pub cache_key_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_dir: PathBuf::from("devcred-data/blobs"),
            registry_path: PathBuf::from("devcred-data/registry.cbor"),
            cache_key_path: PathBuf::from("devcred-data/cache.key"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl DevcredConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DevcredConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        write_file(path, &contents)
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.privacy
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("[privacy] {}", e)))?;
        self.circuits
            .temporal
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("[circuits.temporal] {}", e)))?;
        if self.cache.max_memory_bytes == 0 {
            return Err(ConfigError::Invalid("[cache] max_memory_bytes must be nonzero".into()));
        }
        if self.analysis.min_commits < 2 {
            return Err(ConfigError::Invalid("[analysis] min_commits must be at least 2".into()));
        }
        if self.registry.credential_ttl_days == 0 {
            return Err(ConfigError::Invalid("[registry] credential_ttl_days must be nonzero".into()));
        }
        Ok(())
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        r#"# devcred configuration
#
# Every field is optional; the values below are the defaults.

[analysis]
# Repositories with fewer commits get the all-zero minimal analysis
min_commits = 10
# Events at most this many days apart extend a streak
streak_gap_days = 7.0
# Recent events compared against the baseline for burnout risk
burnout_window = 30
# How per-repository scores are combined: "mean" or "activity_weighted"
policy = "mean"

[privacy]
epsilon = 1.0
delta = 1e-5
# Clamping bounds applied before and after noise
lower = 0.0
upper = 100.0
# "laplace" or "gaussian"
mechanism = "laplace"
sensitivity = 1.0
# Total epsilon one subject may spend
budget = 50.0
anonymization_level = 5

[validation]
# Strict mode turns privacy and percentage violations into failures
strict_mode = true
privacy_preservation = true
min_anonymization_level = 5
epsilon_warning_threshold = 2.0
consistency_tolerance = 0.05
stale_after_ms = 86400000
future_tolerance_ms = 300000
min_commits = 10
history_capacity = 100

[cache]
default_ttl_ms = 3600000
max_memory_bytes = 67108864
compress = true
encrypt = true
replicate = true
operation_log_capacity = 1000

[circuits]
# "groth16_bn254_compressed" or "groth16_bn254_uncompressed"
proof_system = "groth16_bn254_compressed"
# "aggregate", "batch" or "recursive"
combination_mode = "aggregate"
# Claim range widening: "low" (10%), "medium" (25%) or "high" (50%)
privacy_level = "medium"

[circuits.temporal]
gap_bound_days = 7
gap_weight = 60
size_weight = 40

[registry]
credential_ttl_days = 365
future_tolerance_ms = 300000

[storage]
blob_dir = "devcred-data/blobs"
registry_path = "devcred-data/registry.cbor"
cache_key_path = "devcred-data/cache.key"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"
"#
        .to_string()
    }

    /// Create and save a default configuration file
    pub fn create_default(path: &Path) -> Result<(), ConfigError> {
        write_file(path, &Self::generate_default_toml())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, contents).map_err(write_err)
}
