use clap::{Parser, Subcommand};
use devcred::activity::SubjectId;
use devcred::aggregation::ClaimType;
use devcred::cache::{AggregationStore, FileBackend, PayloadCodec};
use devcred::clock::{SystemTimeSource, TimeSource};
use devcred::config::DevcredConfig;
use devcred::privacy::PrivacyLevel;
use devcred::registry::{FileProofStore, VerificationRegistry};
use devcred::CredentialService;
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeroize::Zeroizing;

pub mod analyze;
pub mod config;
pub mod issue;
pub mod logging;
pub mod revoke;
pub mod status;
pub mod version;

/// Config file used when `--config` is not given and it exists.
const DEFAULT_CONFIG_PATH: &str = "devcred.toml";

#[derive(Parser)]
#[command(name = "devcred")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Privacy-preserving developer contribution credentials", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ./devcred.toml when present)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze activity and validate the resulting aggregation
    Analyze {
        /// JSON activity export
        #[arg(long)]
        activity: String,

        /// Subject identity (0x-prefixed address)
        #[arg(long)]
        subject: String,

        /// Claim type: repository, language, collaboration or consistency
        #[arg(long, default_value = "consistency")]
        claim: ClaimType,

        /// Repositories to include (default: every repository in the export)
        #[arg(long)]
        repository: Vec<String>,
    },

    /// Prove a claim and submit it to the local registry
    Issue {
        #[arg(long)]
        activity: String,

        #[arg(long)]
        subject: String,

        #[arg(long)]
        claim: ClaimType,

        /// Claim range widening: low, medium or high (default from config)
        #[arg(long, value_parser = parse_level)]
        level: Option<PrivacyLevel>,

        /// Submitter identity (default: the subject)
        #[arg(long)]
        submitter: Option<String>,

        #[arg(long)]
        repository: Vec<String>,
    },

    /// Show the state of a credential
    Status {
        /// Credential id
        #[arg(long)]
        id: String,
    },

    /// Revoke a credential (submitter only)
    Revoke {
        #[arg(long)]
        id: String,

        #[arg(long)]
        submitter: String,
    },

    /// Write a default configuration file
    Config {
        /// Output path (default: ./devcred.toml)
        #[arg(long)]
        path: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}

fn parse_level(value: &str) -> Result<PrivacyLevel, String> {
    match value {
        "low" => Ok(PrivacyLevel::Low),
        "medium" => Ok(PrivacyLevel::Medium),
        "high" => Ok(PrivacyLevel::High),
        other => Err(format!("unknown privacy level: {} (expected low, medium or high)", other)),
    }
}

/// Load `path`, or the default file when present, or built-in defaults.
pub fn load_config(path: Option<&str>) -> Result<DevcredConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(DevcredConfig::load(Path::new(path))?),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Ok(DevcredConfig::load(Path::new(DEFAULT_CONFIG_PATH))?),
        None => Ok(DevcredConfig::default()),
    }
}

/// Read the cache master key, creating it on first use.
fn cache_key(path: &Path) -> Result<Zeroizing<Vec<u8>>, Box<dyn std::error::Error>> {
    if path.exists() {
        let hex_key = Zeroizing::new(std::fs::read_to_string(path)?);
        let key = Zeroizing::new(hex::decode(hex_key.trim())?);
        if key.len() != 32 {
            return Err(format!("cache key in '{}' must be 32 bytes", path.display()).into());
        }
        return Ok(key);
    }
    let mut key = Zeroizing::new(vec![0u8; 32]);
    rand::rngs::OsRng.fill_bytes(&mut key);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, hex::encode(key.as_slice()))?;
    Ok(key)
}

fn clock() -> Arc<dyn TimeSource> {
    Arc::new(SystemTimeSource)
}

pub(crate) fn service(config: &DevcredConfig) -> Result<CredentialService, Box<dyn std::error::Error>> {
    let key = cache_key(&config.storage.cache_key_path)?;
    let codec = PayloadCodec::new(&key)?;
    let backend = Arc::new(FileBackend::new("blobs", PathBuf::from(&config.storage.blob_dir)));
    let cache = AggregationStore::new(config.cache.clone(), backend, codec, clock());
    Ok(CredentialService::new(config, cache, clock())?)
}

pub(crate) async fn registry(
    config: &DevcredConfig,
    owner: SubjectId,
) -> Result<VerificationRegistry, Box<dyn std::error::Error>> {
    let store = FileProofStore::open(&config.storage.registry_path).await?;
    Ok(VerificationRegistry::new(
        owner,
        config.registry.clone(),
        Arc::new(store),
        clock(),
    ))
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Config { path, force } = &cli.command {
        return config::execute(path.clone(), *force);
    }
    if let Commands::Version = cli.command {
        version::execute();
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    logging::init(&config.logging.level);

    match cli.command {
        Commands::Analyze {
            activity,
            subject,
            claim,
            repository,
        } => analyze::execute(&config, activity, subject, claim, repository).await,
        Commands::Issue {
            activity,
            subject,
            claim,
            level,
            submitter,
            repository,
        } => {
            let level = level.unwrap_or(config.circuits.privacy_level);
            issue::execute(&config, activity, subject, claim, level, submitter, repository).await
        }
        Commands::Status { id } => status::execute(&config, id).await,
        Commands::Revoke { id, submitter } => revoke::execute(&config, id, submitter).await,
        Commands::Config { .. } | Commands::Version => Ok(()),
    }
}
