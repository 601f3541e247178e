//! devcred - Privacy-preserving developer contribution credentials
//!
//! Turns raw commit activity into zero-knowledge credentials: bounded claims
//! about contribution history that can be verified without revealing the
//! repositories, exact counts, or collaborators behind them.
//!
//! Data flows one way:
//! - `analysis` + `privacy`: per-repository consistency metrics, noised before release
//! - `aggregation` + `validation`: typed aggregations certified by six independent checks
//! - `cache`: encrypted, TTL-expiring store between validation and proving
//! - `circuits`: Groth16 circuits over BN254 proving sums, ranges and timeline statistics
//! - `combiner`: many proofs folded into one bundle with a single integrity root
//! - `registry`: replay-protected issuance and revocation of credentials
//!
//! `pipeline` wires these together; `config` loads one TOML file for all of them.

pub mod activity;
pub mod aggregation;
pub mod analysis;
pub mod cache;
pub mod circuits;
pub mod clock;
pub mod combiner;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod privacy;
pub mod registry;
pub mod serialization;
pub mod validation;

pub use error::CredentialError;
pub use pipeline::{AnalysisOutcome, CredentialService, ProvenClaim};
