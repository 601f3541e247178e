//! Credential pipeline
//!
//! Wires the components together in the one direction data flows:
//!
//! ```text
//! activity ─▶ analyzer + privacy ─▶ validator ─▶ cache
//!          ─▶ circuits ─▶ combiner ─▶ registry
//! ```
//!
//! - [`CredentialService::aggregate`]: subject + repositories to a validated aggregation
//! - [`CredentialService::prove`]: validated aggregation + privacy level to a proof bundle
//! - [`CredentialService::submit`]: proof bundle to an issued credential

use crate::activity::{collect_repository, ActivityQuery, ActivitySource, RepositoryActivity, SubjectId};
use crate::aggregation::{Aggregation, AggregationContext, Aggregator, ClaimMetrics, ClaimType};
use crate::analysis::TemporalConsistencyAnalyzer;
use crate::cache::{AggregationStore, StoreOptions};
use crate::circuits::{
    AggregatorCircuit, CircuitKeyring, CircuitProof, ClaimRange, MetricKind, TemporalAggregatorCircuit,
    REPOSITORY_CAPACITY, TIMELINE_CAPACITY,
};
use crate::clock::TimeSource;
use crate::combiner::{ProofBundle, ProofCombiner};
use crate::config::{CircuitConfig, DevcredConfig};
use crate::error::CredentialError;
use crate::privacy::{DifferentialPrivacyEngine, PrivacyLevel};
use crate::registry::statement::{MAX_COLLABORATORS, MAX_COMMITS, MAX_LINES_OF_CODE};
use crate::registry::{Bounds, ClaimStatement, Credential, VerificationRegistry};
use crate::validation::{AggregationValidator, ValidationReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

// Public input positions of the temporal circuit.
const CONSISTENCY_INDEX: usize = 3;
const SUSTAINABILITY: usize = 5;

/// A validated (or rejected) aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub aggregation: Aggregation,
    pub report: ValidationReport,
    /// Storage identifier when the aggregation was cached.
    pub cache_id: Option<String>,
}

impl AnalysisOutcome {
    pub fn is_valid(&self) -> bool {
        self.report.valid && self.report.aggregation_id == self.aggregation.id
    }
}

/// A statement with the bundle that backs it, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenClaim {
    pub subject: SubjectId,
    pub statement: ClaimStatement,
    pub bundle: ProofBundle,
}

/// Cache key for a subject's latest aggregation of one claim type.
pub fn aggregation_key(subject: &SubjectId, claim_type: ClaimType) -> String {
    format!("aggregation:{}:{}", subject, claim_type)
}

/// Claim bounds around `actual`, capped at `ceiling`.
fn widened(level: PrivacyLevel, actual: u64, ceiling: u64) -> Bounds {
    let (min, max) = level.claim_range(actual);
    Bounds::new(min.min(ceiling), max.min(ceiling))
}

/// `value` lowered by the level's widening, for threshold claims.
fn lowered(level: PrivacyLevel, value: u64) -> u64 {
    value * (100 - level.widening_percent()) / 100
}

pub struct CredentialService {
    aggregator: Aggregator,
    validator: AggregationValidator,
    cache: AggregationStore,
    keyring: Arc<CircuitKeyring>,
    combiner: ProofCombiner,
    clock: Arc<dyn TimeSource>,
    circuits: CircuitConfig,
}

impl CredentialService {
    pub fn new(
        config: &DevcredConfig,
        cache: AggregationStore,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, CredentialError> {
        config.validate()?;
        let keyring = match config.circuits.setup_seed {
            Some(seed) => CircuitKeyring::from_seed(seed),
            None => CircuitKeyring::new(),
        }
        .with_proof_system(config.circuits.proof_system);

        let engine = DifferentialPrivacyEngine::new(config.privacy.clone())?;
        let aggregator = Aggregator::new(
            TemporalConsistencyAnalyzer::new(config.analysis.clone()),
            Arc::new(engine),
            clock.clone(),
        )
        .with_timeline_capacity(TIMELINE_CAPACITY);

        Ok(Self {
            aggregator,
            validator: AggregationValidator::new(config.validation.clone(), clock.clone())?,
            cache,
            keyring: Arc::new(keyring),
            combiner: ProofCombiner::new(clock.clone()),
            clock,
            circuits: config.circuits.clone(),
        })
    }

    /// Share proving keys with another service or a test fixture.
    pub fn with_keyring(mut self, keyring: Arc<CircuitKeyring>) -> Self {
        self.keyring = keyring;
        self
    }

    pub fn keyring(&self) -> &Arc<CircuitKeyring> {
        &self.keyring
    }

    pub fn validator(&self) -> &AggregationValidator {
        &self.validator
    }

    pub fn cache(&self) -> &AggregationStore {
        &self.cache
    }

    /// Fetch every repository, failing on the first one the subject cannot access.
    pub async fn collect(
        &self,
        source: &dyn ActivitySource,
        subject: &SubjectId,
        repositories: &[String],
        query: &ActivityQuery,
    ) -> Result<Vec<RepositoryActivity>, CredentialError> {
        let mut collected = Vec::with_capacity(repositories.len());
        for repository in repositories {
            collected.push(collect_repository(source, subject, repository, query).await?);
        }
        Ok(collected)
    }

    /// Aggregate, validate, and cache the aggregation when it passes.
    pub async fn aggregate(
        &self,
        context: &AggregationContext,
        claim_type: ClaimType,
        repositories: &[RepositoryActivity],
    ) -> Result<AnalysisOutcome, CredentialError> {
        if repositories.is_empty() {
            return Err(CredentialError::Input("no repositories to aggregate".into()));
        }
        let aggregation = self.aggregator.aggregate(context, claim_type, repositories)?;
        let report = self.validator.validate(&aggregation, &context.with_new_audit_id())?;

        let cache_id = if report.valid {
            let options = StoreOptions::for_subject(context.subject.clone())
                .with_tags([claim_type.as_str(), "validated"]);
            let key = aggregation_key(&context.subject, claim_type);
            Some(self.cache.store_value(&key, &aggregation, options).await?)
        } else {
            None
        };

        Ok(AnalysisOutcome {
            aggregation,
            report,
            cache_id,
        })
    }

    /// Latest validated aggregation for `subject`, if still cached.
    pub async fn cached_aggregation(
        &self,
        subject: &SubjectId,
        claim_type: ClaimType,
    ) -> Result<Option<Aggregation>, CredentialError> {
        Ok(self.cache.retrieve_value(&aggregation_key(subject, claim_type)).await?)
    }

    fn prove_values(
        &self,
        kind: MetricKind,
        values: &[u64],
        claim: Bounds,
        timestamp_ms: u64,
    ) -> Result<CircuitProof, CredentialError> {
        let circuit = AggregatorCircuit::<REPOSITORY_CAPACITY>::new(
            kind,
            values,
            ClaimRange::new(claim.min, claim.max),
            0,
            &mut rand::thread_rng(),
        )?;
        Ok(self.keyring.prove_aggregate(circuit, timestamp_ms)?)
    }

    /// Prove a validated aggregation at `level`.
    ///
    /// Claim ranges are the true values widened by the level, so the statement
    /// never discloses an exact count.
    pub fn prove(&self, outcome: &AnalysisOutcome, level: PrivacyLevel) -> Result<ProvenClaim, CredentialError> {
        if !outcome.is_valid() {
            return Err(CredentialError::ValidationFailed {
                validation_id: outcome.report.id,
                aggregation_id: outcome.aggregation.id,
            });
        }
        let now = self.clock.now_ms();
        let aggregation = &outcome.aggregation;

        let (statement, proofs) = match &aggregation.metrics {
            ClaimMetrics::Repository(m) => {
                let commits: Vec<u64> = m.repositories.iter().map(|r| r.commits).collect();
                let lines: Vec<u64> = m.repositories.iter().map(|r| r.lines_of_code).collect();
                let team: Vec<u64> = m.repositories.iter().map(|r| r.collaborators).collect();

                let commit_bounds = widened(level, m.total_commits, MAX_COMMITS);
                let line_bounds = widened(level, m.total_lines_of_code, MAX_LINES_OF_CODE);
                let team_bounds = widened(level, team.iter().sum(), MAX_COLLABORATORS);
                let proofs = vec![
                    self.prove_values(MetricKind::Commits, &commits, commit_bounds, now)?,
                    self.prove_values(MetricKind::LinesOfCode, &lines, line_bounds, now)?,
                    self.prove_values(MetricKind::Collaborators, &team, team_bounds, now)?,
                ];
                let statement = ClaimStatement::Repository {
                    commits: commit_bounds,
                    lines_of_code: line_bounds,
                    language_count: None,
                    collaborators: team_bounds,
                    timestamp_ms: now,
                };
                (statement, proofs)
            }
            ClaimMetrics::Language(m) => {
                let lines: Vec<u64> = m.languages.iter().map(|l| l.lines).filter(|&l| l > 0).collect();
                let bounds = widened(level, lines.iter().sum(), MAX_LINES_OF_CODE);
                let statement = ClaimStatement::Language {
                    language_count: lines.len() as u64,
                    timestamp_ms: now,
                };
                (statement, vec![self.prove_values(MetricKind::Languages, &lines, bounds, now)?])
            }
            ClaimMetrics::Collaboration(m) => {
                let team = &m.collaborators_per_repository;
                let bounds = widened(level, team.iter().sum(), MAX_COLLABORATORS);
                let statement = ClaimStatement::Collaboration {
                    collaborators: bounds,
                    timestamp_ms: now,
                };
                (statement, vec![self.prove_values(MetricKind::Collaborators, team, bounds, now)?])
            }
            ClaimMetrics::Consistency(m) => {
                let circuit =
                    TemporalAggregatorCircuit::<TIMELINE_CAPACITY>::new(&m.timeline, self.circuits.temporal)?;
                let proof = self.keyring.prove_temporal(circuit, now)?;
                let output = |i: usize| {
                    proof
                        .public_u64(i)
                        .ok_or_else(|| CredentialError::Proof(format!("temporal output {} is not an integer", i)))
                };
                let statement = ClaimStatement::Consistency {
                    min_consistency: lowered(level, output(CONSISTENCY_INDEX)?),
                    min_sustainability: lowered(level, output(SUSTAINABILITY)?),
                    timestamp_ms: now,
                };
                (statement, vec![proof])
            }
        };

        let bundle = self
            .combiner
            .combine(aggregation.claim_type(), proofs, self.circuits.combination_mode)?;
        if let Some(rejection) = &bundle.rejection {
            return Err(CredentialError::Proof(format!("bundle rejected: {:?}", rejection)));
        }
        debug!(
            subject = %aggregation.subject,
            claim = %aggregation.claim_type(),
            proofs = bundle.proofs.len(),
            "claim proven"
        );

        Ok(ProvenClaim {
            subject: aggregation.subject.clone(),
            statement,
            bundle,
        })
    }

    /// Trust this service's verifying keys in `registry`.
    pub fn register_circuits(&self, registry: &VerificationRegistry, owner: &SubjectId) -> Result<(), CredentialError> {
        for kind in MetricKind::ALL {
            let vk = self.keyring.verifying_key_for_aggregate::<REPOSITORY_CAPACITY>(kind)?;
            registry.register_verifying_key(owner, AggregatorCircuit::<REPOSITORY_CAPACITY>::circuit_id(kind), vk)?;
        }
        let params = self.circuits.temporal;
        let vk = self.keyring.verifying_key_for_temporal::<TIMELINE_CAPACITY>(params)?;
        registry.register_verifying_key(
            owner,
            TemporalAggregatorCircuit::<TIMELINE_CAPACITY>::circuit_id(&params),
            vk,
        )?;
        Ok(())
    }

    pub async fn submit(
        &self,
        registry: &VerificationRegistry,
        submitter: &SubjectId,
        claim: &ProvenClaim,
    ) -> Result<Credential, CredentialError> {
        Ok(registry
            .submit(submitter, &claim.subject, claim.statement.clone(), &claim.bundle)
            .await?)
    }

    /// Aggregate, validate, prove and submit in one call.
    pub async fn issue(
        &self,
        registry: &VerificationRegistry,
        context: &AggregationContext,
        claim_type: ClaimType,
        repositories: &[RepositoryActivity],
        level: PrivacyLevel,
    ) -> Result<Credential, CredentialError> {
        let outcome = self.aggregate(context, claim_type, repositories).await?;
        let claim = self.prove(&outcome, level)?;
        let credential = self.submit(registry, &context.subject, &claim).await?;
        info!(
            correlation_id = %context.correlation_id,
            credential_id = %credential.id,
            "credential issued"
        );
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widened_bounds_are_capped() {
        assert_eq!(widened(PrivacyLevel::Medium, 12, MAX_COMMITS), Bounds::new(9, 15));
        assert_eq!(widened(PrivacyLevel::Low, MAX_COMMITS, MAX_COMMITS), Bounds::new(90_000, MAX_COMMITS));
    }

    #[test]
    fn test_lowered_thresholds() {
        assert_eq!(lowered(PrivacyLevel::High, 81), 40);
        assert_eq!(lowered(PrivacyLevel::Low, 100), 90);
        assert_eq!(lowered(PrivacyLevel::Medium, 0), 0);
    }

    #[test]
    fn test_aggregation_key() {
        let key = aggregation_key(&SubjectId::new("0xabc"), ClaimType::Language);
        assert_eq!(key, "aggregation:0xabc:language");
    }
}
