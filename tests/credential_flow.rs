//! End-to-end credential issuance.
//!
//! Drives the full pipeline against in-memory collaborators:
//! - activity export → aggregation → validation → cache
//! - validated aggregation → circuit proofs → combined bundle
//! - bundle → registry → credential lifecycle (verified, revoked, expired)
//!
//! Every test shares one seeded keyring; Groth16 setup dominates runtime.

use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use devcred::activity::{
    AccessLevel, ActivityQuery, ActivityRecord, JsonActivitySource, LanguageUsage, RepositoryActivity,
    RepositoryEntry, SubjectId,
};
use devcred::aggregation::{AggregationContext, ClaimType};
use devcred::cache::{AggregationStore, MemoryBackend, PayloadCodec};
use devcred::circuits::{AggregatorCircuit, CircuitError, CircuitKeyring, ClaimRange, MetricKind};
use devcred::clock::{ManualTimeSource, TimeSource, DAY_MS};
use devcred::config::DevcredConfig;
use devcred::privacy::PrivacyLevel;
use devcred::registry::{
    Bounds, ClaimStatement, CredentialState, MemoryProofStore, VerificationError, VerificationRegistry,
};
use devcred::{CredentialError, CredentialService};

// === Test Fixtures ===

const SUBJECT: &str = "0x1111111111111111111111111111111111111111";
const OWNER: &str = "0x2222222222222222222222222222222222222222";
const OUTSIDER: &str = "0x3333333333333333333333333333333333333333";

/// 2024-03-01T00:00:00Z
fn now_ms() -> u64 {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap().timestamp_millis() as u64
}

fn keyring() -> Arc<CircuitKeyring> {
    static KEYRING: OnceLock<Arc<CircuitKeyring>> = OnceLock::new();
    KEYRING.get_or_init(|| Arc::new(CircuitKeyring::from_seed(17))).clone()
}

/// `commits` commits, `every_days` apart, alternating between two authors.
fn entry(repository: &str, commits: usize, every_days: i64) -> RepositoryEntry {
    let start = Utc.with_ymd_and_hms(2024, 1, 20, 9, 0, 0).unwrap();
    let authors = ["alice", "bob"];
    let mut permissions = HashMap::new();
    permissions.insert(SUBJECT.to_string(), AccessLevel::Write);

    RepositoryEntry {
        repository: repository.to_string(),
        languages: vec![
            LanguageUsage {
                name: "rust".to_string(),
                lines: 900,
            },
            LanguageUsage {
                name: "toml".to_string(),
                lines: 40,
            },
        ],
        permissions,
        commits: (0..commits)
            .map(|i| {
                ActivityRecord::new(
                    repository,
                    authors[i % 2],
                    start + Duration::days(i as i64 * every_days),
                    10,
                    2,
                )
            })
            .collect(),
    }
}

struct Harness {
    clock: Arc<ManualTimeSource>,
    service: CredentialService,
    registry: VerificationRegistry,
    subject: SubjectId,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualTimeSource::new(now_ms()));
        let time: Arc<dyn TimeSource> = clock.clone();
        let config = DevcredConfig::default();

        let cache = AggregationStore::new(
            config.cache.clone(),
            Arc::new(MemoryBackend::new("primary")),
            PayloadCodec::generate().unwrap(),
            time.clone(),
        );
        let service = CredentialService::new(&config, cache, time.clone())
            .unwrap()
            .with_keyring(keyring());

        let owner = SubjectId::from(OWNER);
        let registry = VerificationRegistry::new(
            owner.clone(),
            config.registry.clone(),
            Arc::new(MemoryProofStore::new()),
            time,
        );
        service.register_circuits(&registry, &owner).unwrap();

        Self {
            clock,
            service,
            registry,
            subject: SubjectId::from(SUBJECT),
        }
    }

    async fn collect(&self, entries: Vec<RepositoryEntry>) -> Vec<RepositoryActivity> {
        let source = JsonActivitySource::from_entries(entries);
        let names = source.repository_names();
        self.service
            .collect(&source, &self.subject, &names, &ActivityQuery::default())
            .await
            .unwrap()
    }

    fn context(&self) -> AggregationContext {
        AggregationContext::new(self.subject.clone(), DevcredConfig::default().privacy)
    }
}

// === Issuance ===

#[tokio::test]
async fn test_repository_claim_issued_end_to_end() {
    let h = Harness::new();
    let repos = h.collect(vec![entry("core", 12, 3)]).await;

    let credential = h
        .service
        .issue(&h.registry, &h.context(), ClaimType::Repository, &repos, PrivacyLevel::Medium)
        .await
        .unwrap();

    match &credential.statement {
        ClaimStatement::Repository {
            commits,
            language_count,
            ..
        } => {
            assert_eq!(*commits, Bounds::new(9, 15));
            assert_eq!(*language_count, None);
        }
        other => panic!("Expected repository statement, got {:?}", other),
    }
    assert_eq!(credential.proof_hashes.len(), 3);
    assert_eq!(credential.subject, h.subject);
    assert_eq!(h.registry.status(&credential.id).await.unwrap(), CredentialState::Verified);
    for hash in &credential.proof_hashes {
        assert!(h.registry.is_consumed(hash).await.unwrap());
    }

    // The validated aggregation is cached for later proving.
    let cached = h
        .service
        .cached_aggregation(&h.subject, ClaimType::Repository)
        .await
        .unwrap();
    assert!(cached.is_some());
}

#[tokio::test]
async fn test_language_and_collaboration_claims() {
    let h = Harness::new();
    let repos = h.collect(vec![entry("core", 12, 3), entry("docs", 10, 2)]).await;

    let language = h
        .service
        .issue(&h.registry, &h.context(), ClaimType::Language, &repos, PrivacyLevel::Low)
        .await
        .unwrap();
    assert!(matches!(
        language.statement,
        ClaimStatement::Language { language_count: 2, .. }
    ));

    let collaboration = h
        .service
        .issue(&h.registry, &h.context(), ClaimType::Collaboration, &repos, PrivacyLevel::High)
        .await
        .unwrap();
    match collaboration.statement {
        ClaimStatement::Collaboration { collaborators, .. } => {
            // Two collaborators in each of two repositories.
            assert!(collaborators.min <= 4 && 4 <= collaborators.max);
        }
        other => panic!("Expected collaboration statement, got {:?}", other),
    }
}

#[tokio::test]
async fn test_consistency_claim_discloses_thresholds_only() {
    let h = Harness::new();
    let repos = h.collect(vec![entry("core", 12, 3)]).await;

    let outcome = h
        .service
        .aggregate(&h.context(), ClaimType::Consistency, &repos)
        .await
        .unwrap();
    assert!(outcome.is_valid(), "errors: {:?}", outcome.report.errors);

    let claim = h.service.prove(&outcome, PrivacyLevel::Medium).unwrap();
    match claim.statement {
        ClaimStatement::Consistency {
            min_consistency,
            min_sustainability,
            ..
        } => {
            // Evenly spaced commits have zero gap variance: index 100, lowered by 25%.
            assert_eq!(min_consistency, 75);
            assert!(min_sustainability <= 100);
        }
        other => panic!("Expected consistency statement, got {:?}", other),
    }

    let credential = h.service.submit(&h.registry, &h.subject, &claim).await.unwrap();
    assert_eq!(credential.claim_type(), ClaimType::Consistency);
}

// === Failure modes ===

#[tokio::test]
async fn test_replayed_bundle_rejected() {
    let h = Harness::new();
    let repos = h.collect(vec![entry("core", 12, 3)]).await;
    let outcome = h
        .service
        .aggregate(&h.context(), ClaimType::Collaboration, &repos)
        .await
        .unwrap();
    let claim = h.service.prove(&outcome, PrivacyLevel::Medium).unwrap();

    h.service.submit(&h.registry, &h.subject, &claim).await.unwrap();
    let replay = h.service.submit(&h.registry, &h.subject, &claim).await;

    match replay {
        Err(CredentialError::Replay { proof_hash }) => {
            assert_eq!(proof_hash, claim.bundle.proof_hashes()[0]);
        }
        other => panic!("Expected replay, got {:?}", other),
    }
}

#[tokio::test]
async fn test_validation_and_proving_are_independent() {
    let h = Harness::new();
    let repos = h.collect(vec![entry("core", 12, 3)]).await;

    // 12 commits clear the validator's minimum of 10.
    let outcome = h
        .service
        .aggregate(&h.context(), ClaimType::Repository, &repos)
        .await
        .unwrap();
    assert!(outcome.is_valid());

    // The circuit still refuses a range the true total does not fall in.
    let circuit = AggregatorCircuit::<8>::new(
        MetricKind::Commits,
        &[12],
        ClaimRange::new(100, 200),
        0,
        &mut rand::thread_rng(),
    )
    .unwrap();
    let result = h.service.keyring().prove_aggregate(circuit, now_ms());
    assert!(matches!(result, Err(CircuitError::Unsatisfied(_))));
}

#[tokio::test]
async fn test_insufficient_activity_cannot_be_proven() {
    let h = Harness::new();
    let repos = h.collect(vec![entry("core", 4, 3)]).await;

    let outcome = h
        .service
        .aggregate(&h.context(), ClaimType::Repository, &repos)
        .await
        .unwrap();
    assert!(!outcome.is_valid());
    assert!(outcome.cache_id.is_none());
    assert!(outcome.report.errors.iter().any(|e| e.rule == "minimum_commits"));

    let result = h.service.prove(&outcome, PrivacyLevel::Medium);
    assert!(matches!(result, Err(CredentialError::ValidationFailed { .. })));
}

#[tokio::test]
async fn test_repository_without_access_is_refused() {
    let h = Harness::new();
    let mut private = entry("private", 12, 3);
    private.permissions.clear();
    let source = JsonActivitySource::from_entries(vec![entry("core", 12, 3), private]);

    let result = h
        .service
        .collect(
            &source,
            &h.subject,
            &["core".to_string(), "private".to_string()],
            &ActivityQuery::default(),
        )
        .await;
    assert!(matches!(result, Err(CredentialError::Input(_))));
}

#[tokio::test]
async fn test_empty_repository_list_is_an_input_error() {
    let h = Harness::new();
    let result = h.service.aggregate(&h.context(), ClaimType::Repository, &[]).await;
    assert!(matches!(result, Err(CredentialError::Input(_))));
}

// === Lifecycle ===

#[tokio::test]
async fn test_revocation_and_expiry() {
    let h = Harness::new();
    let repos = h.collect(vec![entry("core", 12, 3)]).await;

    let revoked = h
        .service
        .issue(&h.registry, &h.context(), ClaimType::Collaboration, &repos, PrivacyLevel::Medium)
        .await
        .unwrap();
    let kept = h
        .service
        .issue(&h.registry, &h.context(), ClaimType::Repository, &repos, PrivacyLevel::Medium)
        .await
        .unwrap();

    let outsider = SubjectId::from(OUTSIDER);
    assert!(matches!(
        h.registry.revoke(&outsider, &revoked.id).await,
        Err(VerificationError::NotSubmitter(_))
    ));
    h.registry.revoke(&h.subject, &revoked.id).await.unwrap();
    assert_eq!(h.registry.status(&revoked.id).await.unwrap(), CredentialState::Revoked);
    assert!(matches!(
        h.registry.revoke(&h.subject, &revoked.id).await,
        Err(VerificationError::AlreadyRevoked(_))
    ));

    h.clock.advance(366 * DAY_MS);
    assert_eq!(h.registry.status(&kept.id).await.unwrap(), CredentialState::Expired);
    // Revocation outranks expiry.
    assert_eq!(h.registry.status(&revoked.id).await.unwrap(), CredentialState::Revoked);
    assert_eq!(h.registry.status("unknown").await.unwrap(), CredentialState::Unissued);

    let all = h.registry.credentials_for(&h.subject).await.unwrap();
    assert_eq!(all.len(), 2);
}
