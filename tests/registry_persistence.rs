//! Registry state across restarts.
//!
//! Consumed proof hashes and credentials live in a CBOR snapshot, so a
//! restarted registry still refuses replays and still answers status queries.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use devcred::activity::{ActivityRecord, RepositoryActivity, SubjectId};
use devcred::aggregation::{AggregationContext, ClaimType};
use devcred::cache::{AggregationStore, MemoryBackend, PayloadCodec};
use devcred::circuits::CircuitKeyring;
use devcred::clock::{ManualTimeSource, TimeSource};
use devcred::config::DevcredConfig;
use devcred::privacy::PrivacyLevel;
use devcred::registry::{CredentialState, FileProofStore, VerificationRegistry};
use devcred::{CredentialError, CredentialService, ProvenClaim};

const SUBJECT: &str = "0x1111111111111111111111111111111111111111";
const OWNER: &str = "0x2222222222222222222222222222222222222222";

fn now_ms() -> u64 {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap().timestamp_millis() as u64
}

fn repository() -> RepositoryActivity {
    let start = Utc.with_ymd_and_hms(2024, 1, 20, 9, 0, 0).unwrap();
    let authors = ["alice", "bob", "carol"];
    RepositoryActivity {
        repository: "core".to_string(),
        records: (0..12)
            .map(|i| ActivityRecord::new("core", authors[i % 3], start + Duration::days(i as i64 * 3), 10, 2))
            .collect(),
        languages: Vec::new(),
    }
}

async fn registry(path: &std::path::Path, service: &CredentialService, clock: Arc<dyn TimeSource>) -> VerificationRegistry {
    let owner = SubjectId::from(OWNER);
    let store = FileProofStore::open(path).await.unwrap();
    let registry = VerificationRegistry::new(owner.clone(), DevcredConfig::default().registry, Arc::new(store), clock);
    service.register_circuits(&registry, &owner).unwrap();
    registry
}

async fn proven_claim(service: &CredentialService) -> ProvenClaim {
    let context = AggregationContext::new(SubjectId::from(SUBJECT), DevcredConfig::default().privacy);
    let outcome = service
        .aggregate(&context, ClaimType::Collaboration, &[repository()])
        .await
        .unwrap();
    service.prove(&outcome, PrivacyLevel::Medium).unwrap()
}

#[tokio::test]
async fn test_replay_refused_after_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("registry.cbor");
    let clock: Arc<dyn TimeSource> = Arc::new(ManualTimeSource::new(now_ms()));

    let config = DevcredConfig::default();
    let cache = AggregationStore::new(
        config.cache.clone(),
        Arc::new(MemoryBackend::new("primary")),
        PayloadCodec::generate().unwrap(),
        clock.clone(),
    );
    let service = CredentialService::new(&config, cache, clock.clone())
        .unwrap()
        .with_keyring(Arc::new(CircuitKeyring::from_seed(5)));
    let submitter = SubjectId::from(SUBJECT);
    let claim = proven_claim(&service).await;

    let credential_id = {
        let first = registry(&path, &service, clock.clone()).await;
        let credential = service.submit(&first, &submitter, &claim).await.unwrap();
        credential.id
    };

    let restarted = registry(&path, &service, clock.clone()).await;
    assert_eq!(restarted.status(&credential_id).await.unwrap(), CredentialState::Verified);
    for hash in claim.bundle.proof_hashes() {
        assert!(restarted.is_consumed(&hash).await.unwrap());
    }

    let replay = service.submit(&restarted, &submitter, &claim).await;
    assert!(matches!(replay, Err(CredentialError::Replay { .. })));

    // Revocation persists too.
    restarted.revoke(&submitter, &credential_id).await.unwrap();
    let again = registry(&path, &service, clock).await;
    assert_eq!(again.status(&credential_id).await.unwrap(), CredentialState::Revoked);
}
