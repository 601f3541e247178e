//! Aggregation cache against a real filesystem backend.
//!
//! - Validated aggregations survive eviction from memory and come back from disk
//! - Blobs on disk are sealed: no subject or metric text in the clear
//! - Expired aggregations are never served
//! - A failing primary backend surfaces as a storage error

use chrono::{Duration, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use devcred::activity::{ActivityRecord, RepositoryActivity, SubjectId};
use devcred::aggregation::{Aggregation, AggregationContext, ClaimType};
use devcred::cache::{
    AggregationStore, BlobBackend, CacheConfig, FileBackend, MemoryBackend, PayloadCodec, SearchQuery,
};
use devcred::clock::{ManualTimeSource, TimeSource};
use devcred::config::DevcredConfig;
use devcred::{CredentialError, CredentialService};

const SUBJECT: &str = "0x1111111111111111111111111111111111111111";

fn now_ms() -> u64 {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap().timestamp_millis() as u64
}

fn repository(name: &str, commits: usize) -> RepositoryActivity {
    let start = Utc.with_ymd_and_hms(2024, 1, 20, 9, 0, 0).unwrap();
    RepositoryActivity {
        repository: name.to_string(),
        records: (0..commits)
            .map(|i| ActivityRecord::new(name, "alice", start + Duration::days(i as i64 * 2), 20, 5))
            .collect(),
        languages: Vec::new(),
    }
}

fn service(cache_config: CacheConfig, primary: Arc<dyn BlobBackend>, clock: Arc<ManualTimeSource>) -> CredentialService {
    let time: Arc<dyn TimeSource> = clock;
    let mut config = DevcredConfig::default();
    config.cache = cache_config.clone();
    let cache = AggregationStore::new(cache_config, primary, PayloadCodec::new(&[7u8; 32]).unwrap(), time.clone());
    CredentialService::new(&config, cache, time).unwrap()
}

fn blob_files(root: &Path) -> Vec<Vec<u8>> {
    let mut blobs = Vec::new();
    for shard in std::fs::read_dir(root).unwrap() {
        let shard = shard.unwrap().path();
        for file in std::fs::read_dir(&shard).unwrap() {
            blobs.push(std::fs::read(file.unwrap().path()).unwrap());
        }
    }
    blobs
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[tokio::test]
async fn test_evicted_aggregation_reloads_from_disk() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualTimeSource::new(now_ms()));
    let config = CacheConfig {
        // Any payload exceeds the budget, so nothing stays resident.
        max_memory_bytes: 1,
        ..CacheConfig::default()
    };
    let service = service(config, Arc::new(FileBackend::new("disk", dir.path())), clock);
    let subject = SubjectId::from(SUBJECT);
    let context = AggregationContext::new(subject.clone(), DevcredConfig::default().privacy);

    let outcome = service
        .aggregate(&context, ClaimType::Repository, &[repository("core", 14)])
        .await
        .unwrap();
    assert!(outcome.is_valid());
    let cache_id = outcome.cache_id.clone().unwrap();

    let blobs = blob_files(dir.path());
    assert_eq!(blobs.len(), 1);
    assert!(!contains(&blobs[0], SUBJECT.as_bytes()));
    assert!(!contains(&blobs[0], b"total_commits"));
    assert!(dir.path().join(&cache_id[..2]).join(&cache_id).exists());

    let cached: Aggregation = service
        .cached_aggregation(&subject, ClaimType::Repository)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached, outcome.aggregation);

    let metrics = service.cache().metrics();
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.memory_hits, 0);
    assert!(metrics.evictions >= 1);
}

#[tokio::test]
async fn test_expired_aggregation_not_served() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualTimeSource::new(now_ms()));
    let service = service(
        CacheConfig::default(),
        Arc::new(FileBackend::new("disk", dir.path())),
        clock.clone(),
    );
    let subject = SubjectId::from(SUBJECT);
    let context = AggregationContext::new(subject.clone(), DevcredConfig::default().privacy);

    service
        .aggregate(&context, ClaimType::Collaboration, &[repository("core", 12)])
        .await
        .unwrap();
    let tagged = service
        .cache()
        .search(&SearchQuery {
            tags: vec!["collaboration".to_string(), "validated".to_string()],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].key, format!("aggregation:{}:collaboration", SUBJECT));

    clock.advance(CacheConfig::default().default_ttl_ms + 1);
    assert!(service
        .cached_aggregation(&subject, ClaimType::Collaboration)
        .await
        .unwrap()
        .is_none());

    let report = service.cache().cleanup().await.unwrap();
    assert_eq!(report.expired, 0);
    // The read already dropped the entry and its blob.
    assert!(blob_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_primary_outage_is_a_storage_error() {
    let clock = Arc::new(ManualTimeSource::new(now_ms()));
    let primary = Arc::new(MemoryBackend::new("primary"));
    primary.set_online(false);
    let service = service(CacheConfig::default(), primary, clock);
    let context = AggregationContext::new(SubjectId::from(SUBJECT), DevcredConfig::default().privacy);

    let result = service
        .aggregate(&context, ClaimType::Repository, &[repository("core", 12)])
        .await;
    assert!(matches!(result, Err(CredentialError::Storage(_))));
}
