//! Property-based tests for the aggregation cache
//!
//! Tests for:
//! - Roundtrip: whatever is stored is retrieved byte-for-byte, in memory or from the backend
//! - Expiry: an entry past its TTL is never a hit

use super::{AggregationStore, CacheConfig, MemoryBackend, PayloadCodec, StoreOptions};
use crate::activity::SubjectId;
use crate::clock::ManualTimeSource;
use proptest::prelude::*;
use std::sync::Arc;

fn store(max_memory_bytes: u64, clock: Arc<ManualTimeSource>) -> AggregationStore {
    AggregationStore::new(
        CacheConfig {
            max_memory_bytes,
            ..Default::default()
        },
        Arc::new(MemoryBackend::new("primary")),
        PayloadCodec::new(&[3u8; 32]).unwrap(),
        clock,
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn subject() -> SubjectId {
    SubjectId::from("0x2222222222222222222222222222222222222222")
}

proptest! {
    /// Property: retrieve(store(k, v)) == v for every option combination,
    /// including when a tiny memory budget forces backend reads
    #[test]
    fn prop_store_retrieve_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 0..4096),
        compress in any::<bool>(),
        encrypt in any::<bool>(),
        budget in prop_oneof![Just(0u64), Just(1u64 << 20)],
    ) {
        let rt = runtime();
        let clock = Arc::new(ManualTimeSource::new(1_000));
        let cache = store(budget, clock);
        let options = StoreOptions {
            compress: Some(compress),
            encrypt: Some(encrypt),
            ..StoreOptions::for_subject(subject())
        };
        let back = rt.block_on(async {
            cache.store("k", &payload, options).await.unwrap();
            cache.retrieve("k").await.unwrap()
        });
        prop_assert_eq!(back, Some(payload));
    }

    /// Property: once now > expires_at, retrieval is a miss
    #[test]
    fn prop_expired_entry_is_a_miss(
        ttl in 0u64..10_000,
        overshoot in 1u64..10_000,
    ) {
        let rt = runtime();
        let clock = Arc::new(ManualTimeSource::new(1_000));
        let cache = store(1 << 20, clock.clone());
        let result = rt.block_on(async {
            cache
                .store("k", b"value", StoreOptions::for_subject(subject()).with_ttl_ms(ttl))
                .await
                .unwrap();
            clock.advance(ttl + overshoot);
            cache.retrieve("k").await.unwrap()
        });
        prop_assert_eq!(result, None);
        prop_assert_eq!(cache.metrics().misses, 1);
    }
}
