use super::{AdmissionOp, MemoryStore, Store, StoreError};
use crate::core::admission::Decision;
use crate::core::config::LimiterConfig;
use crate::core::keyspace::Keyspace;
use std::time::{Duration, SystemTime};

fn op<'a>(
    keys: &Keyspace,
    config: &LimiterConfig,
    identity: &str,
    endpoint: &'a str,
    now: SystemTime,
) -> AdmissionOp<'a> {
    AdmissionOp::new(keys, config, identity, endpoint, now)
}

#[tokio::test]
async fn test_window_counter_gets_ttl_on_first_increment() {
    let store = MemoryStore::new();
    let keys = Keyspace::new("t");
    let config = LimiterConfig::builder()
        .limit(3)
        .window(Duration::from_secs(10))
        .build()
        .unwrap();
    let now = SystemTime::now();

    let first = store
        .admit(&op(&keys, &config, "a", "index", now))
        .await
        .unwrap();
    assert_eq!(first.count, 1);
    assert_eq!(first.decision, Decision::Allow);

    // Later requests do not push the boundary out
    let mid = now + Duration::from_secs(9);
    let second = store
        .admit(&op(&keys, &config, "a", "index", mid))
        .await
        .unwrap();
    assert_eq!(second.count, 2);

    let after = now + Duration::from_secs(10);
    let fresh = store
        .admit(&op(&keys, &config, "a", "index", after))
        .await
        .unwrap();
    assert_eq!(fresh.count, 1);
}

#[tokio::test]
async fn test_banned_admission_leaves_window_untouched() {
    let store = MemoryStore::new();
    let keys = Keyspace::new("t");
    let config = LimiterConfig::default();
    let now = SystemTime::now();

    store
        .set_with_ttl(&keys.ban("a"), "{}", Duration::from_secs(60), now)
        .await
        .unwrap();

    let admission = store
        .admit(&op(&keys, &config, "a", "index", now))
        .await
        .unwrap();
    assert_eq!(admission.decision, Decision::Banned);
    assert_eq!(admission.count, 0);
    assert!(!store.exists(&keys.window("a"), now).await.unwrap());

    let global = store.hash_get_all(&keys.global_stats(), now).await.unwrap();
    assert_eq!(global.get("error"), Some(&1));
    assert_eq!(global.get("success"), None);
}

#[tokio::test]
async fn test_hourly_bucket_fields() {
    let store = MemoryStore::new();
    let keys = Keyspace::new("t");
    let config = LimiterConfig::builder().limit(1).build().unwrap();
    let now = SystemTime::now();

    for _ in 0..3 {
        store
            .admit(&op(&keys, &config, "a", "search", now))
            .await
            .unwrap();
    }

    let hourly_key = op(&keys, &config, "a", "search", now).hourly_key;
    let fields = store.hash_get_all(&hourly_key, now).await.unwrap();
    assert_eq!(fields.get("success"), Some(&1));
    assert_eq!(fields.get("error"), Some(&2));
    assert_eq!(fields.get("throttled"), Some(&2));
    assert_eq!(fields.get("ep:search:success"), Some(&1));
    assert_eq!(fields.get("ep:search:error"), Some(&2));

    let endpoints = store.hash_get_all(&keys.endpoint_stats(), now).await.unwrap();
    assert_eq!(endpoints.get("search"), Some(&3));
}

#[tokio::test]
async fn test_hourly_bucket_expires_after_ttl() {
    let store = MemoryStore::new();
    let keys = Keyspace::new("t");
    let config = LimiterConfig::builder()
        .hourly_ttl(Duration::from_secs(3600 * 24))
        .build()
        .unwrap();
    let now = SystemTime::now();

    let hourly_key = op(&keys, &config, "a", "index", now).hourly_key;
    store
        .admit(&op(&keys, &config, "a", "index", now))
        .await
        .unwrap();

    let within = now + Duration::from_secs(3600 * 23);
    assert!(store.exists(&hourly_key, within).await.unwrap());

    let beyond = now + Duration::from_secs(3600 * 24);
    assert!(!store.exists(&hourly_key, beyond).await.unwrap());

    // Global counters never expire
    let much_later = now + Duration::from_secs(3600 * 24 * 365);
    assert!(store.exists(&keys.global_stats(), much_later).await.unwrap());
}

#[tokio::test]
async fn test_endpoint_counters_lapse_after_retention() {
    let store = MemoryStore::new();
    let keys = Keyspace::new("t");
    let config = LimiterConfig::builder()
        .retention(Duration::from_secs(100))
        .build()
        .unwrap();
    let now = SystemTime::now();

    store
        .admit(&op(&keys, &config, "a", "index", now))
        .await
        .unwrap();
    // Activity refreshes the retention
    let later = now + Duration::from_secs(90);
    store
        .admit(&op(&keys, &config, "b", "index", later))
        .await
        .unwrap();

    let check = now + Duration::from_secs(150);
    let endpoints = store.hash_get_all(&keys.endpoint_stats(), check).await.unwrap();
    assert_eq!(endpoints.get("index"), Some(&2));

    let idle = later + Duration::from_secs(100);
    assert!(
        store
            .hash_get_all(&keys.endpoint_stats(), idle)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_zero_retention_keeps_endpoint_counters() {
    let store = MemoryStore::new();
    let keys = Keyspace::new("t");
    let config = LimiterConfig::builder()
        .retention(Duration::ZERO)
        .build()
        .unwrap();
    let now = SystemTime::now();

    store
        .admit(&op(&keys, &config, "a", "index", now))
        .await
        .unwrap();

    let much_later = now + Duration::from_secs(3600 * 24 * 3650);
    assert!(store.exists(&keys.endpoint_stats(), much_later).await.unwrap());
}

#[tokio::test]
async fn test_primitives() {
    let store = MemoryStore::new();
    let now = SystemTime::now();

    assert_eq!(store.get("k", now).await.unwrap(), None);
    store
        .set_with_ttl("k", "v", Duration::from_secs(5), now)
        .await
        .unwrap();
    assert_eq!(store.get("k", now).await.unwrap().as_deref(), Some("v"));
    assert!(store.exists("k", now).await.unwrap());
    assert!(!store.exists("k", now + Duration::from_secs(5)).await.unwrap());

    assert!(store.delete("k", now).await.unwrap());
    assert!(!store.delete("k", now).await.unwrap());
}

#[tokio::test]
async fn test_wrong_type_is_reported() {
    let store = MemoryStore::new();
    let now = SystemTime::now();

    store
        .set_with_ttl("k", "text", Duration::from_secs(5), now)
        .await
        .unwrap();
    let result = store.hash_get_all("k", now).await;
    assert!(matches!(result, Err(StoreError::Command(_))));
}

#[tokio::test]
async fn test_unrepresentable_expiry_is_an_error() {
    let store = MemoryStore::new();
    let keys = Keyspace::new("t");
    // Bypasses validation on purpose to reach the store directly
    let config = LimiterConfig {
        window: Duration::from_secs(u64::MAX),
        ..LimiterConfig::default()
    };
    let now = SystemTime::now();

    let result = store.admit(&op(&keys, &config, "a", "index", now)).await;
    assert!(matches!(result, Err(StoreError::Command(_))));
    // Nothing was written
    assert!(!store.exists(&keys.window("a"), now).await.unwrap());
    assert!(!store.exists(&keys.global_stats(), now).await.unwrap());

    let result = store
        .set_with_ttl("k", "v", Duration::from_secs(u64::MAX), now)
        .await;
    assert!(matches!(result, Err(StoreError::Command(_))));
    assert!(!store.exists("k", now).await.unwrap());
}
