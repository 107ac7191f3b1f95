use super::keyspace::{MILLIS_PER_HOUR, hour_of};
use super::store::{AdmissionOp, MemoryStore, Store, StoreError};
use super::{Admission, Decision, LimiterConfig, RedisStore, Turnstile};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn limiter(limit: u64, window: Duration) -> Turnstile<MemoryStore> {
    let config = LimiterConfig::builder()
        .limit(limit)
        .window(window)
        .build()
        .unwrap();
    Turnstile::new(Arc::new(MemoryStore::new()), config).unwrap()
}

fn headers(ip: &str) -> HashMap<String, String> {
    HashMap::from([("X-Real-IP".to_string(), ip.to_string())])
}

/// Store that fails every call
struct UnreachableStore;

#[async_trait]
impl Store for UnreachableStore {
    async fn admit(&self, _op: &AdmissionOp<'_>) -> Result<Admission, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn exists(&self, _key: &str, _now: SystemTime) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn get(&self, _key: &str, _now: SystemTime) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
        _now: SystemTime,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str, _now: SystemTime) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn hash_get_all(
        &self,
        _key: &str,
        _now: SystemTime,
    ) -> Result<HashMap<String, i64>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Store whose admission never answers
struct HangingStore;

#[async_trait]
impl Store for HangingStore {
    async fn admit(&self, _op: &AdmissionOp<'_>) -> Result<Admission, StoreError> {
        std::future::pending().await
    }

    async fn exists(&self, _key: &str, _now: SystemTime) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn get(&self, _key: &str, _now: SystemTime) -> Result<Option<String>, StoreError> {
        std::future::pending().await
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
        _now: SystemTime,
    ) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str, _now: SystemTime) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn hash_get_all(
        &self,
        _key: &str,
        _now: SystemTime,
    ) -> Result<HashMap<String, i64>, StoreError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_sixtieth_allowed_sixty_first_denied() {
    let turnstile = limiter(60, Duration::from_millis(60_000));
    let caller = headers("203.0.113.1");
    let now = SystemTime::now();

    for i in 1..=60 {
        assert!(
            turnstile.check_admission_at(&caller, "index", now).await,
            "Request {i} should be allowed"
        );
    }
    assert!(!turnstile.check_admission_at(&caller, "index", now).await);
}

#[tokio::test]
async fn test_identities_are_independent() {
    let turnstile = limiter(2, Duration::from_secs(60));
    let now = SystemTime::now();

    for _ in 0..2 {
        assert!(turnstile.check_admission_at(&headers("10.0.0.1"), "a", now).await);
    }
    assert!(!turnstile.check_admission_at(&headers("10.0.0.1"), "a", now).await);
    assert!(turnstile.check_admission_at(&headers("10.0.0.2"), "a", now).await);
}

#[tokio::test]
async fn test_window_resets_at_boundary() {
    let turnstile = limiter(3, Duration::from_secs(60));
    let now = SystemTime::now();

    for _ in 0..3 {
        assert!(turnstile.admit("10.0.0.1", "a", now).await.unwrap().is_allowed());
    }
    let denied = turnstile.admit("10.0.0.1", "a", now).await.unwrap();
    assert_eq!(denied.decision, Decision::Throttled);
    assert_eq!(denied.count, 4);
    assert_eq!(denied.remaining(), 0);

    let next_window = now + Duration::from_secs(60);
    let fresh = turnstile.admit("10.0.0.1", "a", next_window).await.unwrap();
    assert!(fresh.is_allowed());
    assert_eq!(fresh.count, 1);
    assert_eq!(fresh.remaining(), 2);
}

#[tokio::test]
async fn test_boundary_burst_is_tolerated() {
    // Fixed windows admit up to twice the limit across a boundary
    let turnstile = limiter(5, Duration::from_secs(60));
    let start = SystemTime::now();

    let mut allowed = 0;
    let late = start + Duration::from_secs(59);
    turnstile.admit("10.0.0.9", "a", start).await.unwrap();
    for _ in 0..4 {
        if turnstile.admit("10.0.0.9", "a", late).await.unwrap().is_allowed() {
            allowed += 1;
        }
    }
    let early_next = start + Duration::from_secs(61);
    for _ in 0..5 {
        if turnstile
            .admit("10.0.0.9", "a", early_next)
            .await
            .unwrap()
            .is_allowed()
        {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 9);
}

#[tokio::test]
async fn test_ban_overrides_window() {
    let turnstile = limiter(100, Duration::from_secs(60));
    let caller = headers("198.51.100.7");
    let now = SystemTime::now();

    assert!(turnstile.check_admission_at(&caller, "index", now).await);

    turnstile
        .bans()
        .set_ban_at("198.51.100.7", Duration::from_secs(300), Some("abuse"), now)
        .await
        .unwrap();

    for offset in [0, 10, 120, 299] {
        let at = now + Duration::from_secs(offset);
        assert!(!turnstile.check_admission_at(&caller, "index", at).await);
    }

    // Ban has lapsed
    let after = now + Duration::from_secs(300);
    assert!(turnstile.check_admission_at(&caller, "index", after).await);
}

#[tokio::test]
async fn test_unban_restores_access() {
    let turnstile = limiter(10, Duration::from_secs(60));
    turnstile
        .set_ban("198.51.100.8", Duration::from_secs(600), None)
        .await
        .unwrap();
    assert!(turnstile.is_banned("198.51.100.8").await);
    assert!(!turnstile.check_admission(&headers("198.51.100.8"), "index").await);

    assert!(turnstile.unban("198.51.100.8").await.unwrap());
    assert!(!turnstile.is_banned("198.51.100.8").await);
    assert!(turnstile.check_admission(&headers("198.51.100.8"), "index").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_checks_never_exceed_limit() {
    const LIMIT: u64 = 50;
    const EXTRA: usize = 70;

    let turnstile = limiter(LIMIT, Duration::from_secs(60));
    let barrier = Arc::new(tokio::sync::Barrier::new(LIMIT as usize + EXTRA));

    let mut handles = Vec::new();
    for _ in 0..(LIMIT as usize + EXTRA) {
        let turnstile = turnstile.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            turnstile
                .check_admission(&headers("192.0.2.55"), "index")
                .await
        }));
    }

    let mut allowed = 0;
    let mut denied = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        } else {
            denied += 1;
        }
    }

    assert_eq!(allowed, LIMIT as usize);
    assert_eq!(denied, EXTRA);
}

#[tokio::test]
async fn test_fails_open_when_store_unreachable() {
    let turnstile = Turnstile::new(Arc::new(UnreachableStore), LimiterConfig::default()).unwrap();

    for i in 0..200 {
        let caller = headers(&format!("10.1.0.{}", i % 4));
        assert!(turnstile.check_admission(&caller, "index").await);
    }
    assert!(!turnstile.is_banned("10.1.0.1").await);
    assert!(turnstile.admit("10.1.0.1", "index", SystemTime::now()).await.is_err());
    assert!(turnstile.stats().global().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_fails_open_on_timeout() {
    let config = LimiterConfig::builder()
        .command_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let turnstile = Turnstile::new(Arc::new(HangingStore), config).unwrap();

    assert!(turnstile.check_admission(&headers("10.2.0.1"), "index").await);
    assert!(!turnstile.is_banned("10.2.0.1").await);
    assert!(matches!(
        turnstile.admit("10.2.0.1", "index", SystemTime::now()).await,
        Err(StoreError::Timeout(_))
    ));
}

#[tokio::test]
async fn test_fails_open_against_unreachable_redis() {
    // Nothing listens on port 1
    let store = RedisStore::builder("redis://127.0.0.1:1/")
        .connection_timeout(Duration::from_millis(100))
        .response_timeout(Duration::from_millis(100))
        .connect_retries(0)
        .build()
        .unwrap();
    let config = LimiterConfig::builder()
        .command_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let turnstile = Turnstile::new(Arc::new(store), config).unwrap();

    for _ in 0..3 {
        assert!(turnstile.check_admission(&headers("10.3.0.1"), "index").await);
    }
}

#[tokio::test]
async fn test_stats_match_decisions() {
    let turnstile = limiter(3, Duration::from_secs(60));
    let now = SystemTime::now();

    let mut total = 0u64;
    let mut admitted = 0u64;
    for i in 0..40 {
        let caller = headers(&format!("10.4.0.{}", i % 5));
        let endpoint = if i % 2 == 0 { "posts.list" } else { "media.get" };
        if turnstile.check_admission_at(&caller, endpoint, now).await {
            admitted += 1;
        }
        total += 1;
    }
    turnstile
        .bans()
        .set_ban_at("10.4.0.9", Duration::from_secs(60), None, now)
        .await
        .unwrap();
    assert!(!turnstile.check_admission_at(&headers("10.4.0.9"), "posts.list", now).await);
    total += 1;

    let stats = turnstile.stats();
    let global = stats.global_at(now).await.unwrap();
    assert_eq!(global.total(), total);
    assert_eq!(global.success, admitted);
    assert_eq!(global.success, 15);

    let hourly = stats.hourly_at(hour_of(now), now).await.unwrap();
    assert_eq!(hourly.total(), total);
    assert_eq!(hourly.banned, 1);
    assert_eq!(hourly.throttled + hourly.banned, hourly.error);

    let endpoints = stats.endpoints_at(now).await.unwrap();
    assert_eq!(endpoints.values().sum::<u64>(), total);
    assert_eq!(endpoints["posts.list"], 21);
    assert_eq!(endpoints["media.get"], 20);
}

#[tokio::test]
async fn test_hour_buckets_rotate() {
    let turnstile = limiter(1000, Duration::from_secs(60));
    let hour_start = UNIX_EPOCH + Duration::from_millis(480_000 * MILLIS_PER_HOUR);
    let before = hour_start - Duration::from_secs(1);

    for _ in 0..3 {
        turnstile.check_admission_at(&headers("10.5.0.1"), "a", before).await;
    }
    for _ in 0..4 {
        turnstile.check_admission_at(&headers("10.5.0.1"), "a", hour_start).await;
    }

    let buckets = turnstile
        .stats()
        .recent_hours(hour_start, 3)
        .await
        .unwrap();
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[0].hour, 479_998);
    assert_eq!(buckets[0].total(), 0);
    assert_eq!(buckets[1].hour, 479_999);
    assert_eq!(buckets[1].total(), 3);
    assert_eq!(buckets[2].hour, 480_000);
    assert_eq!(buckets[2].total(), 4);

    let global = turnstile.stats().global_at(hour_start).await.unwrap();
    assert_eq!(
        global.total(),
        buckets.iter().map(|bucket| bucket.total()).sum::<u64>()
    );
}

#[tokio::test]
async fn test_endpoint_counted_for_every_outcome() {
    let turnstile = limiter(1, Duration::from_secs(60));
    let now = SystemTime::now();

    turnstile.check_admission_at(&headers("10.6.0.1"), "login", now).await;
    turnstile.check_admission_at(&headers("10.6.0.1"), "login", now).await;
    turnstile
        .bans()
        .set_ban_at("10.6.0.2", Duration::from_secs(60), None, now)
        .await
        .unwrap();
    turnstile.check_admission_at(&headers("10.6.0.2"), "login", now).await;

    let endpoints = turnstile.stats().endpoints_at(now).await.unwrap();
    assert_eq!(endpoints["login"], 3);

    let hourly = turnstile.stats().hourly_at(hour_of(now), now).await.unwrap();
    let login = hourly.endpoints["login"];
    assert_eq!(login.success, 1);
    assert_eq!(login.error, 2);
}

#[tokio::test]
async fn test_unresolved_callers_share_one_bucket() {
    let turnstile = limiter(2, Duration::from_secs(60));
    let anonymous: HashMap<String, String> = HashMap::new();
    let blank = HashMap::from([("X-Forwarded-For".to_string(), "  ".to_string())]);
    let now = SystemTime::now();

    assert!(turnstile.check_admission_at(&anonymous, "a", now).await);
    assert!(turnstile.check_admission_at(&blank, "a", now).await);
    assert!(!turnstile.check_admission_at(&anonymous, "a", now).await);
}

#[tokio::test]
async fn test_malformed_endpoint_is_normalized() {
    let turnstile = limiter(10, Duration::from_secs(60));
    let now = SystemTime::now();

    turnstile.check_admission_at(&headers("10.7.0.1"), "", now).await;
    turnstile
        .check_admission_at(&headers("10.7.0.1"), "bad endpoint", now)
        .await;

    let endpoints = turnstile.stats().endpoints_at(now).await.unwrap();
    assert_eq!(endpoints["unknown"], 2);
}

#[test]
fn test_invalid_config_rejected() {
    let config = LimiterConfig {
        limit: 0,
        ..LimiterConfig::default()
    };
    assert!(Turnstile::new(Arc::new(MemoryStore::new()), config).is_err());
}

#[tokio::test]
async fn test_oversized_durations_never_panic() {
    let huge = Duration::from_secs(u64::MAX);
    assert!(LimiterConfig::builder().window(huge).build().is_err());
    let config = LimiterConfig {
        hourly_ttl: huge,
        ..LimiterConfig::default()
    };
    assert!(Turnstile::new(Arc::new(MemoryStore::new()), config).is_err());

    // The longest accepted window still admits
    let config = LimiterConfig::builder()
        .window(super::config::MAX_DURATION)
        .retention(super::config::MAX_DURATION)
        .hourly_ttl(super::config::MAX_DURATION)
        .build()
        .unwrap();
    let turnstile = Turnstile::new(Arc::new(MemoryStore::new()), config).unwrap();
    assert!(turnstile.check_admission(&headers("10.9.0.2"), "index").await);

    let result = turnstile.set_ban("10.9.0.1", huge, None).await;
    assert!(matches!(result, Err(super::TurnstileError::InvalidBan(_))));
    assert!(turnstile.check_admission(&headers("10.9.0.1"), "index").await);
}
