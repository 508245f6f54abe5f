/// Connection cache tests
///
/// Reuse, reconnect and single-flight behaviour of the store connection cache
/// Run with: cargo test --test connection_cache_tests

use parcel_service::store::memory::MemoryConnector;
use parcel_service::{ConnectionCache, StoreError, StoreSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn cache_over(connector: &Arc<MemoryConnector>) -> Arc<ConnectionCache> {
    Arc::new(ConnectionCache::new(
        connector.clone(),
        Some(StoreSettings::new("admin", "adminpass")),
    ))
}

#[tokio::test]
async fn test_back_to_back_acquires_share_one_connection() {
    let connector = Arc::new(MemoryConnector::new());
    let cache = cache_over(&connector);

    let first = assert_ok!(cache.acquire().await);
    let second = assert_ok!(cache.acquire().await);

    assert!(first.same_session(&second));
    assert_eq!(first.generation(), second.generation());
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test]
async fn test_failed_probe_triggers_exactly_one_reconnect() {
    let connector = Arc::new(MemoryConnector::new());
    let cache = cache_over(&connector);

    let before = assert_ok!(cache.acquire().await);
    connector.drop_sessions();

    let after = assert_ok!(cache.acquire().await);
    assert!(!before.same_session(&after));
    assert_eq!(after.generation(), before.generation() + 1);
    assert_eq!(connector.connect_count(), 2);

    // The fresh session is healthy and reused from here on.
    let again = assert_ok!(cache.acquire().await);
    assert!(after.same_session(&again));
    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test]
async fn test_reconnected_lease_serves_operations() {
    let connector = Arc::new(MemoryConnector::new());
    let cache = cache_over(&connector);

    let stale = assert_ok!(cache.acquire().await);
    connector.drop_sessions();

    let stale_result = stale
        .parcels()
        .find_one(&parcel_service::store::Filter::All)
        .await;
    assert!(matches!(stale_result, Err(StoreError::Connectivity(_))));

    let fresh = assert_ok!(cache.acquire().await);
    assert!(fresh
        .parcels()
        .find_one(&parcel_service::store::Filter::All)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_cold_start_connects_once_under_concurrency() {
    let connector =
        Arc::new(MemoryConnector::new().connect_delay(Duration::from_millis(50)));
    let cache = cache_over(&connector);

    let mut handles = vec![];
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache.acquire().await.map(|lease| lease.generation())
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test]
async fn test_concurrent_reconnect_after_outage_connects_once() {
    let connector =
        Arc::new(MemoryConnector::new().connect_delay(Duration::from_millis(20)));
    let cache = cache_over(&connector);

    assert_ok!(cache.acquire().await);
    connector.drop_sessions();

    let mut handles = vec![];
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move { assert_ok!(cache.acquire().await).generation() }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 2);
    }
    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test]
async fn test_connectivity_failure_is_surfaced_then_recovers() {
    let connector = Arc::new(MemoryConnector::new());
    let cache = cache_over(&connector);

    connector.refuse_connections(true);
    let err = match cache.acquire().await {
        Err(err) => err,
        Ok(_) => panic!("connect should fail while the store refuses"),
    };
    assert!(err.is_retryable());

    connector.refuse_connections(false);
    assert_ok!(cache.acquire().await);

    let stats = cache.stats().await;
    assert_eq!(stats.connects, 1);
    assert_eq!(stats.current_generation, Some(1));
}

#[tokio::test]
async fn test_missing_credentials_never_connect() {
    let connector = Arc::new(MemoryConnector::new());
    let cache = ConnectionCache::new(connector.clone(), None);

    for _ in 0..3 {
        assert!(matches!(
            cache.acquire().await,
            Err(StoreError::Configuration(_))
        ));
    }
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn test_failed_cold_start_is_shared_by_queued_callers() {
    let connector =
        Arc::new(MemoryConnector::new().connect_delay(Duration::from_millis(100)));
    connector.refuse_connections(true);
    let cache = cache_over(&connector);

    let started = tokio::time::Instant::now();
    let mut handles = vec![];
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move { cache.acquire().await.err() }));
    }

    for handle in handles {
        let err = handle.await.unwrap().expect("every caller should see the failure");
        assert!(matches!(err, StoreError::Connectivity(_)));
    }

    // One 100ms attempt for everyone, not eight in a row.
    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(connector.connect_attempts(), 1);
    assert_eq!(cache.stats().await.attempts, 1);
}

#[tokio::test]
async fn test_request_after_shared_failure_tries_again() {
    let connector = Arc::new(MemoryConnector::new());
    let cache = cache_over(&connector);

    connector.refuse_connections(true);
    assert!(cache.acquire().await.is_err());
    assert!(cache.acquire().await.is_err());
    assert_eq!(connector.connect_attempts(), 2);

    connector.refuse_connections(false);
    let lease = assert_ok!(cache.acquire().await);
    assert_eq!(lease.generation(), 1);
    assert_eq!(connector.connect_attempts(), 3);
}

#[tokio::test]
async fn test_hanging_probe_times_out_and_reconnects_once() {
    let connector = Arc::new(MemoryConnector::new());
    let settings =
        StoreSettings::new("admin", "adminpass").probe_timeout(Duration::from_millis(20));
    let cache = ConnectionCache::new(connector.clone(), Some(settings));

    let before = assert_ok!(cache.acquire().await);
    connector.stall_pings(Duration::from_millis(500));

    let started = tokio::time::Instant::now();
    let after = assert_ok!(cache.acquire().await);
    assert!(started.elapsed() < Duration::from_millis(400));

    assert!(!before.same_session(&after));
    assert_eq!(after.generation(), before.generation() + 1);
    assert_eq!(connector.connect_count(), 2);

    connector.stall_pings(Duration::ZERO);
    let again = assert_ok!(cache.acquire().await);
    assert!(after.same_session(&again));
    assert_eq!(connector.connect_count(), 2);
}
