// tests/integration/failover_test.rs

//! Integration tests for failover mode: randomized candidate order, first
//! success wins, and exhaustion reporting.

use super::fixtures::*;
use super::test_helpers::*;
use cellcache::CacheError;
use std::collections::HashSet;

#[tokio::test]
async fn test_failover_connects_to_only_reachable_candidate() {
    for seed in 0..16 {
        let failover = MockFailoverDialer::new(&["xc:1"]);
        let cache = failover_cache(failover.clone(), seed);

        cache.connection_for(PATH_X).await.unwrap();

        let attempts = failover.attempts();
        assert_eq!(attempts.last().map(String::as_str), Some("xc:1"));
        let unique: HashSet<_> = attempts.iter().collect();
        assert_eq!(unique.len(), attempts.len(), "candidate retried: {attempts:?}");
        assert_eq!(failover.connections().len(), 1);
        assert_eq!(failover.connections()[0].addr, "xc:1");
    }
}

#[tokio::test]
async fn test_failover_exhausted_names_path() {
    let failover = MockFailoverDialer::new(&[]);
    let cache = failover_cache(failover.clone(), 7);

    let err = cache.connection_for(PATH_Y).await.unwrap_err();
    assert_eq!(err, CacheError::FailoverExhausted(PATH_Y.to_string()));
    assert!(err.to_string().contains(PATH_Y));

    let mut attempts = failover.attempts();
    attempts.sort();
    assert_eq!(attempts, vec!["ya:1".to_string(), "yb:1".to_string()]);
}

#[tokio::test]
async fn test_failover_order_follows_seed() {
    let order_for = |seed: u64| async move {
        let failover = MockFailoverDialer::new(&[]);
        let cache = failover_cache(failover.clone(), seed);
        let _ = cache.connection_for(PATH_X).await;
        failover.attempts()
    };

    assert_eq!(order_for(42).await, order_for(42).await);

    let mut orders = HashSet::new();
    for seed in 0..32 {
        let order = order_for(seed).await;
        assert_eq!(order.len(), 3);
        orders.insert(order);
    }
    assert!(orders.len() > 1, "ordering never varied across seeds");
}

#[tokio::test]
async fn test_failover_connection_is_cached() {
    let failover = MockFailoverDialer::new(&["xa:1", "xb:1", "xc:1"]);
    let cache = failover_cache(failover.clone(), 3);

    let first = cache.connection_for(PATH_X).await.unwrap();
    let second = cache.connection_for(PATH_X_OTHER).await.unwrap();

    assert!(same_conn(&first, &second));
    assert_eq!(failover.attempts().len(), 1);
}

#[tokio::test]
async fn test_failover_skips_hanging_candidate() {
    let failover = MockFailoverDialer::with_hanging(&["ya:1", "yb:1"], &["ya:1"]);
    let cache = failover_cache(failover.clone(), 11);

    cache.connection_for(PATH_Y).await.unwrap();

    assert_eq!(failover.connections().len(), 1);
    assert_eq!(failover.connections()[0].addr, "yb:1");
}

#[tokio::test]
async fn test_failover_exhaustion_is_retryable() {
    let failover = MockFailoverDialer::new(&[]);
    let cache = failover_cache(failover.clone(), 5);

    assert!(cache.connection_for(PATH_Y).await.is_err());
    assert!(cache.connection_for(PATH_Y).await.is_err());
    assert_eq!(failover.attempts().len(), 4);
}
