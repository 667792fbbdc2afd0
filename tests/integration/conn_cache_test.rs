// tests/integration/conn_cache_test.rs

//! Integration tests for primary-mode dialing: memoization, dial sharing,
//! retry after failure, close, and independence between cells.

use super::fixtures::*;
use super::test_helpers::*;
use cellcache::CacheError;
use cellcache::connection::SessionState;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_dial() {
    let dialer = MockDialer::new().with_delay(Duration::from_millis(50));
    let cache = primary_cache(dialer.clone());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        handles.push(tokio::spawn(
            async move { cache.connection_for(PATH_X).await },
        ));
    }

    let mut conns = Vec::new();
    for handle in handles {
        conns.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(dialer.dials(), 1);
    assert!(conns.iter().all(|c| same_conn(c, &conns[0])));
}

#[tokio::test]
async fn test_repeated_calls_return_cached_connection() {
    let dialer = MockDialer::new();
    let cache = primary_cache(dialer.clone());

    let first = cache.connection_for(PATH_X).await.unwrap();
    let second = cache.connection_for(PATH_X).await.unwrap();
    let other_path = cache.connection_for(PATH_X_OTHER).await.unwrap();
    let via_alias = cache.connection_for(PATH_LOCAL).await.unwrap();

    assert_eq!(dialer.dials(), 1);
    assert!(same_conn(&first, &second));
    assert!(same_conn(&first, &other_path));
    assert!(same_conn(&first, &via_alias));
    assert_eq!(dialer.connection(0).addr, QUORUM_X);
    assert_eq!(cache.cached_cells().await, vec![CELL_X.to_string()]);
}

#[tokio::test]
async fn test_each_cell_gets_its_own_connection() {
    let dialer = MockDialer::new();
    let cache = primary_cache(dialer.clone());

    let x = cache.connection_for(PATH_X).await.unwrap();
    let y = cache.connection_for(PATH_Y).await.unwrap();

    assert_eq!(dialer.dials(), 2);
    assert!(!same_conn(&x, &y));
    assert_eq!(dialer.connection(1).addr, QUORUM_Y);
    assert_eq!(
        cache.cached_cells().await,
        vec![CELL_X.to_string(), CELL_Y.to_string()]
    );
}

#[tokio::test]
async fn test_close_is_idempotent_and_terminal() {
    let dialer = MockDialer::new();
    let cache = primary_cache(dialer.clone());
    cache.connection_for(PATH_X).await.unwrap();

    assert!(cache.close().await.is_ok());
    assert!(cache.close().await.is_ok());

    assert!(dialer.connection(0).is_closed());
    assert!(cache.is_closed().await);
    assert!(cache.cached_cells().await.is_empty());
    assert_eq!(
        cache.connection_for(PATH_X).await.err(),
        Some(CacheError::CacheClosed)
    );
    assert_eq!(
        cache.connection_for(PATH_Y).await.err(),
        Some(CacheError::CacheClosed)
    );
    assert_eq!(dialer.dials(), 1);
}

#[tokio::test]
async fn test_dial_failure_leaves_entry_retryable() {
    let dialer = MockDialer::new();
    dialer.fail_next(1);
    let cache = primary_cache(dialer.clone());

    let err = cache.connection_for(PATH_X).await.unwrap_err();
    assert!(matches!(err, CacheError::DialFailed { ref addr, .. } if addr == QUORUM_X));
    // The entry stays in the map, empty.
    assert_eq!(cache.cached_cells().await, vec![CELL_X.to_string()]);

    let conn = cache.connection_for(PATH_X).await.unwrap();
    assert_eq!(dialer.dials(), 2);
    assert!(same_conn(&conn, &cache.connection_for(PATH_X).await.unwrap()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_waiters_share_failed_dial_outcome() {
    let dialer = MockDialer::new().with_delay(Duration::from_millis(100));
    dialer.fail_next(1);
    let cache = primary_cache(dialer.clone());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let cache = cache.clone();
        handles.push(tokio::spawn(
            async move { cache.connection_for(PATH_X).await },
        ));
    }
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CacheError::DialFailed { .. }));
    }
    assert_eq!(dialer.dials(), 1);

    // A caller arriving after the failure dials afresh.
    cache.connection_for(PATH_X).await.unwrap();
    assert_eq!(dialer.dials(), 2);
}

#[tokio::test]
async fn test_first_event_not_connected_fails_dial() {
    let dialer = MockDialer::new().with_first_state(Some(SessionState::AuthFailed));
    let cache = primary_cache(dialer.clone());

    let err = cache.connection_for(PATH_X).await.unwrap_err();
    assert_eq!(
        err,
        CacheError::NotConnected {
            cell: CELL_X.to_string(),
            state: SessionState::AuthFailed,
        }
    );
    assert!(dialer.connection(0).is_closed());
}

#[tokio::test]
async fn test_first_event_wait_is_bounded_by_connect_timeout() {
    let dialer = MockDialer::new().with_first_state(None);
    let cache = primary_cache(dialer.clone());

    let started = tokio::time::Instant::now();
    let err = cache.connection_for(PATH_X).await.unwrap_err();
    assert_eq!(
        err,
        CacheError::ConnectTimeout {
            cell: CELL_X.to_string(),
            timeout: TEST_CONNECT_TIMEOUT,
        }
    );
    assert!(started.elapsed() >= TEST_CONNECT_TIMEOUT);
    assert!(dialer.connection(0).is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocked_dial_does_not_delay_other_cells() {
    let dialer = MockDialer::new();
    let gate = dialer.block(QUORUM_X);
    let cache = primary_cache(dialer.clone());

    let pending_x = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.connection_for(PATH_X).await })
    };
    // Let the dial for x start and park on the gate.
    while dialer.dials() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let y = tokio::time::timeout(Duration::from_secs(1), cache.connection_for(PATH_Y))
        .await
        .expect("dial for y waited on x")
        .unwrap();
    assert!(!pending_x.is_finished());

    gate.notify_one();
    let x = pending_x.await.unwrap().unwrap();
    assert!(!same_conn(&x, &y));
}

#[tokio::test]
async fn test_unresolvable_paths() {
    let dialer = MockDialer::new();
    let cache = primary_cache(dialer.clone());

    assert_eq!(
        cache.connection_for("vt/keyspaces").await.err(),
        Some(CacheError::InvalidPath("vt/keyspaces".to_string()))
    );
    assert_eq!(
        cache.connection_for("/zk//vt").await.err(),
        Some(CacheError::InvalidPath("/zk//vt".to_string()))
    );
    assert_eq!(
        cache.connection_for("/zk/nowhere/vt").await.err(),
        Some(CacheError::UnknownCell("nowhere".to_string()))
    );
    assert_eq!(dialer.dials(), 0);
}

#[tokio::test]
async fn test_unknown_cells_leave_no_entry_behind() {
    let dialer = MockDialer::new();
    let cache = primary_cache(dialer.clone());

    for i in 0..100 {
        let path = format!("/zk/typo{i}/vt");
        assert_eq!(
            cache.connection_for(&path).await.err(),
            Some(CacheError::UnknownCell(format!("typo{i}")))
        );
    }
    assert!(cache.cached_cells().await.is_empty());

    // A known cell still dials normally afterwards.
    cache.connection_for(PATH_X).await.unwrap();
    assert_eq!(cache.cached_cells().await, vec![CELL_X.to_string()]);
    assert_eq!(dialer.dials(), 1);
}

#[tokio::test]
async fn test_abandoned_dial_closes_unconfirmed_connection() {
    let dialer = MockDialer::new().with_first_state(None);
    let cache = primary_cache(dialer.clone());

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), cache.connection_for(PATH_X)).await;
    assert!(abandoned.is_err());
    assert_eq!(dialer.dials(), 1);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !dialer.connection(0).is_closed() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "abandoned connection was never closed"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // The entry is left empty, so nothing hands out the closed connection.
    assert_eq!(cache.cached_cells().await, vec![CELL_X.to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_waits_for_in_flight_dial() {
    let dialer = MockDialer::new().with_delay(Duration::from_millis(100));
    let cache = primary_cache(dialer.clone());

    let first = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.connection_for(PATH_X).await })
    };
    while dialer.dials() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    cache.close().await.unwrap();

    // The in-flight dial finishes and reaches its caller, then close tears it down.
    assert!(first.await.unwrap().is_ok());
    assert!(dialer.connection(0).is_closed());
    assert_eq!(
        cache.connection_for(PATH_X).await.err(),
        Some(CacheError::CacheClosed)
    );
    assert_eq!(dialer.dials(), 1);
}
