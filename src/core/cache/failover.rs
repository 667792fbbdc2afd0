// src/core/cache/failover.rs

//! Failover dialing: try each candidate proxy once, in a random order, and keep
//! the first one that answers.

use crate::connection::{ConnHandle, FailoverDialer};
use crate::core::CacheError;
use rand::Rng;
use rand::seq::SliceRandom;
use std::time::Duration;
use tracing::{debug, warn};

/// Splits a comma-joined address list, dropping blank entries.
pub(super) fn split_candidates(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .collect()
}

/// A uniformly random ordering of `0..len`.
pub(super) fn permutation<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}

/// Dials `candidates` in `order` and returns the first success. When all of them
/// fail the error names `path`, not the individual candidates.
pub(super) async fn dial_in_order(
    dialer: &dyn FailoverDialer,
    path: &str,
    candidates: &[&str],
    order: &[usize],
    timeout: Duration,
) -> Result<ConnHandle, CacheError> {
    for &index in order {
        let addr = candidates[index];
        debug!("Trying failover candidate {} for '{}'", addr, path);
        match tokio::time::timeout(timeout, dialer.dial(addr)).await {
            Ok(Ok(conn)) => return Ok(conn),
            Ok(Err(e)) => warn!("Failover connection to {} failed: {}", addr, e),
            Err(_) => warn!("Failover connection to {} timed out after {:?}", addr, timeout),
        }
    }
    Err(CacheError::FailoverExhausted(path.to_string()))
}
