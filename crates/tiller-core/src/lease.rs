//! Socket lease: the platform-lock election strategy.
//!
//! Collapses the probe/claim/standby machinery into acquisition of one
//! origin-scoped exclusive lease: acquire, hold the socket, release, loop.
//! There is no probe window to tune and no takeover latency beyond the
//! moment the holder releases, at the cost of requiring a platform that
//! offers such a primitive. The host owns one lease per origin.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// An origin-scoped exclusive claim on the delivery socket.
///
/// Clones share the same lease. At most one guard exists at a time.
#[derive(Debug, Clone, Default)]
pub struct SocketLease {
    inner: Arc<Mutex<()>>,
}

impl SocketLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until this context holds the socket exclusively.
    ///
    /// The returned guard must be held across the socket's whole tenure;
    /// dropping it releases the lease to the next waiter.
    pub async fn acquire(&self) -> LeaseGuard {
        LeaseGuard {
            _permit: self.inner.clone().lock_owned().await,
        }
    }

    /// Take the lease only if it is currently free.
    pub fn try_acquire(&self) -> Option<LeaseGuard> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|permit| LeaseGuard { _permit: permit })
    }
}

/// Exclusive tenure over the socket; dropping releases the lease.
#[derive(Debug)]
pub struct LeaseGuard {
    _permit: OwnedMutexGuard<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lease_is_exclusive_while_held() {
        let lease = SocketLease::new();
        let guard = lease.acquire().await;

        assert!(lease.try_acquire().is_none());

        drop(guard);
        assert!(lease.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_waiter_takes_over_on_release() {
        let lease = SocketLease::new();
        let guard = lease.acquire().await;

        let waiter = {
            let lease = lease.clone();
            tokio::spawn(async move {
                let _guard = lease.acquire().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished(), "waiter must block while the lease is held");

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_clones_share_one_lease() {
        let lease = SocketLease::new();
        let clone = lease.clone();

        let _guard = clone.acquire().await;
        assert!(lease.try_acquire().is_none());
    }
}
