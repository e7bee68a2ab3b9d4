//! Process-local lock coordinator
//!
//! Same TTL and release semantics as the database lease lock, but only
//! excludes callers sharing this coordinator instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{AcquireRetry, LockCoordinator, LockError, LockGuard, LockResult};

#[derive(Debug, Clone, Copy)]
struct Lease {
    token: u64,
    expires_at: Instant,
}

type Leases = Arc<Mutex<HashMap<String, Lease>>>;

/// In-memory lock coordinator with TTL leases
pub struct MemoryLockCoordinator {
    leases: Leases,
    next_token: AtomicU64,
    retry: AcquireRetry,
}

impl MemoryLockCoordinator {
    pub fn new(retry: AcquireRetry) -> Self {
        Self {
            leases: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(1),
            retry,
        }
    }

    /// Whether `resource` is held by an unexpired lease
    pub fn is_held(&self, resource: &str) -> bool {
        let now = Instant::now();
        self.leases
            .lock()
            .get(resource)
            .is_some_and(|lease| lease.expires_at > now)
    }

    fn try_acquire(&self, resources: &[String], token: u64, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut leases = self.leases.lock();

        let busy = resources.iter().any(|r| {
            leases
                .get(r)
                .is_some_and(|lease| lease.expires_at > now)
        });
        if busy {
            return false;
        }

        let lease = Lease {
            token,
            expires_at: now + ttl,
        };
        for resource in resources {
            leases.insert(resource.clone(), lease);
        }
        true
    }
}

impl Default for MemoryLockCoordinator {
    fn default() -> Self {
        Self::new(AcquireRetry::default())
    }
}

#[async_trait]
impl LockCoordinator for MemoryLockCoordinator {
    async fn acquire(&self, resources: &[String], ttl: Duration) -> LockResult<Box<dyn LockGuard>> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let attempts = self.retry.retry_count + 1;

        for attempt in 1..=attempts {
            if self.try_acquire(resources, token, ttl) {
                return Ok(Box::new(MemoryLockGuard {
                    leases: self.leases.clone(),
                    resources: resources.to_vec(),
                    token,
                }));
            }
            if attempt < attempts {
                tokio::time::sleep(self.retry.retry_delay).await;
            }
        }

        Err(LockError::Timeout {
            resources: resources.join(","),
            attempts,
        })
    }
}

struct MemoryLockGuard {
    leases: Leases,
    resources: Vec<String>,
    token: u64,
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    async fn release(&self) -> LockResult<()> {
        let mut leases = self.leases.lock();
        for resource in &self.resources {
            // Only drop our own lease; after expiry someone else may hold it
            if leases.get(resource).is_some_and(|l| l.token == self.token) {
                leases.remove(resource);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::resource_key;

    fn quick_retry() -> AcquireRetry {
        AcquireRetry {
            retry_count: 2,
            retry_delay: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exclusive_until_release() {
        let locks = MemoryLockCoordinator::new(quick_retry());
        let key = vec![resource_key("10.0.0.5", 9100)];

        let guard = locks.acquire(&key, Duration::from_secs(30)).await.unwrap();
        assert!(locks.is_held(&key[0]));

        let contended = locks.acquire(&key, Duration::from_secs(30)).await;
        assert!(matches!(
            contended,
            Err(LockError::Timeout { attempts: 3, .. })
        ));

        guard.release().await.unwrap();
        guard.release().await.unwrap();
        assert!(!locks.is_held(&key[0]));

        assert!(locks.acquire(&key, Duration::from_secs(30)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expires_after_ttl() {
        let locks = MemoryLockCoordinator::new(quick_retry());
        let key = vec![resource_key("10.0.0.5", 9100)];

        let stale = locks.acquire(&key, Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;

        let fresh = locks.acquire(&key, Duration::from_secs(30)).await.unwrap();
        // Late release of the expired lease must not free the new holder
        stale.release().await.unwrap();
        assert!(locks.is_held(&key[0]));
        fresh.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_printers_do_not_contend() {
        let locks = MemoryLockCoordinator::new(quick_retry());
        let a = vec![resource_key("10.0.0.5", 9100)];
        let b = vec![resource_key("10.0.0.6", 9100)];

        let _ga = locks.acquire(&a, Duration::from_secs(30)).await.unwrap();
        assert!(locks.acquire(&b, Duration::from_secs(30)).await.is_ok());
    }
}
