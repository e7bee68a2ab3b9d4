//! Distributed printer locks
//!
//! A lock is taken over one or more resource keys for a bounded TTL. The
//! holder gets a [`LockGuard`] whose `release` is idempotent. Expiry is not
//! pushed to the holder; callers compare elapsed time against the TTL
//! themselves.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryLockCoordinator;
pub use postgres::PgLeaseLock;

#[derive(Debug, Error)]
pub enum LockError {
    /// Resources stayed held by someone else for every retry
    #[error("Lock acquisition timed out for [{resources}] after {attempts} attempts")]
    Timeout { resources: String, attempts: u32 },

    #[error("Lock database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Lock coordinator unavailable: {0}")]
    Unavailable(String),
}

pub type LockResult<T> = Result<T, LockError>;

/// Resource key guarding one physical printer
pub fn resource_key(ip: &str, port: u16) -> String {
    format!("printer-job:{}:{}", ip, port)
}

/// Retry schedule for contended acquisitions
#[derive(Debug, Clone, Copy)]
pub struct AcquireRetry {
    /// Extra attempts after the first
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl Default for AcquireRetry {
    fn default() -> Self {
        Self {
            retry_count: 10,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Lock capability injected into the worker
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Take all `resources` together for `ttl`
    async fn acquire(&self, resources: &[String], ttl: Duration) -> LockResult<Box<dyn LockGuard>>;
}

/// Held lock
#[async_trait]
pub trait LockGuard: Send + Sync {
    /// Release the lock. Releasing twice, or after expiry, is not an error.
    async fn release(&self) -> LockResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_key_format() {
        assert_eq!(resource_key("10.0.0.5", 9100), "printer-job:10.0.0.5:9100");
    }
}
