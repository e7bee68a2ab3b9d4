//! Lease lock over a PostgreSQL table
//!
//! Each resource is a row in `printer_locks`. Acquiring inserts the row, or
//! takes it over when the previous lease has expired; all resources of one
//! acquisition are taken in a single transaction.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{AcquireRetry, LockCoordinator, LockError, LockGuard, LockResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS printer_locks (
    resource   TEXT PRIMARY KEY,
    token      TEXT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
)
"#;

/// Lease-based lock shared by every worker on the same database
#[derive(Clone)]
pub struct PgLeaseLock {
    pool: PgPool,
    retry: AcquireRetry,
}

impl PgLeaseLock {
    pub fn new(pool: PgPool, retry: AcquireRetry) -> Self {
        Self { pool, retry }
    }

    pub async fn ensure_schema(&self) -> LockResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn try_acquire(
        &self,
        resources: &[String],
        token: &str,
        ttl: Duration,
    ) -> LockResult<bool> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let mut tx = self.pool.begin().await?;

        for resource in resources {
            let taken = sqlx::query(
                r#"
                INSERT INTO printer_locks (resource, token, expires_at)
                VALUES ($1, $2, NOW() + ($3::BIGINT * INTERVAL '1 millisecond'))
                ON CONFLICT (resource) DO UPDATE
                SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
                WHERE printer_locks.expires_at < NOW()
                "#,
            )
            .bind(resource)
            .bind(token)
            .bind(ttl_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if taken == 0 {
                tx.rollback().await?;
                return Ok(false);
            }
        }

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl LockCoordinator for PgLeaseLock {
    async fn acquire(&self, resources: &[String], ttl: Duration) -> LockResult<Box<dyn LockGuard>> {
        let token = uuid::Uuid::new_v4().to_string();
        let attempts = self.retry.retry_count + 1;

        for attempt in 1..=attempts {
            if self.try_acquire(resources, &token, ttl).await? {
                debug!(resources = ?resources, attempt, "Lease acquired");
                return Ok(Box::new(PgLeaseGuard {
                    pool: self.pool.clone(),
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

struct PgLeaseGuard {
    pool: PgPool,
    resources: Vec<String>,
    token: String,
}

#[async_trait]
impl LockGuard for PgLeaseGuard {
    async fn release(&self) -> LockResult<()> {
        sqlx::query("DELETE FROM printer_locks WHERE resource = ANY($1) AND token = $2")
            .bind(&self.resources)
            .bind(&self.token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
