//! PostgreSQL job store
//!
//! Claiming uses `SELECT ... FOR UPDATE SKIP LOCKED` inside a READ COMMITTED
//! transaction, so any number of worker processes can poll the same table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{JobStats, JobStatus, JobStore, NewPrintJob, PrintJob, StoreError, StoreResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS print_jobs (
    id           BIGSERIAL PRIMARY KEY,
    slug         TEXT NOT NULL UNIQUE,
    printer_ip   TEXT NOT NULL,
    printer_port INTEGER NOT NULL,
    job_type     TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',
    data         TEXT NOT NULL,
    error        TEXT,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_print_jobs_status_created ON print_jobs (status, created_at)";

const DATA_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_print_jobs_data ON print_jobs (data)";

const COLUMNS: &str =
    "id, slug, printer_ip, printer_port, job_type, status, data, error, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    slug: String,
    printer_ip: String,
    printer_port: i32,
    job_type: String,
    status: String,
    data: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for PrintJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |reason: String| StoreError::Corrupt { id, reason };

        let job_type = row.job_type.parse().map_err(|e| corrupt(format!("{e}")))?;
        let status = row.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let printer_port = u16::try_from(row.printer_port)
            .map_err(|_| corrupt(format!("printer_port out of range: {}", row.printer_port)))?;

        Ok(PrintJob {
            id,
            slug: row.slug,
            job_type,
            status,
            printer_ip: row.printer_ip,
            printer_port,
            data: row.data,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Job store over the `print_jobs` table
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the table and indexes if missing
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        sqlx::query(STATUS_INDEX).execute(&self.pool).await?;
        sqlx::query(DATA_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    async fn transition(
        &self,
        id: i64,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
        set_error: bool,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE print_jobs
            SET status = $1,
                error = CASE WHEN $2 THEN $3 ELSE error END,
                updated_at = NOW()
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(to.as_str())
        .bind(set_error)
        .bind(error)
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn claim_next_pending(&self) -> StoreResult<Option<PrintJob>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;

        let candidate: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM print_jobs
            WHERE status = 'pending'
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id,)) = candidate else {
            tx.rollback().await?;
            return Ok(None);
        };

        let row: JobRow = sqlx::query_as(&format!(
            "UPDATE print_jobs SET status = 'printing', updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        PrintJob::try_from(row).map(Some)
    }

    async fn mark_printed(&self, id: i64) -> StoreResult<bool> {
        self.transition(id, JobStatus::Printing, JobStatus::Printed, None, true)
            .await
    }

    async fn mark_failed(&self, id: i64, error: &str) -> StoreResult<bool> {
        self.transition(id, JobStatus::Printing, JobStatus::Failed, Some(error), true)
            .await
    }

    async fn release_to_pending(&self, id: i64) -> StoreResult<bool> {
        self.transition(id, JobStatus::Printing, JobStatus::Pending, None, false)
            .await
    }

    async fn reprint_failed(&self, data: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE print_jobs
            SET status = 'pending', error = NULL, updated_at = NOW()
            WHERE data = $1 AND status = 'failed'
            "#,
        )
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert(&self, job: NewPrintJob) -> StoreResult<PrintJob> {
        let slug = job.make_slug();
        let row: JobRow = sqlx::query_as(&format!(
            "INSERT INTO print_jobs (slug, printer_ip, printer_port, job_type, status, data) \
             VALUES ($1, $2, $3, $4, 'pending', $5) RETURNING {COLUMNS}"
        ))
        .bind(slug)
        .bind(&job.printer_ip)
        .bind(i32::from(job.printer_port))
        .bind(job.job_type.as_str())
        .bind(&job.data)
        .fetch_one(&self.pool)
        .await?;

        PrintJob::try_from(row)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<PrintJob>> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM print_jobs WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(PrintJob::try_from).transpose()
    }

    async fn stats(&self) -> StoreResult<JobStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM print_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = JobStats::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status.parse::<JobStatus>() {
                Ok(JobStatus::Pending) => stats.pending = count,
                Ok(JobStatus::Printing) => stats.printing = count,
                Ok(JobStatus::Printed) => stats.printed = count,
                Ok(JobStatus::Failed) => stats.failed = count,
                Err(e) => tracing::warn!(error = %e, "Skipping unknown status in stats"),
            }
        }
        Ok(stats)
    }
}
