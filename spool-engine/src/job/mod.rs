//! Print job storage
//!
//! - `types`: job record, lifecycle and stats
//! - `memory`: mutex-guarded in-process store
//! - `postgres`: `print_jobs` table with skip-locked claiming

pub mod memory;
pub mod postgres;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;
pub use types::{JobStats, JobStatus, JobType, NewPrintJob, ParseTagError, PrintJob};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt job row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable job table
///
/// Status updates only apply when the row is in the expected source status;
/// the returned `bool` says whether a row changed.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically move the oldest unclaimed `pending` job to `printing`
    ///
    /// Never blocks on rows claimed by a concurrent caller and never hands
    /// the same row to two callers.
    async fn claim_next_pending(&self) -> StoreResult<Option<PrintJob>>;

    /// `printing → printed`
    async fn mark_printed(&self, id: i64) -> StoreResult<bool>;

    /// `printing → failed` with the error message
    async fn mark_failed(&self, id: i64, error: &str) -> StoreResult<bool>;

    /// `printing → pending`, leaving `error` unset
    async fn release_to_pending(&self, id: i64) -> StoreResult<bool>;

    /// Operator re-print: every `failed` job for `data` goes back to
    /// `pending` with its error cleared. Returns the number of jobs reset.
    async fn reprint_failed(&self, data: &str) -> StoreResult<u64>;

    async fn insert(&self, job: NewPrintJob) -> StoreResult<PrintJob>;

    async fn get(&self, id: i64) -> StoreResult<Option<PrintJob>>;

    async fn stats(&self) -> StoreResult<JobStats>;
}
