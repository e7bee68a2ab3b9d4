//! In-process job store
//!
//! Claims are serialised by one mutex, which gives the same guarantees as
//! the skip-locked query for callers inside a single process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{JobStats, JobStatus, JobStore, NewPrintJob, PrintJob, StoreError, StoreResult};

#[derive(Default)]
struct State {
    next_id: i64,
    jobs: BTreeMap<i64, PrintJob>,
}

/// Job store backed by an in-memory map
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an infrastructure outage: every call fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    async fn transition(
        &self,
        id: i64,
        from: JobStatus,
        to: JobStatus,
        error: Option<Option<String>>,
    ) -> StoreResult<bool> {
        self.check()?;
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != from {
            return Ok(false);
        }
        job.status = to;
        if let Some(error) = error {
            job.error = error;
        }
        job.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn claim_next_pending(&self) -> StoreResult<Option<PrintJob>> {
        self.check()?;
        let mut state = self.state.lock().await;

        let next = state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .min_by_key(|job| (job.created_at, job.id))
            .map(|job| job.id);

        let Some(id) = next else {
            return Ok(None);
        };

        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.status = JobStatus::Printing;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn mark_printed(&self, id: i64) -> StoreResult<bool> {
        self.transition(id, JobStatus::Printing, JobStatus::Printed, Some(None))
            .await
    }

    async fn mark_failed(&self, id: i64, error: &str) -> StoreResult<bool> {
        self.transition(
            id,
            JobStatus::Printing,
            JobStatus::Failed,
            Some(Some(error.to_string())),
        )
        .await
    }

    async fn release_to_pending(&self, id: i64) -> StoreResult<bool> {
        self.transition(id, JobStatus::Printing, JobStatus::Pending, None)
            .await
    }

    async fn reprint_failed(&self, data: &str) -> StoreResult<u64> {
        self.check()?;
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut count = 0;
        for job in state.jobs.values_mut() {
            if job.data == data && job.status == JobStatus::Failed {
                job.status = JobStatus::Pending;
                job.error = None;
                job.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert(&self, job: NewPrintJob) -> StoreResult<PrintJob> {
        self.check()?;
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let now = Utc::now();
        let record = PrintJob {
            id: state.next_id,
            slug: job.make_slug(),
            job_type: job.job_type,
            status: JobStatus::Pending,
            printer_ip: job.printer_ip,
            printer_port: job.printer_port,
            data: job.data,
            error: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<PrintJob>> {
        self.check()?;
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn stats(&self) -> StoreResult<JobStats> {
        self.check()?;
        let state = self.state.lock().await;
        let mut stats = JobStats::default();
        for job in state.jobs.values() {
            stats.bump(job.status);
        }
        Ok(stats)
    }
}
