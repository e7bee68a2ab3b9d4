//! Print worker
//!
//! Ticks on a fixed interval and handles at most one job per tick:
//! claim → load subject → lock printer → render/encode → send with retry →
//! persist outcome → release lock. Nothing that goes wrong while handling
//! a job escapes the loop; it becomes a status update and a log line.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::{Dispatcher, PrintTarget};
use crate::job::{JobStore, PrintJob};
use crate::lock::LockCoordinator;
use crate::settings::{JobTiming, RuntimeSettings};
use crate::source::PrintSubject;

/// Error stored on jobs abandoned because the lock TTL ran out
pub const LOCK_EXPIRED: &str = "Lock expired";

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub tick_interval: Duration,
    /// Device send attempts per job, including the first
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            max_attempts: 3,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No pending job
    Idle,
    /// Store unreachable; nothing changed
    Aborted,
    /// Subject could not be loaded; job left in `printing`
    Skipped(i64),
    /// Printer lock unavailable; job back to `pending`
    Requeued(i64),
    Printed(i64),
    Failed(i64),
}

pub struct PrintWorker {
    store: Arc<dyn JobStore>,
    locks: Arc<dyn LockCoordinator>,
    dispatcher: Dispatcher,
    settings: Arc<dyn RuntimeSettings>,
    config: WorkerConfig,
}

impl PrintWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        locks: Arc<dyn LockCoordinator>,
        dispatcher: Dispatcher,
        settings: Arc<dyn RuntimeSettings>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            locks,
            dispatcher,
            settings,
            config,
        }
    }

    /// Tick until `shutdown` fires; an in-flight job is finished first
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            max_attempts = self.config.max_attempts,
            "Print worker started"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Print worker received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    if outcome != TickOutcome::Idle {
                        debug!(?outcome, "Tick finished");
                    }
                }
            }
        }
    }

    /// Handle at most one job
    pub async fn tick(&self) -> TickOutcome {
        let job = match self.store.claim_next_pending().await {
            Ok(Some(job)) => job,
            Ok(None) => return TickOutcome::Idle,
            Err(e) => {
                error!(error = %e, "Failed to claim print job");
                return TickOutcome::Aborted;
            }
        };

        info!(
            job_id = job.id,
            slug = %job.slug,
            job_type = %job.job_type,
            printer = %format!("{}:{}", job.printer_ip, job.printer_port),
            "Claimed print job"
        );

        // TODO: decide whether a missing subject should fail the job instead
        // of leaving it claimed for an operator to inspect
        let subject = match self.dispatcher.load(job.job_type, &job.data).await {
            Ok(subject) => subject,
            Err(e) => {
                warn!(
                    job_id = job.id,
                    data = %job.data,
                    error = %e,
                    "Print subject unavailable; job left in printing"
                );
                return TickOutcome::Skipped(job.id);
            }
        };

        let timing = JobTiming::resolve(self.settings.as_ref(), job.job_type);
        let resources = vec![job.lock_resource()];

        let guard = match self.locks.acquire(&resources, timing.lock_ttl).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(job_id = job.id, error = %e, "Printer busy; returning job to pending");
                match self.store.release_to_pending(job.id).await {
                    Ok(true) => {}
                    Ok(false) => warn!(job_id = job.id, "Job was no longer printing"),
                    Err(e) => error!(job_id = job.id, error = %e, "Failed to requeue job"),
                }
                return TickOutcome::Requeued(job.id);
            }
        };
        let acquired_at = Instant::now();

        let outcome = self.execute(&job, &subject, timing, acquired_at).await;

        if let Err(e) = guard.release().await {
            warn!(job_id = job.id, error = %e, "Failed to release printer lock");
        }
        outcome
    }

    async fn execute(
        &self,
        job: &PrintJob,
        subject: &PrintSubject,
        timing: JobTiming,
        acquired_at: Instant,
    ) -> TickOutcome {
        let payloads = match self.dispatcher.prepare(job.job_type, subject).await {
            Ok(payloads) => payloads,
            Err(e) => {
                error!(job_id = job.id, error = %e, "Failed to render print job");
                self.persist_failed(job.id, &e.to_string()).await;
                return TickOutcome::Failed(job.id);
            }
        };

        if payloads.is_empty() {
            debug!(job_id = job.id, "Nothing to send");
            self.persist_printed(job.id).await;
            return TickOutcome::Printed(job.id);
        }

        let target = PrintTarget::for_job(job);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            // Advisory only: the lease may lapse mid-send
            if acquired_at.elapsed() >= timing.lock_ttl {
                warn!(job_id = job.id, attempt, "Printer lock expired before send");
                self.persist_failed(job.id, LOCK_EXPIRED).await;
                return TickOutcome::Failed(job.id);
            }

            match self.dispatcher.send(&target, &payloads).await {
                Ok(()) => {
                    info!(job_id = job.id, attempt, payloads = payloads.len(), "Print job sent");
                    self.persist_printed(job.id).await;
                    return TickOutcome::Printed(job.id);
                }
                Err(e) if attempt >= max_attempts => {
                    error!(job_id = job.id, attempt, error = %e, "Print job failed");
                    self.persist_failed(job.id, &e.to_string()).await;
                    return TickOutcome::Failed(job.id);
                }
                Err(e) => {
                    let delay = timing.retry_delay * attempt;
                    warn!(
                        job_id = job.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Print attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn persist_printed(&self, id: i64) {
        match self.store.mark_printed(id).await {
            Ok(true) => {}
            Ok(false) => warn!(job_id = id, "Job was no longer printing"),
            Err(e) => error!(job_id = id, error = %e, "Failed to mark job printed"),
        }
    }

    async fn persist_failed(&self, id: i64, message: &str) {
        match self.store.mark_failed(id, message).await {
            Ok(true) => {}
            Ok(false) => warn!(job_id = id, "Job was no longer printing"),
            Err(e) => error!(job_id = id, error = %e, "Failed to mark job failed"),
        }
    }
}
