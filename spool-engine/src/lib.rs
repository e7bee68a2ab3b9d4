//! # spool-engine
//!
//! Print-job dispatch for network label (TSPL) and receipt (ESC/POS)
//! printers.
//!
//! - `job`: durable job table with skip-locked claiming
//! - `lock`: per-printer lease locks shared across engine instances
//! - `connection`: protocol strategies and the connection pool
//! - `dispatch`: subject → render → encode → send
//! - `worker`: timer-driven claim/print/retry loop
//! - `queue`: fire-and-forget path without persistence or retry
//! - `settings`: per-job-type lock TTL and retry delay

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod job;
pub mod lock;
pub mod logger;
pub mod queue;
pub mod settings;
pub mod source;
pub mod worker;

// Re-exports
pub use config::Config;
pub use connection::{
    ConnectionError, ConnectionManager, ConnectionSettings, PrinterConnection, Protocol,
};
pub use dispatch::{DeviceSender, DispatchError, Dispatcher, LabelGeometry, PrintTarget};
pub use job::{
    JobStats, JobStatus, JobStore, JobType, MemoryJobStore, NewPrintJob, PgJobStore, PrintJob,
    StoreError,
};
pub use lock::{
    AcquireRetry, LockCoordinator, LockError, LockGuard, MemoryLockCoordinator, PgLeaseLock,
};
pub use queue::{PrintConsumer, PrintProducer, PrintRequest, QueueError, QueueReceipt, print_queue};
pub use settings::{EnvSettings, JobTiming, RuntimeSettings, StaticSettings};
pub use source::{
    HttpRenderer, PgSubjectSource, PrintSubject, SourceError, SubjectSource, TicketRenderer,
};
pub use worker::{PrintWorker, TickOutcome, WorkerConfig};
