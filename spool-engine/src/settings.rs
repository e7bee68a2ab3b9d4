//! Per-job-type timing read at dispatch time
//!
//! | Key | Env var | Default |
//! |-----|---------|---------|
//! | `print.lock_ttl_ms.chef-order` | `PRINT_LOCK_TTL_MS_CHEF_ORDER` | 30000 |
//! | `print.lock_ttl_ms.label-ticket` | `PRINT_LOCK_TTL_MS_LABEL_TICKET` | 40000 |
//! | `print.lock_ttl_ms.invoice` | `PRINT_LOCK_TTL_MS_INVOICE` | 30000 |
//! | `print.retry_delay_ms.chef-order` | `PRINT_RETRY_DELAY_MS_CHEF_ORDER` | 2000 |
//! | `print.retry_delay_ms.label-ticket` | `PRINT_RETRY_DELAY_MS_LABEL_TICKET` | 5000 |
//! | `print.retry_delay_ms.invoice` | `PRINT_RETRY_DELAY_MS_INVOICE` | 2000 |

use std::collections::HashMap;
use std::time::Duration;

use crate::job::JobType;

/// Runtime-tunable integer settings
pub trait RuntimeSettings: Send + Sync {
    fn get_u64(&self, key: &str) -> Option<u64>;
}

/// Reads settings from the process environment on every lookup
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl EnvSettings {
    /// `print.lock_ttl_ms.label-ticket` -> `PRINT_LOCK_TTL_MS_LABEL_TICKET`
    pub fn env_var(key: &str) -> String {
        key.chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect()
    }
}

impl RuntimeSettings for EnvSettings {
    fn get_u64(&self, key: &str) -> Option<u64> {
        std::env::var(Self::env_var(key))
            .ok()
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Fixed settings map, used by tests and embedders
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: HashMap<String, u64>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: u64) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl RuntimeSettings for StaticSettings {
    fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).copied()
    }
}

pub fn lock_ttl_key(job_type: JobType) -> String {
    format!("print.lock_ttl_ms.{}", job_type)
}

pub fn retry_delay_key(job_type: JobType) -> String {
    format!("print.retry_delay_ms.{}", job_type)
}

/// Lock TTL and base retry delay for one job type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTiming {
    pub lock_ttl: Duration,
    pub retry_delay: Duration,
}

impl JobTiming {
    pub fn defaults(job_type: JobType) -> Self {
        let (ttl_ms, delay_ms) = match job_type {
            JobType::ChefOrder => (30_000, 2_000),
            JobType::LabelTicket => (40_000, 5_000),
            JobType::Invoice => (30_000, 2_000),
        };
        Self {
            lock_ttl: Duration::from_millis(ttl_ms),
            retry_delay: Duration::from_millis(delay_ms),
        }
    }

    /// Look up the job type's settings, falling back to the defaults
    pub fn resolve(settings: &dyn RuntimeSettings, job_type: JobType) -> Self {
        let defaults = Self::defaults(job_type);
        Self {
            lock_ttl: settings
                .get_u64(&lock_ttl_key(job_type))
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_ttl),
            retry_delay: settings
                .get_u64(&retry_delay_key(job_type))
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
        }
    }
}
