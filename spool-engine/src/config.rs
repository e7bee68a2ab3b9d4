//! Engine configuration
//!
//! | Env var | Default | Meaning |
//! |---------|---------|---------|
//! | DATABASE_URL | (required) | PostgreSQL URL for jobs and printer locks |
//! | DATABASE_MAX_CONNECTIONS | 5 | Pool size |
//! | WORKER_TICK_MS | 2000 | Worker poll interval |
//! | PRINT_MAX_ATTEMPTS | 3 | Device send attempts per job |
//! | PRINTER_CONNECT_TIMEOUT_MS | 5000 | TCP connect timeout |
//! | ESCPOS_MAX_WIDTH | 576 | Receipt head width in dots |
//! | ESCPOS_MAX_STRIP_HEIGHT | 1000 | Tallest raster strip |
//! | LABEL_WIDTH_DOTS | 400 | Label bitmap width |
//! | LABEL_HEIGHT_DOTS | 240 | Label bitmap height |
//! | LOCK_RETRY_COUNT | 10 | Extra lock attempts when contended |
//! | LOCK_RETRY_DELAY_MS | 200 | Pause between lock attempts |
//! | RENDER_URL | http://localhost:3100 | Render service base URL |
//! | RENDER_TIMEOUT_MS | 10000 | Render request timeout |
//! | LOG_LEVEL | info | Default filter when RUST_LOG is unset |
//! | LOG_JSON | false | JSON console output (always on in production) |
//! | LOG_DIR | (none) | Daily rolling log directory |
//! | ENVIRONMENT | development | development, staging or production |
//!
//! Per-job-type lock TTL and retry delay are read at dispatch time, see
//! [`crate::settings`].

use std::str::FromStr;
use std::time::Duration;

use crate::connection::ConnectionSettings;
use crate::dispatch::LabelGeometry;
use crate::lock::AcquireRetry;
use crate::worker::WorkerConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub worker_tick_ms: u64,
    pub print_max_attempts: u32,
    pub printer_connect_timeout_ms: u64,
    pub escpos_max_width: u32,
    pub escpos_max_strip_height: u32,
    pub label_width_dots: u32,
    pub label_height_dots: u32,
    pub lock_retry_count: u32,
    pub lock_retry_delay_ms: u64,
    pub render_url: String,
    pub render_timeout_ms: u64,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
    /// development | staging | production
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            ..Self::defaults_from_env()
        })
    }

    /// Everything except the database URL, which is left empty
    pub fn defaults_from_env() -> Self {
        Self {
            database_url: String::new(),
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
            worker_tick_ms: env_or("WORKER_TICK_MS", 2000),
            print_max_attempts: env_or("PRINT_MAX_ATTEMPTS", 3),
            printer_connect_timeout_ms: env_or("PRINTER_CONNECT_TIMEOUT_MS", 5000),
            escpos_max_width: env_or("ESCPOS_MAX_WIDTH", 576),
            escpos_max_strip_height: env_or("ESCPOS_MAX_STRIP_HEIGHT", 1000),
            label_width_dots: env_or("LABEL_WIDTH_DOTS", 400),
            label_height_dots: env_or("LABEL_HEIGHT_DOTS", 240),
            lock_retry_count: env_or("LOCK_RETRY_COUNT", 10),
            lock_retry_delay_ms: env_or("LOCK_RETRY_DELAY_MS", 200),
            render_url: std::env::var("RENDER_URL")
                .unwrap_or_else(|_| "http://localhost:3100".into()),
            render_timeout_ms: env_or("RENDER_TIMEOUT_MS", 10_000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_or("LOG_JSON", false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|s| !s.is_empty()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Production always logs JSON
    pub fn json_logs(&self) -> bool {
        self.log_json || self.is_production()
    }

    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            tick_interval: Duration::from_millis(self.worker_tick_ms.max(1)),
            max_attempts: self.print_max_attempts.max(1),
        }
    }

    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings {
            connect_timeout: Duration::from_millis(self.printer_connect_timeout_ms),
            escpos_max_width: self.escpos_max_width,
            // GS v 0 carries the strip height in 16 bits
            escpos_max_strip_height: self.escpos_max_strip_height.clamp(1, u16::MAX as u32),
        }
    }

    pub fn label(&self) -> LabelGeometry {
        LabelGeometry {
            width: self.label_width_dots,
            height: self.label_height_dots,
        }
    }

    pub fn lock_retry(&self) -> AcquireRetry {
        AcquireRetry {
            retry_count: self.lock_retry_count,
            retry_delay: Duration::from_millis(self.lock_retry_delay_ms),
        }
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// `spool_engine=<level>,spool_printer=<level>`
    pub fn log_filter(&self) -> String {
        format!(
            "spool_engine={level},spool_printer={level}",
            level = self.log_level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default_when_unset() {
        assert_eq!(env_or("SPOOL_TEST_UNSET_VARIABLE", 7u32), 7);
    }

    #[test]
    fn test_derived_settings() {
        let mut config = Config::defaults_from_env();
        config.worker_tick_ms = 250;
        config.print_max_attempts = 0;
        config.lock_retry_count = 4;
        config.lock_retry_delay_ms = 50;
        config.log_level = "debug".into();

        assert_eq!(config.worker().tick_interval, Duration::from_millis(250));
        assert_eq!(config.worker().max_attempts, 1);
        assert_eq!(config.lock_retry().retry_count, 4);
        assert_eq!(config.lock_retry().retry_delay, Duration::from_millis(50));
        assert_eq!(config.log_filter(), "spool_engine=debug,spool_printer=debug");
    }

    #[test]
    fn test_strip_height_fits_raster_header() {
        let mut config = Config::defaults_from_env();
        config.escpos_max_strip_height = 100_000;
        assert_eq!(config.connection().escpos_max_strip_height, 65_535);

        config.escpos_max_strip_height = 0;
        assert_eq!(config.connection().escpos_max_strip_height, 1);
    }

    #[test]
    fn test_production_forces_json_logs() {
        let mut config = Config::defaults_from_env();
        config.log_json = false;
        config.environment = "development".into();
        assert!(!config.json_logs());

        config.environment = "production".into();
        assert!(config.json_logs());
    }
}
