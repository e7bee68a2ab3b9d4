//! Logging setup
//!
//! Console output (pretty or JSON) plus an optional daily rolling file under
//! `<log_dir>/app`. Rolled files older than [`RETENTION_DAYS`] are removed
//! by a background task.

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, prelude::*};

pub const RETENTION_DAYS: i64 = 14;

const APP_PREFIX: &str = "app";

/// Date encoded in a rolled file name (`app.YYYY-MM-DD`)
fn rolled_date(name: &str) -> Option<chrono::NaiveDate> {
    let date = name.strip_prefix(APP_PREFIX)?.strip_prefix('.')?;
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Delete rolled application logs older than the retention window
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<()> {
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(RETENTION_DAYS);

    let app_log_dir = log_dir.join(APP_PREFIX);
    if !app_log_dir.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(date) = rolled_date(name)
            && date < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }

    Ok(())
}

async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;

        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Initialise the global subscriber
///
/// `filter` is used when `RUST_LOG` is unset. With `log_dir`, must be called
/// inside a Tokio runtime (spawns the cleanup task).
pub fn init_logger_with_file(
    filter: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let file_layer = match log_dir {
        Some(dir) => {
            let log_dir = Path::new(dir);
            let app_log_dir = log_dir.join(APP_PREFIX);
            fs::create_dir_all(&app_log_dir)?;

            let app_log = RollingFileAppender::new(Rotation::DAILY, app_log_dir, APP_PREFIX);
            tokio::spawn(periodic_cleanup(log_dir.to_path_buf()));

            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::sync::Mutex::new(app_log))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolled_date_parsing() {
        assert_eq!(
            rolled_date("app.2024-03-09"),
            chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
        );
        assert_eq!(rolled_date("app"), None);
        assert_eq!(rolled_date("audit.2024-03-09"), None);
    }

    #[test]
    fn test_cleanup_missing_dir_is_ok() {
        let dir = std::env::temp_dir().join(format!("spool-logs-{}", uuid::Uuid::new_v4()));
        assert!(cleanup_old_logs(&dir).is_ok());
    }
}
