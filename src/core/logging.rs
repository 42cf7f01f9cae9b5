//! Logging setup: console output plus a monthly rolling log file
//!
//! The returned [`Dispatch`] is attached to the run's future by the binary
//! (`WithSubscriber`) instead of being installed as a process-wide default.

use crate::core::error::PublishError;
use chrono::{Datelike, Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Log file name prefix, followed by `YYYY-MM.log`
const LOG_FILE_PREFIX: &str = "nugetpush-";

/// Number of monthly log files kept
pub const RETAINED_LOG_FILES: usize = 3;

/// Environment variable overriding the log filter
const LOG_FILTER_ENV: &str = "NUGETPUSH_LOG";

/// Log file name for the month containing `date`
pub fn monthly_log_file_name(date: NaiveDate) -> String {
    format!("{}{:04}-{:02}.log", LOG_FILE_PREFIX, date.year(), date.month())
}

/// Open (append) this month's log file and prune old ones
pub fn open_monthly_log(dir: &Path, today: NaiveDate) -> Result<(PathBuf, File), PublishError> {
    fs::create_dir_all(dir).map_err(|e| PublishError::io(dir, e))?;

    let path = dir.join(monthly_log_file_name(today));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| PublishError::io(&path, e))?;

    prune_old_logs(dir, RETAINED_LOG_FILES)?;

    Ok((path, file))
}

/// Delete all but the `keep` most recent monthly log files
///
/// Returns the removed paths.
pub fn prune_old_logs(dir: &Path, keep: usize) -> Result<Vec<PathBuf>, PublishError> {
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| PublishError::io(dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX) && n.ends_with(".log"))
        })
        .collect();

    // YYYY-MM sorts chronologically
    logs.sort();
    logs.reverse();

    let mut removed = Vec::new();
    for stale in logs.into_iter().skip(keep) {
        fs::remove_file(&stale).map_err(|e| PublishError::io(&stale, e))?;
        removed.push(stale);
    }

    Ok(removed)
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

/// Console and rolling-file logging for one run
pub fn build_dispatch(log_dir: &Path, verbose: bool) -> Result<Dispatch, PublishError> {
    let (_, file) = open_monthly_log(log_dir, Local::now().date_naive())?;

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)));

    Ok(Dispatch::new(subscriber))
}

/// Console-only logging, used when the log directory is unusable
pub fn console_dispatch(verbose: bool) -> Dispatch {
    let subscriber = tracing_subscriber::registry().with(env_filter(verbose)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time(),
    );

    Dispatch::new(subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_monthly_log_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        assert_eq!(monthly_log_file_name(date), "nugetpush-2024-03.log");
    }

    #[test]
    fn test_open_monthly_log_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let date = NaiveDate::from_ymd_opt(2024, 11, 2).unwrap();

        let (path, _file) = open_monthly_log(&log_dir, date).unwrap();

        assert!(path.exists());
        assert!(path.ends_with("nugetpush-2024-11.log"));
    }

    #[test]
    fn test_prune_keeps_most_recent_months() {
        let temp_dir = TempDir::new().unwrap();
        for month in ["2023-12", "2024-01", "2024-02", "2024-03", "2024-04"] {
            fs::write(temp_dir.path().join(format!("nugetpush-{}.log", month)), "x").unwrap();
        }
        fs::write(temp_dir.path().join("unrelated.log"), "x").unwrap();

        let removed = prune_old_logs(temp_dir.path(), 3).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(!temp_dir.path().join("nugetpush-2023-12.log").exists());
        assert!(!temp_dir.path().join("nugetpush-2024-01.log").exists());
        assert!(temp_dir.path().join("nugetpush-2024-04.log").exists());
        assert!(temp_dir.path().join("unrelated.log").exists());
    }

    #[test]
    fn test_build_dispatch_writes_to_log_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dispatch = build_dispatch(temp_dir.path(), false).unwrap();

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!("hello from the test");
        });

        let name = monthly_log_file_name(Local::now().date_naive());
        let content = fs::read_to_string(temp_dir.path().join(name)).unwrap();
        assert!(content.contains("hello from the test"));
    }
}
