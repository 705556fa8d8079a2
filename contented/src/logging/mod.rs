//! Console and daily-rolling file logging.
//!
//! The level filter can be swapped at runtime, and rolled files older than
//! the retention window are deleted by a background task.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::utils::fs;
use crate::{Error, Result};

pub const DEFAULT_LOG_FILTER: &str = "contented=info,sqlx=warn";

/// Rolled files are named `contented.log.YYYY-MM-DD`.
const LOG_FILE_PREFIX: &str = "contented.log";

const LOG_RETENTION_DAYS: i64 = 7;
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Control over the installed subscriber.
pub struct LogControl {
    filter: FilterHandle,
    log_dir: PathBuf,
    retention_days: i64,
}

impl LogControl {
    pub fn filter(&self) -> String {
        self.filter
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Replace the level filter, e.g. with `contented=debug,sqlx=warn`.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let filter = EnvFilter::try_new(directive)
            .map_err(|e| Error::config(format!("invalid log filter {directive:?}: {e}")))?;
        self.filter
            .reload(filter)
            .map_err(|e| Error::Other(format!("log filter reload failed: {e}")))?;
        info!(directive, "Log filter updated");
        Ok(())
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Sweep old log files now and then once a day until `cancel` fires.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel: CancellationToken) {
        let log_dir = self.log_dir.clone();
        let retention_days = self.retention_days;

        tokio::spawn(async move {
            loop {
                if let Err(e) = cleanup_old_logs(&log_dir, retention_days).await {
                    warn!(error = %e, "Log retention sweep failed");
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RETENTION_SWEEP_INTERVAL) => {}
                }
            }
            debug!("Log retention task stopped");
        });
    }
}

fn rolled_log_date(filename: &str) -> Option<NaiveDate> {
    let date = filename.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Delete rolled log files dated before the retention window. Returns how
/// many were removed.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let expired = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(rolled_log_date)
            .is_some_and(|date| date < cutoff);
        if !expired || !path.is_file() {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => deleted += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot delete old log file"),
        }
    }

    if deleted > 0 {
        info!(count = deleted, "Deleted old log files");
    }
    Ok(deleted)
}

/// Log to the console and to daily files under `log_dir`.
///
/// File output is buffered until the returned guard is dropped.
pub fn init_logging(log_dir: &Path) -> Result<(Arc<LogControl>, WorkerGuard)> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, filter_handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| Error::Other(format!("cannot install log subscriber: {e}")))?;

    let control = Arc::new(LogControl {
        filter: filter_handle,
        log_dir: log_dir.to_path_buf(),
        retention_days: LOG_RETENTION_DAYS,
    });
    Ok((control, guard))
}
