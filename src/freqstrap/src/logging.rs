//! Run log: stderr for the operator, a timestamped file for the record.

use crate::provisioner::ProvisionError;
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "freqstrap-";
const LOG_FILE_SUFFIX: &str = ".log";

/// `freqstrap-YYYYmmdd-HHMMSS.log`
pub fn log_file_name(now: DateTime<Local>) -> String {
    format!(
        "{}{}{}",
        LOG_FILE_PREFIX,
        now.format("%Y%m%d-%H%M%S"),
        LOG_FILE_SUFFIX
    )
}

fn is_run_log(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX) && n.ends_with(LOG_FILE_SUFFIX))
}

/// Delete run logs in `dir` last modified more than `retention` before `now`.
/// Other files are never touched. Returns the removed paths.
pub fn prune_old_logs(
    dir: &Path,
    retention: Duration,
    now: SystemTime,
) -> std::io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || !is_run_log(&path) {
            continue;
        }
        let Ok(modified) = path.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        let expired = now
            .duration_since(modified)
            .is_ok_and(|age| age > retention);
        if expired && std::fs::remove_file(&path).is_ok() {
            removed.push(path);
        }
    }
    Ok(removed)
}

/// Install the global subscriber and return the path of this run's log file.
///
/// `RUST_LOG` overrides the default `info` filter for both outputs.
pub fn init_logging(dir: &Path, retention_days: u64) -> Result<PathBuf, ProvisionError> {
    std::fs::create_dir_all(dir)?;
    let retention = Duration::from_secs(retention_days.saturating_mul(24 * 3600));
    let pruned = prune_old_logs(dir, retention, SystemTime::now())?;

    let path = dir.join(log_file_name(Local::now()));
    let file: File = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o640)
        .open(&path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ProvisionError::Config(format!("Logging already initialized: {}", e)))?;

    tracing::info!("Logging to {}", path.display());
    for old in pruned {
        tracing::debug!("Pruned old log {}", old.display());
    }
    Ok(path)
}
