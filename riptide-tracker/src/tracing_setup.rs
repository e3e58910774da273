//! Log output for tracker exchanges
//!
//! Announce rounds log at `info`, per-tracker outcomes at `debug`/`warn` and
//! individual datagrams at `trace`. The console shows the chosen level; an
//! optional file keeps the full trace of this crate.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Name of the trace log written under the logs directory.
pub const LOG_FILE_NAME: &str = "riptide-tracker.log";

/// Tracing target of everything this crate logs.
const CRATE_TARGET: &str = "riptide_tracker";

/// Installs the global subscriber.
///
/// Console output honours `RUST_LOG` when set and otherwise shows this
/// crate's events at `console_level`. With `logs_dir`, every event of this
/// crate down to `trace` is also written to [`LOG_FILE_NAME`] there, replacing
/// the previous run's file.
///
/// # Examples
/// ```
/// use riptide_tracker::tracing_setup::{LOG_FILE_NAME, init_tracing};
///
/// let logs = tempfile::tempdir().unwrap();
/// let level = "debug".parse().unwrap();
/// let path = init_tracing(level, Some(logs.path())).unwrap();
///
/// assert_eq!(path, Some(logs.path().join(LOG_FILE_NAME)));
/// tracing::info!(target: "riptide_tracker", "announce round finished");
/// ```
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - If the log file cannot be created or a
///   global subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{CRATE_TARGET}={console_level}")));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let (file_layer, log_file_path) = match logs_dir {
        Some(dir) => {
            create_dir_all(dir)?;
            let path = dir.join(LOG_FILE_NAME);
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(File::create(&path)?)
                .with_filter(EnvFilter::new(format!("{CRATE_TARGET}=trace")));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Tracing initialized: console={}, trace_file={:?}",
        console_level,
        log_file_path
    );

    Ok(log_file_path)
}
