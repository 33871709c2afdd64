//! Subscriber installation for the CLI
//!
//! Operators get a human-readable console stream. When local logging is enabled
//! every event is also written as JSON to a rolling file under
//! `logging.local_path`, and rotated files beyond `local_max_size_mb` are pruned
//! oldest-first before the appender opens.

use crate::config::LoggingConfig;
use crate::domain::{Result, TallyError};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// File name prefix shared by the active log and its rotated siblings
pub const LOG_FILE_PREFIX: &str = "tally.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the non-blocking file writer alive; dropping it flushes pending lines
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global subscriber
///
/// `RUST_LOG` wins over `level` when it is set. Fails if a subscriber is
/// already installed or the log directory cannot be created.
///
/// # Example
///
/// ```no_run
/// use tally::logging::init_logging;
/// use tally::config::LoggingConfig;
///
/// let config = LoggingConfig::default();
/// let _guard = init_logging("info", &config).expect("Failed to initialize logging");
/// ```
pub fn init_logging(level: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let level = parse_log_level(level)?;
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("tally={level}")))
    };

    let mut layers: Vec<BoxedLayer> = vec![console_layer(filter())];
    let mut file_guard = None;
    let mut pruned = 0;

    if config.local_enabled {
        let dir = Path::new(&config.local_path);
        std::fs::create_dir_all(dir).map_err(|e| {
            TallyError::Configuration(format!(
                "Failed to create log directory {}: {e}",
                config.local_path
            ))
        })?;
        pruned = prune_rotated_logs(dir, config.local_max_size_mb as u64 * 1024 * 1024)?;

        let (layer, guard) = json_file_layer(dir, &config.local_rotation, filter());
        layers.push(layer);
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| TallyError::Configuration(format!("Failed to install subscriber: {e}")))?;

    tracing::debug!(
        file = config.local_enabled,
        path = %config.local_path,
        rotation = %config.local_rotation,
        pruned_files = pruned,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn console_layer(filter: EnvFilter) -> BoxedLayer {
    tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(filter)
        .boxed()
}

fn json_file_layer(dir: &Path, rotation: &str, filter: EnvFilter) -> (BoxedLayer, WorkerGuard) {
    let appender = RollingFileAppender::new(parse_rotation(rotation), dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_thread_ids(true)
        .with_writer(writer)
        .with_filter(filter)
        .boxed();
    (layer, guard)
}

/// Deletes the oldest `tally.log*` files in `dir` until the rest fit in
/// `budget_bytes`. Returns how many files were removed.
fn prune_rotated_logs(dir: &Path, budget_bytes: u64) -> Result<usize> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        TallyError::Configuration(format!("Failed to read log directory {}: {e}", dir.display()))
    })?;

    let mut files: Vec<(SystemTime, u64, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            meta.is_file()
                .then(|| (meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), meta.len(), entry.path()))
        })
        .collect();
    files.sort();

    let mut total: u64 = files.iter().map(|(_, len, _)| len).sum();
    let mut removed = 0;
    for (_, len, path) in &files {
        if total <= budget_bytes {
            break;
        }
        // A file another process still holds open is left for the next start
        if std::fs::remove_file(path).is_ok() {
            total = total.saturating_sub(*len);
            removed += 1;
        }
    }
    Ok(removed)
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(TallyError::Configuration(format!(
            "Invalid log level: {level}. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

fn parse_rotation(rotation: &str) -> Rotation {
    match rotation {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}
