/// Log setup
///
/// The dashboard owns the terminal, so log records go to a file.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// `<cache dir>/procpulse/procpulse.log`
pub fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("procpulse").join("procpulse.log"))
}

/// Filter from `RUST_LOG`, then `level`, then `info`
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| match level {
            Some(level) => EnvFilter::try_new(level).map_err(|e| {
                eprintln!("invalid log level '{}', using {}: {}", level, DEFAULT_LEVEL, e);
                e
            }),
            None => EnvFilter::try_new(DEFAULT_LEVEL),
        })
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Install the global subscriber writing to `file` (or the default log path).
///
/// Returns the log path on success. Failures only disable logging.
pub fn init_log(level: Option<&str>, file: Option<&Path>) -> Option<PathBuf> {
    let path = file.map(Path::to_path_buf).or_else(default_log_path)?;

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("failed to create log directory {}: {}", parent.display(), e);
            return None;
        }
    }

    let log_file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to open log file {}: {}", path.display(), e);
            return None;
        }
    };

    match tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
    {
        Ok(()) => Some(path),
        Err(e) => {
            eprintln!("failed to init logger: {}", e);
            None
        }
    }
}
