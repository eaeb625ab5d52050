//! Diagnostic logging for browsepilot.
//!
//! Uses `tracing` with `tracing-subscriber`. The terminal belongs to the UI,
//! so output goes to `<settings_dir>/logs/browsepilot.log` instead of stderr.
//!
//! ## Environment Variables
//!
//! - `BROWSEPILOT_LOG` or `RUST_LOG`: log filter (e.g. `debug`, `browsepilot=debug,hyper=warn`)
//! - `BROWSEPILOT_LOG_FORMAT`: output format (`pretty`, `compact`, `json`)
//!
//! ```bash
//! BROWSEPILOT_LOG=browsepilot=debug,warn BROWSEPILOT_LOG_FORMAT=json browsepilot
//! ```

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

pub const LOG_FILE: &str = "browsepilot.log";
const DEFAULT_FILTER: &str = "browsepilot=info,warn";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, indented
    Pretty,
    /// Single-line output
    #[default]
    Compact,
    /// JSON lines for log aggregation
    Json,
}

impl LogFormat {
    /// Parse from string (case-insensitive). Unknown values fall back to compact.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive (e.g. "debug", "browsepilot=debug,hyper=warn")
    pub filter: String,
    pub format: LogFormat,
    /// Include span events (enter/exit)
    pub with_spans: bool,
    /// Include file/line
    pub with_file: bool,
    pub with_thread_ids: bool,
    /// Include target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Compact,
            with_spans: false,
            with_file: false,
            // Worker threads are named after their task.
            with_thread_ids: true,
            with_target: true,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup("BROWSEPILOT_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let format = lookup("BROWSEPILOT_LOG_FORMAT")
            .map(|s| LogFormat::parse(&s))
            .unwrap_or_default();

        Self {
            filter,
            format,
            ..Default::default()
        }
    }

    pub fn debug() -> Self {
        Self {
            filter: "browsepilot=debug,info".to_string(),
            with_file: true,
            ..Default::default()
        }
    }
}

/// Install the global subscriber, appending to `log_dir/browsepilot.log`.
///
/// Returns the log file path. A second call leaves the first subscriber in
/// place.
pub fn init(config: LogConfig, log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let path = log_dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;

    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let span_events = if config.with_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_span_events(span_events)
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_thread_ids(config.with_thread_ids)
        .with_thread_names(config.with_thread_ids)
        .with_target(config.with_target);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(layer).with(env_filter);
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(path)
}
