//! Log sink handed to engines at construction time.
//!
//! Engines never touch the task's log channel directly. They ask the sink for
//! a named [`EngineLogger`] and emit records through it; the sink filters,
//! formats and forwards them, and mirrors every forwarded record into
//! `tracing` so the diagnostic log keeps a copy.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::log_channel::LogSender;

/// Logger names whose records reach the log pane.
pub const ENGINE_LOGGERS: [&str; 4] = ["agent", "controller", "browser", "browser_use_base"];

/// Severity of one engine record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render one record as `LEVEL [logger] message`, level padded to 8 columns.
pub fn format_record(level: Level, logger: &str, message: &str) -> String {
    format_labeled(level.as_str(), logger, message)
}

/// Same layout as [`format_record`] for labels outside [`Level`] (`FATAL`).
pub fn format_labeled(label: &str, logger: &str, message: &str) -> String {
    format!("{label:<8} [{logger}] {message}")
}

struct SinkInner {
    log: LogSender,
    attached: AtomicBool,
    min_level: Level,
}

/// Shared handle that forwards engine records into one task's log channel.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<SinkInner>,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("attached", &self.is_attached())
            .field("min_level", &self.inner.min_level)
            .finish()
    }
}

impl LogSink {
    /// A sink forwarding INFO and above.
    pub fn new(log: LogSender) -> Self {
        Self::with_min_level(log, Level::Info)
    }

    pub fn with_min_level(log: LogSender, min_level: Level) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                log,
                attached: AtomicBool::new(true),
                min_level,
            }),
        }
    }

    /// A named logger bound to this sink.
    pub fn logger(&self, name: &'static str) -> EngineLogger {
        EngineLogger {
            sink: self.clone(),
            name,
        }
    }

    /// Forward one record. Returns whether it reached the log channel.
    ///
    /// Records are dropped when the sink is detached, when the logger is not
    /// one of [`ENGINE_LOGGERS`], or when the level is below the threshold.
    pub fn emit(&self, level: Level, logger: &str, message: &str) -> bool {
        if !self.is_attached()
            || level < self.inner.min_level
            || !ENGINE_LOGGERS.contains(&logger)
        {
            return false;
        }

        match level {
            Level::Error => tracing::error!(logger, "{}", message),
            Level::Warning => tracing::warn!(logger, "{}", message),
            Level::Info => tracing::info!(logger, "{}", message),
            Level::Debug => tracing::debug!(logger, "{}", message),
        }

        self.inner.log.send(format_record(level, logger, message))
    }

    /// Stop forwarding. Returns `true` only for the call that actually
    /// detached; later calls are no-ops.
    pub fn detach(&self) -> bool {
        self.inner.attached.swap(false, Ordering::AcqRel)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire)
    }
}

/// Named logger obtained from a [`LogSink`].
#[derive(Debug, Clone)]
pub struct EngineLogger {
    sink: LogSink,
    name: &'static str,
}

impl EngineLogger {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn log(&self, level: Level, message: impl AsRef<str>) -> bool {
        self.sink.emit(level, self.name, message.as_ref())
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_channel;

    #[test]
    fn test_format_record_pads_level() {
        assert_eq!(
            format_record(Level::Info, "agent", "📍 Step 1"),
            "INFO     [agent] 📍 Step 1"
        );
        assert_eq!(
            format_record(Level::Warning, "browser", "slow page"),
            "WARNING  [browser] slow page"
        );
    }

    #[test]
    fn test_known_loggers_are_forwarded() {
        let (tx, mut rx) = log_channel::channel();
        let sink = LogSink::new(tx);

        sink.logger("agent").info("thinking");
        sink.logger("controller").error("click failed");

        assert_eq!(
            rx.drain_all(),
            vec![
                "INFO     [agent] thinking".to_string(),
                "ERROR    [controller] click failed".to_string(),
            ]
        );
    }

    #[test]
    fn test_debug_and_unknown_loggers_are_filtered() {
        let (tx, mut rx) = log_channel::channel();
        let sink = LogSink::new(tx);

        sink.logger("agent").debug("noise");
        assert!(!sink.emit(Level::Info, "hyper", "connection pool"));

        assert!(rx.drain_all().is_empty());
    }

    #[test]
    fn test_detach_is_idempotent_and_stops_forwarding() {
        let (tx, mut rx) = log_channel::channel();
        let sink = LogSink::new(tx);
        let agent = sink.logger("agent");

        agent.info("before");
        assert!(sink.detach());
        assert!(!sink.detach());
        assert!(!sink.is_attached());
        agent.info("after");

        assert_eq!(rx.drain_all(), vec!["INFO     [agent] before".to_string()]);
    }

    #[test]
    fn test_clones_share_attachment() {
        let (tx, _rx) = log_channel::channel();
        let sink = LogSink::new(tx);
        let clone = sink.clone();
        clone.detach();
        assert!(!sink.is_attached());
    }
}
