//! Body of the per-task worker thread.
//!
//! The worker owns a private current-thread runtime, drives the engine and
//! always ends by sending exactly one [`TaskCompletion`], whatever happened.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::coordinator::{TaskCompletion, TaskId, TaskResult};
use crate::engine::sink::{format_labeled, format_record};
use crate::engine::{AgentOutcome, EngineConfig, EngineError, EngineFactory, Level, LogSink};
use crate::log_channel::LogSender;

pub const FINISHED_MARKER: &str = "--- AGENT TASK FINISHED ---";
pub const FAILED_MARKER: &str = "--- AGENT TASK FAILED ---";
pub const CRITICAL_MARKER: &str = "--- AGENT TASK FAILED (CRITICAL) ---";
pub const CRASH_MARKER: &str = "--- AGENT TASK FAILED (THREAD CRASH) ---";

pub(crate) struct WorkerJob {
    pub task_id: TaskId,
    pub command: String,
    pub factory: Arc<dyn EngineFactory>,
    pub config: Arc<EngineConfig>,
    pub log: LogSender,
    pub completions: mpsc::UnboundedSender<TaskCompletion>,
    /// Fired on application shutdown; the engine is still closed.
    pub cancel: CancellationToken,
}

fn system_line(level: Level, message: &str) -> String {
    format_record(level, "system", message)
}

/// Thread entry point.
pub(crate) fn run(job: WorkerJob) {
    let WorkerJob {
        task_id,
        command,
        factory,
        config,
        log,
        completions,
        cancel,
    } = job;

    let body = panic::catch_unwind(AssertUnwindSafe(|| {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => {
                runtime.block_on(execute(&command, factory.as_ref(), &config, &log, &cancel))
            }
            Err(e) => {
                tracing::error!(task = %task_id, error = %e, "Worker runtime setup failed");
                log.send(format!("FATAL ERROR before/during async execution: {e}"));
                log.send(CRITICAL_MARKER);
                TaskResult::critical(&e.to_string())
            }
        }
    }));

    let result = body.unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!(task = %task_id, panic = %message, "Worker thread crashed");
        log.send(format_labeled(
            "FATAL",
            "worker",
            &format!("Critical error in agent thread: {message}"),
        ));
        log.send(CRASH_MARKER);
        TaskResult::thread_crash(&message)
    });

    // Last act of the thread: every log line above is already queued.
    if completions.send(TaskCompletion { task_id, result }).is_err() {
        tracing::debug!(task = %task_id, "Completion receiver gone; result dropped");
    }
}

/// Build, run and close one engine, reporting progress on `log`.
pub(crate) async fn execute(
    command: &str,
    factory: &dyn EngineFactory,
    config: &EngineConfig,
    log: &LogSender,
    cancel: &CancellationToken,
) -> TaskResult {
    log.send(system_line(Level::Info, "Agent process starting..."));

    let sink = LogSink::new(log.clone());
    log.send(system_line(Level::Info, "Attaching log sink..."));

    let created = tokio::select! {
        created = factory.create(config, sink.clone()) => created,
        _ = cancel.cancelled() => Err(shutdown_error()),
    };
    let (run, mut engine) = match created {
        Ok(mut engine) => {
            let run = tokio::select! {
                run = engine.run(command) => run,
                _ = cancel.cancelled() => Err(shutdown_error()),
            };
            (run, Some(engine))
        }
        Err(e) => (Err(e), None),
    };

    let (result, failed) = match run {
        Ok(AgentOutcome { result }) => {
            log.send(FINISHED_MARKER);
            (TaskResult::completed(result.as_deref()), false)
        }
        Err(err) => (report_failure(&err, log), true),
    };

    log.send(system_line(Level::Info, "Detaching log sink..."));
    sink.detach();

    if let Some(engine) = engine.as_mut() {
        match engine.close().await {
            Ok(()) => {
                log.send(system_line(Level::Info, "Browser closed."));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Engine close failed");
                log.send(system_line(
                    Level::Warning,
                    &format!("Failed to close browser: {e}"),
                ));
            }
        }
    }

    if failed {
        log.send(FAILED_MARKER);
    }
    result
}

fn shutdown_error() -> EngineError {
    EngineError::new("ShutdownError", "application is shutting down")
}

fn report_failure(err: &EngineError, log: &LogSender) -> TaskResult {
    tracing::error!(kind = %err.kind, message = %err.message, "Agent execution failed");
    log.send(system_line(
        Level::Error,
        &format!("Agent execution failed: An error occurred: {err}"),
    ));
    TaskResult::engine_failed(err)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
