//! Lifecycle of the single in-flight command.
//!
//! The coordinator owns at most one [`Task`]. Starting a task allocates a
//! fresh log channel and spawns one worker thread; the worker reports back
//! exactly once through the completion channel, and the poller walks the
//! coordinator through `Running → Completing → Idle`.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineConfig, EngineError, EngineFactory};
use crate::log_channel::{self, LogReceiver};
use crate::worker::{self, WorkerJob};

/// Final output shown when the engine finished without producing a result.
pub const NO_FINAL_RESULT: &str = "No final result was produced.";

/// Worker threads are named `agent-<n>`.
pub const WORKER_THREAD_PREFIX: &str = "agent-";

/// How long [`TaskCoordinator::shutdown`] waits for a worker to close its
/// engine.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Whether a thread with this name is a task worker.
pub fn is_worker_thread(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with(WORKER_THREAD_PREFIX))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn for_tests(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TaskPhase {
    Idle,
    Running,
    Completing,
}

/// What the user sees once a task is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub chat_response: String,
    pub final_output: String,
}

impl TaskResult {
    /// The engine ran to completion.
    pub fn completed(result: Option<&str>) -> Self {
        Self {
            chat_response: "Task completed.".to_string(),
            final_output: result.unwrap_or(NO_FINAL_RESULT).to_string(),
        }
    }

    /// Building or running the engine failed.
    pub fn engine_failed(err: &EngineError) -> Self {
        Self {
            chat_response: "Sorry, I encountered an error.".to_string(),
            final_output: format!("Agent failed.\nAn error occurred: {err}"),
        }
    }

    /// The worker could not even set up its runtime.
    pub fn critical(err: &str) -> Self {
        Self {
            chat_response: "A critical execution error occurred.".to_string(),
            final_output: format!("Failed.\n{err}"),
        }
    }

    /// The worker body panicked.
    pub fn thread_crash(message: &str) -> Self {
        Self {
            chat_response: "System error in worker thread.".to_string(),
            final_output: format!("Failed: {message}"),
        }
    }
}

/// The one message a worker sends when it is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub result: TaskResult,
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("command is empty")]
    EmptyCommand,
    #[error("a task is already running")]
    Busy,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// One user-submitted command and the resources bound to it.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    command: String,
    log: LogReceiver,
    worker: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whether the worker thread has exited.
    pub fn worker_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

pub struct TaskCoordinator {
    factory: Arc<dyn EngineFactory>,
    engine_config: Arc<EngineConfig>,
    completions: mpsc::UnboundedSender<TaskCompletion>,
    phase: TaskPhase,
    task: Option<Task>,
    next_id: u64,
}

impl fmt::Debug for TaskCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCoordinator")
            .field("phase", &self.phase)
            .field("task", &self.task.as_ref().map(Task::id))
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl TaskCoordinator {
    /// `completions` is where workers report; the owning loop holds the
    /// receiving end.
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        engine_config: EngineConfig,
        completions: mpsc::UnboundedSender<TaskCompletion>,
    ) -> Self {
        Self {
            factory,
            engine_config: Arc::new(engine_config),
            completions,
            phase: TaskPhase::Idle,
            task: None,
            next_id: 1,
        }
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == TaskPhase::Idle
    }

    pub fn is_running(&self) -> bool {
        self.phase == TaskPhase::Running
    }

    pub fn current(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    /// Start a task for `command`.
    ///
    /// Rejected with [`StartError::Busy`] unless idle, and with
    /// [`StartError::EmptyCommand`] when the trimmed command is empty.
    pub fn start(&mut self, command: &str) -> Result<&Task, StartError> {
        if !self.is_idle() {
            return Err(StartError::Busy);
        }
        let command = command.trim();
        if command.is_empty() {
            return Err(StartError::EmptyCommand);
        }

        // Residue of the previous task never reaches the new one.
        if let Some(mut old) = self.task.take() {
            let dropped = old.log.discard_pending();
            if dropped > 0 {
                tracing::debug!(task = %old.id, dropped, "Discarded stale log lines");
            }
        }

        let id = TaskId(self.next_id);
        let (log_tx, log_rx) = log_channel::channel();
        let cancel = CancellationToken::new();
        let job = WorkerJob {
            task_id: id,
            command: command.to_string(),
            factory: Arc::clone(&self.factory),
            config: Arc::clone(&self.engine_config),
            log: log_tx,
            completions: self.completions.clone(),
            cancel: cancel.clone(),
        };

        let handle = std::thread::Builder::new()
            .name(format!("{WORKER_THREAD_PREFIX}{}", id.get()))
            .spawn(move || worker::run(job))
            .map_err(|e| {
                tracing::error!(task = %id, error = %e, "Failed to spawn worker thread");
                StartError::Spawn(e)
            })?;

        self.next_id += 1;
        self.phase = TaskPhase::Running;
        tracing::info!(task = %id, command, "Task started");

        Ok(&*self.task.insert(Task {
            id,
            command: command.to_string(),
            log: log_rx,
            worker: Some(handle),
            cancel,
        }))
    }

    /// Up to `max` queued log lines of the current task, oldest first.
    pub fn drain(&mut self, max: usize) -> Vec<String> {
        self.task
            .as_mut()
            .map(|t| t.log.drain(max))
            .unwrap_or_default()
    }

    /// Every queued log line of the current task.
    pub fn drain_all(&mut self) -> Vec<String> {
        self.drain(usize::MAX)
    }

    /// Accept a worker's completion message.
    ///
    /// Moves `Running → Completing` and hands back the result. Messages for
    /// another task, or arriving in any other phase, are logged and ignored.
    pub fn begin_completion(&mut self, completion: TaskCompletion) -> Option<TaskResult> {
        let current = self.task.as_ref().map(Task::id);
        if self.phase != TaskPhase::Running || current != Some(completion.task_id) {
            tracing::warn!(
                task = %completion.task_id,
                phase = %self.phase,
                current = ?current,
                "Ignoring unexpected task completion"
            );
            return None;
        }
        self.phase = TaskPhase::Completing;
        Some(completion.result)
    }

    /// `Completing → Idle`. The finished task is dropped.
    pub fn finish(&mut self) {
        if self.phase != TaskPhase::Completing {
            tracing::warn!(phase = %self.phase, "finish() outside of completion");
            return;
        }
        if let Some(task) = self.task.take() {
            tracing::info!(task = %task.id, "Task finished");
        }
        self.phase = TaskPhase::Idle;
    }

    /// Stop any in-flight task: signal the worker, which abandons the run and
    /// closes its engine, then wait up to [`SHUTDOWN_GRACE`] for it to exit.
    /// Returns `false` when the worker had to be left behind.
    pub fn shutdown(&mut self) -> bool {
        self.shutdown_within(SHUTDOWN_GRACE)
    }

    pub fn shutdown_within(&mut self, grace: Duration) -> bool {
        self.phase = TaskPhase::Idle;
        let Some(mut task) = self.task.take() else {
            return true;
        };
        task.cancel.cancel();
        let Some(handle) = task.worker.take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(SHUTDOWN_POLL);
        }
        if !handle.is_finished() {
            tracing::warn!(task = %task.id, ?grace, "Worker did not stop in time; detaching");
            return false;
        }
        if handle.join().is_err() {
            tracing::warn!(task = %task.id, "Worker thread panicked during shutdown");
        }
        tracing::info!(task = %task.id, "Worker stopped on shutdown");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AgentOutcome, Engine, LogSink};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Quick(Option<&'static str>);

    #[async_trait]
    impl Engine for Quick {
        async fn run(&mut self, _command: &str) -> Result<AgentOutcome, EngineError> {
            Ok(AgentOutcome {
                result: self.0.map(str::to_string),
            })
        }

        async fn close(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct QuickFactory;

    #[async_trait]
    impl EngineFactory for QuickFactory {
        async fn create(
            &self,
            _config: &EngineConfig,
            _sink: LogSink,
        ) -> Result<Box<dyn Engine>, EngineError> {
            Ok(Box::new(Quick(Some("done"))))
        }
    }

    fn coordinator() -> (TaskCoordinator, mpsc::UnboundedReceiver<TaskCompletion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            TaskCoordinator::new(Arc::new(QuickFactory), EngineConfig::default(), tx),
            rx,
        )
    }

    #[test]
    fn test_result_constructors() {
        let ok = TaskResult::completed(Some("Example Domain"));
        assert_eq!(ok.chat_response, "Task completed.");
        assert_eq!(ok.final_output, "Example Domain");

        assert_eq!(TaskResult::completed(None).final_output, NO_FINAL_RESULT);

        let failed = TaskResult::engine_failed(&EngineError::new("TimeoutError", "no response"));
        assert_eq!(failed.chat_response, "Sorry, I encountered an error.");
        assert_eq!(
            failed.final_output,
            "Agent failed.\nAn error occurred: TimeoutError: no response"
        );

        assert_eq!(TaskResult::critical("boom").final_output, "Failed.\nboom");
        assert_eq!(TaskResult::thread_crash("boom").final_output, "Failed: boom");
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(7).to_string(), "task-7");
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let (mut coord, _rx) = coordinator();
        assert!(matches!(coord.start("   "), Err(StartError::EmptyCommand)));
        assert!(coord.is_idle());
        assert!(coord.current().is_none());
    }

    #[test]
    fn test_lifecycle_walks_the_state_machine() {
        let (mut coord, mut rx) = coordinator();

        let id = coord.start("  open example.com  ").unwrap().id();
        assert_eq!(coord.phase(), TaskPhase::Running);
        assert_eq!(coord.current().map(Task::command), Some("open example.com"));
        assert!(matches!(coord.start("again"), Err(StartError::Busy)));

        let completion = rx.blocking_recv().unwrap();
        assert_eq!(completion.task_id, id);

        let result = coord.begin_completion(completion).unwrap();
        assert_eq!(result.final_output, "done");
        assert_eq!(coord.phase(), TaskPhase::Completing);
        assert!(matches!(coord.start("too early"), Err(StartError::Busy)));

        coord.finish();
        assert!(coord.is_idle());
        assert!(coord.current().is_none());

        let next = coord.start("next").unwrap().id();
        assert!(next > id);
    }

    #[test]
    fn test_stray_completion_is_ignored() {
        let (mut coord, mut rx) = coordinator();
        let stray = TaskCompletion {
            task_id: TaskId(99),
            result: TaskResult::completed(None),
        };
        assert!(coord.begin_completion(stray.clone()).is_none());

        coord.start("go").unwrap();
        assert!(coord.begin_completion(stray).is_none());
        assert!(coord.is_running());

        let real = rx.blocking_recv().unwrap();
        assert!(coord.begin_completion(real.clone()).is_some());
        // A duplicate while completing is ignored too.
        assert!(coord.begin_completion(real).is_none());
    }

    #[test]
    fn test_shutdown_when_idle_is_a_no_op() {
        let (mut coord, _rx) = coordinator();
        assert!(coord.shutdown());
        assert!(coord.is_idle());
    }

    /// Runs until cancelled from outside; counts closes.
    struct Endless {
        started: Arc<AtomicBool>,
        closed: Arc<AtomicUsize>,
        thread_name: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl Engine for Endless {
        async fn run(&mut self, _command: &str) -> Result<AgentOutcome, EngineError> {
            *self.thread_name.lock().unwrap() =
                std::thread::current().name().map(str::to_string);
            self.started.store(true, Ordering::SeqCst);
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), EngineError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct EndlessFactory {
        started: Arc<AtomicBool>,
        closed: Arc<AtomicUsize>,
        thread_name: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl EngineFactory for EndlessFactory {
        async fn create(
            &self,
            _config: &EngineConfig,
            _sink: LogSink,
        ) -> Result<Box<dyn Engine>, EngineError> {
            Ok(Box::new(Endless {
                started: Arc::clone(&self.started),
                closed: Arc::clone(&self.closed),
                thread_name: Arc::clone(&self.thread_name),
            }))
        }
    }

    fn wait_until(flag: &AtomicBool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !flag.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "engine never started");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_shutdown_closes_running_engine_before_returning() {
        let factory = Arc::new(EndlessFactory::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coord = TaskCoordinator::new(factory.clone(), EngineConfig::default(), tx);

        coord.start("never ends").unwrap();
        wait_until(&factory.started);

        assert!(coord.shutdown());
        assert!(coord.is_idle());
        assert!(coord.current().is_none());
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);

        let completion = rx.try_recv().unwrap();
        assert!(completion.result.final_output.contains("ShutdownError"));
    }

    #[test]
    fn test_engine_runs_on_named_worker_thread() {
        let factory = Arc::new(EndlessFactory::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut coord = TaskCoordinator::new(factory.clone(), EngineConfig::default(), tx);

        let id = coord.start("where am I").unwrap().id();
        wait_until(&factory.started);

        let name = factory.thread_name.lock().unwrap().clone();
        assert_eq!(name, Some(format!("agent-{}", id.get())));
        assert!(is_worker_thread(name.as_deref()));
        coord.shutdown();
    }

    #[test]
    fn test_is_worker_thread() {
        assert!(is_worker_thread(Some("agent-12")));
        assert!(!is_worker_thread(Some("main")));
        assert!(!is_worker_thread(None));
    }
}
