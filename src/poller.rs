//! The UI side of a task: submission guard, periodic log draining and the
//! completion handler.
//!
//! Nothing here blocks. The owning loop asks [`Poller::deadline`] when the
//! next drain is due and calls [`Poller::drain_cycle`] once it passes;
//! completion messages go to [`Poller::on_task_complete`].

use std::time::Duration;

use tokio::time::Instant;

use crate::config::UiSettings;
use crate::coordinator::{StartError, TaskCompletion, TaskCoordinator, TaskId};
use crate::render::{
    BUSY_NOTICE, ChatRole, NoticeKind, OUTPUT_PROCESSING, RenderError, RenderSurface,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub poll_interval: Duration,
    /// Lines applied per drain cycle.
    pub batch_size: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            batch_size: 10,
        }
    }
}

impl From<&UiSettings> for PollConfig {
    fn from(ui: &UiSettings) -> Self {
        Self {
            poll_interval: ui.poll_interval(),
            batch_size: ui.drain_batch.max(1),
        }
    }
}

/// How a submission was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Started(TaskId),
    /// Empty command; nothing happened.
    Ignored,
    /// A task is active; the busy notice was shown.
    Busy,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct Poller {
    config: PollConfig,
    next_drain: Option<Instant>,
}

impl Poller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            next_drain: None,
        }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// When the next drain cycle is due, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.next_drain
    }

    pub fn is_armed(&self) -> bool {
        self.next_drain.is_some()
    }

    pub fn cancel(&mut self) {
        self.next_drain = None;
    }

    fn arm(&mut self) {
        self.next_drain = Some(Instant::now() + self.config.poll_interval);
    }

    /// Handle the user pressing Enter.
    pub fn submit<S: RenderSurface + ?Sized>(
        &mut self,
        coordinator: &mut TaskCoordinator,
        surface: &mut S,
        command: &str,
    ) -> SubmitOutcome {
        if !coordinator.is_idle() {
            surface.notify(NoticeKind::Busy, BUSY_NOTICE);
            return SubmitOutcome::Busy;
        }
        let command = command.trim();
        if command.is_empty() {
            return SubmitOutcome::Ignored;
        }

        apply("clear input", surface.clear_input());
        apply("append chat", surface.append_chat(ChatRole::User, command));
        apply("clear log", surface.clear_log());
        apply("set output", surface.set_output(OUTPUT_PROCESSING));
        apply("disable input", surface.set_input_enabled(false));

        let id = match coordinator.start(command) {
            Ok(task) => task.id(),
            Err(StartError::Busy) => {
                apply("enable input", surface.set_input_enabled(true));
                surface.notify(NoticeKind::Busy, BUSY_NOTICE);
                return SubmitOutcome::Busy;
            }
            Err(StartError::EmptyCommand) => {
                apply("enable input", surface.set_input_enabled(true));
                return SubmitOutcome::Ignored;
            }
            Err(e @ StartError::Spawn(_)) => {
                let message = e.to_string();
                apply("set output", surface.set_output(&format!("Failed.\n{message}")));
                apply("enable input", surface.set_input_enabled(true));
                surface.notify(NoticeKind::Error, &message);
                return SubmitOutcome::Failed(message);
            }
        };

        self.drain_cycle(coordinator, surface);
        SubmitOutcome::Started(id)
    }

    /// Apply one bounded batch of queued log lines. Re-arms only while the
    /// task is still running. Returns how many lines were applied.
    pub fn drain_cycle<S: RenderSurface + ?Sized>(
        &mut self,
        coordinator: &mut TaskCoordinator,
        surface: &mut S,
    ) -> usize {
        self.next_drain = None;

        let lines = coordinator.drain(self.config.batch_size);
        if !lines.is_empty() {
            apply("append log", surface.append_log(&lines));
        }

        if coordinator.is_running() {
            self.arm();
        }
        lines.len()
    }

    /// Finish a task. Returns `false` when the completion was not for the
    /// running task and was ignored.
    pub fn on_task_complete<S: RenderSurface + ?Sized>(
        &mut self,
        coordinator: &mut TaskCoordinator,
        surface: &mut S,
        completion: TaskCompletion,
    ) -> bool {
        let Some(result) = coordinator.begin_completion(completion) else {
            return false;
        };

        self.cancel();

        let rest = coordinator.drain_all();
        if !rest.is_empty() {
            apply("append log", surface.append_log(&rest));
        }

        apply(
            "append chat",
            surface.append_chat(ChatRole::Assistant, &result.chat_response),
        );
        apply("set output", surface.set_output(&result.final_output));
        apply("enable input", surface.set_input_enabled(true));

        coordinator.finish();
        true
    }

    /// Cancel the pending drain and stop any running task.
    pub fn shutdown(&mut self, coordinator: &mut TaskCoordinator) {
        self.cancel();
        coordinator.shutdown();
    }
}

fn apply(op: &str, result: Result<(), RenderError>) {
    if let Err(e) = result {
        tracing::error!(op, error = %e, "Render operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AgentOutcome, Engine, EngineConfig, EngineError, EngineFactory, LogSink};
    use crate::render::{OUTPUT_PLACEHOLDER, PaneId, RenderState};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Echo;

    #[async_trait]
    impl Engine for Echo {
        async fn run(&mut self, command: &str) -> Result<AgentOutcome, EngineError> {
            Ok(AgentOutcome::with_result(command.to_uppercase()))
        }

        async fn close(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct EchoFactory;

    #[async_trait]
    impl EngineFactory for EchoFactory {
        async fn create(
            &self,
            _config: &EngineConfig,
            _sink: LogSink,
        ) -> Result<Box<dyn Engine>, EngineError> {
            Ok(Box::new(Echo))
        }
    }

    fn setup() -> (TaskCoordinator, mpsc::UnboundedReceiver<TaskCompletion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            TaskCoordinator::new(Arc::new(EchoFactory), EngineConfig::default(), tx),
            rx,
        )
    }

    #[test]
    fn test_poll_config_from_settings() {
        let ui = UiSettings {
            poll_interval_ms: 250,
            drain_batch: 0,
        };
        let config = PollConfig::from(&ui);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.batch_size, 1);
        assert_eq!(PollConfig::default().batch_size, 10);
    }

    #[test]
    fn test_empty_submit_is_silent() {
        let (mut coord, _rx) = setup();
        let mut state = RenderState::new();
        let mut poller = Poller::default();

        assert_eq!(poller.submit(&mut coord, &mut state, "  \t "), SubmitOutcome::Ignored);
        assert!(state.chat.is_empty());
        assert_eq!(state.output, OUTPUT_PLACEHOLDER);
        assert!(state.notice().is_none());
        assert!(coord.is_idle());
    }

    #[tokio::test]
    async fn test_submit_then_complete() {
        let (mut coord, mut rx) = setup();
        let mut state = RenderState::new();
        let mut poller = Poller::default();

        let outcome = poller.submit(&mut coord, &mut state, "hello");
        assert!(matches!(outcome, SubmitOutcome::Started(_)));
        assert!(!state.input_enabled);
        assert_eq!(state.output, OUTPUT_PROCESSING);
        assert_eq!(state.chat_lines().next().as_deref(), Some("You: hello"));

        assert_eq!(poller.submit(&mut coord, &mut state, "again"), SubmitOutcome::Busy);
        assert_eq!(state.notice().map(|n| n.text.as_str()), Some(BUSY_NOTICE));

        let completion = rx.recv().await.unwrap();
        assert!(poller.on_task_complete(&mut coord, &mut state, completion));

        assert!(coord.is_idle());
        assert!(!poller.is_armed());
        assert!(state.input_enabled);
        assert_eq!(state.output, "HELLO");
        assert_eq!(state.chat_lines().last().as_deref(), Some("AI: Task completed."));
        assert_eq!(
            state.log_lines.first().map(String::as_str),
            Some("INFO     [system] Agent process starting...")
        );
    }

    #[test]
    fn test_drain_cycle_idle_does_not_arm() {
        let (mut coord, _rx) = setup();
        let mut state = RenderState::new();
        let mut poller = Poller::default();
        assert_eq!(poller.drain_cycle(&mut coord, &mut state), 0);
        assert!(!poller.is_armed());
    }

    /// Surface whose output pane has gone away.
    struct BrokenOutput(RenderState);

    impl RenderSurface for BrokenOutput {
        fn append_log(&mut self, lines: &[String]) -> Result<(), RenderError> {
            self.0.append_log(lines)
        }
        fn clear_log(&mut self) -> Result<(), RenderError> {
            self.0.clear_log()
        }
        fn append_chat(&mut self, role: ChatRole, text: &str) -> Result<(), RenderError> {
            self.0.append_chat(role, text)
        }
        fn set_output(&mut self, _text: &str) -> Result<(), RenderError> {
            Err(RenderError::Unavailable {
                pane: PaneId::Output,
                reason: "destroyed".into(),
            })
        }
        fn clear_input(&mut self) -> Result<(), RenderError> {
            self.0.clear_input()
        }
        fn set_input_enabled(&mut self, enabled: bool) -> Result<(), RenderError> {
            self.0.set_input_enabled(enabled)
        }
        fn notify(&mut self, kind: NoticeKind, text: &str) {
            self.0.notify(kind, text)
        }
    }

    #[tokio::test]
    async fn test_render_failure_still_returns_to_idle() {
        let (mut coord, mut rx) = setup();
        let mut surface = BrokenOutput(RenderState::new());
        let mut poller = Poller::default();

        poller.submit(&mut coord, &mut surface, "go");
        let completion = rx.recv().await.unwrap();
        assert!(poller.on_task_complete(&mut coord, &mut surface, completion));

        assert!(coord.is_idle());
        assert!(surface.0.input_enabled);
        assert_eq!(surface.0.chat_lines().last().as_deref(), Some("AI: Task completed."));
    }
}
