//! The interactive shell: one loop multiplexing terminal events, worker
//! completions and the log-drain timer.

use std::sync::Arc;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::layout::{Constraint, Layout, Rect};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::action::Action;
use crate::config::Config;
use crate::coordinator::{TaskCompletion, TaskCoordinator};
use crate::engine::{EngineConfig, EngineFactory};
use crate::panes::{
    Pane, chat::ChatPane, footer::FooterPane, input::InputPane, logs::LogsPane,
    output::OutputPane,
};
use crate::poller::{PollConfig, Poller, SubmitOutcome};
use crate::render::{ChatRole, NoticeKind, RenderError, RenderState, RenderSurface};
use crate::tui::{Event, Frame, Tui};

/// What woke the loop up.
enum Step {
    Event(Option<Event>),
    Complete(TaskCompletion),
    Drain,
}

/// [`RenderState`] plus the pane-local state that has to follow it.
struct UiSurface<'a> {
    state: &'a mut RenderState,
    input: &'a mut InputPane,
    logs: &'a mut LogsPane,
}

impl<'a> UiSurface<'a> {
    fn new(state: &'a mut RenderState, input: &'a mut InputPane, logs: &'a mut LogsPane) -> Self {
        Self { state, input, logs }
    }
}

impl RenderSurface for UiSurface<'_> {
    fn append_log(&mut self, lines: &[String]) -> Result<(), RenderError> {
        self.state.append_log(lines)
    }

    fn clear_log(&mut self) -> Result<(), RenderError> {
        self.logs.follow();
        self.state.clear_log()
    }

    fn append_chat(&mut self, role: ChatRole, text: &str) -> Result<(), RenderError> {
        self.state.append_chat(role, text)
    }

    fn set_output(&mut self, text: &str) -> Result<(), RenderError> {
        self.state.set_output(text)
    }

    fn clear_input(&mut self) -> Result<(), RenderError> {
        self.input.reset();
        self.state.clear_input()
    }

    fn set_input_enabled(&mut self, enabled: bool) -> Result<(), RenderError> {
        self.state.set_input_enabled(enabled)
    }

    fn notify(&mut self, kind: NoticeKind, text: &str) {
        self.state.notify(kind, text);
    }
}

pub struct App {
    coordinator: TaskCoordinator,
    completions: mpsc::UnboundedReceiver<TaskCompletion>,
    poller: Poller,
    state: RenderState,
    logs: LogsPane,
    chat: ChatPane,
    input: InputPane,
    output: OutputPane,
    footer: FooterPane,
    action_tx: mpsc::UnboundedSender<Action>,
    action_rx: mpsc::UnboundedReceiver<Action>,
    should_quit: bool,
}

impl App {
    pub fn new(config: &Config, engine_config: EngineConfig, factory: Arc<dyn EngineFactory>) -> Self {
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        Self {
            coordinator: TaskCoordinator::new(factory, engine_config, completion_tx),
            completions,
            poller: Poller::new(PollConfig::from(&config.ui)),
            state: RenderState::new(),
            logs: LogsPane::new(),
            chat: ChatPane::new(),
            input: InputPane::new(),
            output: OutputPane::new(),
            footer: FooterPane::new(),
            action_tx,
            action_rx,
            should_quit: false,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut tui = Tui::new()?;
        tui.enter()?;
        tracing::info!("Terminal UI started");

        loop {
            let step = tokio::select! {
                ev = tui.next() => Step::Event(ev),
                Some(completion) = self.completions.recv() => Step::Complete(completion),
                _ = drain_deadline(self.poller.deadline()) => Step::Drain,
            };

            match step {
                Step::Event(None) => {
                    tracing::warn!("Terminal event stream closed");
                    self.should_quit = true;
                }
                Step::Event(Some(event)) => {
                    if let Some(action) = self.handle_event(event) {
                        self.action_tx.send(action)?;
                    }
                }
                Step::Complete(completion) => {
                    let task = completion.task_id;
                    let mut surface =
                        UiSurface::new(&mut self.state, &mut self.input, &mut self.logs);
                    if self
                        .poller
                        .on_task_complete(&mut self.coordinator, &mut surface, completion)
                    {
                        tracing::info!(task = %task, "Task finished");
                    }
                }
                Step::Drain => {
                    let mut surface =
                        UiSurface::new(&mut self.state, &mut self.input, &mut self.logs);
                    self.poller.drain_cycle(&mut self.coordinator, &mut surface);
                }
            }

            while let Ok(action) = self.action_rx.try_recv() {
                self.dispatch(action, &mut tui)?;
            }

            if self.should_quit {
                break;
            }
        }

        // Hand the terminal back first; closing a running engine can take a moment.
        tui.exit()?;
        self.poller.shutdown(&mut self.coordinator);
        tracing::info!("Terminal UI stopped");
        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> Option<Action> {
        match event {
            Event::Tick => Some(Action::Tick),
            Event::Render => Some(Action::Render),
            Event::Resize(w, h) => Some(Action::Resize(w, h)),
            Event::Key(key) => self.handle_key(key),
            Event::Paste(text) => {
                self.input.paste(&text, &self.state);
                None
            }
            Event::Error => None,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Esc => Some(Action::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::PageUp => Some(Action::ScrollLogsUp),
            KeyCode::PageDown => Some(Action::ScrollLogsDown),
            KeyCode::End if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::FollowLogs)
            }
            _ => self.input.handle_key_events(key, &self.state),
        }
    }

    fn dispatch(&mut self, action: Action, tui: &mut Tui) -> Result<()> {
        match &action {
            Action::Quit => self.should_quit = true,
            Action::Render => self.draw(tui)?,
            Action::Resize(w, h) => {
                tui.terminal.resize(Rect::new(0, 0, *w, *h))?;
                self.draw(tui)?;
            }
            Action::Tick => {
                self.state.expire_notice();
            }
            Action::Submit(command) => self.submit(command),
            _ => {}
        }
        self.logs.update(&action, &self.state);
        self.footer.update(&action, &self.state);
        Ok(())
    }

    fn submit(&mut self, command: &str) {
        let mut surface = UiSurface::new(&mut self.state, &mut self.input, &mut self.logs);
        match self.poller.submit(&mut self.coordinator, &mut surface, command) {
            SubmitOutcome::Started(id) => tracing::debug!(task = %id, "Submitted command"),
            SubmitOutcome::Busy => tracing::debug!("Command rejected while busy"),
            SubmitOutcome::Failed(reason) => tracing::error!(%reason, "Could not start task"),
            SubmitOutcome::Ignored => {}
        }
    }

    fn draw(&mut self, tui: &mut Tui) -> Result<()> {
        tui.draw(|frame| self.render(frame))
    }

    fn render(&mut self, frame: &mut Frame<'_>) {
        let [body, footer] =
            Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());
        let [logs, chat_column, output] = Layout::horizontal([
            Constraint::Percentage(40),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
        ])
        .areas(body);
        let [chat, input] =
            Layout::vertical([Constraint::Min(3), Constraint::Length(3)]).areas(chat_column);

        self.logs.draw(frame, logs, &self.state);
        self.chat.draw(frame, chat, &self.state);
        self.input.draw(frame, input, &self.state);
        self.output.draw(frame, output, &self.state);
        self.footer.draw(frame, footer, &self.state);
    }
}

/// Resolves at the poller's deadline; never while it is disarmed.
async fn drain_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
