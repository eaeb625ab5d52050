//! Terminal setup and the crossterm event pump.
//!
//! `Tui` owns the ratatui terminal. `enter` switches to raw mode and the
//! alternate screen and starts a task that turns crossterm input plus two
//! timers into [`Event`]s; `exit` (or drop) undoes all of it.

use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    cursor,
    event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::coordinator::is_worker_thread;

pub type Frame<'a> = ratatui::Frame<'a>;

/// Ticks per second (notice expiry, spinner).
const TICK_RATE: f64 = 4.0;
/// Render events per second.
const FRAME_RATE: f64 = 30.0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Error,
    Tick,
    Render,
    Key(KeyEvent),
    Paste(String),
    Resize(u16, u16),
}

pub struct Tui {
    pub terminal: ratatui::Terminal<CrosstermBackend<Stdout>>,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    event_rx: mpsc::UnboundedReceiver<Event>,
    event_tx: mpsc::UnboundedSender<Event>,
    entered: bool,
}

impl Tui {
    pub fn new() -> Result<Self> {
        let terminal = ratatui::Terminal::new(CrosstermBackend::new(io::stdout()))
            .context("creating terminal")?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            terminal,
            task: None,
            cancel: CancellationToken::new(),
            event_rx,
            event_tx,
            entered: false,
        })
    }

    fn start(&mut self) {
        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let tx = self.event_tx.clone();
        let tick_delay = Duration::from_secs_f64(1.0 / TICK_RATE);
        let render_delay = Duration::from_secs_f64(1.0 / FRAME_RATE);

        self.task = Some(tokio::spawn(async move {
            let mut reader = EventStream::new();
            let mut tick = tokio::time::interval(tick_delay);
            let mut render = tokio::time::interval(render_delay);
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe = reader.next() => match maybe {
                        Some(Ok(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => {
                            Event::Key(key)
                        }
                        Some(Ok(CrosstermEvent::Resize(w, h))) => Event::Resize(w, h),
                        Some(Ok(CrosstermEvent::Paste(text))) => Event::Paste(text),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Terminal event error");
                            Event::Error
                        }
                        None => break,
                    },
                    _ = tick.tick() => Event::Tick,
                    _ = render.tick() => Event::Render,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn enter(&mut self) -> Result<()> {
        enable_raw_mode().context("enabling raw mode")?;
        execute!(io::stdout(), EnterAlternateScreen, cursor::Hide)
            .context("entering alternate screen")?;
        self.entered = true;
        self.start();
        Ok(())
    }

    pub fn exit(&mut self) -> Result<()> {
        self.stop();
        if self.entered {
            self.entered = false;
            self.terminal.flush()?;
            execute!(io::stdout(), LeaveAlternateScreen, cursor::Show)?;
            disable_raw_mode()?;
        }
        Ok(())
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.event_rx.recv().await
    }

    pub fn draw(&mut self, f: impl FnOnce(&mut Frame<'_>)) -> Result<()> {
        self.terminal.draw(f)?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        if let Err(e) = self.exit() {
            tracing::warn!(error = %e, "Failed to restore terminal");
        }
    }
}

/// Put the terminal back without a `Tui` at hand (panic hook).
pub fn restore_terminal() {
    let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
    let _ = disable_raw_mode();
}

/// Install the process panic hook: a panic on the UI side restores the
/// terminal and then runs the default hook.
pub fn install_panic_hook() {
    install_panic_hook_with(restore_terminal);
}

/// Same as [`install_panic_hook`] with a custom terminal-restore step.
///
/// Worker panics are recovered by the worker itself, so they are only
/// logged; the terminal stays in raw mode and nothing is printed over the UI.
pub fn install_panic_hook_with(restore: impl Fn() + Send + Sync + 'static) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        if is_worker_thread(thread.name()) {
            tracing::error!(thread = thread.name(), panic = %info, "Worker thread panicked");
            return;
        }
        restore();
        tracing::error!(panic = %info, "Panic");
        default_hook(info);
    }));
}
