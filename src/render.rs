//! On-screen state and the surface the poller renders into.
//!
//! The poller only talks to [`RenderSurface`]. The TUI implements it on top of
//! [`RenderState`]; tests use `RenderState` directly.

use std::time::{Duration, Instant};

/// Log pane contents before the first task.
pub const LOG_PLACEHOLDER: &str = "AI Agent ready. Waiting for command.";
/// Output pane contents before the first task.
pub const OUTPUT_PLACEHOLDER: &str = "No task performed yet.";
/// Output pane contents while a task runs.
pub const OUTPUT_PROCESSING: &str = "Processing...";
pub const BUSY_NOTICE: &str = "Busy: Agent is currently processing a command. Please wait.";

/// How long a notice stays on screen.
pub const NOTICE_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{pane} pane unavailable: {reason}")]
    Unavailable { pane: PaneId, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum PaneId {
    #[strum(to_string = "log")]
    Log,
    #[strum(to_string = "chat")]
    Chat,
    #[strum(to_string = "output")]
    Output,
    #[strum(to_string = "input")]
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Busy,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub text: String,
}

impl ChatEntry {
    /// `You: …` / `AI: …`
    pub fn line(&self) -> String {
        format!("{}: {}", self.role.prefix(), self.text)
    }
}

/// Operations the poller performs on the visible UI.
pub trait RenderSurface {
    fn append_log(&mut self, lines: &[String]) -> Result<(), RenderError>;
    fn clear_log(&mut self) -> Result<(), RenderError>;
    fn append_chat(&mut self, role: ChatRole, text: &str) -> Result<(), RenderError>;
    fn set_output(&mut self, text: &str) -> Result<(), RenderError>;
    fn clear_input(&mut self) -> Result<(), RenderError>;
    fn set_input_enabled(&mut self, enabled: bool) -> Result<(), RenderError>;
    fn notify(&mut self, kind: NoticeKind, text: &str);
}

/// Everything the panes display. Owned by the controlling thread.
#[derive(Debug, Clone)]
pub struct RenderState {
    pub log_lines: Vec<String>,
    pub chat: Vec<ChatEntry>,
    pub output: String,
    pub input_enabled: bool,
    notice: Option<(Notice, Instant)>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            log_lines: vec![LOG_PLACEHOLDER.to_string()],
            chat: Vec::new(),
            output: OUTPUT_PLACEHOLDER.to_string(),
            input_enabled: true,
            notice: None,
        }
    }
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current notice, unless it has expired.
    pub fn notice(&self) -> Option<&Notice> {
        self.notice
            .as_ref()
            .filter(|(_, expires)| Instant::now() < *expires)
            .map(|(notice, _)| notice)
    }

    /// Drop an expired notice. Returns whether anything changed.
    pub fn expire_notice(&mut self) -> bool {
        match &self.notice {
            Some((_, expires)) if Instant::now() >= *expires => {
                self.notice = None;
                true
            }
            _ => false,
        }
    }

    pub fn chat_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.chat.iter().map(ChatEntry::line)
    }
}

impl RenderSurface for RenderState {
    fn append_log(&mut self, lines: &[String]) -> Result<(), RenderError> {
        self.log_lines.extend(lines.iter().cloned());
        Ok(())
    }

    fn clear_log(&mut self) -> Result<(), RenderError> {
        self.log_lines.clear();
        Ok(())
    }

    fn append_chat(&mut self, role: ChatRole, text: &str) -> Result<(), RenderError> {
        self.chat.push(ChatEntry {
            role,
            text: text.to_string(),
        });
        Ok(())
    }

    fn set_output(&mut self, text: &str) -> Result<(), RenderError> {
        self.output = text.to_string();
        Ok(())
    }

    /// The text itself belongs to the input widget; nothing is kept here.
    fn clear_input(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    fn set_input_enabled(&mut self, enabled: bool) -> Result<(), RenderError> {
        self.input_enabled = enabled;
        Ok(())
    }

    fn notify(&mut self, kind: NoticeKind, text: &str) {
        self.notice = Some((
            Notice {
                kind,
                text: text.to_string(),
            },
            Instant::now() + NOTICE_TTL,
        ));
    }
}
