use strum::Display;

/// Actions that drive the application.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Action {
    Tick,
    Render,
    Resize(u16, u16),
    Quit,
    /// Enter pressed; carries the input bar contents.
    Submit(String),
    ScrollLogsUp,
    ScrollLogsDown,
    /// Jump the log pane back to the newest line.
    FollowLogs,
    Noop,
}
