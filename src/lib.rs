#[cfg(feature = "tui")]
pub mod action;
#[cfg(feature = "tui")]
pub mod app;
pub mod args;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod llm;
pub mod log_channel;
pub mod logging;
#[cfg(feature = "tui")]
pub mod panes;
pub mod poller;
pub mod render;
pub mod theme;
#[cfg(feature = "tui")]
pub mod tui;
mod worker;

// Re-export the task lifecycle types at crate root for convenience
pub use coordinator::{StartError, TaskCompletion, TaskCoordinator, TaskId, TaskPhase, TaskResult};
pub use engine::{AgentOutcome, Engine, EngineConfig, EngineError, EngineFactory};
pub use poller::{PollConfig, Poller, SubmitOutcome};
pub use render::{RenderState, RenderSurface};
