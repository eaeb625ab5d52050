//! Boundary to the browser-automation engine.
//!
//! The coordinator only ever sees the [`EngineFactory`] and [`Engine`]
//! traits. A factory is handed the task's [`LogSink`] when it builds an
//! engine, so progress reporting is explicit rather than routed through any
//! global logger registry.

pub mod actions;
#[cfg(feature = "browser")]
mod browser;
pub mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EngineSettings;
use crate::llm::LlmError;
pub use sink::{EngineLogger, Level, LogSink};

#[cfg(feature = "browser")]
pub use browser::BrowserEngineFactory;

/// Failure reported by an engine. `kind` carries the error's type name so it
/// can be shown to the user alongside the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: String,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<LlmError> for EngineError {
    fn from(err: LlmError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOutcome {
    pub result: Option<String>,
}

impl AgentOutcome {
    pub fn with_result(result: impl Into<String>) -> Self {
        Self {
            result: Some(result.into()),
        }
    }

    pub fn final_result(&self) -> Option<&str> {
        self.result.as_deref()
    }
}

/// Resolved per-process engine configuration.
#[derive(Clone)]
pub struct EngineConfig {
    pub model: String,
    pub temperature: f32,
    pub provider_base_url: String,
    /// Name of the environment variable the key was read from.
    pub api_key_env: String,
    pub api_key: Option<String>,
    pub browser_executable: Option<PathBuf>,
    pub headless: bool,
    pub max_steps: u32,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("provider_base_url", &self.provider_base_url)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("browser_executable", &self.browser_executable)
            .field("headless", &self.headless)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings_with_key(&EngineSettings::default(), None)
    }
}

impl EngineConfig {
    /// Build from settings, reading the API key from the configured
    /// environment variable. Called once at start-up.
    pub fn resolve(settings: &EngineSettings) -> Self {
        let api_key = std::env::var(&settings.api_key_env).ok();
        Self::from_settings_with_key(settings, api_key)
    }

    pub fn from_settings_with_key(settings: &EngineSettings, api_key: Option<String>) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            provider_base_url: settings.provider_base_url.clone(),
            api_key_env: settings.api_key_env.clone(),
            api_key,
            browser_executable: settings.browser_executable.clone(),
            headless: settings.headless,
            max_steps: settings.max_steps,
        }
    }
}

/// One live automation session, owned by a single task.
#[async_trait]
pub trait Engine: Send {
    /// Carry out `command`. Runs until the agent finishes or fails.
    async fn run(&mut self, command: &str) -> Result<AgentOutcome, EngineError>;

    /// Release the session. Always attempted once the run is over.
    async fn close(&mut self) -> Result<(), EngineError>;
}

/// Builds a fresh [`Engine`] for every task.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(
        &self,
        config: &EngineConfig,
        sink: LogSink,
    ) -> Result<Box<dyn Engine>, EngineError>;
}

/// Factory used when the crate is built without the `browser` feature.
#[cfg(not(feature = "browser"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEngineFactory;

#[cfg(not(feature = "browser"))]
#[async_trait]
impl EngineFactory for DisabledEngineFactory {
    async fn create(
        &self,
        _config: &EngineConfig,
        _sink: LogSink,
    ) -> Result<Box<dyn Engine>, EngineError> {
        Err(EngineError::new(
            "FeatureDisabled",
            "browser automation requires the 'browser' feature. Build with: cargo build --features browser",
        ))
    }
}

/// The factory the binary uses.
pub fn default_factory() -> Arc<dyn EngineFactory> {
    #[cfg(feature = "browser")]
    {
        Arc::new(BrowserEngineFactory)
    }

    #[cfg(not(feature = "browser"))]
    {
        Arc::new(DisabledEngineFactory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display_includes_kind() {
        let err = EngineError::new("TimeoutError", "no response");
        assert_eq!(err.to_string(), "TimeoutError: no response");
    }

    #[test]
    fn test_llm_error_conversion_keeps_kind() {
        let err: EngineError = LlmError::MissingApiKey("OPENAI_API_KEY".into()).into();
        assert_eq!(err.kind, "MissingApiKeyError");
        assert!(err.message.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = EngineConfig::from_settings_with_key(
            &EngineSettings::default(),
            Some("sk-very-secret".into()),
        );
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_defaults_follow_settings() {
        let config = EngineConfig::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
        assert!(config.api_key.is_none());
        assert!(!config.headless);
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn test_disabled_factory_explains_feature() {
        let (tx, _rx) = crate::log_channel::channel();
        let err = match DisabledEngineFactory
            .create(&EngineConfig::default(), LogSink::new(tx))
            .await
        {
            Err(e) => e,
            Ok(_) => panic!("disabled factory must not build an engine"),
        };
        assert_eq!(err.kind, "FeatureDisabled");
    }
}
