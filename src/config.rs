use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding config.toml and logs/
    pub settings_dir: PathBuf,
    /// Passphrase checked before the UI starts. `None` disables the gate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub engine: EngineSettings,
    pub ui: UiSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub provider_base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Environment variable holding the API key
    pub api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_executable: Option<PathBuf>,
    pub headless: bool,
    pub max_steps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub poll_interval_ms: u64,
    pub drain_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings_dir: default_settings_dir(),
            password: None,
            engine: EngineSettings::default(),
            ui: UiSettings::default(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            provider_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            api_key_env: "OPENAI_API_KEY".to_string(),
            browser_executable: None,
            headless: false,
            max_steps: 25,
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            drain_batch: 10,
        }
    }
}

impl UiSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_settings_dir() -> PathBuf {
    let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home_dir.join(".browsepilot")
}

impl Config {
    /// Load configuration from `path`, or from `~/.browsepilot/config.toml`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(|| default_settings_dir().join(CONFIG_FILE));

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to `path`, or to `<settings_dir>/config.toml`.
    pub fn save(&self, path: Option<PathBuf>) -> Result<()> {
        let config_path = path.unwrap_or_else(|| self.settings_dir.join(CONFIG_FILE));

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("writing {}", config_path.display()))?;
        Ok(())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.settings_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.engine, EngineSettings::default());
        assert_eq!(config.ui.poll_interval_ms, 100);
        assert_eq!(config.ui.drain_batch, 10);
        assert!(config.password.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = Config {
            settings_dir: dir.path().to_path_buf(),
            password: Some("open sesame".into()),
            ..Config::default()
        };
        config.engine.model = "gpt-4o-mini".into();
        config.engine.headless = true;
        config.ui.drain_batch = 25;
        config.save(Some(path.clone())).unwrap();

        let loaded = Config::load(Some(path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[engine]\nmodel = \"local-llama\"\n").unwrap();

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.engine.model, "local-llama");
        assert_eq!(config.engine.max_steps, 25);
        assert_eq!(config.ui, UiSettings::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "engine = [").unwrap();
        let err = Config::load(Some(path)).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let ui = UiSettings {
            poll_interval_ms: 0,
            drain_batch: 10,
        };
        assert_eq!(ui.poll_interval(), Duration::from_millis(1));
    }
}
