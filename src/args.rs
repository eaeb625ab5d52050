use crate::config::Config;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

const CONFIG_FILE: &str = "config.toml";

// Command-line flags. Each one overrides the matching config.toml entry.
//   -c / --config      Path to a config.toml file
//   --settings-dir     Root state directory override
//   --model            Model identifier
//   --headless         Run the browser without a window
//   --no-password      Skip the password gate
//   --no-color         Disable coloured terminal output
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "browsepilot",
    version,
    about = "Drive a browser agent from the terminal and watch it work"
)]
pub struct Args {
    /// Path to a config.toml file
    #[arg(short = 'c', long, value_name = "PATH", env = "BROWSEPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Settings directory (default: ~/.browsepilot)
    #[arg(long, value_name = "DIR", env = "BROWSEPILOT_SETTINGS_DIR")]
    pub settings_dir: Option<PathBuf>,

    /// Model identifier (e.g. gpt-4o)
    #[arg(long, value_name = "MODEL", env = "BROWSEPILOT_MODEL")]
    pub model: Option<String>,

    /// Run the browser without a visible window
    #[arg(long, action = ArgAction::SetTrue)]
    pub headless: bool,

    /// Skip the password prompt even if a password is configured
    #[arg(long = "no-password", action = ArgAction::SetTrue)]
    pub no_password: bool,

    /// Disable coloured terminal output
    #[arg(long = "no-color", action = ArgAction::SetTrue, env = "NO_COLOR")]
    pub no_color: bool,
}

impl Args {
    /// Where to read configuration from, if not the default location.
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(config) = &self.config {
            return Some(config.clone());
        }
        self.settings_dir.as_ref().map(|dir| dir.join(CONFIG_FILE))
    }

    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(settings_dir) = &self.settings_dir {
            config.settings_dir = settings_dir.clone();
        }

        if let Some(model) = &self.model {
            config.engine.model = model.clone();
        }

        if self.headless {
            config.engine.headless = true;
        }

        if self.no_password {
            config.password = None;
        }
    }
}
