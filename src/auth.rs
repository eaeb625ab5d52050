//! Start-up password gate.
//!
//! A plain passphrase compared against `password` in config.toml. It keeps a
//! casual passer-by out of the UI and nothing more.

use crate::theme as t;

pub const PROMPT: &str = "Enter Password: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No gate configured, or the entry matched.
    Granted,
    Denied,
    /// Empty entry or the prompt was aborted.
    Cancelled,
}

impl AuthOutcome {
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }

    /// Process exit code when the UI does not start.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Granted | Self::Cancelled => 0,
            Self::Denied => 1,
        }
    }

    pub fn message(self) -> Option<&'static str> {
        match self {
            Self::Granted => None,
            Self::Denied => Some("Incorrect Password"),
            Self::Cancelled => Some("Login cancelled."),
        }
    }
}

/// Compare an entry against the configured passphrase.
pub fn check(expected: Option<&str>, entered: Option<&str>) -> AuthOutcome {
    let Some(expected) = expected else {
        return AuthOutcome::Granted;
    };
    match entered.map(|s| s.trim_end_matches(['\r', '\n'])) {
        None | Some("") => AuthOutcome::Cancelled,
        Some(entry) if entry == expected => AuthOutcome::Granted,
        Some(_) => AuthOutcome::Denied,
    }
}

/// Prompt on the terminal (without echo) when a passphrase is configured.
pub fn authenticate(expected: Option<&str>) -> AuthOutcome {
    if expected.is_none() {
        return AuthOutcome::Granted;
    }
    let entered = match rpassword::prompt_password(format!("{} {}", t::info("🔑"), PROMPT)) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::debug!(error = %e, "Password prompt aborted");
            None
        }
    };
    let outcome = check(expected, entered.as_deref());
    tracing::info!(outcome = ?outcome, "Password gate");
    outcome
}
