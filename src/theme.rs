//! Terminal colours for the CLI messages and the TUI panes.
//!
//! Respects the `NO_COLOR` env-var and the `--no-color` CLI flag.
//!
//! | Token   | Hex       | Usage                               |
//! |---------|-----------|-------------------------------------|
//! | accent  | `#3DB2FF` | pane titles, focused borders        |
//! | info    | `#7FC8F8` | informational values, INFO lines    |
//! | success | `#2FBF71` | success states, finished markers    |
//! | warn    | `#FFB020` | warnings, busy notice               |
//! | error   | `#E23D2D` | errors, failure markers             |
//! | muted   | `#8B8F99` | de-emphasis, hints                  |

use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Global color toggle ─────────────────────────────────────────────────────

static COLOR_DISABLED: AtomicBool = AtomicBool::new(false);

pub fn disable_color() {
    COLOR_DISABLED.store(true, Ordering::Relaxed);
    colored::control::set_override(false);
}

/// Call once at startup with the `--no-color` flag.
pub fn init_color(no_color_flag: bool) {
    if no_color_flag
        || std::env::var("NO_COLOR")
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    {
        disable_color();
    }
}

fn is_color() -> bool {
    !COLOR_DISABLED.load(Ordering::Relaxed)
}

pub mod palette {
    pub const ACCENT: (u8, u8, u8) = (0x3D, 0xB2, 0xFF);
    pub const INFO: (u8, u8, u8) = (0x7F, 0xC8, 0xF8);
    pub const SUCCESS: (u8, u8, u8) = (0x2F, 0xBF, 0x71);
    pub const WARN: (u8, u8, u8) = (0xFF, 0xB0, 0x20);
    pub const ERROR: (u8, u8, u8) = (0xE2, 0x3D, 0x2D);
    pub const MUTED: (u8, u8, u8) = (0x8B, 0x8F, 0x99);
}

fn apply(text: &str, rgb: (u8, u8, u8)) -> String {
    if is_color() {
        text.truecolor(rgb.0, rgb.1, rgb.2).to_string()
    } else {
        text.to_string()
    }
}

pub fn accent(text: &str) -> String {
    apply(text, palette::ACCENT)
}

pub fn info(text: &str) -> String {
    apply(text, palette::INFO)
}

pub fn success(text: &str) -> String {
    apply(text, palette::SUCCESS)
}

pub fn warn(text: &str) -> String {
    apply(text, palette::WARN)
}

pub fn error(text: &str) -> String {
    apply(text, palette::ERROR)
}

pub fn muted(text: &str) -> String {
    apply(text, palette::MUTED)
}

/// Green ✓
pub fn icon_ok(label: &str) -> String {
    format!("{} {}", success("✓"), label)
}

/// Red ✗
pub fn icon_fail(label: &str) -> String {
    format!("{} {}", error("✗"), label)
}

/// Yellow ⚠
pub fn icon_warn(label: &str) -> String {
    format!("{} {}", warn("⚠"), label)
}

/// Severity of a log-pane line, read from its level column or marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTone {
    Plain,
    Info,
    Success,
    Warn,
    Error,
}

pub fn line_tone(line: &str) -> LineTone {
    if line.starts_with("--- AGENT TASK FAILED") {
        LineTone::Error
    } else if line.starts_with("--- AGENT TASK FINISHED") {
        LineTone::Success
    } else if line.starts_with("ERROR") || line.starts_with("FATAL") {
        LineTone::Error
    } else if line.starts_with("WARNING") {
        LineTone::Warn
    } else if line.starts_with("INFO") {
        LineTone::Info
    } else {
        LineTone::Plain
    }
}


// ── Ratatui palette ─────────────────────────────────────────────────────────

#[cfg(feature = "tui")]
pub mod tui_palette {
    use ratatui::style::{Color, Modifier, Style};

    use super::{LineTone, palette};

    const fn rgb(c: (u8, u8, u8)) -> Color {
        Color::Rgb(c.0, c.1, c.2)
    }

    pub const ACCENT: Color = rgb(palette::ACCENT);
    pub const INFO: Color = rgb(palette::INFO);
    pub const SUCCESS: Color = rgb(palette::SUCCESS);
    pub const WARN: Color = rgb(palette::WARN);
    pub const ERROR: Color = rgb(palette::ERROR);
    pub const MUTED: Color = rgb(palette::MUTED);

    pub const SURFACE: Color = Color::Rgb(0x12, 0x14, 0x18);
    pub const SURFACE_RAISED: Color = Color::Rgb(0x1E, 0x21, 0x27);
    pub const BORDER: Color = Color::Rgb(0x3C, 0x40, 0x48);
    pub const TEXT: Color = Color::Rgb(0xEE, 0xEE, 0xEE);
    pub const TEXT_DIM: Color = Color::Rgb(0x82, 0x86, 0x8E);

    pub const fn pane_border() -> Style {
        Style::new().fg(BORDER)
    }

    pub const fn focused_border() -> Style {
        Style::new().fg(ACCENT)
    }

    pub const fn pane_title() -> Style {
        Style::new().fg(ACCENT).add_modifier(Modifier::BOLD)
    }

    pub const fn prompt_active() -> Style {
        Style::new().fg(ACCENT).add_modifier(Modifier::BOLD)
    }

    /// Input bar while a task runs.
    pub const fn prompt_inactive() -> Style {
        Style::new().fg(TEXT_DIM).add_modifier(Modifier::DIM)
    }

    pub const fn hint() -> Style {
        Style::new().fg(MUTED)
    }

    pub const fn user_message() -> Style {
        Style::new().fg(ACCENT)
    }

    pub const fn assistant_message() -> Style {
        Style::new().fg(TEXT)
    }

    pub const fn body() -> Style {
        Style::new().fg(TEXT)
    }

    pub const fn log_line(tone: LineTone) -> Style {
        match tone {
            LineTone::Plain => Style::new().fg(TEXT_DIM),
            LineTone::Info => Style::new().fg(TEXT),
            LineTone::Success => Style::new().fg(SUCCESS).add_modifier(Modifier::BOLD),
            LineTone::Warn => Style::new().fg(WARN),
            LineTone::Error => Style::new().fg(ERROR).add_modifier(Modifier::BOLD),
        }
    }

    pub const fn notice_busy() -> Style {
        Style::new().fg(WARN).add_modifier(Modifier::BOLD)
    }

    pub const fn notice_info() -> Style {
        Style::new().fg(INFO)
    }

    pub const fn notice_error() -> Style {
        Style::new().fg(ERROR).add_modifier(Modifier::BOLD)
    }
}
