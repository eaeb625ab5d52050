pub mod chat;
pub mod footer;
pub mod input;
pub mod logs;
pub mod output;

use crossterm::event::KeyEvent;
use ratatui::{
    text::Line,
    widgets::{Block, BorderType, Borders},
};
use unicode_width::UnicodeWidthStr;

use crate::action::Action;
use crate::render::RenderState;
use crate::theme::tui_palette as tp;
use crate::tui::Frame;

/// A drawable region of the screen.
pub trait Pane {
    #[allow(unused_variables)]
    fn handle_key_events(&mut self, key: KeyEvent, state: &RenderState) -> Option<Action> {
        None
    }

    #[allow(unused_variables)]
    fn update(&mut self, action: &Action, state: &RenderState) {}

    fn draw(&mut self, frame: &mut Frame<'_>, area: ratatui::layout::Rect, state: &RenderState);
}

/// Bordered block with the pane title.
pub fn pane_block(title: &str, focused: bool) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(if focused {
            tp::focused_border()
        } else {
            tp::pane_border()
        })
        .title(Line::styled(format!(" {title} "), tp::pane_title()))
}

/// Rows a line of text occupies when wrapped to `width` columns.
pub fn visual_height(text: &str, width: u16) -> usize {
    if width == 0 {
        return 1;
    }
    let w = width as usize;
    let text_width = UnicodeWidthStr::width(text);
    text_width.div_ceil(w).max(1)
}

/// Rows to skip from the top so that the view ends `from_bottom` rows above
/// the last line. `usize::MAX` means pinned to the bottom.
pub fn scroll_top(total: usize, viewport: usize, from_bottom: usize) -> usize {
    let max_scroll = total.saturating_sub(viewport);
    let from_bottom = if from_bottom == usize::MAX {
        0
    } else {
        from_bottom.min(max_scroll)
    };
    max_scroll - from_bottom
}
