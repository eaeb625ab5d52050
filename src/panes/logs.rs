use ratatui::{
    layout::Rect,
    text::Line,
    widgets::{Paragraph, Wrap},
};

use crate::action::Action;
use crate::panes::{Pane, pane_block, scroll_top, visual_height};
use crate::render::RenderState;
use crate::theme::{line_tone, tui_palette as tp};
use crate::tui::Frame;

/// Rows moved per PageUp/PageDown when the pane height is unknown.
const DEFAULT_PAGE: usize = 10;

/// Streaming agent output. Follows new lines while pinned to the bottom.
pub struct LogsPane {
    /// Visual rows from the bottom. `usize::MAX` = pinned (auto-scroll).
    scroll_offset: usize,
    page: usize,
}

impl Default for LogsPane {
    fn default() -> Self {
        Self {
            scroll_offset: usize::MAX,
            page: DEFAULT_PAGE,
        }
    }
}

impl LogsPane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_following(&self) -> bool {
        self.scroll_offset == usize::MAX
    }

    pub fn follow(&mut self) {
        self.scroll_offset = usize::MAX;
    }

    fn scroll_up(&mut self) {
        let current = if self.is_following() { 0 } else { self.scroll_offset };
        self.scroll_offset = current.saturating_add(self.page);
    }

    fn scroll_down(&mut self) {
        if self.is_following() {
            return;
        }
        self.scroll_offset = self.scroll_offset.saturating_sub(self.page);
        if self.scroll_offset == 0 {
            self.scroll_offset = usize::MAX;
        }
    }
}

impl Pane for LogsPane {
    fn update(&mut self, action: &Action, _state: &RenderState) {
        match action {
            Action::ScrollLogsUp => self.scroll_up(),
            Action::ScrollLogsDown => self.scroll_down(),
            Action::FollowLogs => self.follow(),
            _ => {}
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>, area: Rect, state: &RenderState) {
        let block = pane_block("Agent Logs", false);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.width == 0 || inner.height == 0 {
            return;
        }
        self.page = (inner.height as usize).saturating_sub(1).max(1);

        let total: usize = state
            .log_lines
            .iter()
            .map(|l| visual_height(l, inner.width))
            .sum();
        let top = scroll_top(total, inner.height as usize, self.scroll_offset);
        if !self.is_following() {
            // Keep the stored offset clamped so PageDown reacts immediately.
            self.scroll_offset = total.saturating_sub(inner.height as usize) - top;
        }

        let lines: Vec<Line<'_>> = state
            .log_lines
            .iter()
            .map(|l| Line::styled(l.as_str(), tp::log_line(line_tone(l))))
            .collect();

        frame.render_widget(
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .scroll((top.min(u16::MAX as usize) as u16, 0)),
            inner,
        );
    }
}
