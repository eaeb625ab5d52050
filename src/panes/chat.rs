use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
};

use crate::panes::{Pane, pane_block, scroll_top, visual_height};
use crate::render::{ChatRole, RenderState};
use crate::theme::tui_palette as tp;
use crate::tui::Frame;

/// `You:` / `AI:` transcript, always showing the newest exchange.
#[derive(Default)]
pub struct ChatPane;

impl ChatPane {
    pub fn new() -> Self {
        Self
    }
}

impl Pane for ChatPane {
    fn draw(&mut self, frame: &mut Frame<'_>, area: Rect, state: &RenderState) {
        let block = pane_block("Chat", false);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.width == 0 || inner.height == 0 {
            return;
        }

        let mut lines: Vec<Line<'_>> = Vec::with_capacity(state.chat.len() * 2);
        let mut total = 0usize;
        for (i, entry) in state.chat.iter().enumerate() {
            if i > 0 && entry.role == ChatRole::User {
                lines.push(Line::raw(""));
                total += 1;
            }
            let style = match entry.role {
                ChatRole::User => tp::user_message(),
                ChatRole::Assistant => tp::assistant_message(),
            };
            let prefix = format!("{}: ", entry.role.prefix());
            total += visual_height(&format!("{prefix}{}", entry.text), inner.width);
            lines.push(Line::from(vec![
                Span::styled(prefix, style.add_modifier(ratatui::style::Modifier::BOLD)),
                Span::styled(entry.text.as_str(), style),
            ]));
        }

        let top = scroll_top(total, inner.height as usize, usize::MAX);
        frame.render_widget(
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .scroll((top.min(u16::MAX as usize) as u16, 0)),
            inner,
        );
    }
}
