use crossterm::event::{Event as CrosstermEvent, KeyCode, KeyEvent};
use ratatui::{
    layout::{Position, Rect},
    text::{Line, Span},
    widgets::Paragraph,
};
use tui_input::{Input, backend::crossterm::EventHandler};

use crate::action::Action;
use crate::panes::{Pane, pane_block};
use crate::render::RenderState;
use crate::theme::tui_palette as tp;
use crate::tui::Frame;

const PROMPT: &str = "❯ ";

/// Command entry under the chat transcript. Greyed out while a task runs.
#[derive(Default)]
pub struct InputPane {
    input: Input,
}

impl InputPane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &str {
        self.input.value()
    }

    pub fn reset(&mut self) {
        self.input.reset();
    }

    /// Append pasted text; newlines are flattened to spaces.
    pub fn paste(&mut self, text: &str, state: &RenderState) {
        if !state.input_enabled {
            return;
        }
        let flattened = text.replace(['\r', '\n'], " ");
        self.input = Input::new(format!("{}{}", self.input.value(), flattened));
    }
}

impl Pane for InputPane {
    fn handle_key_events(&mut self, key: KeyEvent, state: &RenderState) -> Option<Action> {
        match key.code {
            // Enter always goes through so a running task can surface the busy notice.
            KeyCode::Enter => Some(Action::Submit(self.input.value().to_string())),
            _ if !state.input_enabled => None,
            _ => {
                self.input.handle_event(&CrosstermEvent::Key(key));
                Some(Action::Noop)
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>, area: Rect, state: &RenderState) {
        let enabled = state.input_enabled;
        let block = pane_block("Command", enabled);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.width == 0 || inner.height == 0 {
            return;
        }

        let (prompt_style, text_style) = if enabled {
            (tp::prompt_active(), tp::body())
        } else {
            (tp::prompt_inactive(), tp::prompt_inactive())
        };

        let prompt_width = 2u16;
        let text_width = inner.width.saturating_sub(prompt_width) as usize;
        let scroll = self.input.visual_scroll(text_width);
        let shown: String = self.input.value().chars().skip(scroll).collect();

        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(PROMPT, prompt_style),
                Span::styled(shown, text_style),
            ])),
            inner,
        );

        if enabled {
            let cursor = self.input.visual_cursor().saturating_sub(scroll) as u16;
            frame.set_cursor_position(Position::new(
                inner.x + prompt_width + cursor.min(inner.width.saturating_sub(prompt_width + 1)),
                inner.y,
            ));
        }
    }
}
