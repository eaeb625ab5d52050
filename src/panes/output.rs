use ratatui::{
    layout::Rect,
    widgets::{Paragraph, Wrap},
};

use crate::panes::{Pane, pane_block};
use crate::render::RenderState;
use crate::theme::tui_palette as tp;
use crate::tui::Frame;

/// Final result of the last task.
#[derive(Default)]
pub struct OutputPane;

impl OutputPane {
    pub fn new() -> Self {
        Self
    }
}

impl Pane for OutputPane {
    fn draw(&mut self, frame: &mut Frame<'_>, area: Rect, state: &RenderState) {
        frame.render_widget(
            Paragraph::new(state.output.as_str())
                .style(tp::body())
                .wrap(Wrap { trim: false })
                .block(pane_block("Final Output / Result", false)),
            area,
        );
    }
}
