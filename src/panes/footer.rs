use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
};

use crate::action::Action;
use crate::panes::Pane;
use crate::render::{NoticeKind, RenderState};
use crate::theme::tui_palette as tp;
use crate::tui::Frame;

const HINTS: &str = "[Enter → run] [PgUp/PgDn → scroll logs] [Esc/Ctrl-C → quit]";
const SPINNER: [&str; 4] = ["◐", "◓", "◑", "◒"];

/// One-row status line: the current notice, or key hints.
#[derive(Default)]
pub struct FooterPane {
    spinner: usize,
}

impl FooterPane {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pane for FooterPane {
    fn update(&mut self, action: &Action, state: &RenderState) {
        if matches!(action, Action::Tick) && !state.input_enabled {
            self.spinner = (self.spinner + 1) % SPINNER.len();
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>, area: Rect, state: &RenderState) {
        let mut spans = Vec::with_capacity(3);
        if !state.input_enabled {
            spans.push(Span::styled(
                format!("{} working ", SPINNER[self.spinner]),
                tp::notice_info(),
            ));
        }
        match state.notice() {
            Some(notice) => {
                let style = match notice.kind {
                    NoticeKind::Busy => tp::notice_busy(),
                    NoticeKind::Info => tp::notice_info(),
                    NoticeKind::Error => tp::notice_error(),
                };
                spans.push(Span::styled(notice.text.as_str(), style));
            }
            None => spans.push(Span::styled(HINTS, tp::hint())),
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}
