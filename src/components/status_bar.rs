use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};

use crate::client::feed::FeedStatus;

const KEY_HINTS: &str = " ↑↓ move  →← open/close  ⏎ toggle  type to find  ^C quit ";

/// Status bar: feed state, server, type-ahead buffer and key hints.
pub struct StatusBarWidget<'a> {
    status: FeedStatus,
    server: &'a str,
    typeahead: &'a str,
}

impl<'a> StatusBarWidget<'a> {
    pub fn new(status: FeedStatus, server: &'a str) -> Self {
        Self {
            status,
            server,
            typeahead: "",
        }
    }

    pub fn typeahead(mut self, buffer: &'a str) -> Self {
        self.typeahead = buffer;
        self
    }
}

/// Short human label for the feed state.
pub fn feed_label(status: FeedStatus) -> String {
    match status {
        FeedStatus::Connecting => "connecting".to_string(),
        FeedStatus::Live => "live".to_string(),
        FeedStatus::Reconnecting { attempt, delay } => {
            format!("retry #{attempt} in {:.1}s", delay.as_secs_f32())
        }
    }
}

fn feed_style(status: FeedStatus) -> Style {
    let color = match status {
        FeedStatus::Live => Color::Green,
        FeedStatus::Connecting => Color::Yellow,
        FeedStatus::Reconnecting { .. } => Color::Red,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

impl<'a> Widget for StatusBarWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        let width = area.width as usize;
        let mut spans = vec![
            Span::styled(format!(" ● {} ", feed_label(self.status)), feed_style(self.status)),
            Span::styled(self.server.to_string(), Style::default().fg(Color::Gray)),
        ];
        if !self.typeahead.is_empty() {
            spans.push(Span::styled(
                format!("  find: {}", self.typeahead),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ));
        }

        // Hints go on the right when they fit.
        let used: usize = spans.iter().map(|s| s.width()).sum();
        let hints = Span::styled(
            KEY_HINTS,
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::DIM),
        );
        if used + hints.width() <= width {
            spans.push(Span::raw(" ".repeat(width - used - hints.width())));
            spans.push(hints);
        }

        buf.set_line(area.x, area.y, &Line::from(spans), area.width);
    }
}
