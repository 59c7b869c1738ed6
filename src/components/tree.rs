use std::collections::HashSet;

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Widget},
};

use crate::client::projection::{count_files_within_folder, VisibleNode};

const INDENT: &str = "  ";

/// Renders the visible projection, one row per node.
pub struct TreeWidget<'a> {
    rows: &'a [VisibleNode<'a>],
    expanded: &'a HashSet<String>,
    selected: Option<usize>,
    scroll: usize,
    block: Option<Block<'a>>,
}

impl<'a> TreeWidget<'a> {
    pub fn new(rows: &'a [VisibleNode<'a>], expanded: &'a HashSet<String>) -> Self {
        Self {
            rows,
            expanded,
            selected: None,
            scroll: 0,
            block: None,
        }
    }

    pub fn selected(mut self, selected: Option<usize>) -> Self {
        self.selected = selected;
        self
    }

    pub fn scroll(mut self, scroll: usize) -> Self {
        self.scroll = scroll;
        self
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = block.into();
        self
    }

    /// Indentation, folder marker and name of one row.
    fn label(&self, row: &VisibleNode) -> String {
        let marker = if !row.node.is_folder() {
            "  "
        } else if self.expanded.contains(row.node.path()) {
            "▾ "
        } else {
            "▸ "
        };
        format!("{}{}{}", INDENT.repeat(row.depth), marker, row.node.name())
    }

    fn file_count(row: &VisibleNode) -> Option<String> {
        if !row.node.is_folder() {
            return None;
        }
        match count_files_within_folder(row.node) {
            1 => Some(" (1 file)".to_string()),
            n => Some(format!(" ({n} files)")),
        }
    }
}

impl<'a> Widget for TreeWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner_area = if let Some(block) = &self.block {
            let inner = block.inner(area);
            block.clone().render(area, buf);
            inner
        } else {
            area
        };

        let visible_height = inner_area.height as usize;
        if self.rows.is_empty() || visible_height == 0 {
            return;
        }

        let on_screen = self
            .rows
            .iter()
            .enumerate()
            .skip(self.scroll)
            .take(visible_height);

        for (i, (idx, row)) in on_screen.enumerate() {
            let y = inner_area.y + i as u16;
            let is_selected = self.selected == Some(idx);

            let name_style = if is_selected {
                Style::default()
                    .bg(Color::Blue)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD)
            } else if row.node.is_folder() {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let mut spans = vec![Span::styled(self.label(row), name_style)];
            if let Some(count) = Self::file_count(row) {
                spans.push(Span::styled(
                    count,
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::DIM),
                ));
            }

            if is_selected {
                buf.set_style(Rect::new(inner_area.x, y, inner_area.width, 1), name_style);
            }
            buf.set_line(inner_area.x, y, &Line::from(spans), inner_area.width);
        }
    }
}
