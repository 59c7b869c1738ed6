use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::App;
use crate::components::status_bar::StatusBarWidget;
use crate::components::tree::TreeWidget;

/// Render the viewer: tree pane above a one-line status bar.
pub fn render(app: &mut App, frame: &mut Frame) {
    let [tree_area, status_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

    let block = Block::default().borders(Borders::ALL);
    app.tree_area = block.inner(tree_area);
    app.update_scroll(app.tree_area.height as usize);

    match &app.snapshot {
        Some(snapshot) => {
            let visible = app.navigator.visible(snapshot);
            let selected = app.navigator.selected_index(&visible);
            let block = block.title(format!(" {} ", snapshot.root().name()));
            let tree = TreeWidget::new(&visible, app.navigator.expanded())
                .selected(selected)
                .scroll(app.scroll_offset)
                .block(block);
            frame.render_widget(tree, tree_area);
        }
        None => {
            let message = match &app.bootstrap_error {
                Some(e) => Line::styled(
                    format!("Cannot reach {}: {e}", app.server_addr),
                    Style::default().fg(Color::Red),
                ),
                None => Line::from(format!("Waiting for a snapshot from {}…", app.server_addr)),
            };
            let placeholder = Paragraph::new(message)
                .wrap(Wrap { trim: true })
                .block(block.title(" treecast "));
            frame.render_widget(placeholder, tree_area);
        }
    }

    let status = StatusBarWidget::new(app.feed_status, &app.server_addr)
        .typeahead(app.navigator.typeahead_buffer());
    frame.render_widget(status, status_area);
}
