use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::app::App;
use crate::client::navigation::NavKey;

/// Map a key to a navigation action. Letters are never shortcuts: every
/// printable character feeds type-ahead.
pub fn key_to_nav(key: &KeyEvent) -> Option<NavKey> {
    if key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
    {
        return None;
    }
    match key.code {
        KeyCode::Down => Some(NavKey::Down),
        KeyCode::Up => Some(NavKey::Up),
        KeyCode::Right => Some(NavKey::Expand),
        KeyCode::Left => Some(NavKey::Collapse),
        KeyCode::Enter => Some(NavKey::Activate),
        KeyCode::Esc => Some(NavKey::Escape),
        KeyCode::Char(c) if !c.is_control() => Some(NavKey::Char(c)),
        _ => None,
    }
}

/// Handle a key event.
pub fn handle_key_event(app: &mut App, key: KeyEvent, now: Instant) {
    if key.kind != KeyEventKind::Press {
        return;
    }
    match key.code {
        KeyCode::Char('c') | KeyCode::Char('q') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.quit()
        }
        _ => {
            if let Some(nav) = key_to_nav(&key) {
                app.handle_nav(nav, now);
            }
        }
    }
}

/// Handle a mouse event. Only a left click does anything.
pub fn handle_mouse_event(app: &mut App, mouse: MouseEvent) {
    if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
        app.click(mouse.column, mouse.row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::fs::tree::{Snapshot, TreeNode, ROOT_PATH};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> App {
        let mut app = App::new("x", Duration::from_millis(500));
        app.handle_pushed(Snapshot::new(TreeNode::folder(
            "root",
            ROOT_PATH,
            vec![TreeNode::file("queue.txt", "/queue.txt")],
        )));
        app
    }

    #[test]
    fn arrows_and_enter_map_to_navigation() {
        assert_eq!(key_to_nav(&key(KeyCode::Down)), Some(NavKey::Down));
        assert_eq!(key_to_nav(&key(KeyCode::Up)), Some(NavKey::Up));
        assert_eq!(key_to_nav(&key(KeyCode::Right)), Some(NavKey::Expand));
        assert_eq!(key_to_nav(&key(KeyCode::Left)), Some(NavKey::Collapse));
        assert_eq!(key_to_nav(&key(KeyCode::Enter)), Some(NavKey::Activate));
        assert_eq!(key_to_nav(&key(KeyCode::Esc)), Some(NavKey::Escape));
        assert_eq!(key_to_nav(&key(KeyCode::Tab)), None);
    }

    #[test]
    fn letters_feed_typeahead() {
        assert_eq!(key_to_nav(&key(KeyCode::Char('j'))), Some(NavKey::Char('j')));
        assert_eq!(key_to_nav(&key(KeyCode::Char('Q'))), Some(NavKey::Char('Q')));
        let ctrl_a = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL);
        assert_eq!(key_to_nav(&ctrl_a), None);
    }

    #[test]
    fn plain_q_does_not_quit() {
        let mut app = app();
        handle_key_event(&mut app, key(KeyCode::Char('q')), Instant::now());
        assert!(!app.should_quit);
        assert_eq!(app.navigator.selected(), Some("/queue.txt"));
    }

    #[test]
    fn ctrl_c_quits() {
        let mut app = app();
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        handle_key_event(&mut app, ctrl_c, Instant::now());
        assert!(app.should_quit);
    }

    #[test]
    fn key_release_is_ignored() {
        let mut app = app();
        let mut release = key(KeyCode::Down);
        release.kind = KeyEventKind::Release;
        handle_key_event(&mut app, release, Instant::now());
        assert_eq!(app.navigator.selected(), None);
    }

    #[test]
    fn left_click_activates_row() {
        let mut app = app();
        app.tree_area = ratatui::layout::Rect::new(0, 0, 10, 5);
        let click = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 2,
            row: 1,
            modifiers: KeyModifiers::NONE,
        };
        handle_mouse_event(&mut app, click);
        assert_eq!(app.navigator.selected(), Some("/queue.txt"));

        let scroll = MouseEvent {
            kind: MouseEventKind::ScrollDown,
            row: 0,
            ..click
        };
        handle_mouse_event(&mut app, scroll);
        assert_eq!(app.navigator.selected(), Some("/queue.txt"));
    }
}
