use std::time::{Duration, Instant};

use ratatui::layout::Rect;
use tracing::{debug, info};

use crate::client::feed::FeedStatus;
use crate::client::navigation::{NavKey, Navigator};
use crate::fs::tree::Snapshot;

/// Main viewer state.
pub struct App {
    /// Latest snapshot; replaced whole, never edited.
    pub snapshot: Option<Snapshot>,
    pub navigator: Navigator,
    pub feed_status: FeedStatus,
    /// Shown while no snapshot has arrived at all.
    pub bootstrap_error: Option<String>,
    pub server_addr: String,
    /// First tree row currently on screen.
    pub scroll_offset: usize,
    /// Where the last frame drew tree rows, for mouse hit-testing.
    pub tree_area: Rect,
    pub should_quit: bool,
    has_pushed_snapshot: bool,
}

impl App {
    pub fn new(server_addr: impl Into<String>, typeahead_window: Duration) -> Self {
        Self {
            snapshot: None,
            navigator: Navigator::new(typeahead_window),
            feed_status: FeedStatus::Connecting,
            bootstrap_error: None,
            server_addr: server_addr.into(),
            scroll_offset: 0,
            tree_area: Rect::default(),
            should_quit: false,
            has_pushed_snapshot: false,
        }
    }

    /// Apply the bootstrap fetch, unless the event stream already delivered
    /// something newer.
    pub fn handle_bootstrap(&mut self, result: Result<Snapshot, String>) {
        if self.has_pushed_snapshot {
            debug!("bootstrap result arrived after a pushed snapshot; ignored");
            return;
        }
        match result {
            Ok(snapshot) => self.replace_snapshot(snapshot),
            Err(e) => {
                if self.snapshot.is_none() {
                    self.bootstrap_error = Some(e);
                }
            }
        }
    }

    pub fn handle_pushed(&mut self, snapshot: Snapshot) {
        self.has_pushed_snapshot = true;
        self.replace_snapshot(snapshot);
    }

    fn replace_snapshot(&mut self, snapshot: Snapshot) {
        self.navigator.reconcile(&snapshot);
        self.snapshot = Some(snapshot);
        self.bootstrap_error = None;
    }

    pub fn handle_feed_status(&mut self, status: FeedStatus) {
        if status != self.feed_status {
            info!(?status, "feed state changed");
        }
        self.feed_status = status;
    }

    pub fn handle_nav(&mut self, key: NavKey, now: Instant) {
        if let Some(snapshot) = &self.snapshot {
            self.navigator.handle_key(snapshot, key, now);
        }
    }

    /// Activate the tree row under a click at terminal cell (`column`, `row`).
    pub fn click(&mut self, column: u16, row: u16) {
        let area = self.tree_area;
        let inside = column >= area.x
            && column < area.x + area.width
            && row >= area.y
            && row < area.y + area.height;
        if !inside {
            return;
        }
        let Some(snapshot) = &self.snapshot else {
            return;
        };

        let index = self.scroll_offset + usize::from(row - area.y);
        let path = self
            .navigator
            .visible(snapshot)
            .get(index)
            .map(|v| v.node.path().to_string());
        if let Some(path) = path {
            self.navigator.activate(snapshot, &path);
        }
    }

    /// Keep the selected row within a window of `visible_height` rows.
    pub fn update_scroll(&mut self, visible_height: usize) {
        if visible_height == 0 {
            return;
        }
        let Some(snapshot) = &self.snapshot else {
            self.scroll_offset = 0;
            return;
        };
        let visible = self.navigator.visible(snapshot);
        self.scroll_offset = self
            .scroll_offset
            .min(visible.len().saturating_sub(visible_height));

        if let Some(selected) = self.navigator.selected_index(&visible) {
            if selected < self.scroll_offset {
                self.scroll_offset = selected;
            } else if selected >= self.scroll_offset + visible_height {
                self.scroll_offset = selected - visible_height + 1;
            }
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.navigator.expire_typeahead(now);
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::tree::{TreeNode, ROOT_PATH};

    const WINDOW: Duration = Duration::from_millis(500);

    fn snapshot(names: &[&str]) -> Snapshot {
        let children = names
            .iter()
            .map(|n| TreeNode::file(*n, format!("/{n}")))
            .collect();
        Snapshot::new(TreeNode::folder("root", ROOT_PATH, children))
    }

    fn app_with(names: &[&str]) -> App {
        let mut app = App::new("127.0.0.1:7878", WINDOW);
        app.handle_pushed(snapshot(names));
        app
    }

    #[test]
    fn starts_connecting_without_snapshot() {
        let app = App::new("127.0.0.1:7878", WINDOW);
        assert!(app.snapshot.is_none());
        assert_eq!(app.feed_status, FeedStatus::Connecting);
        assert!(!app.should_quit);
    }

    #[test]
    fn bootstrap_snapshot_is_applied() {
        let mut app = App::new("x", WINDOW);
        app.handle_bootstrap(Ok(snapshot(&["a"])));
        assert!(app.snapshot.is_some());
    }

    #[test]
    fn bootstrap_after_push_is_ignored() {
        let mut app = app_with(&["pushed"]);
        app.handle_bootstrap(Ok(snapshot(&["stale"])));
        let root = app.snapshot.as_ref().unwrap().root();
        assert_eq!(root.children()[0].name(), "pushed");
    }

    #[test]
    fn bootstrap_error_shown_until_snapshot_arrives() {
        let mut app = App::new("x", WINDOW);
        app.handle_bootstrap(Err("connection refused".into()));
        assert_eq!(app.bootstrap_error.as_deref(), Some("connection refused"));

        app.handle_pushed(snapshot(&["a"]));
        assert!(app.bootstrap_error.is_none());
    }

    #[test]
    fn pushed_snapshot_reconciles_selection() {
        let mut app = app_with(&["a", "b"]);
        app.handle_nav(NavKey::Up, Instant::now());
        assert_eq!(app.navigator.selected(), Some("/b"));

        app.handle_pushed(snapshot(&["a"]));
        assert_eq!(app.navigator.selected(), None);
    }

    #[test]
    fn navigation_without_snapshot_is_noop() {
        let mut app = App::new("x", WINDOW);
        app.handle_nav(NavKey::Down, Instant::now());
        assert_eq!(app.navigator.selected(), None);
    }

    #[test]
    fn click_activates_row_under_cursor() {
        let mut app = app_with(&["a", "b", "c"]);
        app.tree_area = Rect::new(1, 1, 20, 10);

        app.click(5, 3);
        assert_eq!(app.navigator.selected(), Some("/b"));

        app.click(5, 1);
        assert_eq!(app.navigator.selected(), Some(ROOT_PATH));
        assert!(!app.navigator.expanded().contains(ROOT_PATH));
    }

    #[test]
    fn click_outside_tree_or_below_rows_is_ignored() {
        let mut app = app_with(&["a"]);
        app.tree_area = Rect::new(1, 1, 20, 10);
        app.click(0, 0);
        app.click(5, 9);
        assert_eq!(app.navigator.selected(), None);
    }

    #[test]
    fn click_accounts_for_scroll_offset() {
        let mut app = app_with(&["a", "b", "c", "d"]);
        app.tree_area = Rect::new(0, 0, 20, 2);
        app.scroll_offset = 2;
        app.click(0, 1);
        assert_eq!(app.navigator.selected(), Some("/c"));
    }

    #[test]
    fn update_scroll_follows_selection() {
        let mut app = app_with(&["a", "b", "c", "d", "e"]);
        app.handle_nav(NavKey::Up, Instant::now());
        app.update_scroll(3);
        assert_eq!(app.scroll_offset, 3);

        app.handle_nav(NavKey::Down, Instant::now());
        for _ in 0..5 {
            app.handle_nav(NavKey::Up, Instant::now());
        }
        app.update_scroll(3);
        assert_eq!(app.scroll_offset, 0);
    }

    #[test]
    fn update_scroll_clamps_after_tree_shrinks() {
        let mut app = app_with(&["a", "b", "c", "d", "e"]);
        app.scroll_offset = 3;
        app.handle_pushed(snapshot(&["a"]));
        app.update_scroll(3);
        assert_eq!(app.scroll_offset, 0);
    }

    #[test]
    fn tick_expires_typeahead() {
        let mut app = app_with(&["apple"]);
        let t0 = Instant::now();
        app.handle_nav(NavKey::Char('a'), t0);
        assert_eq!(app.navigator.typeahead_buffer(), "a");
        app.tick(t0 + WINDOW * 2);
        assert_eq!(app.navigator.typeahead_buffer(), "");
    }

    #[test]
    fn quit_sets_flag() {
        let mut app = App::new("x", WINDOW);
        app.quit();
        assert!(app.should_quit);
    }
}
