//! Keyboard navigation over the visible projection of a snapshot.
//!
//! The navigator keeps only paths (expanded folders, the selection and the
//! type-ahead buffer), never node references, so it survives any number of
//! snapshot replacements. Every transition re-projects the snapshot it is
//! given before acting.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::client::projection::{find_node, parent_of, project, VisibleNode};
use crate::fs::tree::{Snapshot, ROOT_PATH};

/// Default pause after which type-ahead starts a new search.
pub const DEFAULT_TYPEAHEAD_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Down,
    Up,
    Expand,
    Collapse,
    Activate,
    Char(char),
    Escape,
}

#[derive(Debug, Clone, Default)]
struct Typeahead {
    buffer: String,
    last_input: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct Navigator {
    expanded: HashSet<String>,
    selected: Option<String>,
    typeahead: Typeahead,
    window: Duration,
}

/// Index of the next visible node whose name starts with `query`.
///
/// The search begins just after `selected_path` (or at the top when there is
/// no visible selection), wraps around, and may land on the selection itself.
pub fn find_typeahead_match(
    query: &str,
    visible: &[VisibleNode],
    selected_path: Option<&str>,
) -> Option<usize> {
    if query.is_empty() || visible.is_empty() {
        return None;
    }
    let query = query.to_lowercase();
    let start = selected_path
        .and_then(|path| visible.iter().position(|v| v.node.path() == path))
        .map_or(0, |i| i + 1);

    (0..visible.len())
        .map(|offset| (start + offset) % visible.len())
        .find(|&i| visible[i].node.name().to_lowercase().starts_with(&query))
}

impl Navigator {
    /// A fresh session: the root is open and nothing is selected.
    pub fn new(window: Duration) -> Self {
        Self {
            expanded: HashSet::from([ROOT_PATH.to_string()]),
            selected: None,
            typeahead: Typeahead::default(),
            window,
        }
    }

    pub fn expanded(&self) -> &HashSet<String> {
        &self.expanded
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn typeahead_buffer(&self) -> &str {
        &self.typeahead.buffer
    }

    pub fn visible<'a>(&self, snapshot: &'a Snapshot) -> Vec<VisibleNode<'a>> {
        project(snapshot, &self.expanded)
    }

    /// Position of the selection in `visible`, if it is on screen.
    pub fn selected_index(&self, visible: &[VisibleNode]) -> Option<usize> {
        let selected = self.selected.as_deref()?;
        visible.iter().position(|v| v.node.path() == selected)
    }

    pub fn handle_key(&mut self, snapshot: &Snapshot, key: NavKey, now: Instant) {
        match key {
            NavKey::Down => self.move_down(snapshot),
            NavKey::Up => self.move_up(snapshot),
            NavKey::Expand => self.expand(snapshot),
            NavKey::Collapse => self.collapse(snapshot),
            NavKey::Activate => {
                if let Some(path) = self.selected.clone() {
                    self.activate(snapshot, &path);
                }
            }
            NavKey::Char(c) => self.type_char(snapshot, c, now),
            NavKey::Escape => self.cancel_typeahead(),
        }
    }

    /// Adopt a replacement snapshot: drop a selection that no longer resolves.
    pub fn reconcile(&mut self, snapshot: &Snapshot) {
        if let Some(path) = &self.selected {
            if find_node(snapshot.root(), path).is_none() {
                self.selected = None;
            }
        }
    }

    pub fn move_down(&mut self, snapshot: &Snapshot) {
        let visible = self.visible(snapshot);
        let target = match self.selected_index(&visible) {
            Some(i) => visible.get((i + 1).min(visible.len() - 1)),
            None => visible.first(),
        };
        if let Some(target) = target {
            self.selected = Some(target.node.path().to_string());
        }
    }

    pub fn move_up(&mut self, snapshot: &Snapshot) {
        let visible = self.visible(snapshot);
        let target = match self.selected_index(&visible) {
            Some(i) => visible.get(i.saturating_sub(1)),
            None => visible.last(),
        };
        if let Some(target) = target {
            self.selected = Some(target.node.path().to_string());
        }
    }

    pub fn expand(&mut self, snapshot: &Snapshot) {
        let visible = self.visible(snapshot);
        let Some(i) = self.selected_index(&visible) else {
            if let Some(first) = visible.first() {
                self.selected = Some(first.node.path().to_string());
            }
            return;
        };

        let node = visible[i].node;
        if !node.is_folder() {
            return;
        }
        if !self.expanded.contains(node.path()) {
            self.expanded.insert(node.path().to_string());
        } else if let Some(child) = node.children().first() {
            self.selected = Some(child.path().to_string());
        }
    }

    pub fn collapse(&mut self, snapshot: &Snapshot) {
        let visible = self.visible(snapshot);
        let Some(i) = self.selected_index(&visible) else {
            return;
        };

        let node = visible[i].node;
        if node.is_folder() && self.expanded.remove(node.path()) {
            return;
        }
        if let Some(parent) = parent_of(snapshot.root(), node.path()) {
            self.selected = Some(parent.path().to_string());
        }
    }

    /// Click or Enter on a node: folders toggle open, anything gets selected.
    pub fn activate(&mut self, snapshot: &Snapshot, path: &str) {
        let Some(node) = find_node(snapshot.root(), path) else {
            return;
        };
        if node.is_folder() && !self.expanded.remove(node.path()) {
            self.expanded.insert(node.path().to_string());
        }
        self.selected = Some(node.path().to_string());
    }

    pub fn type_char(&mut self, snapshot: &Snapshot, c: char, now: Instant) {
        let continues = self
            .typeahead
            .last_input
            .is_some_and(|last| now.saturating_duration_since(last) <= self.window);
        if !continues {
            self.typeahead.buffer.clear();
        }
        self.typeahead.buffer.extend(c.to_lowercase());
        self.typeahead.last_input = Some(now);

        let visible = self.visible(snapshot);
        if let Some(i) =
            find_typeahead_match(&self.typeahead.buffer, &visible, self.selected.as_deref())
        {
            self.selected = Some(visible[i].node.path().to_string());
        }
    }

    pub fn cancel_typeahead(&mut self) {
        self.typeahead = Typeahead::default();
    }

    /// Clear a buffer whose inactivity window has passed.
    pub fn expire_typeahead(&mut self, now: Instant) {
        if let Some(last) = self.typeahead.last_input {
            if now.saturating_duration_since(last) > self.window {
                self.cancel_typeahead();
            }
        }
    }
}
