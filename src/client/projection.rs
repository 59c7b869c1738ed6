//! Pure queries over a snapshot: the visible-node projection and path lookups.

use std::collections::HashSet;

use crate::fs::tree::{Snapshot, TreeNode};

/// A node that is currently on screen, with its indentation depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleNode<'a> {
    pub node: &'a TreeNode,
    pub depth: usize,
}

/// Flatten `snapshot` into display order.
///
/// Pre-order from the root (always present, depth 0). A folder's children
/// follow it only when its path is in `expanded`.
pub fn project<'a>(snapshot: &'a Snapshot, expanded: &HashSet<String>) -> Vec<VisibleNode<'a>> {
    let mut visible = Vec::new();
    let mut stack = vec![(snapshot.root(), 0)];

    while let Some((node, depth)) = stack.pop() {
        visible.push(VisibleNode { node, depth });
        if node.is_folder() && expanded.contains(node.path()) {
            for child in node.children().iter().rev() {
                stack.push((child, depth + 1));
            }
        }
    }
    visible
}

/// Number of files anywhere below `node`. Folders are not counted.
pub fn count_files_within_folder(node: &TreeNode) -> usize {
    let mut count = 0;
    let mut stack: Vec<&TreeNode> = node.children().iter().collect();
    while let Some(current) = stack.pop() {
        match current {
            TreeNode::File { .. } => count += 1,
            TreeNode::Folder { children, .. } => stack.extend(children.iter()),
        }
    }
    count
}

pub fn find_node<'a>(root: &'a TreeNode, path: &str) -> Option<&'a TreeNode> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.path() == path {
            return Some(node);
        }
        stack.extend(node.children().iter());
    }
    None
}

/// The folder whose children include `path`. The root has no parent.
pub fn parent_of<'a>(root: &'a TreeNode, path: &str) -> Option<&'a TreeNode> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.children().iter().any(|c| c.path() == path) {
            return Some(node);
        }
        stack.extend(node.children().iter().filter(|c| c.is_folder()));
    }
    None
}
