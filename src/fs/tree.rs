use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};

/// Path of the root node in every snapshot.
pub const ROOT_PATH: &str = "/";

/// Default entry names left out of snapshots.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "target",
];

/// Descriptive metadata attached to file nodes. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Modification time in seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
}

impl FileMeta {
    fn is_empty(&self) -> bool {
        self.extension.is_none() && self.size.is_none() && self.modified.is_none()
    }
}

/// Decode an explicit `null` the same way as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A node in a tree snapshot.
///
/// Only folders have children and only files carry metadata. A folder
/// decoded without a `children` array (or with `null`) is an empty folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    File {
        name: String,
        path: String,
        #[serde(
            default,
            deserialize_with = "null_as_default",
            skip_serializing_if = "FileMeta::is_empty"
        )]
        meta: FileMeta,
    },
    Folder {
        name: String,
        path: String,
        #[serde(default, deserialize_with = "null_as_default")]
        children: Vec<TreeNode>,
    },
}

impl TreeNode {
    #[cfg(test)]
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        TreeNode::File {
            name: name.into(),
            path: path.into(),
            meta: FileMeta::default(),
        }
    }

    pub fn folder(
        name: impl Into<String>,
        path: impl Into<String>,
        children: Vec<TreeNode>,
    ) -> Self {
        TreeNode::Folder {
            name: name.into(),
            path: path.into(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TreeNode::File { name, .. } | TreeNode::Folder { name, .. } => name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            TreeNode::File { path, .. } | TreeNode::Folder { path, .. } => path,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, TreeNode::Folder { .. })
    }

    /// Children in display order; always empty for files.
    pub fn children(&self) -> &[TreeNode] {
        match self {
            TreeNode::Folder { children, .. } => children,
            TreeNode::File { .. } => &[],
        }
    }
}

/// Build the path of a child from its parent's path and its name.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("{ROOT_PATH}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// The entire tree at one instant. Never mutated after it is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    root: TreeNode,
}

impl Snapshot {
    pub fn new(root: TreeNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Sort criteria for folder children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortBy {
    /// Alphabetical (case-insensitive), default.
    Name,
    /// By file size (largest first).
    Size,
    /// By modification time (newest first).
    Modified,
}

impl SortBy {
    /// Parse sort_by from config string.
    pub fn from_str(s: &str) -> Self {
        match s {
            "size" => SortBy::Size,
            "modified" => SortBy::Modified,
            _ => SortBy::Name,
        }
    }
}

/// How the filesystem reader shapes a snapshot.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub sort_by: SortBy,
    pub dirs_first: bool,
    pub ignore: Vec<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            sort_by: SortBy::Name,
            dirs_first: true,
            ignore: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ReadOptions {
    fn ignores(&self, name: &str) -> bool {
        self.ignore.iter().any(|pattern| pattern == name)
    }
}

/// Producer of tree snapshots consumed by the broadcaster.
#[async_trait]
pub trait TreeSource: Send + Sync {
    /// Directory the change detector should watch.
    fn watch_root(&self) -> &Path;

    /// Make sure the tree root exists. Safe to call repeatedly.
    async fn ensure_exists(&self) -> Result<()>;

    /// Read a complete, current snapshot.
    async fn read_snapshot(&self) -> Result<Snapshot>;
}

/// Reads snapshots straight from a directory on disk.
#[derive(Debug, Clone)]
pub struct FsTreeSource {
    root: PathBuf,
    options: ReadOptions,
}

impl FsTreeSource {
    pub fn new(root: impl Into<PathBuf>, options: ReadOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }
}

#[async_trait]
impl TreeSource for FsTreeSource {
    fn watch_root(&self) -> &Path {
        &self.root
    }

    async fn ensure_exists(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn read_snapshot(&self) -> Result<Snapshot> {
        let root = self.root.clone();
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || read_tree(&root, &options))
            .await
            .map_err(|e| AppError::Io(std::io::Error::other(e)))?
    }
}

/// Walk `root` and build a snapshot. Unreadable entries below the root are skipped.
pub fn read_tree(root: &Path, options: &ReadOptions) -> Result<Snapshot> {
    let metadata = fs::metadata(root)?;
    if !metadata.is_dir() {
        return Err(AppError::InvalidPath(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root.to_string_lossy().to_string());
    let children = read_folder(root, ROOT_PATH, options)?;

    Ok(Snapshot::new(TreeNode::folder(name, ROOT_PATH, children)))
}

/// Sort keys gathered while reading; not part of the snapshot itself.
struct Entry {
    node: TreeNode,
    size: u64,
    modified: Option<u64>,
}

fn read_folder(dir: &Path, path: &str, options: &ReadOptions) -> std::io::Result<Vec<TreeNode>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name().to_string_lossy().to_string();
        if options.ignores(&name) {
            continue;
        }
        let entry_path = entry.path();
        let Ok(metadata) = fs::symlink_metadata(&entry_path) else {
            continue;
        };

        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
        let node_path = child_path(path, &name);

        if metadata.is_dir() {
            let children = match read_folder(&entry_path, &node_path, options) {
                Ok(children) => children,
                Err(e) => {
                    debug!("skipping unreadable folder {}: {}", entry_path.display(), e);
                    Vec::new()
                }
            };
            entries.push(Entry {
                node: TreeNode::folder(name, node_path, children),
                size: 0,
                modified,
            });
        } else {
            let extension = Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().to_string());
            entries.push(Entry {
                node: TreeNode::File {
                    name,
                    path: node_path,
                    meta: FileMeta {
                        extension,
                        size: Some(metadata.len()),
                        modified,
                    },
                },
                size: metadata.len(),
                modified,
            });
        }
    }

    sort_entries(&mut entries, &options.sort_by, options.dirs_first);
    Ok(entries.into_iter().map(|e| e.node).collect())
}

fn sort_entries(entries: &mut [Entry], sort_by: &SortBy, dirs_first: bool) {
    entries.sort_by(|a, b| {
        let mut cmp = std::cmp::Ordering::Equal;

        if dirs_first {
            cmp = b.node.is_folder().cmp(&a.node.is_folder());
        }

        cmp.then_with(|| match sort_by {
            SortBy::Name => a
                .node
                .name()
                .to_lowercase()
                .cmp(&b.node.name().to_lowercase()),
            SortBy::Size => b.size.cmp(&a.size),
            SortBy::Modified => b.modified.cmp(&a.modified),
        })
    });
}
