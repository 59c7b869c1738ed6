use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info};

use crate::error::Result;

/// What the watch reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// Some filesystem event happened somewhere under the root.
    Changed,
    /// The watch failed and will not report anything further.
    Failed(String),
}

/// Map one raw notification to a signal. Access events (opens, reads) are
/// not changes, and reading a snapshot produces them, so they are dropped.
fn classify(result: notify::Result<notify::Event>) -> Option<WatchSignal> {
    match result {
        Ok(event) if event.kind.is_access() => None,
        Ok(_) => Some(WatchSignal::Changed),
        Err(e) => Some(WatchSignal::Failed(e.to_string())),
    }
}

/// One recursive filesystem watch on a tree root.
///
/// Every create, remove, rename or modify event is forwarded without
/// interpretation; the watch is released when this value is dropped.
pub struct ChangeDetector {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl ChangeDetector {
    /// Start watching `root` recursively, calling `on_signal` from the watcher thread.
    pub fn start<F>(root: &Path, on_signal: F) -> Result<Self>
    where
        F: Fn(WatchSignal) + Send + 'static,
    {
        let mut watcher = notify::recommended_watcher(
            move |result: notify::Result<notify::Event>| {
                if let Some(signal) = classify(result) {
                    on_signal(signal);
                }
            },
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("watching {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            _watcher: watcher,
        })
    }

    #[cfg(test)]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        debug!("released watch on {}", self.root.display());
    }
}
