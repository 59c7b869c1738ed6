//! Snapshot broadcaster.
//!
//! A single task owns the subscriber set, the filesystem watch and the
//! coalescing timer, so every registration, teardown and broadcast is
//! serialized without locks. The watch lives exactly as long as at least
//! one subscriber is registered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::fs::coalesce::{Coalescer, DEFAULT_QUIET_MS};
use crate::fs::tree::TreeSource;
use crate::fs::watcher::{ChangeDetector, WatchSignal};

/// One JSON-encoded snapshot, shared by every subscriber it is pushed to.
pub type Payload = Arc<str>;

pub type SubscriberId = u64;

/// Latest undelivered snapshot of one subscriber; `None` until the first push.
type Slot = watch::Receiver<Option<Payload>>;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub quiet: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            quiet: Duration::from_millis(DEFAULT_QUIET_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub subscribers: usize,
    pub watching: bool,
    /// Number of watches established so far.
    pub generation: u64,
}

enum Command {
    Subscribe(oneshot::Sender<(SubscriberId, Slot)>),
    Unsubscribe(SubscriberId),
    Watch { generation: u64, signal: WatchSignal },
    Stats(oneshot::Sender<HubStats>),
    #[cfg(test)]
    Inject(WatchSignal),
}

/// Cloneable handle to a running hub. The hub stops once every handle and
/// subscription is gone.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl HubHandle {
    /// Register a new subscriber. A fresh snapshot is queued for it immediately.
    pub async fn subscribe(&self) -> Result<Subscription> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Subscribe(reply))
            .map_err(|_| AppError::HubClosed)?;
        let (id, latest) = response.await.map_err(|_| AppError::HubClosed)?;
        Ok(Subscription {
            id,
            latest,
            commands: self.commands.clone(),
        })
    }

    pub async fn stats(&self) -> Result<HubStats> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stats(reply))
            .map_err(|_| AppError::HubClosed)?;
        response.await.map_err(|_| AppError::HubClosed)
    }

    /// Feed a signal as if it came from the current watch.
    #[cfg(test)]
    fn inject(&self, signal: WatchSignal) {
        let _ = self.commands.send(Command::Inject(signal));
    }
}

/// A registered subscriber. Dropping it deregisters it.
///
/// Delivery is latest-wins: a subscriber that falls behind skips the
/// snapshots it missed and receives only the newest one.
pub struct Subscription {
    id: SubscriberId,
    latest: Slot,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next snapshot pushed to this subscriber; `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Payload> {
        loop {
            self.latest.changed().await.ok()?;
            if let Some(payload) = self.latest.borrow_and_update().clone() {
                return Some(payload);
            }
        }
    }

    #[cfg(test)]
    fn try_recv(&mut self) -> Option<Payload> {
        if !self.latest.has_changed().unwrap_or(false) {
            return None;
        }
        self.latest.borrow_and_update().clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe(self.id));
    }
}

pub struct Hub {
    source: Arc<dyn TreeSource>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Weak so the watch callback does not keep the hub alive on its own.
    signals: mpsc::WeakUnboundedSender<Command>,
    subscribers: HashMap<SubscriberId, watch::Sender<Option<Payload>>>,
    next_id: SubscriberId,
    watch: Option<ChangeDetector>,
    generation: u64,
    coalescer: Coalescer,
}

impl Hub {
    /// Start the hub on the current runtime.
    pub fn spawn(source: Arc<dyn TreeSource>, config: HubConfig) -> HubHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Hub {
            source,
            coalescer: Coalescer::new(config.quiet),
            commands: rx,
            signals: tx.downgrade(),
            subscribers: HashMap::new(),
            next_id: 1,
            watch: None,
            generation: 0,
        };
        tokio::spawn(hub.run());
        HubHandle { commands: tx }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                () = self.coalescer.fired() => self.broadcast().await,
            }
        }
        debug!("snapshot hub stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe(reply) => self.subscribe(reply).await,
            Command::Unsubscribe(id) => self.unsubscribe(id),
            Command::Watch { generation, signal } => self.on_watch_signal(generation, signal),
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            #[cfg(test)]
            Command::Inject(signal) => self.on_watch_signal(self.generation, signal),
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscribers.len(),
            watching: self.watch.is_some(),
            generation: self.generation,
        }
    }

    async fn subscribe(&mut self, reply: oneshot::Sender<(SubscriberId, Slot)>) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = watch::channel(None);
        if reply.send((id, rx)).is_err() {
            // The caller gave up before the registration completed.
            return;
        }
        self.subscribers.insert(id, tx);
        info!(subscriber = id, total = self.subscribers.len(), "subscriber joined");

        self.ensure_watch().await;
        if let Some(payload) = self.read_payload().await {
            self.push(id, payload);
        }
        self.release_if_idle();
    }

    fn unsubscribe(&mut self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_none() {
            return;
        }
        info!(subscriber = id, total = self.subscribers.len(), "subscriber left");
        self.release_if_idle();
    }

    async fn ensure_watch(&mut self) {
        if self.watch.is_some() {
            return;
        }
        if let Err(e) = self.source.ensure_exists().await {
            error!("cannot prepare tree root: {e}");
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let signals = self.signals.clone();
        let started = ChangeDetector::start(self.source.watch_root(), move |signal| {
            if let Some(tx) = signals.upgrade() {
                let _ = tx.send(Command::Watch { generation, signal });
            }
        });
        match started {
            Ok(detector) => self.watch = Some(detector),
            Err(e) => error!(
                "failed to watch {}: {e}",
                self.source.watch_root().display()
            ),
        }
    }

    fn on_watch_signal(&mut self, generation: u64, signal: WatchSignal) {
        // Signals from a watch that has since been torn down are stale.
        if generation != self.generation || self.watch.is_none() {
            return;
        }
        match signal {
            WatchSignal::Changed => {
                if self.coalescer.notify() {
                    debug!("change burst started");
                }
            }
            WatchSignal::Failed(message) => {
                error!("watch failed, tearing it down: {message}");
                self.watch = None;
            }
        }
    }

    /// Drop the watch and any pending timer once nobody is listening.
    fn release_if_idle(&mut self) {
        if !self.subscribers.is_empty() {
            return;
        }
        self.coalescer.cancel();
        if self.watch.take().is_some() {
            info!("last subscriber left, watch released");
        }
    }

    async fn broadcast(&mut self) {
        let targets: Vec<SubscriberId> = self.subscribers.keys().copied().collect();
        if targets.is_empty() {
            return;
        }
        let Some(payload) = self.read_payload().await else {
            return;
        };
        debug!(subscribers = targets.len(), "broadcasting snapshot");
        for id in targets {
            self.push(id, payload.clone());
        }
        self.release_if_idle();
    }

    async fn read_payload(&self) -> Option<Payload> {
        match self.source.read_snapshot().await.and_then(|s| s.to_json()) {
            Ok(json) => Some(Arc::from(json)),
            Err(e) => {
                warn!("snapshot read failed, skipping push: {e}");
                None
            }
        }
    }

    /// Replace whatever the subscriber has not consumed yet; never waits.
    fn push(&mut self, id: SubscriberId, payload: Payload) {
        let Some(tx) = self.subscribers.get(&id) else {
            return;
        };
        if tx.send(Some(payload)).is_err() {
            debug!(subscriber = id, "subscriber channel closed");
            self.subscribers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::time::advance;

    use crate::fs::tree::{Snapshot, TreeNode, ROOT_PATH};

    const QUIET: Duration = Duration::from_millis(75);

    /// In-memory tree whose next read can be swapped or made to fail.
    struct MemorySource {
        root: PathBuf,
        next: Mutex<Option<Snapshot>>,
        reads: AtomicUsize,
    }

    impl MemorySource {
        fn new(root: &Path, snapshot: Snapshot) -> Arc<Self> {
            Arc::new(Self {
                root: root.to_path_buf(),
                next: Mutex::new(Some(snapshot)),
                reads: AtomicUsize::new(0),
            })
        }

        fn set(&self, snapshot: Snapshot) {
            *self.next.lock().unwrap() = Some(snapshot);
        }

        fn fail(&self) {
            *self.next.lock().unwrap() = None;
        }
    }

    #[async_trait]
    impl TreeSource for MemorySource {
        fn watch_root(&self) -> &Path {
            &self.root
        }

        async fn ensure_exists(&self) -> Result<()> {
            Ok(())
        }

        async fn read_snapshot(&self) -> Result<Snapshot> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.next
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AppError::Io(std::io::Error::other("disk unavailable")))
        }
    }

    fn tree(files: &[&str]) -> Snapshot {
        let children = files
            .iter()
            .map(|f| TreeNode::file(*f, format!("/{f}")))
            .collect();
        Snapshot::new(TreeNode::folder("root", ROOT_PATH, children))
    }

    fn json(snapshot: &Snapshot) -> String {
        snapshot.to_json().unwrap()
    }

    fn config() -> HubConfig {
        HubConfig { quiet: QUIET }
    }

    #[tokio::test(start_paused = true)]
    async fn new_subscriber_gets_immediate_snapshot() {
        let dir = TempDir::new().unwrap();
        let initial = tree(&["a.txt"]);
        let source = MemorySource::new(dir.path(), initial.clone());
        let hub = Hub::spawn(source, config());

        let mut sub = hub.subscribe().await.unwrap();
        let payload = sub.recv().await.unwrap();
        assert_eq!(&*payload, json(&initial));

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.subscribers, 1);
        assert!(stats.watching);
    }

    #[tokio::test(start_paused = true)]
    async fn one_burst_fans_out_one_identical_push_per_subscriber() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new(dir.path(), tree(&["a.txt"]));
        let hub = Hub::spawn(source.clone(), config());

        let mut subs = Vec::new();
        for _ in 0..3 {
            let mut sub = hub.subscribe().await.unwrap();
            sub.recv().await.unwrap();
            subs.push(sub);
        }

        let updated = tree(&["a.txt", "b.txt"]);
        source.set(updated.clone());
        for _ in 0..5 {
            hub.inject(WatchSignal::Changed);
        }

        for sub in &mut subs {
            let payload = sub.recv().await.unwrap();
            assert_eq!(&*payload, json(&updated));
        }

        advance(QUIET * 4).await;
        hub.stats().await.unwrap();
        for sub in &mut subs {
            assert!(sub.try_recv().is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn coalesced_burst_reads_the_tree_once() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new(dir.path(), tree(&["a.txt"]));
        let hub = Hub::spawn(source.clone(), config());
        let mut sub = hub.subscribe().await.unwrap();
        sub.recv().await.unwrap();
        let before = source.reads.load(Ordering::SeqCst);

        for _ in 0..20 {
            hub.inject(WatchSignal::Changed);
        }
        sub.recv().await.unwrap();

        assert_eq!(source.reads.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_changes_each_push() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new(dir.path(), tree(&["a.txt"]));
        let hub = Hub::spawn(source, config());
        let mut sub = hub.subscribe().await.unwrap();
        sub.recv().await.unwrap();

        for _ in 0..3 {
            hub.inject(WatchSignal::Changed);
            sub.recv().await.unwrap();
            advance(QUIET * 2).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn last_unsubscribe_releases_watch_and_resubscribe_restores_it() {
        let dir = TempDir::new().unwrap();
        let initial = tree(&["a.txt"]);
        let source = MemorySource::new(dir.path(), initial.clone());
        let hub = Hub::spawn(source, config());

        let first = hub.subscribe().await.unwrap();
        let second = hub.subscribe().await.unwrap();
        drop(first);
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.subscribers, 1);
        assert!(stats.watching);

        drop(second);
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.subscribers, 0);
        assert!(!stats.watching);
        assert_eq!(stats.generation, 1);

        let mut again = hub.subscribe().await.unwrap();
        assert_eq!(&*again.recv().await.unwrap(), json(&initial));
        let stats = hub.stats().await.unwrap();
        assert!(stats.watching);
        assert_eq!(stats.generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_change_is_dropped_when_everyone_leaves() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new(dir.path(), tree(&["a.txt"]));
        let hub = Hub::spawn(source.clone(), config());
        let sub = hub.subscribe().await.unwrap();

        hub.inject(WatchSignal::Changed);
        drop(sub);
        hub.stats().await.unwrap();
        let reads = source.reads.load(Ordering::SeqCst);

        advance(QUIET * 4).await;
        hub.stats().await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_read_skips_push_without_closing_channel() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new(dir.path(), tree(&["a.txt"]));
        source.fail();
        let hub = Hub::spawn(source.clone(), config());

        let mut sub = hub.subscribe().await.unwrap();
        hub.stats().await.unwrap();
        assert!(sub.try_recv().is_none());

        hub.inject(WatchSignal::Changed);
        advance(QUIET * 2).await;
        hub.stats().await.unwrap();
        assert!(sub.try_recv().is_none());

        let recovered = tree(&["b.txt"]);
        source.set(recovered.clone());
        hub.inject(WatchSignal::Changed);
        assert_eq!(&*sub.recv().await.unwrap(), json(&recovered));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_failure_tears_down_until_next_subscription() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new(dir.path(), tree(&["a.txt"]));
        let hub = Hub::spawn(source, config());
        let mut sub = hub.subscribe().await.unwrap();
        sub.recv().await.unwrap();

        hub.inject(WatchSignal::Failed("inotify limit reached".into()));
        let stats = hub.stats().await.unwrap();
        assert!(!stats.watching);
        assert_eq!(stats.subscribers, 1);

        // Nothing is watching, so raw changes are ignored.
        hub.inject(WatchSignal::Changed);
        advance(QUIET * 2).await;
        hub.stats().await.unwrap();
        assert!(sub.try_recv().is_none());

        let mut next = hub.subscribe().await.unwrap();
        next.recv().await.unwrap();
        let stats = hub.stats().await.unwrap();
        assert!(stats.watching);
        assert_eq!(stats.generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_subscriber_catches_up_on_latest_snapshot() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new(dir.path(), tree(&["old.txt"]));
        let hub = Hub::spawn(source.clone(), config());
        // The initial snapshot is queued but never read.
        let mut sub = hub.subscribe().await.unwrap();
        hub.stats().await.unwrap();

        let mid = tree(&["mid.txt"]);
        source.set(mid);
        hub.inject(WatchSignal::Changed);
        advance(QUIET * 2).await;
        hub.stats().await.unwrap();

        let newest = tree(&["new.txt"]);
        source.set(newest.clone());
        hub.inject(WatchSignal::Changed);
        advance(QUIET * 2).await;

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.subscribers, 1);
        assert_eq!(sub.try_recv().as_deref(), Some(json(&newest).as_str()));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn real_file_change_reaches_subscriber() {
        use crate::fs::tree::{FsTreeSource, ReadOptions};

        let dir = TempDir::new().unwrap();
        let source = Arc::new(FsTreeSource::new(dir.path(), ReadOptions::default()));
        let hub = Hub::spawn(source, HubConfig::default());
        let mut sub = hub.subscribe().await.unwrap();
        let initial = Snapshot::from_json(&sub.recv().await.unwrap()).unwrap();
        assert!(initial.root().children().is_empty());

        std::fs::write(dir.path().join("fresh.txt"), "hi").unwrap();

        let pushed = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        let snapshot = Snapshot::from_json(&pushed).unwrap();
        assert_eq!(snapshot.root().children()[0].name(), "fresh.txt");
    }
}
