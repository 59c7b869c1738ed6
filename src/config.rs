//! Application configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--bind`, `--quiet-ms`, `--server`, etc.)
//! 2. Explicit `--config` file
//! 3. `$TREECAST_CONFIG` environment variable (path to config file)
//! 4. Project-local `.treecast.toml` in the current working directory
//! 5. Global `~/.config/treecast/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::client::feed::{DEFAULT_RECONNECT_MAX_MS, DEFAULT_RECONNECT_MIN_MS};
use crate::client::navigation::DEFAULT_TYPEAHEAD_MS;
use crate::fs::coalesce::DEFAULT_QUIET_MS;
use crate::fs::tree::{ReadOptions, SortBy, DEFAULT_IGNORE_PATTERNS};
use crate::server::http::DEFAULT_HEARTBEAT_SECS;

// ── Section configs ──────────────────────────────────────────────────────────

/// Snapshot server settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: Option<String>,
    /// Keep-alive interval on idle event streams.
    pub heartbeat_secs: Option<u64>,
}

/// How the served tree is read.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TreeConfig {
    /// Directory to serve (overridden by CLI positional arg).
    pub root: Option<String>,
    /// Sort order: "name", "size", "modified".
    pub sort_by: Option<String>,
    /// Directories always listed first.
    pub dirs_first: Option<bool>,
    /// Entry names left out of snapshots.
    pub ignore: Option<Vec<String>>,
}

/// Filesystem watcher settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WatcherConfig {
    /// Delay from the first event of a burst to the snapshot read.
    pub quiet_ms: Option<u64>,
}

/// Terminal viewer settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address to follow.
    pub server: Option<String>,
    /// Type-ahead inactivity window in milliseconds.
    pub typeahead_ms: Option<u64>,
    /// Enable mouse support.
    pub mouse: Option<bool>,
    pub reconnect_min_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: Option<String>,
    /// Viewer log file.
    pub file: Option<PathBuf>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub tree: TreeConfig,
    pub watcher: WatcherConfig,
    pub client: ClientConfig,
    pub log: LogConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

pub const DEFAULT_BIND: &str = "127.0.0.1:7878";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const CONFIG_ENV_VAR: &str = "TREECAST_CONFIG";

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path; that is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".treecast.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("treecast").join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed.
///
/// Config is loaded before logging is set up, so parse failures go to stderr.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!(
                "Warning: failed to parse config file {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                bind: other.server.bind.clone().or(self.server.bind),
                heartbeat_secs: other.server.heartbeat_secs.or(self.server.heartbeat_secs),
            },
            tree: TreeConfig {
                root: other.tree.root.clone().or(self.tree.root),
                sort_by: other.tree.sort_by.clone().or(self.tree.sort_by),
                dirs_first: other.tree.dirs_first.or(self.tree.dirs_first),
                ignore: other.tree.ignore.clone().or(self.tree.ignore),
            },
            watcher: WatcherConfig {
                quiet_ms: other.watcher.quiet_ms.or(self.watcher.quiet_ms),
            },
            client: ClientConfig {
                server: other.client.server.clone().or(self.client.server),
                typeahead_ms: other.client.typeahead_ms.or(self.client.typeahead_ms),
                mouse: other.client.mouse.or(self.client.mouse),
                reconnect_min_ms: other
                    .client
                    .reconnect_min_ms
                    .or(self.client.reconnect_min_ms),
                reconnect_max_ms: other
                    .client
                    .reconnect_max_ms
                    .or(self.client.reconnect_max_ms),
            },
            log: LogConfig {
                level: other.log.level.clone().or(self.log.level),
                file: other.log.file.clone().or(self.log.file),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Lowest priority first so higher sources overwrite.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            match load_file(cli_path) {
                Some(file_cfg) => config = config.merge(&file_cfg),
                None => warn!("config file {} not loaded", cli_path.display()),
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn bind(&self) -> &str {
        self.server.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(
            self.server
                .heartbeat_secs
                .unwrap_or(DEFAULT_HEARTBEAT_SECS)
                .max(1),
        )
    }

    pub fn root(&self) -> PathBuf {
        PathBuf::from(self.tree.root.as_deref().unwrap_or("."))
    }

    /// Sort mode: "name", "size", or "modified".
    pub fn sort_by(&self) -> &str {
        self.tree.sort_by.as_deref().unwrap_or("name")
    }

    pub fn dirs_first(&self) -> bool {
        self.tree.dirs_first.unwrap_or(true)
    }

    pub fn ignore(&self) -> Vec<String> {
        match &self.tree.ignore {
            Some(ignore) => ignore.clone(),
            None => DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            sort_by: SortBy::from_str(self.sort_by()),
            dirs_first: self.dirs_first(),
            ignore: self.ignore(),
        }
    }

    pub fn quiet(&self) -> Duration {
        Duration::from_millis(self.watcher.quiet_ms.unwrap_or(DEFAULT_QUIET_MS))
    }

    /// Server address the viewer connects to; falls back to the bind address.
    pub fn server_addr(&self) -> &str {
        self.client
            .server
            .as_deref()
            .or(self.server.bind.as_deref())
            .unwrap_or(DEFAULT_BIND)
    }

    pub fn typeahead_window(&self) -> Duration {
        Duration::from_millis(self.client.typeahead_ms.unwrap_or(DEFAULT_TYPEAHEAD_MS))
    }

    /// Whether mouse support is enabled.
    pub fn mouse_enabled(&self) -> bool {
        self.client.mouse.unwrap_or(true)
    }

    pub fn reconnect_min(&self) -> Duration {
        Duration::from_millis(
            self.client
                .reconnect_min_ms
                .unwrap_or(DEFAULT_RECONNECT_MIN_MS),
        )
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(
            self.client
                .reconnect_max_ms
                .unwrap_or(DEFAULT_RECONNECT_MAX_MS),
        )
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Viewer log file: configured path, else `<cache dir>/treecast/view.log`.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.log
            .file
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("treecast").join("view.log")))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
