mod app;
mod client;
mod components;
mod config;
mod error;
mod event;
mod fs;
mod handler;
mod server;
mod sse;
mod tui;
mod ui;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::App;
use crate::client::feed::{self, Backoff};
use crate::config::{AppConfig, ClientConfig, ServerConfig, TreeConfig, WatcherConfig};
use crate::event::{Event, EventHandler};
use crate::fs::tree::{FsTreeSource, TreeSource};
use crate::server::hub::{Hub, HubConfig};
use crate::tui::{install_panic_hook, Tui};

const TICK_RATE: Duration = Duration::from_millis(100);

/// Serve a live directory tree, or follow one in the terminal.
#[derive(Parser, Debug)]
#[command(name = "treecast", version, about)]
struct Cli {
    /// Path to a config file (overrides the default search)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a directory and push snapshots to every connected viewer
    Serve {
        /// Directory to serve (created if missing)
        root: Option<PathBuf>,
        /// Listen address
        #[arg(long)]
        bind: Option<String>,
        /// Delay from the first change of a burst to the snapshot read
        #[arg(long)]
        quiet_ms: Option<u64>,
        /// Keep-alive interval on idle event streams
        #[arg(long)]
        heartbeat_secs: Option<u64>,
    },
    /// Browse a served tree, updated live
    View {
        /// Server address (host:port)
        #[arg(long)]
        server: Option<String>,
        /// Disable mouse support
        #[arg(long)]
        no_mouse: bool,
    },
}

impl Cli {
    /// Flags as a partial config that wins over every file.
    fn overrides(&self) -> AppConfig {
        match &self.command {
            Command::Serve {
                root,
                bind,
                quiet_ms,
                heartbeat_secs,
            } => AppConfig {
                server: ServerConfig {
                    bind: bind.clone(),
                    heartbeat_secs: *heartbeat_secs,
                    ..Default::default()
                },
                tree: TreeConfig {
                    root: root.as_ref().map(|r| r.to_string_lossy().to_string()),
                    ..Default::default()
                },
                watcher: WatcherConfig { quiet_ms: *quiet_ms },
                ..Default::default()
            },
            Command::View { server, no_mouse } => AppConfig {
                client: ClientConfig {
                    server: server.clone(),
                    mouse: no_mouse.then_some(false),
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));

    match cli.command {
        Command::Serve { .. } => {
            init_logging(&config, None);
            serve(&config).await
        }
        Command::View { .. } => {
            let log_file = config.log_file();
            init_logging(&config, log_file.as_deref());
            view(&config).await
        }
    }
}

/// Log to stderr, or to `file` when the terminal belongs to the UI.
///
/// If the file cannot be opened the UI runs without logging.
fn init_logging(config: &AppConfig, file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    match file {
        None => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer())
                .with(filter)
                .init();
        }
        Some(path) => {
            let Some(file) = open_log_file(path) else {
                return;
            };
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .with(filter)
                .init();
        }
    }
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

async fn serve(config: &AppConfig) -> error::Result<()> {
    let root = config.root();
    tokio::fs::create_dir_all(&root).await?;
    let root = root.canonicalize()?;

    let source: Arc<dyn TreeSource> = Arc::new(FsTreeSource::new(&root, config.read_options()));
    source.ensure_exists().await?;
    info!("serving {}", root.display());

    let hub = Hub::spawn(
        source.clone(),
        HubConfig {
            quiet: config.quiet(),
        },
    );
    let listener = TcpListener::bind(config.bind()).await?;

    tokio::select! {
        result = server::http::serve(listener, hub.clone(), source, config.heartbeat()) => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("waiting for ctrl-c failed: {e}");
            }
            if let Ok(stats) = hub.stats().await {
                info!(
                    subscribers = stats.subscribers,
                    watching = stats.watching,
                    watches = stats.generation,
                    "shutting down"
                );
            }
            Ok(())
        }
    }
}

async fn view(config: &AppConfig) -> error::Result<()> {
    install_panic_hook();

    let mut tui = Tui::new(config.mouse_enabled())?;
    let mut app = App::new(config.server_addr(), config.typeahead_window());
    let mut events = EventHandler::new(TICK_RATE);

    let addr = config.server_addr().to_string();
    info!("following {addr}");
    let client = feed::http_client();
    tokio::spawn(feed::bootstrap(client.clone(), addr.clone(), events.sender()));
    let follower = tokio::spawn(feed::run_feed(
        client,
        addr,
        Backoff::new(config.reconnect_min(), config.reconnect_max()),
        events.sender(),
    ));

    loop {
        tui.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await? {
            Event::Key(key) => handler::handle_key_event(&mut app, key, Instant::now()),
            Event::Mouse(mouse) => handler::handle_mouse_event(&mut app, mouse),
            Event::Tick => app.tick(Instant::now()),
            Event::Resize(_, _) => {}
            Event::Bootstrap(result) => app.handle_bootstrap(result),
            Event::Snapshot(snapshot) => app.handle_pushed(snapshot),
            Event::Feed(status) => app.handle_feed_status(status),
        }

        if app.should_quit {
            break;
        }
    }

    follower.abort();
    tui.restore()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_flags_become_overrides() {
        let cli = Cli::parse_from([
            "treecast",
            "serve",
            "/srv/tree",
            "--bind",
            "0.0.0.0:9000",
            "--quiet-ms",
            "120",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.bind(), "0.0.0.0:9000");
        assert_eq!(overrides.root(), PathBuf::from("/srv/tree"));
        assert_eq!(overrides.quiet(), Duration::from_millis(120));
        assert!(overrides.server.heartbeat_secs.is_none());
    }

    #[test]
    fn view_flags_become_overrides() {
        let cli = Cli::parse_from([
            "treecast",
            "--config",
            "custom.toml",
            "view",
            "--server",
            "10.0.0.2:7878",
            "--no-mouse",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        let overrides = cli.overrides();
        assert_eq!(overrides.server_addr(), "10.0.0.2:7878");
        assert!(!overrides.mouse_enabled());
    }

    #[test]
    fn mouse_flag_absent_leaves_config_alone() {
        let cli = Cli::parse_from(["treecast", "view"]);
        assert!(cli.overrides().client.mouse.is_none());
    }
}
