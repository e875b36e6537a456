//! Homeshortcut Daemon - reference home-screen service.
//!
//! Listens on the shortcut socket, records accepted shortcuts in the SQLite
//! store and answers every request with the outcome.

mod handler;

use anyhow::Result;
use clap::Parser;
use homeshortcut_core::{ServiceConfig, ShortcutService, ShortcutStore, SqliteShortcutStore};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::handler::StoreHandler;

/// How often the listener is checked and restarted after a failure.
const SUPERVISE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "homeshortcut-daemon")]
#[command(about = "Home-screen service accepting shortcut requests")]
struct Args {
    /// Socket path (overrides the config file and HOMESHORTCUT_SOCKET)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Shortcut database (defaults to the platform data directory)
    #[arg(long)]
    db: Option<PathBuf>,

    /// JSON service configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reject widget requests
    #[arg(long)]
    no_widgets: bool,

    /// Print the stored shortcuts as JSON and exit
    #[arg(long)]
    list: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging. stdout is reserved for --list output.
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::from_env(),
    };
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    let store = match &args.db {
        Some(path) => SqliteShortcutStore::open_at(path)?,
        None => SqliteShortcutStore::open()?,
    };

    if args.list {
        let records = store.get_shortcuts(None)?;
        // Intentional stdout: machine-readable listing
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    info!("Starting homeshortcut daemon");

    let handler = StoreHandler::new(store, !args.no_widgets);
    let mut service = ShortcutService::new(config);
    service.register_handler(handler.clone()).await?;

    info!("Accepting shortcut requests on {}", service.socket_path().display());

    let mut supervise = tokio::time::interval(SUPERVISE_INTERVAL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown signal received, exiting");
                break;
            }
            _ = supervise.tick() => {
                if !service.is_listening() {
                    warn!("Shortcut listener is down, restarting");
                    if let Err(e) = service.register_handler(handler.clone()).await {
                        warn!("Failed to restart shortcut listener: {}", e);
                    }
                }
            }
        }
    }

    service.shutdown();
    Ok(())
}
