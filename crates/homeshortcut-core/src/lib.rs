//! Homeshortcut Core - request protocol for adding shortcuts to the home screen.
//!
//! Applications use [`ShortcutClient`] to ask the home screen to add a
//! shortcut or a periodically refreshed widget. The home screen runs a
//! [`ShortcutService`] with a registered handler that decides each request
//! and usually records accepted shortcuts in a [`ShortcutStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use homeshortcut_core::{LaunchKind, ServiceConfig, ShortcutClient};
//!
//! #[tokio::main]
//! async fn main() -> homeshortcut_core::Result<()> {
//!     let client = ShortcutClient::new(ServiceConfig::from_env());
//!
//!     client
//!         .add_shortcut("com.example.mail", "Inbox", LaunchKind::Package, "", "", |reply| {
//!             println!("home screen answered {} (pid {})", reply.result, reply.peer_pid);
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ipc;
pub mod platform;
pub mod store;

// Re-export commonly used types
pub use config::{IpcConfig, ServiceConfig, StoreConfig};
pub use error::{Result, ShortcutError};
pub use ipc::{
    LaunchKind, PacketSink, PendingQueue, Reply, ShortcutClient, ShortcutHandler,
    ShortcutRequest, ShortcutService, UtilityLink,
};
pub use store::{ShortcutFilter, ShortcutRecord, ShortcutStore, SqliteShortcutStore};
