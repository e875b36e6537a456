//! Home-screen shortcut IPC.
//!
//! Applications ask the home screen to add a shortcut or widget by sending a
//! single binary request over a Unix domain socket and receiving an
//! acknowledgement that carries the home screen's verdict.
//!
//! # Architecture
//!
//! - **Transport**: Unix stream sockets with per-read sender credentials
//! - **Protocol**: fixed 32-byte header plus NUL-terminated string payload
//! - **Client**: one connection per request, outcome delivered by callback
//! - **Server**: accept loop, per-connection parser, pluggable handler
//! - **Pending**: FIFO for requests made before the utility connection is up

pub mod client;
pub mod connection;
pub mod pending;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{Reply, ShortcutClient};
pub use pending::{PacketSink, PendingQueue, UtilityLink};
pub use protocol::{LaunchKind, ShortcutRequest};
pub use server::{ShortcutHandler, ShortcutService};
