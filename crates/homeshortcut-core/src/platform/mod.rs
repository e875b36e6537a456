//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific filesystem behavior live here rather
//! than in the IPC modules. Socket credential handling is the exception: it is
//! part of the transport and stays in `ipc::transport`.
//!
//! - `paths` - well-known socket and database locations
//! - `permissions` - socket file mode and stale socket cleanup

pub mod paths;
pub mod permissions;

pub use paths::{data_dir, default_socket_path, store_db_path};
pub use permissions::{remove_owned_socket, remove_stale_socket, set_socket_mode, SocketFileId};
