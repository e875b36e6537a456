//! Client side of the shortcut protocol.
//!
//! Each request opens its own connection to the service, writes a single
//! packet and hands the connection to a background task that waits for the
//! acknowledgement. The caller's callback is invoked exactly once with the
//! outcome: the server's result on success, or a negative errno describing
//! why no valid acknowledgement arrived.
//!
//! | Condition                                | Result          |
//! |------------------------------------------|-----------------|
//! | Short write or send failure              | `-EFAULT`       |
//! | Connection closed before a full header   | `-ECONNABORTED` |
//! | Receive failure                          | `-ECONNABORTED` |
//! | Reply is not a valid acknowledgement     | `-EPROTO`       |
//! | No reply within the reply timeout        | `-ETIMEDOUT`    |
//!
//! Failures before anything was sent (service unreachable, unencodable
//! request) are returned directly and the callback is never invoked.

use super::protocol::{self, decode_header, HeaderBody, LaunchKind, ShortcutRequest, HEADER_SIZE};
use super::transport::{self, Connection, UNKNOWN_PID};
use crate::config::ServiceConfig;
use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome delivered to a request's callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// Server result, or a local negative errno.
    pub result: i32,
    /// PID of the process that sent the acknowledgement, `-1` if unknown.
    pub peer_pid: i32,
}

impl Reply {
    fn failed(errno: i32) -> Self {
        Self {
            result: -errno,
            peer_pid: UNKNOWN_PID,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == 0
    }
}

/// Callback receiving the outcome of one request.
pub type ReplyCallback = Box<dyn FnOnce(Reply) + Send + 'static>;

/// A request waiting for its acknowledgement.
enum PendingOperation {
    Shortcut {
        sequence: u32,
        callback: ReplyCallback,
    },
    Widget {
        sequence: u32,
        period: f64,
        callback: ReplyCallback,
    },
}

impl PendingOperation {
    fn sequence(&self) -> u32 {
        match self {
            PendingOperation::Shortcut { sequence, .. }
            | PendingOperation::Widget { sequence, .. } => *sequence,
        }
    }

    fn into_callback(self) -> ReplyCallback {
        match self {
            PendingOperation::Shortcut { callback, .. }
            | PendingOperation::Widget { callback, .. } => callback,
        }
    }
}

/// Operations keyed by connection id.
///
/// An entry is removed before its callback runs, so a second completion of
/// the same connection finds nothing and does nothing.
#[derive(Default)]
struct PendingCalls {
    calls: Mutex<HashMap<u64, PendingOperation>>,
}

impl PendingCalls {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingOperation>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, connection: u64, operation: PendingOperation) {
        self.lock().insert(connection, operation);
    }

    /// Deliver `reply` to the operation on `connection`. Returns false when
    /// the operation was already completed.
    fn complete(&self, connection: u64, reply: Reply) -> bool {
        let operation = self.lock().remove(&connection);
        match operation {
            Some(operation) => {
                if let PendingOperation::Widget { sequence, period, .. } = &operation {
                    debug!(sequence, period, result = reply.result, "Widget request completed");
                } else {
                    debug!(
                        sequence = operation.sequence(),
                        result = reply.result,
                        "Shortcut request completed"
                    );
                }
                (operation.into_callback())(reply);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Progress of an acknowledgement read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyProgress {
    NeedMore,
    Complete(Reply),
}

/// Incremental acknowledgement reader.
///
/// Performs no I/O; the caller feeds it the result of each receive.
#[derive(Debug)]
pub struct ReplyReader {
    buf: [u8; HEADER_SIZE],
    filled: usize,
    peer_pid: Option<i32>,
}

impl Default for ReplyReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyReader {
    pub fn new() -> Self {
        Self {
            buf: [0u8; HEADER_SIZE],
            filled: 0,
            peer_pid: None,
        }
    }

    /// Bytes still missing from the header.
    pub fn wanted(&self) -> usize {
        HEADER_SIZE - self.filled
    }

    /// Consume one receive. An empty `bytes` is end of stream.
    pub fn feed(&mut self, bytes: &[u8], sender_pid: i32) -> ReplyProgress {
        if bytes.is_empty() {
            return ReplyProgress::Complete(self.fail(libc::ECONNABORTED));
        }
        self.peer_pid.get_or_insert(sender_pid);

        let take = bytes.len().min(self.wanted());
        self.buf[self.filled..self.filled + take].copy_from_slice(&bytes[..take]);
        self.filled += take;
        if self.filled < HEADER_SIZE {
            return ReplyProgress::NeedMore;
        }

        let reply = match decode_header(&self.buf) {
            Ok(header) => match header.body {
                HeaderBody::Ack { result } => Reply {
                    result,
                    peer_pid: self.peer_pid.unwrap_or(UNKNOWN_PID),
                },
                _ => {
                    warn!("Expected an acknowledgement, got {:?}", header.kind());
                    self.fail(libc::EPROTO)
                }
            },
            Err(e) => {
                warn!("Malformed acknowledgement: {}", e);
                self.fail(libc::EPROTO)
            }
        };
        ReplyProgress::Complete(reply)
    }

    /// Reply for a read that ended with `errno`.
    pub fn fail(&self, errno: i32) -> Reply {
        Reply {
            result: -errno,
            peer_pid: self.peer_pid.unwrap_or(UNKNOWN_PID),
        }
    }
}

/// Sends shortcut and widget requests to the service.
pub struct ShortcutClient {
    config: ServiceConfig,
    next_sequence: AtomicU32,
    next_connection: AtomicU64,
    pending: Arc<PendingCalls>,
}

impl ShortcutClient {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            next_sequence: AtomicU32::new(1),
            next_connection: AtomicU64::new(1),
            pending: Arc::new(PendingCalls::default()),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Requests still waiting for their acknowledgement.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Send `request` and invoke `callback` once with the outcome.
    ///
    /// Returns the sequence number of the sent packet. An error means nothing
    /// was sent and `callback` is dropped without being called.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn add_to_home<F>(&self, request: ShortcutRequest, callback: F) -> Result<u32>
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let conn = transport::connect(&self.config.socket_path, self.config.connect_timeout()).await?;

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let packet = protocol::encode_request(sequence, &request)?;

        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let callback: ReplyCallback = Box::new(callback);
        let operation = match request.period {
            Some(period) => PendingOperation::Widget {
                sequence,
                period,
                callback,
            },
            None => PendingOperation::Shortcut { sequence, callback },
        };
        self.pending.insert(connection, operation);

        debug!(
            sequence,
            package = request.package(),
            name = request.name(),
            "Sending shortcut request"
        );

        let pending = Arc::clone(&self.pending);
        let reply_timeout = self.config.reply_timeout();
        tokio::spawn(async move {
            let reply = exchange(conn, packet, reply_timeout).await;
            pending.complete(connection, reply);
        });

        Ok(sequence)
    }

    /// Ask the home screen to add a shortcut.
    ///
    /// Empty strings are sent as absent fields.
    pub async fn add_shortcut<F>(
        &self,
        package: &str,
        name: &str,
        launch: LaunchKind,
        content: &str,
        icon: &str,
        callback: F,
    ) -> Result<u32>
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let request = ShortcutRequest::new(package, name, launch)
            .with_content(content)
            .with_icon(icon);
        self.add_to_home(request, callback).await
    }

    /// Ask the home screen to add a widget refreshed every `period` seconds.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_widget<F>(
        &self,
        package: &str,
        name: &str,
        launch: LaunchKind,
        content: &str,
        icon: &str,
        period: f64,
        callback: F,
    ) -> Result<u32>
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let request = ShortcutRequest::new(package, name, launch)
            .with_content(content)
            .with_icon(icon)
            .with_period(period);
        self.add_to_home(request, callback).await
    }
}

/// Write `packet` and wait for the acknowledgement on `conn`.
async fn exchange(conn: Connection, packet: Vec<u8>, reply_timeout: Option<Duration>) -> Reply {
    match conn.send(&packet).await {
        Ok(written) if written == packet.len() => {}
        Ok(written) => {
            warn!("Short write: {} of {} bytes sent", written, packet.len());
            return Reply::failed(libc::EFAULT);
        }
        Err(e) => {
            warn!("Failed to send shortcut request: {}", e);
            return Reply::failed(libc::EFAULT);
        }
    }

    match reply_timeout {
        Some(limit) => match tokio::time::timeout(limit, read_reply(&conn)).await {
            Ok(reply) => reply,
            Err(_) => {
                warn!("No acknowledgement within {:?}", limit);
                Reply::failed(libc::ETIMEDOUT)
            }
        },
        None => read_reply(&conn).await,
    }
}

async fn read_reply(conn: &Connection) -> Reply {
    let mut reader = ReplyReader::new();
    loop {
        match conn.receive(reader.wanted()).await {
            Ok((bytes, sender_pid)) => {
                if let ReplyProgress::Complete(reply) = reader.feed(&bytes, sender_pid) {
                    return reply;
                }
            }
            Err(e) => {
                debug!("Acknowledgement receive failed: {}", e);
                return reader.fail(libc::ECONNABORTED);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShortcutError;
    use crate::ipc::protocol::{encode_ack, PacketHeader};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    const PEER: i32 = 321;

    #[test]
    fn test_reader_accepts_split_ack() {
        let ack = encode_ack(9, -libc::EINVAL);
        let mut reader = ReplyReader::new();

        assert_eq!(reader.feed(&ack[..5], PEER), ReplyProgress::NeedMore);
        assert_eq!(reader.wanted(), HEADER_SIZE - 5);
        assert_eq!(
            reader.feed(&ack[5..], PEER),
            ReplyProgress::Complete(Reply {
                result: -libc::EINVAL,
                peer_pid: PEER
            })
        );
    }

    #[test]
    fn test_reader_eof_before_header_is_connection_aborted() {
        let ack = encode_ack(1, 0);
        let mut reader = ReplyReader::new();

        assert_eq!(reader.feed(&ack[..12], PEER), ReplyProgress::NeedMore);
        assert_eq!(
            reader.feed(&[], PEER),
            ReplyProgress::Complete(Reply {
                result: -libc::ECONNABORTED,
                peer_pid: PEER
            })
        );
    }

    #[test]
    fn test_reader_eof_without_data_has_unknown_pid() {
        let mut reader = ReplyReader::new();
        assert_eq!(
            reader.feed(&[], PEER),
            ReplyProgress::Complete(Reply {
                result: -libc::ECONNABORTED,
                peer_pid: UNKNOWN_PID
            })
        );
    }

    #[test]
    fn test_reader_rejects_non_ack() {
        let header = PacketHeader {
            sequence: 1,
            payload_size: 0,
            body: HeaderBody::Error,
        };
        let mut reader = ReplyReader::new();
        match reader.feed(&header.encode(), PEER) {
            ReplyProgress::Complete(reply) => assert_eq!(reply.result, -libc::EPROTO),
            other => panic!("Expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_reader_rejects_garbage() {
        let mut reader = ReplyReader::new();
        match reader.feed(&[0xFFu8; HEADER_SIZE], PEER) {
            ReplyProgress::Complete(reply) => assert_eq!(reply.result, -libc::EPROTO),
            other => panic!("Expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_pending_completes_exactly_once() {
        let pending = PendingCalls::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        pending.insert(
            7,
            PendingOperation::Widget {
                sequence: 1,
                period: 600.0,
                callback: Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            },
        );
        assert_eq!(pending.len(), 1);

        assert!(pending.complete(7, Reply::failed(libc::ETIMEDOUT)));
        assert!(!pending.complete(7, Reply { result: 0, peer_pid: PEER }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_service_fails_without_callback() {
        let temp_dir = TempDir::new().unwrap();
        let client =
            ShortcutClient::new(ServiceConfig::with_socket_path(temp_dir.path().join("none.sock")));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = client
            .add_shortcut("com.example.app", "Mail", LaunchKind::Package, "", "", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(matches!(result, Err(ShortcutError::Comm { .. })));
        assert_eq!(client.pending_count(), 0);
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("silent.sock");
        let listener = transport::listen(&path).unwrap();

        let config = ServiceConfig {
            reply_timeout_ms: 50,
            ..ServiceConfig::with_socket_path(&path)
        };
        let client = ShortcutClient::new(config);
        let (tx, rx) = tokio::sync::oneshot::channel();

        client
            .add_shortcut("com.example.app", "Mail", LaunchKind::Package, "", "", move |reply| {
                let _ = tx.send(reply);
            })
            .await
            .unwrap();
        let _held = listener.accept().await.unwrap();

        let reply = rx.await.unwrap();
        assert_eq!(reply.result, -libc::ETIMEDOUT);
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_server_closing_early_is_connection_aborted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rude.sock");
        let listener = transport::listen(&path).unwrap();
        let client = ShortcutClient::new(ServiceConfig::with_socket_path(&path));
        let (tx, rx) = tokio::sync::oneshot::channel();

        client
            .add_shortcut("com.example.app", "Mail", LaunchKind::Package, "", "", move |reply| {
                let _ = tx.send(reply);
            })
            .await
            .unwrap();
        let server_side = listener.accept().await.unwrap();
        let _ = server_side.receive(HEADER_SIZE).await.unwrap();
        drop(server_side);

        let reply = rx.await.unwrap();
        assert_eq!(reply.result, -libc::ECONNABORTED);
    }
}
