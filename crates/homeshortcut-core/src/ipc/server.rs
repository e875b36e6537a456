//! Shortcut service: accepts requests and answers with an acknowledgement.
//!
//! Listens on the rendezvous socket, reads one request per connection, hands
//! it to the registered [`ShortcutHandler`] together with the sender's PID and
//! writes back an acknowledgement carrying the handler's result and the
//! request's sequence number. The connection is closed after the ack.
//!
//! # Thread Safety
//!
//! The service runs on the tokio runtime. Each connection is handled in its
//! own spawned task. The handler is called synchronously on that task, so a
//! slow handler holds a runtime worker for its duration; with the
//! multi-threaded runtime other connections keep being served on the
//! remaining workers.

use super::connection::{ConnectionState, Progress};
use super::protocol::{encode_ack, ShortcutRequest};
use super::transport::{self, Connection, Listener, UNKNOWN_PID};
use crate::config::ServiceConfig;
use crate::error::{Result, ShortcutError};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Back-off after the process or system ran out of descriptors.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Application callback deciding the result of each request.
///
/// Returns 0 to accept the request or a negative errno to reject it. The
/// value is relayed unchanged to the client.
pub trait ShortcutHandler: Send + Sync + 'static {
    fn handle(&self, request: &ShortcutRequest, sender_pid: i32) -> i32;
}

impl<F> ShortcutHandler for F
where
    F: Fn(&ShortcutRequest, i32) -> i32 + Send + Sync + 'static,
{
    fn handle(&self, request: &ShortcutRequest, sender_pid: i32) -> i32 {
        self(request, sender_pid)
    }
}

type HandlerSlot = Arc<RwLock<Arc<dyn ShortcutHandler>>>;

/// Running accept loop. Dropping it stops the loop and all connections.
struct ServerTask {
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
    listening: Arc<AtomicBool>,
}

impl ServerTask {
    fn start(listener: Listener, handler: HandlerSlot, max_connections: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let listening = Arc::new(AtomicBool::new(true));

        let task_handle = tokio::spawn(accept_loop(
            listener,
            handler,
            max_connections,
            shutdown_rx,
            conn_shutdown_rx,
            Arc::clone(&listening),
        ));

        Self {
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
            listening,
        }
    }

    fn is_alive(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Whether [`shutdown`](Self::shutdown) was requested, as opposed to the
    /// loop ending on its own.
    fn was_stopped(&self) -> bool {
        self.shutdown_tx.is_none()
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
        self.listening.store(false, Ordering::Release);
    }

    /// Stop the loop and wait until it has released the listener.
    async fn finish(mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                warn!("Shortcut accept task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ServerTask {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Server side of the shortcut protocol.
///
/// Nothing is bound until the first [`register_handler`](Self::register_handler)
/// call. Dropping the service stops listening and removes the socket file.
pub struct ShortcutService {
    config: ServiceConfig,
    handler: Option<HandlerSlot>,
    server: Option<ServerTask>,
}

impl ShortcutService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            handler: None,
            server: None,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Install `handler` and make sure the service is listening.
    ///
    /// The first call binds the socket and starts accepting. Later calls
    /// replace the handler without rebinding, unless the service was shut
    /// down or the accept loop stopped after a listener failure, in which
    /// case the old loop is awaited and the socket is bound again. Requests
    /// already being dispatched finish with the previous handler.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn register_handler<H: ShortcutHandler>(&mut self, handler: H) -> Result<()> {
        let handler: Arc<dyn ShortcutHandler> = Arc::new(handler);

        let slot = match &self.handler {
            Some(slot) => {
                let mut current = slot.write().map_err(|_| ShortcutError::Fault {
                    message: "handler lock poisoned".to_string(),
                })?;
                *current = handler;
                Arc::clone(slot)
            }
            None => {
                let slot = Arc::new(RwLock::new(handler));
                self.handler = Some(Arc::clone(&slot));
                slot
            }
        };

        if self.is_listening() {
            debug!("Replaced shortcut handler");
            return Ok(());
        }

        if let Some(old) = self.server.take() {
            if !old.was_stopped() {
                warn!(
                    "Shortcut service listener stopped, binding {} again",
                    self.config.socket_path.display()
                );
            }
            // The old listener must be gone before the path is bound again.
            old.finish().await;
        }

        let listener = transport::listen(&self.config.socket_path)?;
        self.server = Some(ServerTask::start(
            listener,
            slot,
            self.config.max_connections,
        ));
        Ok(())
    }

    /// Whether the accept loop is running.
    pub fn is_listening(&self) -> bool {
        self.server.as_ref().is_some_and(ServerTask::is_alive)
    }

    /// Stop accepting and close all connections. The handler stays
    /// registered; a later `register_handler` listens again.
    pub fn shutdown(&mut self) {
        if let Some(server) = self.server.as_mut() {
            if !server.was_stopped() {
                server.shutdown();
                info!("Shortcut service stopped");
            }
        }
    }
}

impl Drop for ShortcutService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(
    listener: Listener,
    handler: HandlerSlot,
    max_connections: usize,
    mut shutdown_rx: oneshot::Receiver<()>,
    conn_shutdown_rx: watch::Receiver<bool>,
    listening: Arc<AtomicBool>,
) {
    let active_connections = Arc::new(AtomicUsize::new(0));
    let next_id = AtomicU64::new(1);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Shortcut service shutting down");
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok(conn) => {
                        let Some(slot) =
                            ConnectionSlot::acquire(&active_connections, max_connections)
                        else {
                            warn!(
                                "Rejecting shortcut connection: at max capacity ({})",
                                max_connections
                            );
                            continue;
                        };

                        let id = next_id.fetch_add(1, Ordering::Relaxed);
                        let handler = Arc::clone(&handler);
                        let mut conn_shutdown = conn_shutdown_rx.clone();

                        tokio::spawn(async move {
                            let _slot = slot;
                            match handle_connection(id, &conn, &handler, &mut conn_shutdown).await {
                                Ok(()) => debug!("Shortcut connection {} closed", id),
                                Err(e) => warn!("Shortcut connection {} dropped: {}", id, e),
                            }
                        });
                    }
                    Err(e) if is_retryable_accept_error(&e) => {
                        warn!("Shortcut accept error, retrying: {}", e);
                        if is_resource_exhaustion(&e) {
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        }
                    }
                    Err(e) => {
                        error!(
                            "Shortcut listener on {} failed: {}",
                            listener.path().display(),
                            e
                        );
                        break;
                    }
                }
            }
        }
    }

    listening.store(false, Ordering::Release);
}

/// One connection counted against the cap. Released on drop, including when
/// the connection task unwinds.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    /// Only the accept loop acquires, so load-then-add does not race.
    fn acquire(active: &Arc<AtomicUsize>, max_connections: usize) -> Option<Self> {
        if active.load(Ordering::Relaxed) >= max_connections {
            return None;
        }
        active.fetch_add(1, Ordering::Relaxed);
        Some(Self(Arc::clone(active)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

fn is_retryable_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    ) || matches!(err.raw_os_error(), Some(libc::EPROTO)) || is_resource_exhaustion(err)
}

fn is_resource_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM)
    )
}

/// Server side of one accepted socket.
trait PeerStream {
    async fn receive(&self, max_len: usize) -> Result<(Vec<u8>, i32)>;
    async fn send(&self, bytes: &[u8]) -> Result<usize>;
}

impl PeerStream for Connection {
    async fn receive(&self, max_len: usize) -> Result<(Vec<u8>, i32)> {
        Connection::receive(self, max_len).await
    }

    async fn send(&self, bytes: &[u8]) -> Result<usize> {
        Connection::send(self, bytes).await
    }
}

async fn handle_connection<S: PeerStream>(
    id: u64,
    conn: &S,
    handler: &HandlerSlot,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<()> {
    let mut state = ConnectionState::new();

    loop {
        let (bytes, sender_pid) = tokio::select! {
            received = conn.receive(state.wanted()) => received?,
            _ = shutdown_rx.changed() => return Ok(()),
        };

        if bytes.is_empty() {
            return Err(ShortcutError::Comm {
                message: format!("peer closed the connection in {:?}", state.phase()),
                source: None,
            });
        }

        match state.feed(&bytes, sender_pid) {
            Progress::NeedMore => continue,
            Progress::Done => return Ok(()),
            Progress::Abort(err) => return Err(err),
            Progress::Dispatch { sequence, request } => {
                let peer_pid = state.peer_pid().unwrap_or(UNKNOWN_PID);
                debug!(
                    connection = id,
                    sequence,
                    peer_pid,
                    package = request.package(),
                    widget = request.is_widget(),
                    "Dispatching shortcut request"
                );

                let result = dispatch(handler, &request, peer_pid);
                let ack = encode_ack(sequence, result);
                let written = conn.send(&ack).await?;
                if written != ack.len() {
                    return Err(ShortcutError::Fault {
                        message: format!("short ack write ({} of {} bytes)", written, ack.len()),
                    });
                }
                return Ok(());
            }
        }
    }
}

fn dispatch(handler: &HandlerSlot, request: &ShortcutRequest, peer_pid: i32) -> i32 {
    // The lock is not held while the handler runs.
    let current = match handler.read() {
        Ok(guard) => Arc::clone(&*guard),
        Err(_) => {
            error!("Shortcut handler lock poisoned");
            return -libc::EFAULT;
        }
    };
    match panic::catch_unwind(AssertUnwindSafe(|| current.handle(request, peer_pid))) {
        Ok(result) => result,
        Err(_) => {
            error!("Shortcut handler panicked (peer pid {})", peer_pid);
            -libc::EFAULT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::protocol::{decode_header, encode_request, HeaderBody, LaunchKind, HEADER_SIZE};
    use crate::ipc::transport::connect;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicI32;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> ServiceConfig {
        ServiceConfig::with_socket_path(temp_dir.path().join("service.sock"))
    }

    async fn exchange(service: &ShortcutService, packet: &[u8]) -> Vec<u8> {
        let conn = connect(service.socket_path(), Duration::from_secs(2))
            .await
            .unwrap();
        conn.send(packet).await.unwrap();

        let mut reply = Vec::new();
        loop {
            let (bytes, _) = conn.receive(HEADER_SIZE).await.unwrap();
            if bytes.is_empty() {
                return reply;
            }
            reply.extend_from_slice(&bytes);
        }
    }

    #[tokio::test]
    async fn test_nothing_bound_before_registration() {
        let temp_dir = TempDir::new().unwrap();
        let service = ShortcutService::new(test_config(&temp_dir));

        assert!(!service.is_listening());
        assert!(!service.socket_path().exists());
    }

    #[tokio::test]
    async fn test_ack_echoes_sequence_and_result() {
        let temp_dir = TempDir::new().unwrap();
        let mut service = ShortcutService::new(test_config(&temp_dir));
        service
            .register_handler(|_: &ShortcutRequest, _: i32| -libc::EACCES)
            .await
            .unwrap();

        let request = ShortcutRequest::new("com.example.app", "Mail", LaunchKind::Package);
        let reply = exchange(&service, &encode_request(77, &request).unwrap()).await;

        assert_eq!(reply.len(), HEADER_SIZE);
        let header = decode_header(&reply).unwrap();
        assert_eq!(header.sequence, 77);
        assert_eq!(header.body, HeaderBody::Ack { result: -libc::EACCES });
    }

    #[tokio::test]
    async fn test_handler_sees_request_and_sender_pid() {
        let temp_dir = TempDir::new().unwrap();
        let mut service = ShortcutService::new(test_config(&temp_dir));
        let seen_pid = Arc::new(AtomicI32::new(0));
        let seen = Arc::clone(&seen_pid);
        service
            .register_handler(move |request: &ShortcutRequest, pid: i32| {
                assert_eq!(request.package(), "com.example.app");
                assert_eq!(request.content(), "app://mail");
                seen.store(pid, Ordering::SeqCst);
                0
            })
            .await
            .unwrap();

        let request = ShortcutRequest::new("com.example.app", "Mail", LaunchKind::Uri)
            .with_content("app://mail");
        exchange(&service, &encode_request(1, &request).unwrap()).await;

        assert_eq!(seen_pid.load(Ordering::SeqCst), std::process::id() as i32);
    }

    #[tokio::test]
    async fn test_reregister_replaces_handler_without_rebind() {
        let temp_dir = TempDir::new().unwrap();
        let mut service = ShortcutService::new(test_config(&temp_dir));
        service
            .register_handler(|_: &ShortcutRequest, _: i32| 0)
            .await
            .unwrap();
        let inode = std::os::unix::fs::MetadataExt::ino(
            &std::fs::metadata(service.socket_path()).unwrap(),
        );

        service
            .register_handler(|_: &ShortcutRequest, _: i32| -libc::ENOTSUP)
            .await
            .unwrap();
        let inode_after = std::os::unix::fs::MetadataExt::ino(
            &std::fs::metadata(service.socket_path()).unwrap(),
        );
        assert_eq!(inode, inode_after);

        let request = ShortcutRequest::new("com.example.app", "Mail", LaunchKind::Package);
        let reply = exchange(&service, &encode_request(2, &request).unwrap()).await;
        let header = decode_header(&reply).unwrap();
        assert_eq!(header.body, HeaderBody::Ack { result: -libc::ENOTSUP });
    }

    #[tokio::test]
    async fn test_malformed_packet_gets_no_ack() {
        let temp_dir = TempDir::new().unwrap();
        let mut service = ShortcutService::new(test_config(&temp_dir));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        service
            .register_handler(move |_: &ShortcutRequest, _: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                0
            })
            .await
            .unwrap();

        let mut packet = encode_ack(1, 0).to_vec();
        packet[4..8].copy_from_slice(&42i32.to_ne_bytes());
        let reply = exchange(&service, &packet).await;

        assert!(reply.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let temp_dir = TempDir::new().unwrap();
        let mut service = ShortcutService::new(test_config(&temp_dir));
        service
            .register_handler(|_: &ShortcutRequest, _: i32| 0)
            .await
            .unwrap();
        assert!(service.is_listening());

        service.shutdown();
        assert!(!service.is_listening());

        // The accept task owns the listener; give it a moment to drop.
        for _ in 0..50 {
            if !service.socket_path().exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!service.socket_path().exists());
    }

    #[tokio::test]
    async fn test_register_after_shutdown_listens_again() {
        let temp_dir = TempDir::new().unwrap();
        let mut service = ShortcutService::new(test_config(&temp_dir));
        service
            .register_handler(|_: &ShortcutRequest, _: i32| -libc::EPERM)
            .await
            .unwrap();

        service.shutdown();
        service
            .register_handler(|_: &ShortcutRequest, _: i32| 0)
            .await
            .unwrap();

        // Anything left of the old loop has had time to run.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(service.is_listening());
        assert!(service.socket_path().exists());

        let request = ShortcutRequest::new("com.example.app", "Mail", LaunchKind::Package);
        let reply = exchange(&service, &encode_request(3, &request).unwrap()).await;
        let header = decode_header(&reply).unwrap();
        assert_eq!(header.body, HeaderBody::Ack { result: 0 });
    }

    #[tokio::test]
    async fn test_panicking_handler_gets_fault_and_frees_its_slot() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        config.max_connections = 2;
        let mut service = ShortcutService::new(config);
        service
            .register_handler(|_: &ShortcutRequest, _: i32| -> i32 { panic!("handler bug") })
            .await
            .unwrap();

        let request = ShortcutRequest::new("com.example.app", "Mail", LaunchKind::Package);
        for sequence in 0..2 {
            let reply = exchange(&service, &encode_request(sequence, &request).unwrap()).await;
            let header = decode_header(&reply).unwrap();
            assert_eq!(header.body, HeaderBody::Ack { result: -libc::EFAULT });
        }

        service
            .register_handler(|_: &ShortcutRequest, _: i32| 0)
            .await
            .unwrap();
        let reply = exchange(&service, &encode_request(9, &request).unwrap()).await;
        let header = decode_header(&reply).unwrap();
        assert_eq!(header.sequence, 9);
        assert_eq!(header.body, HeaderBody::Ack { result: 0 });
    }

    #[tokio::test]
    async fn test_connection_slot_released_when_task_panics() {
        let active = Arc::new(AtomicUsize::new(0));
        let slot = ConnectionSlot::acquire(&active, 1).unwrap();
        assert!(ConnectionSlot::acquire(&active, 1).is_none());

        let task = tokio::spawn(async move {
            let _slot = slot;
            panic!("connection task failed");
        });
        assert!(task.await.unwrap_err().is_panic());

        assert_eq!(active.load(Ordering::Relaxed), 0);
        assert!(ConnectionSlot::acquire(&active, 1).is_some());
    }

    #[tokio::test]
    async fn test_connections_over_cap_are_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        config.max_connections = 1;
        let mut service = ShortcutService::new(config);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        service
            .register_handler(move |_: &ShortcutRequest, _: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                0
            })
            .await
            .unwrap();

        // Occupies the only slot without ever sending a request.
        let idle = connect(service.socket_path(), Duration::from_secs(2))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let request = ShortcutRequest::new("com.example.app", "Mail", LaunchKind::Package);
        let packet = encode_request(4, &request).unwrap();
        let extra = connect(service.socket_path(), Duration::from_secs(2))
            .await
            .unwrap();
        let _ = extra.send(&packet).await;
        match extra.receive(HEADER_SIZE).await {
            Ok((bytes, _)) => assert!(bytes.is_empty(), "connection over the cap was answered"),
            Err(e) => assert!(matches!(e, ShortcutError::Comm { .. })),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        drop(idle);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reply = exchange(&service, &packet).await;
        let header = decode_header(&reply).unwrap();
        assert_eq!(header.body, HeaderBody::Ack { result: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Peer that replays receives with chosen sender PIDs.
    struct ScriptedPeer {
        chunks: Mutex<VecDeque<(Vec<u8>, i32)>>,
        sent: Mutex<Vec<u8>>,
    }

    impl ScriptedPeer {
        fn new(chunks: Vec<(Vec<u8>, i32)>) -> Self {
            Self {
                chunks: Mutex::new(chunks.into()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl PeerStream for ScriptedPeer {
        async fn receive(&self, max_len: usize) -> Result<(Vec<u8>, i32)> {
            let mut chunks = self.chunks.lock().unwrap();
            match chunks.pop_front() {
                Some((mut bytes, pid)) => {
                    if bytes.len() > max_len {
                        let rest = bytes.split_off(max_len);
                        chunks.push_front((rest, pid));
                    }
                    Ok((bytes, pid))
                }
                None => Ok((Vec::new(), UNKNOWN_PID)),
            }
        }

        async fn send(&self, bytes: &[u8]) -> Result<usize> {
            self.sent.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }
    }

    fn counting_slot(calls: &Arc<AtomicUsize>) -> HandlerSlot {
        let counter = Arc::clone(calls);
        let handler: Arc<dyn ShortcutHandler> =
            Arc::new(move |_: &ShortcutRequest, _: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                0
            });
        Arc::new(RwLock::new(handler))
    }

    #[tokio::test]
    async fn test_sender_pid_change_drops_connection_before_dispatch() {
        let request = ShortcutRequest::new("com.example.app", "Mail", LaunchKind::Package);
        let packet = encode_request(6, &request).unwrap();
        let (header, payload) = packet.split_at(HEADER_SIZE);
        let peer = ScriptedPeer::new(vec![(header.to_vec(), 100), (payload.to_vec(), 200)]);

        let calls = Arc::new(AtomicUsize::new(0));
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let result = handle_connection(1, &peer, &counting_slot(&calls), &mut shutdown_rx).await;

        assert!(matches!(result, Err(ShortcutError::Invalid { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(peer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_split_request_from_one_sender_is_acked() {
        let request = ShortcutRequest::new("com.example.app", "Mail", LaunchKind::Package);
        let packet = encode_request(6, &request).unwrap();
        let (header, payload) = packet.split_at(HEADER_SIZE);
        let peer = ScriptedPeer::new(vec![(header.to_vec(), 100), (payload.to_vec(), 100)]);

        let calls = Arc::new(AtomicUsize::new(0));
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        handle_connection(1, &peer, &counting_slot(&calls), &mut shutdown_rx)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let sent = peer.sent.lock().unwrap();
        let ack = decode_header(&sent).unwrap();
        assert_eq!(ack.sequence, 6);
        assert_eq!(ack.body, HeaderBody::Ack { result: 0 });
    }
}
