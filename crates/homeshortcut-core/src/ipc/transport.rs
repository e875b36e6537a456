//! Unix domain socket transport with peer credentials.
//!
//! Thin wrapper over tokio's Unix sockets. Every connection has credential
//! passing enabled so that each receive reports the PID of the sending
//! process. Handles are non-blocking and close-on-exec from the moment they
//! are created (tokio and std open sockets with `SOCK_CLOEXEC`).
//!
//! On Linux the PID comes from `SCM_CREDENTIALS` ancillary data attached to
//! the read itself. Other Unix platforms fall back to the peer credentials
//! of the connection.

use crate::config::IpcConfig;
use crate::error::{Result, ShortcutError};
use crate::platform::{self, SocketFileId};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::Interest;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

/// Sender PID reported when no credentials accompanied the data.
pub const UNKNOWN_PID: i32 = -1;

/// One end of a connected service socket.
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
}

impl Connection {
    fn from_stream(stream: UnixStream) -> io::Result<Self> {
        enable_credentials(&stream)?;
        Ok(Self { stream })
    }

    /// Wait until the socket accepts writes.
    pub async fn writable(&self) -> Result<()> {
        self.stream
            .writable()
            .await
            .map_err(|e| ShortcutError::comm("wait for writable socket", e))
    }

    /// Write `bytes` with a single send.
    ///
    /// Returns the number of bytes the kernel accepted, which may be less
    /// than `bytes.len()`. Callers treat a short count as a failed send.
    pub async fn send(&self, bytes: &[u8]) -> Result<usize> {
        loop {
            self.writable().await?;

            match self.stream.try_write(bytes) {
                Ok(written) => return Ok(written),
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::Interrupted =>
                {
                    continue
                }
                Err(e) => return Err(ShortcutError::comm("send", e)),
            }
        }
    }

    /// Single non-blocking write without waiting for readiness.
    ///
    /// Fails with `WouldBlock` until the runtime has seen the socket become
    /// writable; await [`writable`](Self::writable) first on a fresh
    /// connection.
    pub fn try_send(&self, bytes: &[u8]) -> Result<usize> {
        self.stream
            .try_write(bytes)
            .map_err(|e| ShortcutError::comm("send", e))
    }

    /// Read up to `max_len` bytes.
    ///
    /// Returns the bytes read together with the sender's PID, or
    /// [`UNKNOWN_PID`] when the kernel attached no credentials. An empty
    /// buffer means the peer closed the connection.
    pub async fn receive(&self, max_len: usize) -> Result<(Vec<u8>, i32)> {
        let mut buf = vec![0u8; max_len];
        loop {
            self.stream
                .readable()
                .await
                .map_err(|e| ShortcutError::comm("wait for readable socket", e))?;

            match self
                .stream
                .try_io(Interest::READABLE, || recv_with_pid(&self.stream, &mut buf))
            {
                Ok((read, pid)) => {
                    buf.truncate(read);
                    return Ok((buf, pid));
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::Interrupted =>
                {
                    continue
                }
                Err(e) => return Err(ShortcutError::comm("receive", e)),
            }
        }
    }
}

/// Connect to the service socket at `path`.
///
/// Fails with [`ShortcutError::Timeout`] when the service does not accept
/// within `timeout`, and with `Comm` for every other connect failure.
pub async fn connect(path: &Path, timeout: Duration) -> Result<Connection> {
    let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
        .await
        .map_err(|_| ShortcutError::Timeout(timeout))?
        .map_err(|e| ShortcutError::comm(format!("connect to {}", path.display()), e))?;

    debug!("Connected to shortcut service at {}", path.display());

    Connection::from_stream(stream)
        .map_err(|e| ShortcutError::comm("enable credential passing", e))
}

/// Listening service socket.
///
/// Dropping it removes the socket file, unless another listener has been
/// bound at the same path in the meantime.
#[derive(Debug)]
pub struct Listener {
    listener: UnixListener,
    path: PathBuf,
    file_id: SocketFileId,
}

impl Listener {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept one pending connection.
    ///
    /// The raw `io::Error` is returned so the accept loop can tell transient
    /// failures from a broken listening socket.
    pub async fn accept(&self) -> io::Result<Connection> {
        let (stream, _addr) = self.listener.accept().await?;
        Connection::from_stream(stream)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Err(e) = platform::remove_owned_socket(&self.path, self.file_id) {
            warn!("Failed to remove socket {}: {}", self.path.display(), e);
        }
    }
}

/// Bind and listen on `path`.
///
/// Removes a stale socket file first, makes the new one world read/write and
/// limits the accept queue to [`IpcConfig::LISTEN_BACKLOG`]. Must be called
/// from within a tokio runtime.
pub fn listen(path: &Path) -> Result<Listener> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ShortcutError::io_with_path(e, parent))?;
        }
    }
    platform::remove_stale_socket(path)?;

    let std_listener = std::os::unix::net::UnixListener::bind(path)
        .map_err(|e| ShortcutError::comm(format!("bind {}", path.display()), e))?;
    let file_id = SocketFileId::of(path)?;
    platform::set_socket_mode(path, IpcConfig::SOCKET_MODE)?;
    set_backlog(&std_listener).map_err(|e| ShortcutError::comm("listen", e))?;
    std_listener
        .set_nonblocking(true)
        .map_err(|e| ShortcutError::comm("set non-blocking", e))?;

    let listener = UnixListener::from_std(std_listener)
        .map_err(|e| ShortcutError::comm("register listener", e))?;

    info!("Shortcut service listening on {}", path.display());

    Ok(Listener {
        listener,
        path: path.to_path_buf(),
        file_id,
    })
}

/// std binds with its own default queue length; listen(2) again to shrink it.
fn set_backlog(listener: &std::os::unix::net::UnixListener) -> io::Result<()> {
    use nix::sys::socket::{listen, Backlog};

    let backlog = Backlog::new(IpcConfig::LISTEN_BACKLOG)?;
    listen(listener, backlog)?;
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn enable_credentials(stream: &UnixStream) -> io::Result<()> {
    use nix::sys::socket::{setsockopt, sockopt};

    setsockopt(stream, sockopt::PassCred, &true)?;
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn enable_credentials(_stream: &UnixStream) -> io::Result<()> {
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn recv_with_pid(stream: &UnixStream, buf: &mut [u8]) -> io::Result<(usize, i32)> {
    use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags, UnixCredentials};
    use std::io::IoSliceMut;
    use std::os::fd::AsRawFd;

    let mut iov = [IoSliceMut::new(buf)];
    let mut cmsg_buffer = nix::cmsg_space!(UnixCredentials);
    let msg = recvmsg::<()>(
        stream.as_raw_fd(),
        &mut iov,
        Some(&mut cmsg_buffer),
        MsgFlags::MSG_CMSG_CLOEXEC,
    )?;

    let mut pid = UNKNOWN_PID;
    for cmsg in msg.cmsgs()? {
        if let ControlMessageOwned::ScmCredentials(creds) = cmsg {
            pid = creds.pid();
        }
    }

    Ok((msg.bytes, pid))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn recv_with_pid(stream: &UnixStream, buf: &mut [u8]) -> io::Result<(usize, i32)> {
    use nix::sys::socket::{recv, MsgFlags};
    use std::os::fd::AsRawFd;

    let read = recv(stream.as_raw_fd(), buf, MsgFlags::empty())?;
    let pid = stream
        .peer_cred()
        .ok()
        .and_then(|cred| cred.pid())
        .unwrap_or(UNKNOWN_PID);
    Ok((read, pid))
}
