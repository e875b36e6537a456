//! Incremental request parser for one accepted connection.
//!
//! The server feeds whatever each receive returned into [`ConnectionState`],
//! which accumulates the fixed header, then the declared payload, and reports
//! when a complete request is ready for dispatch. It performs no I/O itself.
//!
//! ```text
//! Begin -> ReadingHeader -> ReadingPayload -> Complete      (request)
//!                        -> Complete                       (ack, no payload)
//!                        -> ErrorDrain -> abort            (ack with payload)
//!                        -> abort                          (error kind, bad header)
//! ```
//!
//! Every receive carries the sender PID. The first one fixes the peer; a
//! different PID on any later receive aborts the connection.

use super::protocol::{decode_header, decode_request, HeaderBody, PacketHeader, ShortcutRequest, HEADER_SIZE};
use crate::error::ShortcutError;

/// Parser phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Begin,
    ReadingHeader,
    ReadingPayload,
    Complete,
    ErrorDrain,
}

/// Outcome of feeding received bytes.
#[derive(Debug)]
pub enum Progress {
    /// The packet is not complete yet.
    NeedMore,
    /// A full request was read and must be answered.
    Dispatch {
        sequence: u32,
        request: ShortcutRequest,
    },
    /// The packet was consumed and needs no reply.
    Done,
    /// The connection must be dropped.
    Abort(ShortcutError),
}

/// Per-connection parser state.
#[derive(Debug)]
pub struct ConnectionState {
    phase: Phase,
    header_buf: [u8; HEADER_SIZE],
    /// Bytes consumed in the current phase.
    bytes_read: usize,
    peer_pid: Option<i32>,
    header: Option<PacketHeader>,
    payload: Vec<u8>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Begin,
            header_buf: [0u8; HEADER_SIZE],
            bytes_read: 0,
            peer_pid: None,
            header: None,
            payload: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// PID learned from the first receive on this connection.
    pub fn peer_pid(&self) -> Option<i32> {
        self.peer_pid
    }

    /// Number of bytes to ask for next.
    ///
    /// Reading exactly this much keeps every receive inside one phase.
    pub fn wanted(&self) -> usize {
        match self.phase {
            Phase::Begin => HEADER_SIZE,
            Phase::ReadingHeader => HEADER_SIZE - self.bytes_read,
            Phase::ReadingPayload => self.declared_payload().saturating_sub(self.payload.len()),
            Phase::ErrorDrain => self.declared_payload().saturating_sub(self.bytes_read),
            Phase::Complete => 0,
        }
    }

    /// Consume the bytes of one receive from `sender_pid`.
    pub fn feed(&mut self, bytes: &[u8], sender_pid: i32) -> Progress {
        if let Err(err) = self.check_peer(sender_pid) {
            return self.abort(err);
        }

        let mut rest = bytes;
        loop {
            match self.phase {
                Phase::Begin => self.phase = Phase::ReadingHeader,
                Phase::ReadingHeader => {
                    let take = rest.len().min(HEADER_SIZE - self.bytes_read);
                    self.header_buf[self.bytes_read..self.bytes_read + take]
                        .copy_from_slice(&rest[..take]);
                    self.bytes_read += take;
                    rest = &rest[take..];

                    if self.bytes_read < HEADER_SIZE {
                        return Progress::NeedMore;
                    }
                    if let Some(progress) = self.on_header() {
                        return progress;
                    }
                }
                Phase::ReadingPayload => {
                    let take = rest.len().min(self.wanted());
                    self.payload.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];

                    if self.payload.len() < self.declared_payload() {
                        return Progress::NeedMore;
                    }
                    return self.complete();
                }
                Phase::ErrorDrain => {
                    let take = rest.len().min(self.wanted());
                    self.bytes_read += take;
                    rest = &rest[take..];

                    if self.bytes_read < self.declared_payload() {
                        return Progress::NeedMore;
                    }
                    return self.abort(ShortcutError::invalid(
                        "peer sent an acknowledgement with a payload",
                    ));
                }
                Phase::Complete => return Progress::Done,
            }
        }
    }

    fn check_peer(&mut self, sender_pid: i32) -> Result<(), ShortcutError> {
        match self.peer_pid {
            None => {
                self.peer_pid = Some(sender_pid);
                Ok(())
            }
            Some(known) if known == sender_pid => Ok(()),
            Some(known) => Err(ShortcutError::invalid(format!(
                "sender pid changed from {} to {} on one connection",
                known, sender_pid
            ))),
        }
    }

    /// Transition out of `ReadingHeader`. `None` means keep consuming bytes.
    fn on_header(&mut self) -> Option<Progress> {
        let header = match decode_header(&self.header_buf) {
            Ok(header) => header,
            Err(err) => return Some(self.abort(err)),
        };
        self.header = Some(header);
        self.bytes_read = 0;

        match header.body {
            HeaderBody::Request { .. } => {
                let mut payload = Vec::new();
                if payload.try_reserve_exact(header.payload_len()).is_err() {
                    return Some(self.abort(ShortcutError::OutOfMemory {
                        message: format!("payload buffer of {} bytes", header.payload_size),
                    }));
                }
                self.payload = payload;
                self.phase = Phase::ReadingPayload;

                if header.payload_size == 0 {
                    return Some(self.complete());
                }
                None
            }
            HeaderBody::Ack { .. } if header.payload_size > 0 => {
                self.phase = Phase::ErrorDrain;
                None
            }
            HeaderBody::Ack { .. } => {
                self.phase = Phase::Complete;
                Some(Progress::Done)
            }
            HeaderBody::Error => Some(self.abort(ShortcutError::invalid("peer sent an error packet"))),
        }
    }

    fn complete(&mut self) -> Progress {
        self.phase = Phase::Complete;
        let payload = std::mem::take(&mut self.payload);

        let Some(header) = self.header else {
            return self.abort(ShortcutError::Fault {
                message: "payload completed without a header".to_string(),
            });
        };

        match decode_request(&header, &payload) {
            Ok(request) => Progress::Dispatch {
                sequence: header.sequence,
                request,
            },
            Err(err) => self.abort(err),
        }
    }

    fn abort(&mut self, err: ShortcutError) -> Progress {
        self.phase = Phase::Complete;
        self.payload = Vec::new();
        Progress::Abort(err)
    }

    fn declared_payload(&self) -> usize {
        self.header.map(|h| h.payload_len()).unwrap_or(0)
    }
}
