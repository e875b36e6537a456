//! Requests held back until the utility connection is up.
//!
//! Icon and utility requests share one long-lived connection that may not be
//! established yet when a request is made. Such requests are serialized right
//! away and parked in a FIFO queue; once the connection reports that it is
//! up, the queue is flushed in submission order and every item's callback
//! receives the outcome of its send (0 or a negative errno).
//!
//! A send that would block is not an outcome. The item stays at the head of
//! the queue and the flush resumes on the next writable notification.

use super::transport::Connection;
use crate::error::{Result, ShortcutError};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Callback receiving the send outcome of a queued packet.
pub type SendCallback = Box<dyn FnOnce(i32) + Send + 'static>;

/// Destination for serialized packets.
pub trait PacketSink {
    /// Write the whole packet or fail. An error for which
    /// [`ShortcutError::is_would_block`] holds means nothing was written.
    fn send_packet(&mut self, packet: &[u8]) -> Result<()>;
}

impl PacketSink for Connection {
    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        let written = self.try_send(packet)?;
        if written != packet.len() {
            return Err(ShortcutError::Fault {
                message: format!("short write ({} of {} bytes)", written, packet.len()),
            });
        }
        Ok(())
    }
}

/// A serialized packet waiting to be sent.
pub struct PendingItem {
    packet: Vec<u8>,
    callback: SendCallback,
}

enum SendOutcome {
    Sent,
    Failed,
    NotReady(PendingItem),
}

impl PendingItem {
    fn send_to<S: PacketSink + ?Sized>(self, sink: &mut S) -> SendOutcome {
        match sink.send_packet(&self.packet) {
            Ok(()) => {
                (self.callback)(0);
                SendOutcome::Sent
            }
            Err(e) if e.is_would_block() => SendOutcome::NotReady(self),
            Err(e) => {
                warn!("Failed to send queued packet: {}", e);
                (self.callback)(e.to_result_code());
                SendOutcome::Failed
            }
        }
    }
}

/// FIFO of packets submitted before the connection existed.
#[derive(Default)]
pub struct PendingQueue {
    items: VecDeque<PendingItem>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue<F>(&mut self, packet: Vec<u8>, callback: F)
    where
        F: FnOnce(i32) + Send + 'static,
    {
        self.items.push_back(PendingItem {
            packet,
            callback: Box::new(callback),
        });
    }

    /// Send queued packets in order, invoking each callback once.
    ///
    /// Returns the number of items taken off the queue. A failed send does
    /// not stop the flush; its callback gets the error code. A send that
    /// would block stops it, leaving that item and the rest queued.
    pub fn flush<S: PacketSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut flushed = 0;
        let mut failed = 0;
        while let Some(item) = self.items.pop_front() {
            match item.send_to(sink) {
                SendOutcome::Sent => {}
                SendOutcome::Failed => failed += 1,
                SendOutcome::NotReady(item) => {
                    debug!("Connection not writable, {} packets stay queued", self.items.len() + 1);
                    self.items.push_front(item);
                    break;
                }
            }
            flushed += 1;
        }
        if flushed > 0 {
            debug!("Flushed {} queued packets ({} failed)", flushed, failed);
        }
        flushed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Owner of the utility connection and its backlog.
pub struct UtilityLink<S> {
    sink: Option<S>,
    queue: PendingQueue,
}

impl<S> Default for UtilityLink<S> {
    fn default() -> Self {
        Self {
            sink: None,
            queue: PendingQueue::new(),
        }
    }
}

impl<S: PacketSink> UtilityLink<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    /// Packets waiting for the connection.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Send now when connected, otherwise queue until [`on_connected`](Self::on_connected).
    ///
    /// Behind a backlog, or on a connection that is not writable, the packet
    /// queues and goes out with the next [`on_writable`](Self::on_writable).
    pub fn submit<F>(&mut self, packet: Vec<u8>, callback: F)
    where
        F: FnOnce(i32) + Send + 'static,
    {
        self.queue.enqueue(packet, callback);
        match self.sink.as_mut() {
            Some(sink) => {
                self.queue.flush(sink);
            }
            None => debug!("Utility connection not ready, queueing packet"),
        }
    }

    /// Adopt the established connection and flush the backlog into it.
    pub fn on_connected(&mut self, sink: S) -> usize {
        let sink = self.sink.insert(sink);
        self.queue.flush(sink)
    }

    /// The connection became writable again; resume flushing.
    pub fn on_writable(&mut self) -> usize {
        match self.sink.as_mut() {
            Some(sink) => self.queue.flush(sink),
            None => 0,
        }
    }

    /// Give up the connection; later submissions queue again.
    pub fn on_disconnected(&mut self) -> Option<S> {
        self.sink.take()
    }
}
