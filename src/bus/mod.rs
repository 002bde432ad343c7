//! Message Bus Module
//!
//! The `MessageBus` decouples channel adapters from the agent loop with two
//! independent bounded FIFO queues:
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Channel   │────>│  MessageBus │────>│  AgentLoop  │
//! │  (Telegram) │     │  (inbound)  │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲
//!                            │ outbound
//! ┌─────────────┐     ┌──────┴──────┐
//! │   Channel   │<────│  MessageBus │
//! │  (Telegram) │     │  (outbound) │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! Publishes are non-blocking: a full queue yields [`NanoError::BusFull`] and
//! the publisher decides whether to drop, log, or retry. Consumes block until
//! a message arrives or the caller's cancellation token fires. `close()` is
//! idempotent and aborts all in-flight operations.

pub mod message;

pub use message::{InboundMessage, Message, OutboundMessage};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{NanoError, Result};

/// Default buffer size for both queues.
const DEFAULT_BUFFER_SIZE: usize = 100;

/// The central message bus routing messages between channels and the agent.
///
/// Cloning shares the same underlying queues. Multiple consumers compete;
/// each message is delivered to exactly one of them. Ordering is strict FIFO
/// within a single queue, with no ordering across the two queues.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
    /// Queue capacity, used to derive instantaneous depth snapshots.
    capacity: usize,
    /// Set once by `close()`; publishes observe it before touching the queues.
    closed: Arc<AtomicBool>,
    /// Fired by `close()` to abort blocked consumers.
    shutdown: CancellationToken,
}

impl MessageBus {
    /// Create a bus with the default buffer size (100 per queue).
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a bus with a custom buffer size for both queues.
    ///
    /// # Example
    /// ```
    /// use nanogrip::bus::MessageBus;
    ///
    /// let bus = MessageBus::with_buffer_size(500);
    /// assert_eq!(bus.inbound_size(), 0);
    /// ```
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size);

        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            capacity: buffer_size,
            closed: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Publish an inbound message without blocking.
    ///
    /// # Errors
    /// [`NanoError::BusFull`] when the queue is at capacity,
    /// [`NanoError::BusClosed`] after `close()`.
    pub fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NanoError::BusClosed);
        }
        self.inbound_tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NanoError::BusFull,
            mpsc::error::TrySendError::Closed(_) => NanoError::BusClosed,
        })
    }

    /// Publish an outbound message without blocking.
    ///
    /// A message with empty routing (`channel` or `chat_id`) is discarded
    /// with a warning — it can never be delivered and is not auto-routed.
    pub fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        if !msg.is_routable() {
            warn!(
                channel = %msg.channel,
                chat_id = %msg.chat_id,
                "Discarding outbound message with empty routing"
            );
            return Ok(());
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(NanoError::BusClosed);
        }
        self.outbound_tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NanoError::BusFull,
            mpsc::error::TrySendError::Closed(_) => NanoError::BusClosed,
        })
    }

    /// Consume the next inbound message, blocking until one arrives.
    ///
    /// # Errors
    /// [`NanoError::Cancelled`] when `cancel` fires first,
    /// [`NanoError::BusClosed`] when the bus shuts down while waiting.
    pub async fn consume_inbound(&self, cancel: &CancellationToken) -> Result<InboundMessage> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Err(NanoError::Cancelled),
            _ = self.shutdown.cancelled() => Err(NanoError::BusClosed),
            msg = rx.recv() => msg.ok_or(NanoError::BusClosed),
        }
    }

    /// Consume the next outbound message, blocking until one arrives.
    pub async fn consume_outbound(&self, cancel: &CancellationToken) -> Result<OutboundMessage> {
        let mut rx = self.outbound_rx.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Err(NanoError::Cancelled),
            _ = self.shutdown.cancelled() => Err(NanoError::BusClosed),
            msg = rx.recv() => msg.ok_or(NanoError::BusClosed),
        }
    }

    /// Instantaneous depth of the inbound queue.
    ///
    /// Snapshot only — the value may change immediately after the call.
    pub fn inbound_size(&self) -> usize {
        self.capacity - self.inbound_tx.capacity()
    }

    /// Instantaneous depth of the outbound queue.
    pub fn outbound_size(&self) -> usize {
        self.capacity - self.outbound_tx.capacity()
    }

    /// Close the bus. Idempotent.
    ///
    /// Publishes after close return [`NanoError::BusClosed`]; consumers
    /// blocked in `consume_*` are woken with the same error.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    /// Clones share the same underlying queues and closed state.
    fn clone(&self) -> Self {
        Self {
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
            capacity: self.capacity,
            closed: Arc::clone(&self.closed),
            shutdown: self.shutdown.clone(),
        }
    }
}
