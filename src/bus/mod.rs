//! Message Bus Module
//!
//! The `MessageBus` decouples external adapters from the agent loop. It holds
//! two independent bounded queues and a registry of reply handlers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Adapter   │────>│  MessageBus │────>│ Agent Loop  │
//! │  (Telegram) │     │  (inbound)  │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            │ outbound
//!                            ▼
//! ┌─────────────┐     ┌─────────────┐
//! │   Handler   │<────│  MessageBus │
//! │  (Telegram) │     │  (outbound) │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! Publishing never blocks: when a queue is full the message is dropped.
//! This is a decoupling buffer for one process, not a durable broker.
//!
//! # Example
//!
//! ```
//! use attoclaw::bus::{InboundMessage, MessageBus};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let bus = MessageBus::new();
//! let cancel = CancellationToken::new();
//!
//! bus.publish_inbound(InboundMessage::new("telegram", "user123", "chat456", "Hello"));
//!
//! let received = bus.consume_inbound(&cancel).await;
//! assert_eq!(received.unwrap().content, "Hello");
//! # });
//! ```

pub mod message;

pub use message::{InboundMessage, OutboundMessage, SYSTEM_CHANNEL};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Default capacity of each queue.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Delivers outbound messages for one channel.
///
/// Adapters register a handler under their channel name; the outbound
/// dispatcher looks it up per message.
#[async_trait]
pub trait OutboundHandler: Send + Sync {
    /// Deliver one message to the external surface.
    async fn deliver(&self, msg: OutboundMessage) -> Result<()>;
}

/// The in-process mailbox between adapters and the agent loop.
///
/// Cloning is cheap and every clone shares the same queues, handlers and
/// closed state.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn OutboundHandler>>>>,
    closed: CancellationToken,
}

impl MessageBus {
    /// Create a new bus with [`DEFAULT_BUFFER_SIZE`] slots per queue.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new bus with a custom queue capacity.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is zero (tokio channels require capacity > 0).
    /// `Config::validate` rejects a zero buffer size before it gets here.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size);

        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            closed: CancellationToken::new(),
        }
    }

    /// Queue a request for the agent loop.
    ///
    /// Returns `false` if the message was dropped because the queue is full
    /// or the bus is closed. Never blocks.
    pub fn publish_inbound(&self, msg: InboundMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.inbound_tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                debug!(channel = %msg.channel, chat_id = %msg.chat_id, "Inbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a reply for the adapters. Same drop semantics as
    /// [`publish_inbound`](Self::publish_inbound).
    pub fn publish_outbound(&self, msg: OutboundMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.outbound_tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                debug!(channel = %msg.channel, chat_id = %msg.chat_id, "Outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Wait for the next inbound message.
    ///
    /// Returns `None` if `cancel` fires first, or once the bus is closed and
    /// drained. Already-queued messages are delivered even when `cancel` is
    /// already cancelled, so a pre-cancelled token drains without waiting.
    pub async fn consume_inbound(&self, cancel: &CancellationToken) -> Option<InboundMessage> {
        recv_or_cancel(&self.inbound_rx, cancel, &self.closed).await
    }

    /// Wait for the next outbound message. See [`consume_inbound`](Self::consume_inbound).
    pub async fn subscribe_outbound(&self, cancel: &CancellationToken) -> Option<OutboundMessage> {
        recv_or_cancel(&self.outbound_rx, cancel, &self.closed).await
    }

    /// Register the delivery handler for `channel`, replacing any previous one.
    pub async fn register_handler(&self, channel: &str, handler: Arc<dyn OutboundHandler>) {
        self.handlers
            .write()
            .await
            .insert(channel.to_string(), handler);
    }

    /// Look up the delivery handler for `channel`.
    pub async fn get_handler(&self, channel: &str) -> Option<Arc<dyn OutboundHandler>> {
        self.handlers.read().await.get(channel).cloned()
    }

    /// Drain the outbound queue into registered handlers until `cancel`
    /// fires or the bus closes.
    ///
    /// Messages for channels without a handler are dropped with a warning.
    pub async fn dispatch_outbound(&self, cancel: CancellationToken) {
        info!("Outbound dispatcher started");
        while let Some(msg) = self.subscribe_outbound(&cancel).await {
            let channel = msg.channel.clone();
            match self.get_handler(&channel).await {
                Some(handler) => {
                    if let Err(e) = handler.deliver(msg).await {
                        error!(channel = %channel, error = %e, "Failed to deliver outbound message");
                    }
                }
                None => warn!(channel = %channel, "No handler for outbound message"),
            }
        }
        info!("Outbound dispatcher stopped");
    }

    /// Close the bus. Idempotent.
    ///
    /// Later publishes are dropped; consumers receive what is still queued
    /// and then `None`.
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            info!("Message bus closed");
        }
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of queued inbound messages.
    pub fn inbound_len(&self) -> usize {
        self.inbound_tx.max_capacity() - self.inbound_tx.capacity()
    }

    /// Number of queued outbound messages.
    pub fn outbound_len(&self) -> usize {
        self.outbound_tx.max_capacity() - self.outbound_tx.capacity()
    }
}

async fn recv_or_cancel<T>(
    rx: &Mutex<mpsc::Receiver<T>>,
    cancel: &CancellationToken,
    closed: &CancellationToken,
) -> Option<T> {
    tokio::select! {
        biased;
        // A ready message wins over cancellation so pre-cancelled callers can drain.
        msg = async { rx.lock().await.recv().await } => msg,
        _ = cancel.cancelled() => None,
        // Reached only when the queue had nothing ready.
        _ = closed.cancelled() => None,
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    fn clone(&self) -> Self {
        Self {
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
            handlers: Arc::clone(&self.handlers),
            closed: self.closed.clone(),
        }
    }
}
