//! The message source contract consumed by the live coordinator.
//!
//! # Overview
//!
//! The source is an external collaborator: it owns persistence and the
//! daemon protocol. This engine only pulls batches ([`MessageSource::messages`],
//! [`MessageSource::dms`]) and receives pushes through a [`Subscription`].
//!
//! ## Cancellation
//!
//! A subscription is a channel pair. The producing side holds a
//! [`SubscriptionSink`]; the consuming side holds the [`Subscription`].
//! [`CancelHandle::cancel`] injects a close marker into the same channel, so a
//! consumer blocked in [`Subscription::recv`] wakes up and returns `None`
//! instead of leaking a parked receive. Dropping the sink closes the
//! subscription the same way.

pub mod memory;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use crate::error::SourceError;
use crate::model::{
    AgentInfo, DmConversation, Message, MessageFilter, SearchHit, SubscriptionFilter, TopicInfo,
};

pub use memory::MemorySource;

/// Read-only access to the message store.
///
/// Implementations are shared across fetch workers, so they must be
/// `Send + Sync`. Every call may block.
pub trait MessageSource: Send + Sync {
    /// List topics with activity summaries.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport or I/O failure.
    fn topics(&self) -> Result<Vec<TopicInfo>, SourceError>;

    /// Messages posted to `topic` within `filter`, chronological.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport or I/O failure.
    fn messages(&self, topic: &str, filter: &MessageFilter) -> Result<Vec<Message>, SourceError>;

    /// DM conversations visible to `self_agent`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport or I/O failure.
    fn dm_conversations(&self, self_agent: &str) -> Result<Vec<DmConversation>, SourceError>;

    /// Direct messages sent to or by `agent` within `filter`, chronological.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport or I/O failure.
    fn dms(&self, agent: &str, filter: &MessageFilter) -> Result<Vec<Message>, SourceError>;

    /// Known agents.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport or I/O failure.
    fn agents(&self) -> Result<Vec<AgentInfo>, SourceError>;

    /// Full-text search.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport or I/O failure.
    fn search(&self, query: &str) -> Result<Vec<SearchHit>, SourceError>;

    /// Open a push subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the subscription cannot be established.
    fn subscribe(&self, filter: &SubscriptionFilter) -> Result<Subscription, SourceError>;
}

#[derive(Debug)]
enum Delivery {
    Message(Box<Message>),
    Closed,
}

/// Outcome of a non-blocking poll on a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryNext {
    Message(Message),
    Empty,
    Closed,
}

/// Create a connected sink/subscription pair.
#[must_use]
pub fn subscription_channel() -> (SubscriptionSink, Subscription) {
    let (tx, rx) = mpsc::channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    let sink = SubscriptionSink {
        tx: tx.clone(),
        cancelled: Arc::clone(&cancelled),
    };
    let subscription = Subscription {
        rx,
        cancel: CancelHandle { tx, cancelled },
        closed: false,
    };
    (sink, subscription)
}

/// Producer half of a subscription, held by the source.
#[derive(Debug)]
pub struct SubscriptionSink {
    tx: Sender<Delivery>,
    cancelled: Arc<AtomicBool>,
}

impl SubscriptionSink {
    /// Deliver one message. Returns `false` once the subscription has been
    /// cancelled, telling the producer to drop this sink.
    pub fn send(&self, message: Message) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.tx.send(Delivery::Message(Box::new(message))).is_ok()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for SubscriptionSink {
    fn drop(&mut self) {
        let _ = self.tx.send(Delivery::Closed);
    }
}

/// Cloneable handle that tears a subscription down from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Sender<Delivery>,
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Cancel the subscription and wake any pending receive. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Delivery::Closed);
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Consumer half of a push subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: Receiver<Delivery>,
    cancel: CancelHandle,
    closed: bool,
}

impl Subscription {
    /// Block until the next message. Returns `None` once cancelled or closed.
    pub fn recv(&mut self) -> Option<Message> {
        if self.closed || self.cancel.is_cancelled() {
            self.closed = true;
            return None;
        }
        match self.rx.recv() {
            Ok(Delivery::Message(message)) if !self.cancel.is_cancelled() => Some(*message),
            Ok(_) | Err(_) => {
                self.closed = true;
                None
            }
        }
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv_timeout(&mut self, timeout: Duration) -> TryNext {
        if self.closed || self.cancel.is_cancelled() {
            self.closed = true;
            return TryNext::Closed;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(Delivery::Message(message)) if !self.cancel.is_cancelled() => {
                TryNext::Message(*message)
            }
            Err(RecvTimeoutError::Timeout) => TryNext::Empty,
            Ok(_) | Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                TryNext::Closed
            }
        }
    }

    /// Non-blocking poll.
    pub fn try_next(&mut self) -> TryNext {
        if self.closed || self.cancel.is_cancelled() {
            self.closed = true;
            return TryNext::Closed;
        }
        match self.rx.try_recv() {
            Ok(Delivery::Message(message)) => TryNext::Message(*message),
            Err(TryRecvError::Empty) => TryNext::Empty,
            Ok(Delivery::Closed) | Err(TryRecvError::Disconnected) => {
                self.closed = true;
                TryNext::Closed
            }
        }
    }

    /// A handle that can cancel this subscription from another thread.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
