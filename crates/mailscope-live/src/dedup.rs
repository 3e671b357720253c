//! Per-view message set with `(id, from, to)` deduplication.
//!
//! The same message can reach a view through a reload, an older-page fetch
//! and a push. [`MessageSet::merge`] admits each [`MessageKey`] once and
//! keeps the set in `(time, id)` order.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use mailscope_core::model::{Message, MessageKey, chronological};

#[derive(Debug, Clone, Default)]
pub struct MessageSet {
    messages: Vec<Message>,
    seen: HashSet<MessageKey>,
}

impl MessageSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch, skipping keys already present. Returns the messages
    /// that were actually added, in batch order.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = Message>) -> Vec<Message> {
        let mut added = Vec::new();
        for msg in batch {
            if self.seen.insert(msg.key()) {
                added.push(msg.clone());
                self.messages.push(msg);
            }
        }
        if !added.is_empty() && !is_sorted(&self.messages) {
            self.messages.sort_by(chronological);
        }
        added
    }

    /// Drop the oldest messages until at most `cap` remain. Evicted keys
    /// leave the seen-set so a later older-page fetch can bring them back.
    pub fn evict_to(&mut self, cap: usize) -> usize {
        if self.messages.len() <= cap {
            return 0;
        }
        let excess = self.messages.len() - cap;
        for evicted in self.messages.drain(..excess) {
            self.seen.remove(&evicted.key());
        }
        excess
    }

    #[must_use]
    pub fn contains(&self, key: &MessageKey) -> bool {
        self.seen.contains(key)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.messages.first().map(|m| m.time)
    }

    #[must_use]
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(|m| m.time)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn is_sorted(messages: &[Message]) -> bool {
    messages
        .windows(2)
        .all(|pair| chronological(&pair[0], &pair[1]).is_le())
}
