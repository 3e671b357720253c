//! The message record every derived view is computed from.
//!
//! # Identity
//!
//! A message is identified for deduplication by the triple
//! `(id, from, to)` ([`MessageKey`]). The same ID may legitimately appear
//! under several targets when one send fans out, so the ID alone is not a
//! sufficient key.
//!
//! # Ordering
//!
//! All derived structures order messages by `(time, id)` ascending. IDs are
//! lexicographically sortable and encode time plus a sequence number (see
//! [`format_message_id`]), so the ID is a stable tie-break for equal
//! timestamps.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Prefix that marks a direct-message target (`@agent`).
pub const DM_PREFIX: char = '@';

/// Delivery priority attached by the sender.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// One observed message. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: String,
    /// Topic name, or `@agent` for a direct message.
    pub to: String,
    pub time: DateTime<Utc>,
    /// Normalized body text. Non-string bodies are rendered as compact JSON.
    #[serde(default, deserialize_with = "deserialize_body")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Classified message target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target<'a> {
    /// Broadcast to a named topic.
    Topic(&'a str),
    /// Direct message to the named agent (without the `@`).
    Direct(&'a str),
}

/// Deduplication identity of a message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    pub id: String,
    pub from: String,
    pub to: String,
}

impl Message {
    /// Create a normal-priority message with no reply link, tags, or host.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        time: DateTime<Utc>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            time,
            body: body.into(),
            reply_to: None,
            priority: Priority::Normal,
            tags: Vec::new(),
            host: None,
        }
    }

    /// Builder-style setter for the reply link.
    #[must_use]
    pub fn with_reply_to(mut self, parent_id: impl Into<String>) -> Self {
        self.reply_to = Some(parent_id.into());
        self
    }

    /// The reply parent ID, treating an empty string as absent.
    #[must_use]
    pub fn reply_to_id(&self) -> Option<&str> {
        self.reply_to.as_deref().filter(|id| !id.is_empty())
    }

    /// Classify the `to` field.
    #[must_use]
    pub fn target(&self) -> Target<'_> {
        self.to
            .strip_prefix(DM_PREFIX)
            .map_or(Target::Topic(self.to.as_str()), Target::Direct)
    }

    /// Returns `true` if this is a direct message.
    #[must_use]
    pub fn is_dm(&self) -> bool {
        matches!(self.target(), Target::Direct(_))
    }

    /// The DM recipient, or `None` for topic messages.
    #[must_use]
    pub fn dm_peer(&self) -> Option<&str> {
        match self.target() {
            Target::Direct(agent) => Some(agent),
            Target::Topic(_) => None,
        }
    }

    /// The topic name, or `None` for direct messages.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        match self.target() {
            Target::Topic(topic) => Some(topic),
            Target::Direct(_) => None,
        }
    }

    /// Deduplication key `(id, from, to)`.
    #[must_use]
    pub fn key(&self) -> MessageKey {
        MessageKey {
            id: self.id.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }

    /// Returns `true` if this message is addressed to, or sent by, `agent`
    /// as a direct message.
    #[must_use]
    pub fn involves_dm_with(&self, agent: &str) -> bool {
        self.dm_peer().is_some_and(|peer| peer == agent) || (self.is_dm() && self.from == agent)
    }
}

/// Total chronological order: `(time, id)` ascending.
#[must_use]
pub fn chronological(a: &Message, b: &Message) -> Ordering {
    a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id))
}

/// Sort in place by `(time, id)`. Stable, so exact duplicates keep input order.
pub fn sort_chronological(messages: &mut [Message]) {
    messages.sort_by(chronological);
}

/// Format a sortable message ID: `YYYYMMDD-HHMMSS-NNNN`.
#[must_use]
pub fn format_message_id(time: DateTime<Utc>, seq: u32) -> String {
    format!("{}-{:04}", time.format("%Y%m%d-%H%M%S"), seq % 10_000)
}

fn deserialize_body<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(normalize_body(value))
}

/// Normalize a dynamically-typed body to text.
///
/// Strings pass through, `null` becomes empty, everything else is rendered
/// as compact JSON.
#[must_use]
pub fn normalize_body(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
