//! Read markers and bookmarks.
//!
//! Both are persisted by the dashboard, not by this engine. They are
//! consumed read-only to support unread filters and bookmark-only views.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::message::Message;

/// Per-target "last read" boundary, keyed by the message `to` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadMarkers {
    markers: HashMap<String, String>,
}

impl ReadMarkers {
    #[must_use]
    pub fn new(markers: HashMap<String, String>) -> Self {
        Self { markers }
    }

    /// The last-read message ID for `target`.
    #[must_use]
    pub fn marker(&self, target: &str) -> Option<&str> {
        self.markers.get(target).map(String::as_str)
    }

    /// A message is unread when its ID sorts after its target's marker.
    /// Targets without a marker are entirely unread.
    #[must_use]
    pub fn is_unread(&self, message: &Message) -> bool {
        self.marker(&message.to)
            .is_none_or(|marker| message.id.as_str() > marker)
    }

    /// Count unread messages in a batch.
    #[must_use]
    pub fn unread_count<'a, I>(&self, messages: I) -> usize
    where
        I: IntoIterator<Item = &'a Message>,
    {
        messages.into_iter().filter(|m| self.is_unread(m)).count()
    }
}

/// Bookmarked message IDs with an optional note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bookmarks {
    entries: BTreeMap<String, Option<String>>,
}

impl Bookmarks {
    #[must_use]
    pub fn new(entries: BTreeMap<String, Option<String>>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn contains(&self, message_id: &str) -> bool {
        self.entries.contains_key(message_id)
    }

    #[must_use]
    pub fn note(&self, message_id: &str) -> Option<&str> {
        self.entries.get(message_id).and_then(Option::as_deref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, to: &str) -> Message {
        let t = Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid ts");
        Message::new(id, "a", to, t, "")
    }

    #[test]
    fn unread_is_strictly_after_marker() {
        let markers = ReadMarkers::new(HashMap::from([(
            "ops".to_string(),
            "20240101-000000-0002".to_string(),
        )]));

        assert!(!markers.is_unread(&msg("20240101-000000-0001", "ops")));
        assert!(!markers.is_unread(&msg("20240101-000000-0002", "ops")));
        assert!(markers.is_unread(&msg("20240101-000000-0003", "ops")));
        assert!(markers.is_unread(&msg("20240101-000000-0001", "dev")));
    }

    #[test]
    fn bookmarks_expose_notes() {
        let marks = Bookmarks::new(BTreeMap::from([
            ("m1".to_string(), Some("follow up".to_string())),
            ("m2".to_string(), None),
        ]));
        assert!(marks.contains("m2"));
        assert_eq!(marks.note("m1"), Some("follow up"));
        assert_eq!(marks.note("m2"), None);
        assert!(!marks.contains("m3"));
        assert_eq!(marks.len(), 2);
    }
}
