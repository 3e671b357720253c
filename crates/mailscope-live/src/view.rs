//! Per-view state owned by the coordinator.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mailscope_analytics::AnalyticsSnapshot;
use mailscope_core::model::{Bookmarks, Message, ReadMarkers};
use mailscope_core::{ErrorCode, SourceError, WindowError};
use serde::Serialize;

use crate::dedup::MessageSet;
use crate::window::ViewWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ViewId(pub u64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view-{}", self.0)
    }
}

/// What a view shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ViewTarget {
    /// Messages posted to one topic.
    Topic(String),
    /// Direct messages sent to or by one agent.
    Direct(String),
    /// Every topic plus the configured agent's DMs.
    All,
}

impl ViewTarget {
    /// Returns `true` if a pushed message belongs in this view.
    #[must_use]
    pub fn matches(&self, message: &Message, self_agent: Option<&str>) -> bool {
        match self {
            Self::Topic(topic) => message.topic() == Some(topic.as_str()),
            Self::Direct(agent) => message.involves_dm_with(agent),
            Self::All => {
                !message.is_dm() || self_agent.is_some_and(|me| message.involves_dm_with(me))
            }
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Topic(topic) => topic.clone(),
            Self::Direct(agent) => format!("@{agent}"),
            Self::All => "*".to_string(),
        }
    }
}

/// Optional restriction applied before the aggregators run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ViewFilter {
    #[default]
    Everything,
    /// Only messages after the read marker of their target.
    Unread(ReadMarkers),
    /// Only bookmarked messages.
    Bookmarked(Bookmarks),
}

impl ViewFilter {
    #[must_use]
    pub fn admits(&self, message: &Message) -> bool {
        match self {
            Self::Everything => true,
            Self::Unread(markers) => markers.is_unread(message),
            Self::Bookmarked(bookmarks) => bookmarks.contains(&message.id),
        }
    }

    const fn tag(&self) -> &'static str {
        match self {
            Self::Everything => "all",
            Self::Unread(_) => "unread",
            Self::Bookmarked(_) => "bookmarked",
        }
    }
}

/// Last failure seen by a view. Cleared by the next successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewFault {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&SourceError> for ViewFault {
    fn from(err: &SourceError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<&WindowError> for ViewFault {
    fn from(err: &WindowError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// A view's messages, window and last computed snapshot.
#[derive(Debug)]
pub struct ViewState {
    pub(crate) id: ViewId,
    pub(crate) target: ViewTarget,
    pub(crate) window: ViewWindow,
    pub(crate) filter: ViewFilter,
    pub(crate) messages: MessageSet,
    /// Tail cap; applied only while following the tail.
    pub(crate) max_messages: Option<usize>,
    pub(crate) has_older: bool,
    /// Set by the first successful fetch; no snapshot is built before it.
    pub(crate) loaded: bool,
    pub(crate) last_error: Option<ViewFault>,
    pub(crate) snapshot: Option<Arc<AnalyticsSnapshot>>,
    /// Fingerprint of the input the snapshot was computed from.
    pub(crate) computed_from: Option<String>,
    /// Bounds of the last computed window, for push routing.
    pub(crate) last_bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub(crate) dirty: bool,
}

impl ViewState {
    pub(crate) fn new(
        id: ViewId,
        target: ViewTarget,
        window: ViewWindow,
        max_messages: Option<usize>,
    ) -> Self {
        Self {
            id,
            target,
            window,
            filter: ViewFilter::Everything,
            messages: MessageSet::new(),
            max_messages,
            has_older: false,
            loaded: false,
            last_error: None,
            snapshot: None,
            computed_from: None,
            last_bounds: None,
            dirty: true,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ViewId {
        self.id
    }

    #[must_use]
    pub const fn target(&self) -> &ViewTarget {
        &self.target
    }

    #[must_use]
    pub const fn window(&self) -> ViewWindow {
        self.window
    }

    #[must_use]
    pub const fn filter(&self) -> &ViewFilter {
        &self.filter
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.messages.as_slice()
    }

    /// `true` when the last page fetch came back full, so older messages may
    /// exist in the source.
    #[must_use]
    pub const fn has_older(&self) -> bool {
        self.has_older
    }

    /// `false` until a fetch for this view has succeeded. An unloaded view
    /// has no snapshot, so an empty one always means "no messages".
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&ViewFault> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<AnalyticsSnapshot>> {
        self.snapshot.clone()
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Merge fetched or pushed messages; returns the newly admitted ones.
    pub(crate) fn absorb(&mut self, batch: impl IntoIterator<Item = Message>) -> Vec<Message> {
        let added = self.messages.merge(batch);
        if let (Some(cap), true) = (self.max_messages, self.window.follows_tail()) {
            if self.messages.evict_to(cap) > 0 {
                self.has_older = true;
            }
        }
        added
    }

    /// Merge an older page. The tail cap grows to keep the page.
    pub(crate) fn absorb_older(
        &mut self,
        batch: impl IntoIterator<Item = Message>,
    ) -> Vec<Message> {
        let added = self.messages.merge(batch);
        self.max_messages = self.max_messages.map(|cap| cap.max(self.messages.len()));
        added
    }

    /// Messages inside `[start, end)` that pass the view filter.
    pub(crate) fn select(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Message> {
        self.messages
            .as_slice()
            .iter()
            .filter(|m| m.time >= start && m.time < end && self.filter.admits(m))
            .cloned()
            .collect()
    }

    /// Returns `true` if `time` falls inside the last computed window, or if
    /// no window has been computed yet.
    pub(crate) fn in_last_window(&self, time: DateTime<Utc>) -> bool {
        self.window.follows_tail()
            || self
                .last_bounds
                .is_none_or(|(start, end)| time >= start && time < end)
    }

    pub(crate) fn filter_tag(&self) -> &'static str {
        self.filter.tag()
    }
}
