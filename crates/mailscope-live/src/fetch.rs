//! Background fetches and last-issued-wins bookkeeping.
//!
//! # Generations
//!
//! Every request carries a generation number drawn from a counter keyed by
//! `(view, purpose)`. Issuing a new request bumps the counter, so when two
//! reloads of the same view overlap only the result matching the current
//! generation is applied; the other is discarded on arrival.
//!
//! Workers are plain `std::thread`s: each one makes exactly one blocking
//! source call and reports back over the coordinator's channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, TimeDelta, Utc};
use mailscope_core::SourceError;
use mailscope_core::model::{
    AgentInfo, DmConversation, Message, MessageFilter, TopicInfo, chronological,
};
use mailscope_core::source::MessageSource;
use tracing::{debug, trace};

use crate::coordinator::Event;
use crate::view::{ViewId, ViewTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPurpose {
    /// Initial load or explicit refresh of a view.
    Reload,
    /// The page immediately before a view's oldest message.
    OlderPage,
    /// Source-wide topic/agent/conversation listing.
    Metrics,
}

impl FetchPurpose {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::OlderPage => "older-page",
            Self::Metrics => "metrics",
        }
    }
}

/// Source-wide listing refreshed by [`FetchPurpose::Metrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceOverview {
    pub topics: Vec<TopicInfo>,
    pub agents: Vec<AgentInfo>,
    pub conversations: Vec<DmConversation>,
}

type FetchKey = (Option<ViewId>, FetchPurpose);

#[derive(Debug, Clone)]
pub(crate) enum FetchJob {
    Messages {
        target: ViewTarget,
        filter: MessageFilter,
        self_agent: Option<String>,
    },
    Overview {
        self_agent: Option<String>,
    },
}

#[derive(Debug)]
pub(crate) enum FetchPayload {
    Messages(Vec<Message>),
    Overview(SourceOverview),
}

#[derive(Debug)]
pub(crate) struct FetchResult {
    pub view: Option<ViewId>,
    pub purpose: FetchPurpose,
    pub generation: u64,
    /// Page size requested, for `has_older` (`0` = unlimited).
    pub limit: usize,
    pub outcome: Result<FetchPayload, SourceError>,
}

// ---------------------------------------------------------------------------
// FetchTracker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct FetchTracker {
    generations: HashMap<FetchKey, u64>,
    in_flight: HashMap<FetchKey, u64>,
}

impl FetchTracker {
    /// Start a new request, superseding any in flight for the same key.
    pub fn issue(&mut self, view: Option<ViewId>, purpose: FetchPurpose) -> u64 {
        let generation = self.generations.entry((view, purpose)).or_insert(0);
        *generation += 1;
        self.in_flight.insert((view, purpose), *generation);
        *generation
    }

    /// Accept a completed request if it is still the latest one issued.
    pub fn complete(
        &mut self,
        view: Option<ViewId>,
        purpose: FetchPurpose,
        generation: u64,
    ) -> bool {
        let key = (view, purpose);
        if self.generations.get(&key).copied() != Some(generation) {
            return false;
        }
        self.in_flight.remove(&key);
        true
    }

    pub fn is_in_flight(&self, view: Option<ViewId>, purpose: FetchPurpose) -> bool {
        self.in_flight.contains_key(&(view, purpose))
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Forget a closed view; late results for it no longer match.
    pub fn forget(&mut self, view: ViewId) {
        self.generations.retain(|(v, _), _| *v != Some(view));
        self.in_flight.retain(|(v, _), _| *v != Some(view));
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Reload bounds: everything from `since` (if any) up to the anchored end.
pub(crate) fn reload_filter(
    since: Option<DateTime<Utc>>,
    anchored_end: Option<DateTime<Utc>>,
    limit: usize,
) -> MessageFilter {
    MessageFilter {
        since,
        until: anchored_end.map(|end| end - TimeDelta::nanoseconds(1)),
        limit,
    }
}

/// The page strictly before `oldest`.
pub(crate) fn older_page_filter(oldest: DateTime<Utc>, page_size: usize) -> MessageFilter {
    MessageFilter {
        since: None,
        until: Some(oldest - TimeDelta::nanoseconds(1)),
        limit: page_size,
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

pub(crate) fn spawn_fetch(
    source: Arc<dyn MessageSource>,
    job: FetchJob,
    view: Option<ViewId>,
    purpose: FetchPurpose,
    generation: u64,
    events: Sender<Event>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("mailscope-{}", purpose.label()))
        .spawn(move || {
            let limit = match &job {
                FetchJob::Messages { filter, .. } => filter.limit,
                FetchJob::Overview { .. } => 0,
            };
            trace!(?view, purpose = purpose.label(), generation, "fetch started");
            let outcome = run_job(source.as_ref(), &job);
            let result = FetchResult {
                view,
                purpose,
                generation,
                limit,
                outcome,
            };
            if events.send(Event::Fetched(result)).is_err() {
                debug!(?view, purpose = purpose.label(), "coordinator gone, dropping fetch result");
            }
        })
}

fn run_job(source: &dyn MessageSource, job: &FetchJob) -> Result<FetchPayload, SourceError> {
    match job {
        FetchJob::Messages {
            target,
            filter,
            self_agent,
        } => fetch_messages(source, target, filter, self_agent.as_deref())
            .map(FetchPayload::Messages),
        FetchJob::Overview { self_agent } => {
            let topics = source.topics()?;
            let agents = source.agents()?;
            let conversations = match self_agent {
                Some(me) => source.dm_conversations(me)?,
                None => Vec::new(),
            };
            Ok(FetchPayload::Overview(SourceOverview {
                topics,
                agents,
                conversations,
            }))
        }
    }
}

fn fetch_messages(
    source: &dyn MessageSource,
    target: &ViewTarget,
    filter: &MessageFilter,
    self_agent: Option<&str>,
) -> Result<Vec<Message>, SourceError> {
    match target {
        ViewTarget::Topic(topic) => source.messages(topic, filter),
        ViewTarget::Direct(agent) => source.dms(agent, filter),
        ViewTarget::All => {
            let mut merged = Vec::new();
            for topic in source.topics()? {
                merged.extend(source.messages(&topic.name, filter)?);
            }
            if let Some(me) = self_agent {
                merged.extend(source.dms(me, filter)?);
            }
            merged.sort_by(chronological);
            if filter.limit > 0 && merged.len() > filter.limit {
                merged.drain(..merged.len() - filter.limit);
            }
            Ok(merged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mailscope_core::source::MemorySource;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("valid ts")
    }

    #[test]
    fn last_issued_generation_wins() {
        let mut tracker = FetchTracker::default();
        let view = Some(ViewId(1));
        let first = tracker.issue(view, FetchPurpose::Reload);
        let second = tracker.issue(view, FetchPurpose::Reload);
        assert!(tracker.is_in_flight(view, FetchPurpose::Reload));

        assert!(!tracker.complete(view, FetchPurpose::Reload, first));
        assert!(tracker.is_in_flight(view, FetchPurpose::Reload));
        assert!(tracker.complete(view, FetchPurpose::Reload, second));
        assert!(!tracker.is_in_flight(view, FetchPurpose::Reload));
    }

    #[test]
    fn purposes_are_tracked_independently() {
        let mut tracker = FetchTracker::default();
        let view = Some(ViewId(1));
        let reload = tracker.issue(view, FetchPurpose::Reload);
        let _older = tracker.issue(view, FetchPurpose::OlderPage);
        assert!(tracker.complete(view, FetchPurpose::Reload, reload));
        assert_eq!(tracker.in_flight_count(), 1);

        tracker.forget(ViewId(1));
        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[test]
    fn older_page_stops_before_oldest() {
        let filter = older_page_filter(at(100), 50);
        assert!(!filter.admits(at(100)));
        assert!(filter.admits(at(99)));
        assert_eq!(filter.limit, 50);
    }

    #[test]
    fn all_target_merges_topics_and_own_dms() {
        let source = MemorySource::with_messages([
            Message::new("1", "amy", "ops", at(0), ""),
            Message::new("2", "bob", "dev", at(1), ""),
            Message::new("3", "bob", "@amy", at(2), ""),
            Message::new("4", "cat", "@dan", at(3), ""),
        ]);
        let all = fetch_messages(&source, &ViewTarget::All, &MessageFilter::default(), Some("amy"))
            .expect("fetch");
        let ids: Vec<_> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);

        let limited = MessageFilter {
            limit: 2,
            ..MessageFilter::default()
        };
        let tail = fetch_messages(&source, &ViewTarget::All, &limited, None).expect("fetch");
        let ids: Vec<_> = tail.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
    }
}
