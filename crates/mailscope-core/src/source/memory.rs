//! In-memory [`MessageSource`] with push fan-out and failure injection.
//!
//! Backs the CLI (messages loaded from a JSON-lines export) and every
//! coordinator test. `publish` appends a message and delivers it to each
//! live subscription whose filter matches; cancelled subscriptions are
//! pruned on the next publish.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use super::{MessageSource, Subscription, SubscriptionSink, subscription_channel};
use crate::error::SourceError;
use crate::model::{
    AgentInfo, DmConversation, Message, MessageFilter, SearchHit, SubscriptionFilter, TopicInfo,
    chronological,
};

#[derive(Debug, Default)]
struct MemoryState {
    messages: Vec<Message>,
    agents: BTreeMap<String, AgentInfo>,
    subscribers: Vec<(SubscriptionFilter, SubscriptionSink)>,
    unavailable: Option<String>,
    fetch_delay: Option<Duration>,
}

/// Thread-safe in-memory message store.
#[derive(Debug, Default)]
pub struct MemorySource {
    state: Mutex<MemoryState>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source pre-loaded with `messages`.
    #[must_use]
    pub fn with_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let source = Self::new();
        source.extend(messages);
        source
    }

    /// Append messages without notifying subscribers.
    pub fn extend(&self, messages: impl IntoIterator<Item = Message>) {
        let mut state = self.lock();
        state.messages.extend(messages);
        state.messages.sort_by(chronological);
    }

    /// Append one message and push it to matching subscriptions.
    ///
    /// Returns the number of subscriptions it was delivered to.
    pub fn publish(&self, message: Message) -> usize {
        let mut state = self.lock();
        state.messages.push(message.clone());
        state.messages.sort_by(chronological);

        state.subscribers.retain(|(_, sink)| !sink.is_cancelled());
        let mut delivered = 0;
        for (filter, sink) in &state.subscribers {
            if filter.matches(&message) && sink.send(message.clone()) {
                delivered += 1;
            }
        }
        trace!(id = %message.id, delivered, "published message");
        delivered
    }

    /// Register agent metadata returned by [`MessageSource::agents`].
    pub fn register_agent(&self, agent: AgentInfo) {
        self.lock().agents.insert(agent.name.clone(), agent);
    }

    /// Make every pull call fail with [`SourceError::Unavailable`] until
    /// cleared with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.lock().unavailable = reason.map(str::to_string);
    }

    /// Delay every pull call, simulating a slow transport.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.lock().fetch_delay = delay;
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|(_, sink)| !sink.is_cancelled());
        state.subscribers.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply injected latency and failures, then run `f` on the state.
    fn pull<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> Result<T, SourceError> {
        let delay = self.lock().fetch_delay;
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let state = self.lock();
        if let Some(reason) = &state.unavailable {
            debug!(reason = %reason, "memory source refusing pull");
            return Err(SourceError::Unavailable(reason.clone()));
        }
        Ok(f(&state))
    }
}

impl MessageSource for MemorySource {
    fn topics(&self) -> Result<Vec<TopicInfo>, SourceError> {
        self.pull(|state| {
            let mut by_topic: BTreeMap<&str, (Vec<&Message>, BTreeSet<&str>)> = BTreeMap::new();
            for msg in &state.messages {
                if let Some(topic) = msg.topic() {
                    let entry = by_topic.entry(topic).or_default();
                    entry.0.push(msg);
                    entry.1.insert(msg.from.as_str());
                }
            }

            let mut topics: Vec<TopicInfo> = by_topic
                .into_iter()
                .map(|(name, (msgs, participants))| {
                    let last = msgs.last().copied();
                    TopicInfo {
                        name: name.to_string(),
                        last_activity: last.map(|m| m.time),
                        message_count: msgs.len() as u64,
                        participants: participants.into_iter().map(str::to_string).collect(),
                        last_message: last.cloned(),
                    }
                })
                .collect();
            topics.sort_by(|a, b| {
                b.last_activity
                    .cmp(&a.last_activity)
                    .then_with(|| a.name.cmp(&b.name))
            });
            topics
        })
    }

    fn messages(&self, topic: &str, filter: &MessageFilter) -> Result<Vec<Message>, SourceError> {
        self.pull(|state| {
            filter.apply(
                state
                    .messages
                    .iter()
                    .filter(|m| m.topic().is_some_and(|t| t == topic)),
            )
        })
    }

    fn dm_conversations(&self, self_agent: &str) -> Result<Vec<DmConversation>, SourceError> {
        self.pull(|state| {
            let mut by_peer: BTreeMap<&str, DmConversation> = BTreeMap::new();
            for msg in &state.messages {
                let Some(recipient) = msg.dm_peer() else {
                    continue;
                };
                let peer = if msg.from == self_agent {
                    recipient
                } else if recipient == self_agent {
                    msg.from.as_str()
                } else {
                    continue;
                };
                let entry = by_peer.entry(peer).or_insert_with(|| DmConversation {
                    agent: peer.to_string(),
                    last_activity: None,
                    message_count: 0,
                    unread_count: 0,
                });
                entry.message_count += 1;
                entry.last_activity = entry.last_activity.max(Some(msg.time));
            }

            let mut conversations: Vec<DmConversation> = by_peer.into_values().collect();
            conversations.sort_by(|a, b| {
                b.last_activity
                    .cmp(&a.last_activity)
                    .then_with(|| a.agent.cmp(&b.agent))
            });
            conversations
        })
    }

    fn dms(&self, agent: &str, filter: &MessageFilter) -> Result<Vec<Message>, SourceError> {
        self.pull(|state| {
            filter.apply(state.messages.iter().filter(|m| m.involves_dm_with(agent)))
        })
    }

    fn agents(&self) -> Result<Vec<AgentInfo>, SourceError> {
        self.pull(|state| {
            let mut agents = state.agents.clone();
            for msg in &state.messages {
                let entry = agents.entry(msg.from.clone()).or_insert_with(|| AgentInfo {
                    name: msg.from.clone(),
                    last_seen: None,
                    status: None,
                    host: None,
                });
                if entry.last_seen.is_none_or(|seen| msg.time > seen) {
                    entry.last_seen = Some(msg.time);
                    if msg.host.is_some() {
                        entry.host.clone_from(&msg.host);
                    }
                }
            }
            agents.into_values().collect()
        })
    }

    fn search(&self, query: &str) -> Result<Vec<SearchHit>, SourceError> {
        let needle = query.to_lowercase();
        self.pull(|state| {
            state
                .messages
                .iter()
                .filter(|m| !needle.is_empty() && m.body.to_lowercase().contains(&needle))
                .map(|m| SearchHit {
                    message: m.clone(),
                    topic: m.to.clone(),
                    prev_in_thread: m
                        .reply_to_id()
                        .and_then(|parent| state.messages.iter().find(|p| p.id == parent))
                        .cloned(),
                    next_in_thread: state
                        .messages
                        .iter()
                        .find(|c| c.reply_to_id() == Some(m.id.as_str()))
                        .cloned(),
                })
                .collect()
        })
    }

    fn subscribe(&self, filter: &SubscriptionFilter) -> Result<Subscription, SourceError> {
        let (sink, subscription) = subscription_channel();
        let mut state = self.lock();
        state.subscribers.push((filter.clone(), sink));
        debug!(topic = ?filter.topic, include_dm = filter.include_dm, "subscription opened");
        Ok(subscription)
    }
}
