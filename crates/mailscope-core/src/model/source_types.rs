//! Records returned by the message source alongside raw messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{Message, chronological};

/// Topic listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub name: String,
    pub last_activity: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub participants: Vec<String>,
    pub last_message: Option<Message>,
}

/// One DM conversation as seen from a given agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmConversation {
    /// The peer agent.
    pub agent: String,
    pub last_activity: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub unread_count: u64,
}

/// Known agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub host: Option<String>,
}

/// Search result with its immediate thread neighbours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub message: Message,
    pub topic: String,
    pub prev_in_thread: Option<Message>,
    pub next_in_thread: Option<Message>,
}

/// Time bounds for a pull fetch.
///
/// `since` and `until` are inclusive. `limit > 0` selects the most recent
/// `limit` messages inside the bounds; `0` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl MessageFilter {
    /// Returns `true` if `time` falls inside the bounds.
    #[must_use]
    pub fn admits(&self, time: DateTime<Utc>) -> bool {
        self.since.is_none_or(|since| time >= since) && self.until.is_none_or(|until| time <= until)
    }

    /// Apply bounds and limit to an arbitrary batch, returning the selected
    /// messages in chronological order.
    #[must_use]
    pub fn apply<'a, I>(&self, messages: I) -> Vec<Message>
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let mut selected: Vec<Message> = messages
            .into_iter()
            .filter(|msg| self.admits(msg.time))
            .cloned()
            .collect();
        selected.sort_by(chronological);
        if self.limit > 0 && selected.len() > self.limit {
            selected.drain(..selected.len() - self.limit);
        }
        selected
    }
}

/// What a push subscription delivers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// Restrict to one topic; `None` means every topic.
    pub topic: Option<String>,
    pub include_dm: bool,
}

impl SubscriptionFilter {
    /// Returns `true` if `message` should be delivered to this subscription.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        match message.topic() {
            Some(topic) => self.topic.as_deref().is_none_or(|wanted| wanted == topic),
            None => self.include_dm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("valid ts")
    }

    fn msgs() -> Vec<Message> {
        (0..5)
            .map(|i| Message::new(format!("m{i}"), "a", "t", at(i * 10), ""))
            .collect()
    }

    #[test]
    fn limit_keeps_most_recent() {
        let filter = MessageFilter {
            limit: 2,
            ..MessageFilter::default()
        };
        let ids: Vec<_> = filter.apply(&msgs()).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["m3", "m4"]);
    }

    #[test]
    fn until_is_inclusive() {
        let filter = MessageFilter {
            until: Some(at(20)),
            ..MessageFilter::default()
        };
        assert_eq!(filter.apply(&msgs()).len(), 3);

        let filter = MessageFilter {
            until: Some(at(20) - Duration::nanoseconds(1)),
            ..MessageFilter::default()
        };
        assert_eq!(filter.apply(&msgs()).len(), 2);
    }

    #[test]
    fn subscription_filter_gates_dms() {
        let dm = Message::new("1", "a", "@b", at(0), "");
        let topic = Message::new("2", "a", "ops", at(0), "");
        let other = Message::new("3", "a", "dev", at(0), "");

        let filter = SubscriptionFilter {
            topic: Some("ops".to_string()),
            include_dm: false,
        };
        assert!(!filter.matches(&dm));
        assert!(filter.matches(&topic));
        assert!(!filter.matches(&other));

        let all = SubscriptionFilter {
            topic: None,
            include_dm: true,
        };
        assert!(all.matches(&dm) && all.matches(&other));
    }
}
