//! Message model shared by the aggregators and the live coordinator.

pub mod markers;
pub mod message;
pub mod source_types;

pub use markers::{Bookmarks, ReadMarkers};
pub use message::{
    DM_PREFIX, Message, MessageKey, Priority, Target, chronological, format_message_id,
    normalize_body, sort_chronological,
};
pub use source_types::{
    AgentInfo, DmConversation, MessageFilter, SearchHit, SubscriptionFilter, TopicInfo,
};
