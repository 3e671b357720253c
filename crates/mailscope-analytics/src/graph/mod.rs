//! Agent relationship graph.
//!
//! - [`build`]: weighted directed agent graph plus topic overlay, bounded to
//!   a node budget by collapsing the tail into a synthetic `others` node.
//! - [`summary`]: `petgraph` export and shape statistics for a snapshot.

pub mod build;
pub mod summary;

use mailscope_core::config::GraphConfig;
use serde::Serialize;

pub use build::{build_graph_snapshot, build_graph_snapshot_with};
pub use summary::GraphSummary;

/// Name of the synthetic node that absorbs agents beyond the node budget.
pub const OTHERS_NODE: &str = "others";

pub const DEFAULT_MAX_NODES: usize = 12;
pub const DEFAULT_MAX_TOPICS: usize = 8;

/// Graph builder bounds. A value of zero means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphOptions {
    pub max_nodes: usize,
    pub max_topics: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_topics: DEFAULT_MAX_TOPICS,
        }
    }
}

impl From<&GraphConfig> for GraphOptions {
    fn from(config: &GraphConfig) -> Self {
        Self {
            max_nodes: config.max_nodes,
            max_topics: config.max_topics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub name: String,
    pub sent: u64,
    pub received: u64,
    pub total: u64,
    /// `true` only for the collapsed `others` node.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

/// Directed, weighted `from -> to` edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicSummary {
    pub name: String,
    pub message_count: u64,
    pub participant_count: usize,
}

/// Overlay edge: messages an agent (or `others`) posted to a kept topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicEdge {
    pub agent: String,
    pub topic: String,
    pub count: u64,
}

/// Immutable graph view over one message set.
///
/// Invariants:
/// - `node.total == node.sent + node.received` for every node.
/// - `sum(edges.count) + collapsed_internal == sum(nodes.sent)`.
/// - `nodes.len() <= max_nodes` when `max_nodes > 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    /// Real nodes by total desc then name; `others` (if any) last.
    pub nodes: Vec<GraphNode>,
    /// By count desc, then `(from, to)`.
    pub edges: Vec<GraphEdge>,
    /// Busiest topics by message count desc, then name.
    pub topics: Vec<TopicSummary>,
    pub topic_edges: Vec<TopicEdge>,
    /// Edge weight between two absorbed agents, dropped as an
    /// `others -> others` self-loop.
    pub collapsed_internal: u64,
}

impl GraphSnapshot {
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    #[must_use]
    pub fn edge(&self, from: &str, to: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    /// The synthetic `others` node, present only after collapsing.
    #[must_use]
    pub fn others(&self) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.synthetic)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
