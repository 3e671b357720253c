//! Graph snapshot construction.
//!
//! # Edge Semantics
//!
//! An edge `a -> b` with count `n` means `a` addressed `b` `n` times:
//!
//! - A direct message `a -> @b` adds one to `a -> b`.
//! - A topic message from `a` adds one to `a -> p` for every other agent `p`
//!   that has posted to the same topic in the input set. One broadcast to a
//!   topic with four other participants therefore counts four sends.
//! - Self-DMs add nothing.
//!
//! `sent`/`received` count edge increments, so they always reconcile with the
//! edge list.
//!
//! ## Node Budget
//!
//! With `max_nodes = k > 0` and more than `k` agents, the top `k - 1` agents
//! (by total desc, name asc) are kept and the remainder collapse into the
//! synthetic [`OTHERS_NODE`]. Edges are re-aggregated against the collapsed
//! set; traffic between two absorbed agents becomes an `others -> others`
//! self-loop, which is dropped and tallied in
//! [`GraphSnapshot::collapsed_internal`].

use std::collections::{BTreeMap, BTreeSet, HashSet};

use mailscope_core::model::{Message, Target};
use tracing::{debug, instrument};

use super::{
    GraphEdge, GraphNode, GraphOptions, GraphSnapshot, OTHERS_NODE, TopicEdge, TopicSummary,
};

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Build a snapshot bounded to `max_nodes` with the default topic budget.
#[must_use]
pub fn build_graph_snapshot(messages: &[Message], max_nodes: usize) -> GraphSnapshot {
    build_graph_snapshot_with(
        messages,
        &GraphOptions {
            max_nodes,
            ..GraphOptions::default()
        },
    )
}

#[must_use]
#[instrument(skip(messages), fields(count = messages.len()))]
pub fn build_graph_snapshot_with(messages: &[Message], options: &GraphOptions) -> GraphSnapshot {
    let participants = topic_participants(messages);
    let raw_edges = count_edges(messages, &participants);
    let nodes = rank_nodes(messages, &raw_edges);

    let keep = if options.max_nodes == 0 || nodes.len() <= options.max_nodes {
        nodes.len()
    } else {
        options.max_nodes - 1
    };
    let kept: HashSet<String> = nodes[..keep].iter().map(|n| n.name.clone()).collect();
    let collapsing = keep < nodes.len();

    let (nodes, edges, collapsed_internal) = if collapsing {
        debug!(
            kept = keep,
            absorbed = nodes.len() - keep,
            "collapsing graph tail into others"
        );
        collapse(&nodes, keep, &raw_edges, &kept)
    } else {
        (nodes, sorted_edges(raw_edges), 0)
    };

    let (topics, topic_edges) = topic_overlay(messages, &participants, options.max_topics, |agent| {
        if !collapsing || kept.contains(agent) {
            agent.to_string()
        } else {
            OTHERS_NODE.to_string()
        }
    });

    GraphSnapshot {
        nodes,
        edges,
        topics,
        topic_edges,
        collapsed_internal,
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Distinct senders per topic.
fn topic_participants(messages: &[Message]) -> BTreeMap<&str, BTreeSet<&str>> {
    let mut participants: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for msg in messages {
        if let Some(topic) = msg.topic() {
            participants.entry(topic).or_default().insert(msg.from.as_str());
        }
    }
    participants
}

fn count_edges<'a>(
    messages: &'a [Message],
    participants: &BTreeMap<&'a str, BTreeSet<&'a str>>,
) -> BTreeMap<(&'a str, &'a str), u64> {
    let mut edges: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    for msg in messages {
        let from = msg.from.as_str();
        match msg.target() {
            Target::Direct(peer) => {
                if peer != from {
                    *edges.entry((from, peer)).or_insert(0) += 1;
                }
            }
            Target::Topic(topic) => {
                let Some(members) = participants.get(topic) else {
                    continue;
                };
                for &member in members {
                    if member != from {
                        *edges.entry((from, member)).or_insert(0) += 1;
                    }
                }
            }
        }
    }
    edges
}

/// Every agent that sent a message or received a DM, ranked by total desc
/// then name asc.
fn rank_nodes(messages: &[Message], edges: &BTreeMap<(&str, &str), u64>) -> Vec<GraphNode> {
    let mut tallies: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for msg in messages {
        tallies.entry(msg.from.as_str()).or_default();
        if let Some(peer) = msg.dm_peer() {
            tallies.entry(peer).or_default();
        }
    }
    for (&(from, to), &count) in edges {
        tallies.entry(from).or_default().0 += count;
        tallies.entry(to).or_default().1 += count;
    }

    let mut nodes: Vec<GraphNode> = tallies
        .into_iter()
        .map(|(name, (sent, received))| GraphNode {
            name: name.to_string(),
            sent,
            received,
            total: sent + received,
            synthetic: false,
        })
        .collect();
    nodes.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    nodes
}

fn collapse(
    ranked: &[GraphNode],
    keep: usize,
    raw_edges: &BTreeMap<(&str, &str), u64>,
    kept: &HashSet<String>,
) -> (Vec<GraphNode>, Vec<GraphEdge>, u64) {
    let mut nodes: Vec<GraphNode> = ranked[..keep].to_vec();
    let mut others = GraphNode {
        name: OTHERS_NODE.to_string(),
        sent: 0,
        received: 0,
        total: 0,
        synthetic: true,
    };
    for absorbed in &ranked[keep..] {
        others.sent += absorbed.sent;
        others.received += absorbed.received;
        others.total += absorbed.total;
    }
    nodes.push(others);

    let bucket = |name: &str| -> String {
        if kept.contains(name) {
            name.to_string()
        } else {
            OTHERS_NODE.to_string()
        }
    };

    let mut merged: BTreeMap<(String, String), u64> = BTreeMap::new();
    let mut internal = 0_u64;
    for (&(from, to), &count) in raw_edges {
        let (from, to) = (bucket(from), bucket(to));
        if from == to {
            internal += count;
        } else {
            *merged.entry((from, to)).or_insert(0) += count;
        }
    }

    let edges = merged
        .into_iter()
        .map(|((from, to), count)| GraphEdge { from, to, count })
        .collect();
    (nodes, sort_edge_list(edges), internal)
}

fn sorted_edges(raw: BTreeMap<(&str, &str), u64>) -> Vec<GraphEdge> {
    let edges = raw
        .into_iter()
        .map(|((from, to), count)| GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            count,
        })
        .collect();
    sort_edge_list(edges)
}

fn sort_edge_list(mut edges: Vec<GraphEdge>) -> Vec<GraphEdge> {
    edges.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.from.cmp(&b.from))
            .then_with(|| a.to.cmp(&b.to))
    });
    edges
}

fn topic_overlay(
    messages: &[Message],
    participants: &BTreeMap<&str, BTreeSet<&str>>,
    max_topics: usize,
    agent_bucket: impl Fn(&str) -> String,
) -> (Vec<TopicSummary>, Vec<TopicEdge>) {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for msg in messages {
        if let Some(topic) = msg.topic() {
            *counts.entry(topic).or_insert(0) += 1;
        }
    }

    let mut topics: Vec<TopicSummary> = counts
        .into_iter()
        .map(|(name, message_count)| TopicSummary {
            name: name.to_string(),
            message_count,
            participant_count: participants.get(name).map_or(0, BTreeSet::len),
        })
        .collect();
    topics.sort_by(|a, b| {
        b.message_count
            .cmp(&a.message_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    if max_topics > 0 {
        topics.truncate(max_topics);
    }

    let shown: HashSet<&str> = topics.iter().map(|t| t.name.as_str()).collect();
    let mut weights: BTreeMap<(String, &str), u64> = BTreeMap::new();
    for msg in messages {
        if let Some(topic) = msg.topic().filter(|t| shown.contains(t)) {
            *weights.entry((agent_bucket(&msg.from), topic)).or_insert(0) += 1;
        }
    }

    let mut topic_edges: Vec<TopicEdge> = weights
        .into_iter()
        .map(|((agent, topic), count)| TopicEdge {
            agent,
            topic: topic.to_string(),
            count,
        })
        .collect();
    topic_edges.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.agent.cmp(&b.agent))
            .then_with(|| a.topic.cmp(&b.topic))
    });

    (topics, topic_edges)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
