//! Reply-thread reconstruction.
//!
//! # Overview
//!
//! [`build_threads`] turns a flat, reply-linked message list into a forest of
//! [`Thread`]s. Each thread is an arena of [`ThreadNode`]s addressed by
//! index; node 0 is always the root.
//!
//! ## Link precedence
//!
//! Messages are processed in `(time, id)` order and a message may only link
//! to a parent that has already been processed. A `reply_to` that is empty,
//! points at the message itself, names an unknown ID, or names a message
//! that sorts later is left unlinked and the message becomes a root. Because
//! every link points backwards in a total order, the result is acyclic for
//! any input, including adversarial mutual references.
//!
//! ## Duplicate IDs
//!
//! When an ID occurs more than once (one send fanned out to several
//! targets), the first occurrence in `(time, id)` order is the link target.
//! Later duplicates are still placed as nodes.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use mailscope_core::config::ThreadConfig;
use mailscope_core::model::{Message, chronological};
use serde::Serialize;
use tracing::instrument;

/// Default depth past which nodes are flagged instead of indented further.
pub const DEFAULT_MAX_DISPLAY_DEPTH: usize = 6;

/// Title used when the root body has no non-blank line.
pub const UNTITLED_THREAD: &str = "(untitled)";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Thread builder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadOptions {
    /// Display depth clamp. A node deeper than this keeps its true parent
    /// but reports `depth == max_display_depth` and `depth_overflow`.
    pub max_display_depth: usize,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            max_display_depth: DEFAULT_MAX_DISPLAY_DEPTH,
        }
    }
}

impl From<&ThreadConfig> for ThreadOptions {
    fn from(config: &ThreadConfig) -> Self {
        Self {
            max_display_depth: config.max_display_depth,
        }
    }
}

// ---------------------------------------------------------------------------
// Thread / ThreadNode
// ---------------------------------------------------------------------------

/// One message placed in a thread arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadNode {
    pub message: Message,
    /// Arena index of the parent; `None` at the root.
    pub parent: Option<usize>,
    /// Arena indices of direct replies, ordered by `(time, id)`.
    pub children: Vec<usize>,
    /// Display depth, clamped to the configured maximum.
    pub depth: usize,
    /// Unclamped distance from the root.
    pub true_depth: usize,
    /// Set when `true_depth` exceeds the display clamp.
    pub depth_overflow: bool,
}

/// A reply-connected component.
///
/// Only built by [`build_threads_with`], which starts every thread from its
/// root, so a `Thread` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    /// Arena; index 0 is the root and nodes are stored in `(time, id)` order.
    nodes: Vec<ThreadNode>,
    /// Maximum clamped depth over all nodes.
    depth: usize,
}

impl Thread {
    fn rooted(root: ThreadNode) -> Self {
        Self {
            nodes: vec![root],
            depth: 0,
        }
    }

    #[must_use]
    pub fn root(&self) -> &ThreadNode {
        &self.nodes[0]
    }

    /// All nodes in arena order, root first.
    #[must_use]
    pub fn nodes(&self) -> &[ThreadNode] {
        &self.nodes
    }

    /// Maximum clamped depth over all nodes.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn node(&self, index: usize) -> Option<&ThreadNode> {
        self.nodes.get(index)
    }

    /// Parent node of `node`, if linked.
    #[must_use]
    pub fn parent_of(&self, node: &ThreadNode) -> Option<&ThreadNode> {
        node.parent.and_then(|idx| self.nodes.get(idx))
    }

    /// Arena index of the first node carrying `message_id`.
    #[must_use]
    pub fn position(&self, message_id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.message.id == message_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Latest message time in the thread.
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.nodes
            .iter()
            .map(|n| n.message.time)
            .max()
            .unwrap_or_default()
    }
}

/// Dashboard list-row summary of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSummary {
    pub root_id: String,
    pub title: String,
    pub message_count: usize,
    pub participant_count: usize,
    pub last_activity: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Build threads with default options.
#[must_use]
pub fn build_threads(messages: &[Message]) -> Vec<Thread> {
    build_threads_with(messages, &ThreadOptions::default())
}

/// Build the reply forest for `messages`.
///
/// Threads are returned in root `(time, id)` order. Never fails: malformed
/// links degrade to extra roots.
#[must_use]
#[instrument(skip(messages), fields(count = messages.len()))]
pub fn build_threads_with(messages: &[Message], options: &ThreadOptions) -> Vec<Thread> {
    let mut ordered: Vec<&Message> = messages.iter().collect();
    ordered.sort_by(|a, b| chronological(a, b));

    let mut threads: Vec<Thread> = Vec::new();
    // Message ID -> (thread index, arena index) of its first occurrence.
    let mut placed: HashMap<&str, (usize, usize)> = HashMap::with_capacity(ordered.len());

    for msg in ordered {
        let parent = msg
            .reply_to_id()
            .filter(|parent_id| *parent_id != msg.id)
            .and_then(|parent_id| placed.get(parent_id).copied());

        let slot = match parent {
            Some((thread_idx, parent_idx)) => {
                let thread = &mut threads[thread_idx];
                let true_depth = thread.nodes[parent_idx].true_depth + 1;
                let node_idx = thread.nodes.len();
                thread.nodes.push(place(msg, Some(parent_idx), true_depth, options));
                thread.nodes[parent_idx].children.push(node_idx);
                thread.depth = thread.depth.max(thread.nodes[node_idx].depth);
                (thread_idx, node_idx)
            }
            None => {
                threads.push(Thread::rooted(place(msg, None, 0, options)));
                (threads.len() - 1, 0)
            }
        };

        placed.entry(msg.id.as_str()).or_insert(slot);
    }

    threads
}

fn place(
    msg: &Message,
    parent: Option<usize>,
    true_depth: usize,
    options: &ThreadOptions,
) -> ThreadNode {
    ThreadNode {
        message: msg.clone(),
        parent,
        children: Vec::new(),
        depth: true_depth.min(options.max_display_depth),
        true_depth,
        depth_overflow: true_depth > options.max_display_depth,
    }
}

/// The thread containing `around_id`, built with default options.
#[must_use]
pub fn build_thread(messages: &[Message], around_id: &str) -> Option<Thread> {
    build_thread_with(messages, around_id, &ThreadOptions::default())
}

#[must_use]
pub fn build_thread_with(
    messages: &[Message],
    around_id: &str,
    options: &ThreadOptions,
) -> Option<Thread> {
    build_threads_with(messages, options)
        .into_iter()
        .find(|thread| thread.position(around_id).is_some())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Depth-first, parent-before-children traversal in child order.
#[must_use]
pub fn flatten_thread(thread: &Thread) -> Vec<&ThreadNode> {
    let mut out = Vec::with_capacity(thread.nodes.len());
    if thread.nodes.is_empty() {
        return out;
    }

    let mut stack = vec![0_usize];
    while let Some(idx) = stack.pop() {
        let node = &thread.nodes[idx];
        out.push(node);
        stack.extend(node.children.iter().rev().copied());
    }
    out
}

#[must_use]
pub fn summarize_thread(thread: &Thread) -> ThreadSummary {
    let root = &thread.root().message;
    let title = root
        .body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(UNTITLED_THREAD)
        .to_string();
    let participants: BTreeSet<&str> =
        thread.nodes.iter().map(|n| n.message.from.as_str()).collect();

    ThreadSummary {
        root_id: root.id.clone(),
        title,
        message_count: thread.nodes.len(),
        participant_count: participants.len(),
        last_activity: thread.last_activity(),
    }
}

/// True when `node` replies to a parent posted on a different target.
#[must_use]
pub fn is_cross_target_reply(thread: &Thread, node: &ThreadNode) -> bool {
    thread
        .parent_of(node)
        .is_some_and(|parent| parent.message.to != node.message.to)
}

/// Order threads for a list view: latest activity first, then root ID.
pub fn sort_by_activity(threads: &mut [Thread]) {
    threads.sort_by(|a, b| {
        b.last_activity()
            .cmp(&a.last_activity())
            .then_with(|| a.root().message.id.cmp(&b.root().message.id))
    });
}
