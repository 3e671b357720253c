//! `petgraph` export and shape statistics for a [`GraphSnapshot`].
//!
//! - **density**: `edge_count / (node_count * (node_count - 1))`, zero for
//!   graphs with fewer than two nodes.
//! - **components**: weakly connected components; more than one means the
//!   agents split into groups that never address each other.
//! - **isolated**: agents with no edges in either direction.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::connected_components;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use super::{GraphNode, GraphSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub message_weight: u64,
    pub density: f64,
    pub components: usize,
    pub isolated: usize,
    /// Heaviest edge as `(from, to, count)`.
    pub heaviest_edge: Option<(String, String, u64)>,
}

impl GraphSnapshot {
    /// Export as a `petgraph` digraph weighted by edge count.
    ///
    /// Node indices follow `self.nodes` order.
    #[must_use]
    pub fn to_digraph(&self) -> DiGraph<GraphNode, u64> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        let mut index: HashMap<&str, NodeIndex> = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            index.insert(node.name.as_str(), graph.add_node(node.clone()));
        }
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) =
                (index.get(edge.from.as_str()), index.get(edge.to.as_str()))
            {
                graph.add_edge(from, to, edge.count);
            }
        }
        graph
    }

    #[must_use]
    pub fn summary(&self) -> GraphSummary {
        let graph = self.to_digraph();
        let isolated = graph
            .node_indices()
            .filter(|&idx| {
                graph.neighbors_directed(idx, Direction::Incoming).next().is_none()
                    && graph.neighbors_directed(idx, Direction::Outgoing).next().is_none()
            })
            .count();

        GraphSummary {
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            message_weight: self.edges.iter().map(|e| e.count).sum(),
            density: compute_density(graph.node_count(), graph.edge_count()),
            components: connected_components(&graph),
            isolated,
            heaviest_edge: self
                .edges
                .first()
                .map(|e| (e.from.clone(), e.to.clone(), e.count)),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn compute_density(node_count: usize, edge_count: usize) -> f64 {
    if node_count < 2 {
        return 0.0_f64;
    }
    edge_count as f64 / (node_count * (node_count - 1)) as f64
}
