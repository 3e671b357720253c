//! `msc graph`: who talks to whom.

use std::io::{self, Write};
use std::path::Path;

use clap::Args;
use mailscope_analytics::graph::GraphSummary;
use mailscope_analytics::{GraphOptions, GraphSnapshot, build_graph_snapshot_with};
use mailscope_core::config::MailscopeConfig;
use serde::Serialize;

use crate::input::load_messages;
use crate::output::{OutputMode, cell, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct GraphArgs {
    /// Agent node budget; the rest collapse into "others" (0 = unbounded).
    #[arg(long)]
    pub max_nodes: Option<usize>,

    /// Topic overlay budget (0 = unbounded).
    #[arg(long)]
    pub max_topics: Option<usize>,
}

#[derive(Debug, Serialize)]
struct GraphReport {
    #[serde(flatten)]
    graph: GraphSnapshot,
    summary: GraphSummary,
}

pub fn run_graph(
    args: &GraphArgs,
    config: &MailscopeConfig,
    input: &Path,
    output: OutputMode,
) -> anyhow::Result<()> {
    let messages = load_messages(input)?;
    let mut options = GraphOptions::from(&config.graph);
    if let Some(max_nodes) = args.max_nodes {
        options.max_nodes = max_nodes;
    }
    if let Some(max_topics) = args.max_topics {
        options.max_topics = max_topics;
    }

    let graph = build_graph_snapshot_with(&messages, &options);
    let report = GraphReport {
        summary: graph.summary(),
        graph,
    };
    render_mode(output, &report, render_text, render_pretty)
}

fn render_text(report: &GraphReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "FROM  TO  COUNT")?;
    for edge in &report.graph.edges {
        writeln!(w, "{}  {}  {}", edge.from, edge.to, edge.count)?;
    }
    Ok(())
}

fn render_pretty(report: &GraphReport, w: &mut dyn Write) -> io::Result<()> {
    let graph = &report.graph;
    let summary = &report.summary;

    pretty_section(w, "Agents")?;
    for node in &graph.nodes {
        writeln!(
            w,
            "{} sent {:>5}  received {:>5}{}",
            cell(&node.name, 20),
            node.sent,
            node.received,
            if node.synthetic { "  (collapsed)" } else { "" }
        )?;
    }

    writeln!(w)?;
    pretty_section(w, "Edges")?;
    for edge in &graph.edges {
        writeln!(w, "{} -> {} {:>5}", cell(&edge.from, 20), cell(&edge.to, 20), edge.count)?;
    }

    if !graph.topics.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Topics")?;
        for topic in &graph.topics {
            writeln!(
                w,
                "{} {:>5} msg {:>3} agents",
                cell(&topic.name, 20),
                topic.message_count,
                topic.participant_count
            )?;
        }
    }

    writeln!(w)?;
    pretty_section(w, "Summary")?;
    pretty_kv(w, "Nodes", summary.node_count.to_string())?;
    pretty_kv(w, "Edges", summary.edge_count.to_string())?;
    pretty_kv(w, "Density", format!("{:.3}", summary.density))?;
    pretty_kv(w, "Components", summary.components.to_string())?;
    if let Some((from, to, count)) = &summary.heaviest_edge {
        pretty_kv(w, "Heaviest", format!("{from} -> {to} ({count})"))?;
    }
    if graph.collapsed_internal > 0 {
        pretty_kv(w, "Collapsed", format!("{} messages among others", graph.collapsed_internal))?;
    }
    Ok(())
}
