#![no_main]

use libfuzzer_sys::fuzz_target;
use mailscope_analytics::{GraphOptions, build_graph_snapshot_with};
use mailscope_core::Message;

fuzz_target!(|data: &[u8]| {
    let Some((&budget, rest)) = data.split_first() else {
        return;
    };
    let Ok(text) = std::str::from_utf8(rest) else {
        return;
    };
    let messages: Vec<Message> = text
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    let options = GraphOptions {
        max_nodes: usize::from(budget % 8),
        max_topics: usize::from(budget / 32),
    };
    let graph = build_graph_snapshot_with(&messages, &options);

    if options.max_nodes > 0 {
        assert!(graph.nodes.len() <= options.max_nodes);
    }
    if options.max_topics > 0 {
        assert!(graph.topics.len() <= options.max_topics);
    }
    for edge in &graph.edges {
        assert!(edge.count > 0);
        assert!(graph.nodes.iter().any(|n| n.name == edge.from));
        assert!(graph.nodes.iter().any(|n| n.name == edge.to));
    }
});
