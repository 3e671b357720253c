//! One-shot bundle of every derived view over a window.

use chrono::{DateTime, Utc};
use mailscope_core::WindowError;
use mailscope_core::config::MailscopeConfig;
use mailscope_core::model::Message;
use mailscope_core::timing::timed;
use serde::Serialize;

use crate::graph::{GraphOptions, GraphSnapshot, build_graph_snapshot_with};
use crate::stats::{
    HeatmapMatrix, HeatmapMode, StatsOptions, StatsSnapshot, TimeWindow, build_heatmap_matrix,
    compute_stats_with,
};
use crate::thread::{Thread, ThreadOptions, build_threads_with};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyticsOptions {
    pub threads: ThreadOptions,
    pub graph: GraphOptions,
    pub stats: StatsOptions,
    pub heatmap_bucket_secs: i64,
    pub heatmap_mode: HeatmapMode,
}

impl Default for AnalyticsOptions {
    fn default() -> Self {
        Self {
            threads: ThreadOptions::default(),
            graph: GraphOptions::default(),
            stats: StatsOptions::default(),
            heatmap_bucket_secs: 3_600,
            heatmap_mode: HeatmapMode::ByAgent,
        }
    }
}

impl From<&MailscopeConfig> for AnalyticsOptions {
    fn from(config: &MailscopeConfig) -> Self {
        Self {
            threads: ThreadOptions::from(&config.threads),
            graph: GraphOptions::from(&config.graph),
            stats: StatsOptions::from(&config.stats),
            heatmap_bucket_secs: config.stats.heatmap_bucket_secs,
            heatmap_mode: HeatmapMode::ByAgent,
        }
    }
}

/// Threads, graph, statistics and heatmap computed from the same input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub window: TimeWindow,
    /// Messages inside the window.
    pub message_count: usize,
    pub threads: Vec<Thread>,
    pub graph: GraphSnapshot,
    pub stats: StatsSnapshot,
    pub heatmap: HeatmapMatrix,
}

/// Run every aggregator over the messages inside `[start, end)`.
///
/// # Errors
///
/// Returns [`WindowError`] for a reversed window or a non-positive heatmap
/// bucket.
pub fn analyze(
    messages: &[Message],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    options: &AnalyticsOptions,
) -> Result<AnalyticsSnapshot, WindowError> {
    let window = TimeWindow::new(start, end)?;
    let in_window: Vec<Message> = window.select(messages).into_iter().cloned().collect();

    let heatmap = timed("heatmap", || {
        build_heatmap_matrix(
            &in_window,
            start,
            end,
            options.heatmap_bucket_secs,
            options.heatmap_mode,
        )
    })?;
    let stats = timed("stats", || compute_stats_with(&in_window, start, end, &options.stats))?;
    let threads = timed("threads", || build_threads_with(&in_window, &options.threads));
    let graph = timed("graph", || build_graph_snapshot_with(&in_window, &options.graph));

    Ok(AnalyticsSnapshot {
        window,
        message_count: in_window.len(),
        threads,
        graph,
        stats,
        heatmap,
    })
}
