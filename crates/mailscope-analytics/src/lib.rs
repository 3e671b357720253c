#![forbid(unsafe_code)]
//! mailscope-analytics library.
//!
//! Pure aggregators over message sets. Every entry point is a function of
//! its inputs only: no clock reads, no I/O, deterministic tie-breaks. Callers
//! recompute and replace whole results rather than patching them.
//!
//! - [`thread`]: reply-forest reconstruction with cycle-proof linking.
//! - [`graph`]: weighted agent graph with a bounded node budget.
//! - [`stats`]: window statistics and heatmaps.
//! - [`snapshot`]: all of the above for one window.

pub mod graph;
pub mod snapshot;
pub mod stats;
pub mod thread;

pub use graph::{GraphOptions, GraphSnapshot, build_graph_snapshot, build_graph_snapshot_with};
pub use snapshot::{AnalyticsOptions, AnalyticsSnapshot, analyze};
pub use stats::{
    HeatmapMatrix, HeatmapMode, StatsOptions, StatsSnapshot, TimeWindow, all_time_window,
    build_heatmap_matrix, compute_stats, compute_stats_with,
};
pub use thread::{
    Thread, ThreadNode, ThreadOptions, ThreadSummary, build_thread, build_threads,
    build_threads_with, flatten_thread, is_cross_target_reply, sort_by_activity, summarize_thread,
};
