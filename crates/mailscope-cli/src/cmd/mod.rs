pub mod graph;
pub mod heatmap;
pub mod stats;
pub mod threads;
pub mod watch;
