#![forbid(unsafe_code)]
//! Live window coordinator for mailscope.
//!
//! Keeps per-view message sets current from pulled pages and pushed
//! messages, and re-runs the pure aggregators in `mailscope-analytics` when
//! a view's input changes. See [`coordinator`] for the threading model.

pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod view;
pub mod window;

pub use coordinator::{Coordinator, CoordinatorOptions};
pub use dedup::MessageSet;
pub use error::LiveError;
pub use fetch::{FetchPurpose, SourceOverview};
pub use view::{ViewFault, ViewFilter, ViewId, ViewState, ViewTarget};
pub use window::{ViewWindow, Zoom};
