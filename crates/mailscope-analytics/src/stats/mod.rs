//! Time-windowed statistics and heatmaps.
//!
//! All aggregates are computed over a half-open UTC window `[start, end)`.
//! A window with `end == start` is valid and empty; `end < start` and
//! non-positive bucket sizes are rejected with [`WindowError`].

pub mod compute;
pub mod heatmap;

use chrono::{DateTime, TimeDelta, Utc};
use mailscope_core::WindowError;
use mailscope_core::config::StatsConfig;
use mailscope_core::model::Message;
use serde::Serialize;

pub use compute::{
    LatencyBucket, LatencyStats, RankEntry, StatsSnapshot, ThreadSizeStats, TimeBucket,
    compute_stats, compute_stats_with,
};
pub use heatmap::{HeatmapMatrix, HeatmapMode, HeatmapRow, build_heatmap_matrix};

pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsOptions {
    /// Entries kept in each top-N ranking.
    pub top_n: usize,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl From<&StatsConfig> for StatsOptions {
    fn from(config: &StatsConfig) -> Self {
        Self {
            top_n: config.top_n,
        }
    }
}

/// Validated half-open window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// # Errors
    ///
    /// Returns [`WindowError::EndBeforeStart`] if `end < start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, WindowError> {
        if end < start {
            return Err(WindowError::EndBeforeStart);
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.start && time < self.end
    }

    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Messages inside the window, in input order.
    #[must_use]
    pub fn select<'a>(&self, messages: &'a [Message]) -> Vec<&'a Message> {
        messages.iter().filter(|m| self.contains(m.time)).collect()
    }

    /// Number of `bucket`-sized columns covering the window, the last one
    /// possibly partial.
    #[must_use]
    pub(crate) fn bucket_count(&self, bucket: TimeDelta) -> usize {
        let span = u64::try_from(self.duration().num_milliseconds()).unwrap_or(0);
        let step = u64::try_from(bucket.num_milliseconds()).unwrap_or(0);
        if span == 0 || step == 0 {
            return 0;
        }
        usize::try_from(span.div_ceil(step)).unwrap_or(0)
    }

    /// Column index of `time` for `bucket`-sized columns.
    #[must_use]
    pub(crate) fn bucket_index(&self, time: DateTime<Utc>, bucket: TimeDelta) -> Option<usize> {
        if !self.contains(time) {
            return None;
        }
        let offset = (time - self.start).num_milliseconds();
        usize::try_from(offset / bucket.num_milliseconds().max(1)).ok()
    }
}

/// The "all time" window: earliest observed message to one second past the
/// latest. `None` for an empty input.
#[must_use]
pub fn all_time_window(messages: &[Message]) -> Option<TimeWindow> {
    let start = messages.iter().map(|m| m.time).min()?;
    let last = messages.iter().map(|m| m.time).max()?;
    Some(TimeWindow {
        start,
        end: last + TimeDelta::seconds(1),
    })
}

pub(crate) fn bucket_delta(seconds: i64) -> Result<TimeDelta, WindowError> {
    if seconds <= 0 {
        return Err(WindowError::NonPositiveBucket { seconds });
    }
    TimeDelta::try_seconds(seconds).ok_or(WindowError::NonPositiveBucket { seconds })
}
