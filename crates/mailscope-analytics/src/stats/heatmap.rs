//! Agent/topic by time-bucket heatmaps.
//!
//! # Scaling
//!
//! Cells map to four display levels. Level 0 is an empty cell; levels 1-3
//! split the non-zero cells at their 1/3 and 2/3 nearest-rank quantiles, so
//! the scale adapts to whatever traffic volume the window holds.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mailscope_core::WindowError;
use mailscope_core::model::Message;
use serde::Serialize;
use tracing::instrument;

use super::{TimeWindow, bucket_delta};

/// Row dimension of a heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapMode {
    /// One row per sender.
    ByAgent,
    /// One row per raw target; DMs appear as `@agent` rows.
    ByTopic,
}

impl HeatmapMode {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ByAgent => "agent",
            Self::ByTopic => "topic",
        }
    }

    fn row_key(self, msg: &Message) -> &str {
        match self {
            Self::ByAgent => &msg.from,
            Self::ByTopic => &msg.to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapRow {
    pub label: String,
    pub cells: Vec<u64>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapMatrix {
    pub mode: HeatmapMode,
    pub window: TimeWindow,
    pub bucket_secs: i64,
    /// Start time of each column.
    pub columns: Vec<DateTime<Utc>>,
    /// By total desc, then label.
    pub rows: Vec<HeatmapRow>,
    /// Upper bounds of levels 1 and 2.
    pub thresholds: [u64; 2],
}

impl HeatmapMatrix {
    /// Display level 0..=3 for a cell count.
    #[must_use]
    pub const fn level(&self, count: u64) -> u8 {
        if count == 0 {
            0
        } else if count <= self.thresholds[0] {
            1
        } else if count <= self.thresholds[1] {
            2
        } else {
            3
        }
    }

    /// Sum of each column across rows.
    #[must_use]
    pub fn column_totals(&self) -> Vec<u64> {
        let mut totals = vec![0_u64; self.columns.len()];
        for row in &self.rows {
            for (total, cell) in totals.iter_mut().zip(&row.cells) {
                *total += cell;
            }
        }
        totals
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.rows.iter().map(|r| r.total).sum()
    }

    #[must_use]
    pub fn max_cell(&self) -> u64 {
        self.rows
            .iter()
            .flat_map(|r| r.cells.iter().copied())
            .max()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn row(&self, label: &str) -> Option<&HeatmapRow> {
        self.rows.iter().find(|r| r.label == label)
    }
}

/// Count messages per row per `bucket_secs` column over `[start, end)`.
///
/// # Errors
///
/// Returns [`WindowError`] if `bucket_secs <= 0` or `end < start`.
#[instrument(skip(messages), fields(count = messages.len()))]
pub fn build_heatmap_matrix(
    messages: &[Message],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    bucket_secs: i64,
    mode: HeatmapMode,
) -> Result<HeatmapMatrix, WindowError> {
    let bucket = bucket_delta(bucket_secs)?;
    let window = TimeWindow::new(start, end)?;
    let width = window.bucket_count(bucket);

    let columns = (0..width)
        .map(|idx| start + bucket * i32::try_from(idx).unwrap_or(i32::MAX))
        .collect();

    let mut grid: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    for msg in messages {
        let Some(col) = window.bucket_index(msg.time, bucket) else {
            continue;
        };
        grid.entry(mode.row_key(msg))
            .or_insert_with(|| vec![0; width])[col] += 1;
    }

    let mut rows: Vec<HeatmapRow> = grid
        .into_iter()
        .map(|(label, cells)| HeatmapRow {
            label: label.to_string(),
            total: cells.iter().sum(),
            cells,
        })
        .collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.label.cmp(&b.label)));

    let thresholds = level_thresholds(&rows);
    Ok(HeatmapMatrix {
        mode,
        window,
        bucket_secs,
        columns,
        rows,
        thresholds,
    })
}

fn level_thresholds(rows: &[HeatmapRow]) -> [u64; 2] {
    let mut nonzero: Vec<u64> = rows
        .iter()
        .flat_map(|r| r.cells.iter().copied())
        .filter(|&c| c > 0)
        .collect();
    if nonzero.is_empty() {
        return [0, 0];
    }
    nonzero.sort_unstable();
    let n = nonzero.len();
    let rank = |num: usize| nonzero[(num * n).div_ceil(3).saturating_sub(1)];
    [rank(1), rank(2)]
}
