//! Window statistics: counts, rankings, reply latency, busiest/quietest
//! hour, and thread-size distribution.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use mailscope_core::WindowError;
use mailscope_core::model::{Message, chronological};
use serde::Serialize;
use tracing::instrument;

use super::{StatsOptions, TimeWindow};
use crate::thread::build_threads;

/// Upper bounds (exclusive, seconds) of the first three latency buckets.
const LATENCY_EDGES: [i64; 3] = [30, 5 * 60, 30 * 60];
const LATENCY_LABELS: [&str; 4] = ["<30s", "30s-5m", "5m-30m", ">=30m"];

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub window: TimeWindow,
    pub total_messages: u64,
    pub direct_messages: u64,
    pub active_agents: usize,
    pub active_topics: usize,
    /// `None` when no in-window reply has an in-window parent.
    pub latency: Option<LatencyStats>,
    pub busiest_hour: Option<TimeBucket>,
    pub quietest_hour: Option<TimeBucket>,
    /// Senders by message count desc, then name.
    pub top_agents: Vec<RankEntry>,
    /// Topics by message count desc, then name. Direct messages excluded.
    pub top_topics: Vec<RankEntry>,
    /// `None` for an empty window.
    pub thread_sizes: Option<ThreadSizeStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankEntry {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeBucket {
    pub start: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub mean_ms: i64,
    /// Middle sample, or the mean of the two middle samples.
    pub median_ms: i64,
    pub min_ms: i64,
    pub max_ms: i64,
    pub histogram: Vec<LatencyBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyBucket {
    pub label: &'static str,
    pub count: usize,
    pub percent: f64,
}

/// Thread sizes: standalone (1), small (2-3), medium (4-10), large (11+).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSizeStats {
    pub threads: usize,
    pub standalone: usize,
    pub small: usize,
    pub medium: usize,
    pub large: usize,
    pub average_messages: f64,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Statistics over `[start, end)` with default options.
///
/// # Errors
///
/// Returns [`WindowError::EndBeforeStart`] if `end < start`.
pub fn compute_stats(
    messages: &[Message],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<StatsSnapshot, WindowError> {
    compute_stats_with(messages, start, end, &StatsOptions::default())
}

/// # Errors
///
/// Returns [`WindowError::EndBeforeStart`] if `end < start`.
#[instrument(skip(messages), fields(count = messages.len()))]
pub fn compute_stats_with(
    messages: &[Message],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    options: &StatsOptions,
) -> Result<StatsSnapshot, WindowError> {
    let window = TimeWindow::new(start, end)?;
    let mut in_window: Vec<&Message> = window.select(messages);
    in_window.sort_by(|a, b| chronological(a, b));

    let mut by_agent: BTreeMap<&str, u64> = BTreeMap::new();
    let mut by_topic: BTreeMap<&str, u64> = BTreeMap::new();
    let mut direct_messages = 0_u64;
    for msg in &in_window {
        *by_agent.entry(msg.from.as_str()).or_insert(0) += 1;
        match msg.topic() {
            Some(topic) => *by_topic.entry(topic).or_insert(0) += 1,
            None => direct_messages += 1,
        }
    }

    let (busiest_hour, quietest_hour) = busiest_and_quietest(&window, &in_window);

    Ok(StatsSnapshot {
        window,
        total_messages: in_window.len() as u64,
        direct_messages,
        active_agents: by_agent.len(),
        active_topics: by_topic.len(),
        latency: latency_stats(&in_window),
        busiest_hour,
        quietest_hour,
        top_agents: top_n(by_agent, options.top_n),
        top_topics: top_n(by_topic, options.top_n),
        thread_sizes: thread_size_stats(&in_window),
    })
}

// ---------------------------------------------------------------------------
// Pieces
// ---------------------------------------------------------------------------

fn top_n(counts: BTreeMap<&str, u64>, n: usize) -> Vec<RankEntry> {
    let mut ranked: Vec<RankEntry> = counts
        .into_iter()
        .map(|(name, count)| RankEntry {
            name: name.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(n);
    ranked
}

/// Hour-long buckets from the window start, zero buckets included. Ties go
/// to the earliest bucket.
fn busiest_and_quietest(
    window: &TimeWindow,
    in_window: &[&Message],
) -> (Option<TimeBucket>, Option<TimeBucket>) {
    let hour = TimeDelta::hours(1);
    let buckets = window.bucket_count(hour);
    if in_window.is_empty() || buckets == 0 {
        return (None, None);
    }

    let mut counts = vec![0_u64; buckets];
    for msg in in_window {
        if let Some(idx) = window.bucket_index(msg.time, hour) {
            counts[idx] += 1;
        }
    }

    let bucket_at = |idx: usize| TimeBucket {
        start: window.start + hour * i32::try_from(idx).unwrap_or(i32::MAX),
        count: counts[idx],
    };

    let mut busiest = 0;
    let mut quietest = 0;
    for (idx, &count) in counts.iter().enumerate() {
        if count > counts[busiest] {
            busiest = idx;
        }
        if count < counts[quietest] {
            quietest = idx;
        }
    }
    (Some(bucket_at(busiest)), Some(bucket_at(quietest)))
}

/// Reply latency where both ends are in the window. Negative deltas (child
/// posted before its parent) are discarded.
fn latency_stats(in_window: &[&Message]) -> Option<LatencyStats> {
    let mut first_seen: HashMap<&str, DateTime<Utc>> = HashMap::with_capacity(in_window.len());
    for msg in in_window {
        first_seen.entry(msg.id.as_str()).or_insert(msg.time);
    }

    let mut samples: Vec<i64> = in_window
        .iter()
        .filter_map(|msg| {
            let parent = msg.reply_to_id().filter(|p| *p != msg.id)?;
            let parent_time = first_seen.get(parent)?;
            let delta = (msg.time - *parent_time).num_milliseconds();
            (delta >= 0).then_some(delta)
        })
        .collect();
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();

    let n = samples.len();
    let total: i64 = samples.iter().sum();
    let median_ms = if n % 2 == 1 {
        samples[n / 2]
    } else {
        (samples[n / 2 - 1] + samples[n / 2]) / 2
    };

    let mut counts = [0_usize; 4];
    for &ms in &samples {
        let slot = LATENCY_EDGES
            .iter()
            .position(|&edge| ms < edge * 1_000)
            .unwrap_or(LATENCY_EDGES.len());
        counts[slot] += 1;
    }
    let histogram = LATENCY_LABELS
        .iter()
        .zip(counts)
        .map(|(&label, count)| LatencyBucket {
            label,
            count,
            percent: percent(count, n),
        })
        .collect();

    Some(LatencyStats {
        samples: n,
        mean_ms: total / i64::try_from(n).unwrap_or(i64::MAX),
        median_ms,
        min_ms: samples[0],
        max_ms: samples[n - 1],
        histogram,
    })
}

fn thread_size_stats(in_window: &[&Message]) -> Option<ThreadSizeStats> {
    if in_window.is_empty() {
        return None;
    }
    let owned: Vec<Message> = in_window.iter().map(|m| (*m).clone()).collect();
    let threads = build_threads(&owned);

    let mut stats = ThreadSizeStats {
        threads: threads.len(),
        standalone: 0,
        small: 0,
        medium: 0,
        large: 0,
        average_messages: ratio(owned.len(), threads.len()),
    };
    for thread in &threads {
        match thread.len() {
            0 | 1 => stats.standalone += 1,
            2..=3 => stats.small += 1,
            4..=10 => stats.medium += 1,
            _ => stats.large += 1,
        }
    }
    Some(stats)
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64
}
