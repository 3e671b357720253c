//! Opt-in recompute timing.
//!
//! The coordinator wraps every aggregator pass in [`timed`]; when collection
//! is enabled (`MAILSCOPE_TIMING=1` or `--timing`) samples accumulate in a
//! thread-local buffer and [`collect_report`] summarizes them per operation.
//! Aggregators run on the interactive thread, so thread-local storage sees
//! every sample that matters.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;

/// Per-operation summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpTiming {
    pub name: String,
    pub count: usize,
    pub p50: Duration,
    pub p90: Duration,
    pub max: Duration,
    pub total: Duration,
}

/// Timing summary across all instrumented operations, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingReport {
    pub operations: Vec<OpTiming>,
}

thread_local! {
    static SAMPLES: RefCell<Vec<(String, Duration)>> = const { RefCell::new(Vec::new()) };
}

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Returns true when `MAILSCOPE_TIMING` is set to a truthy value
/// (`1`, `true`, `yes`, `on`; case-insensitive).
#[must_use]
pub fn timing_enabled_from_env() -> bool {
    std::env::var("MAILSCOPE_TIMING")
        .ok()
        .is_some_and(|value| is_truthy(&value))
}

pub fn set_timing_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        clear_timings();
    }
}

#[must_use]
pub fn is_timing_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Drop all samples recorded on the current thread.
pub fn clear_timings() {
    SAMPLES.with(|samples| samples.borrow_mut().clear());
}

/// Run `f`, recording its wall time under `name` when collection is enabled.
pub fn timed<R>(name: &str, f: impl FnOnce() -> R) -> R {
    if !is_timing_enabled() {
        return f();
    }
    let started = Instant::now();
    let result = f();
    record(name, started.elapsed());
    result
}

/// Drain the current thread's samples into a report.
#[must_use]
pub fn collect_report() -> TimingReport {
    let samples = SAMPLES.with(|samples| std::mem::take(&mut *samples.borrow_mut()));

    let mut grouped: BTreeMap<String, Vec<Duration>> = BTreeMap::new();
    for (name, elapsed) in samples {
        grouped.entry(name).or_default().push(elapsed);
    }

    let operations = grouped
        .into_iter()
        .map(|(name, mut values)| {
            values.sort_unstable();
            OpTiming {
                count: values.len(),
                p50: nearest_rank(&values, 50),
                p90: nearest_rank(&values, 90),
                max: values.last().copied().unwrap_or_default(),
                total: values.iter().sum(),
                name,
            }
        })
        .collect();

    TimingReport { operations }
}

impl TimingReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let operations: Vec<_> = self
            .operations
            .iter()
            .map(|op| {
                json!({
                    "name": op.name,
                    "count": op.count,
                    "p50_us": op.p50.as_micros(),
                    "p90_us": op.p90.as_micros(),
                    "max_us": op.max.as_micros(),
                    "total_us": op.total.as_micros(),
                })
            })
            .collect();
        json!({ "operations": operations })
    }

    /// Fixed-width table for stderr.
    #[must_use]
    pub fn display_table(&self) -> String {
        if self.operations.is_empty() {
            return "No timing samples recorded.".to_string();
        }

        let mut out = String::new();
        out.push_str("operation                  count      p50      p90      max\n");
        out.push_str("------------------------------------------------------------\n");
        for op in &self.operations {
            let _ = writeln!(
                out,
                "{:<26} {:>6} {:>8} {:>8} {:>8}",
                op.name,
                op.count,
                short_duration(op.p50),
                short_duration(op.p90),
                short_duration(op.max),
            );
        }
        out
    }
}

fn record(name: &str, elapsed: Duration) {
    SAMPLES.with(|samples| samples.borrow_mut().push((name.to_string(), elapsed)));
}

fn nearest_rank(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (pct.min(100) * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

fn short_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    if micros >= 1_000_000 {
        format!("{}.{:03}s", micros / 1_000_000, (micros % 1_000_000) / 1_000)
    } else if micros >= 1_000 {
        format!("{}.{:03}ms", micros / 1_000, micros % 1_000)
    } else {
        format!("{micros}µs")
    }
}

fn is_truthy(value: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|truthy| value.eq_ignore_ascii_case(truthy))
}
