//! JSON-lines message exports.
//!
//! One message object per line; blank lines are skipped. The loaded set is
//! sorted by `(time, id)` and served through a [`MemorySource`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use mailscope_analytics::all_time_window;
use mailscope_core::model::sort_chronological;
use mailscope_core::source::MemorySource;
use mailscope_core::Message;
use tracing::debug;

pub fn load_messages(path: &Path) -> Result<Vec<Message>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut messages = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let message: Message = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid message", path.display(), idx + 1))?;
        messages.push(message);
    }
    sort_chronological(&mut messages);
    debug!(path = %path.display(), count = messages.len(), "loaded messages");
    Ok(messages)
}

pub fn load_source(path: &Path) -> Result<MemorySource> {
    Ok(MemorySource::with_messages(load_messages(path)?))
}

/// Resolve `[since, until)` against the loaded messages.
///
/// Open ends fall back to the first message and one second past the last.
/// With no messages and no bounds the window is empty at `now`.
pub fn resolve_window(
    messages: &[Message],
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let all = all_time_window(messages);
    let start = since
        .or_else(|| all.map(|w| w.start))
        .unwrap_or(now);
    let end = until
        .or_else(|| all.map(|w| w.end))
        .unwrap_or_else(|| start.max(now));
    (start, end)
}

/// `end - start` in whole seconds, for headers.
pub fn span_label(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let span = end - start;
    if span >= TimeDelta::days(2) {
        format!("{}d", span.num_days())
    } else if span >= TimeDelta::hours(2) {
        format!("{}h", span.num_hours())
    } else if span >= TimeDelta::minutes(2) {
        format!("{}m", span.num_minutes())
    } else {
        format!("{}s", span.num_seconds())
    }
}
