//! `msc stats`: activity statistics over a time window.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use mailscope_analytics::{StatsOptions, StatsSnapshot, compute_stats_with};
use mailscope_core::config::MailscopeConfig;

use crate::input::{load_messages, resolve_window, span_label};
use crate::output::{OutputMode, cell, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct StatsArgs {
    /// Window start (RFC 3339). Defaults to the first message.
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Window end, exclusive (RFC 3339). Defaults to just past the last message.
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,

    /// Number of agents and topics to rank.
    #[arg(long)]
    pub top: Option<usize>,
}

pub fn run_stats(
    args: &StatsArgs,
    config: &MailscopeConfig,
    input: &Path,
    output: OutputMode,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let messages = load_messages(input)?;
    let (start, end) = resolve_window(&messages, args.since, args.until, now);
    let mut options = StatsOptions::from(&config.stats);
    if let Some(top) = args.top {
        options.top_n = top;
    }

    let stats = compute_stats_with(&messages, start, end, &options)
        .with_context(|| format!("invalid stats window {start} .. {end}"))?;
    render_mode(output, &stats, render_text, render_pretty)
}

fn render_text(stats: &StatsSnapshot, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "messages  {}", stats.total_messages)?;
    writeln!(w, "direct  {}", stats.direct_messages)?;
    writeln!(w, "agents  {}", stats.active_agents)?;
    writeln!(w, "topics  {}", stats.active_topics)?;
    if let Some(latency) = &stats.latency {
        writeln!(w, "latency_median_ms  {}", latency.median_ms)?;
    }
    for entry in &stats.top_agents {
        writeln!(w, "agent  {}  {}", entry.name, entry.count)?;
    }
    for entry in &stats.top_topics {
        writeln!(w, "topic  {}  {}", entry.name, entry.count)?;
    }
    Ok(())
}

fn render_pretty(stats: &StatsSnapshot, w: &mut dyn Write) -> io::Result<()> {
    let window = &stats.window;
    pretty_section(
        w,
        &format!(
            "Activity {} .. {} ({})",
            window.start.format("%Y-%m-%d %H:%M"),
            window.end.format("%Y-%m-%d %H:%M"),
            span_label(window.start, window.end)
        ),
    )?;
    pretty_kv(w, "Messages", stats.total_messages.to_string())?;
    pretty_kv(w, "Direct", stats.direct_messages.to_string())?;
    pretty_kv(w, "Agents", stats.active_agents.to_string())?;
    pretty_kv(w, "Topics", stats.active_topics.to_string())?;
    if let Some(busiest) = &stats.busiest_hour {
        pretty_kv(
            w,
            "Busiest hour",
            format!("{} ({})", busiest.start.format("%Y-%m-%d %H:%M"), busiest.count),
        )?;
    }
    if let Some(quietest) = &stats.quietest_hour {
        pretty_kv(
            w,
            "Quietest hour",
            format!("{} ({})", quietest.start.format("%Y-%m-%d %H:%M"), quietest.count),
        )?;
    }

    if let Some(latency) = &stats.latency {
        writeln!(w)?;
        pretty_section(w, &format!("Reply latency ({} replies)", latency.samples))?;
        pretty_kv(w, "Median", human_ms(latency.median_ms))?;
        pretty_kv(w, "Mean", human_ms(latency.mean_ms))?;
        pretty_kv(
            w,
            "Range",
            format!("{} .. {}", human_ms(latency.min_ms), human_ms(latency.max_ms)),
        )?;
        for bucket in &latency.histogram {
            writeln!(
                w,
                "  {} {:>5}  {:>5.1}%",
                cell(bucket.label, 8),
                bucket.count,
                bucket.percent
            )?;
        }
    }

    if !stats.top_agents.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Top agents")?;
        for entry in &stats.top_agents {
            writeln!(w, "  {} {:>6}", cell(&entry.name, 24), entry.count)?;
        }
    }
    if !stats.top_topics.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Top topics")?;
        for entry in &stats.top_topics {
            writeln!(w, "  {} {:>6}", cell(&entry.name, 24), entry.count)?;
        }
    }

    if let Some(sizes) = &stats.thread_sizes {
        writeln!(w)?;
        pretty_section(w, &format!("Threads ({})", sizes.threads))?;
        pretty_kv(w, "Standalone", sizes.standalone.to_string())?;
        pretty_kv(w, "2-3", sizes.small.to_string())?;
        pretty_kv(w, "4-10", sizes.medium.to_string())?;
        pretty_kv(w, "11+", sizes.large.to_string())?;
        pretty_kv(w, "Average", format!("{:.1}", sizes.average_messages))?;
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn human_ms(ms: i64) -> String {
    if ms >= 3_600_000 {
        format!("{:.1}h", ms as f64 / 3_600_000.0)
    } else if ms >= 60_000 {
        format!("{:.1}m", ms as f64 / 60_000.0)
    } else if ms >= 1_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{ms}ms")
    }
}
