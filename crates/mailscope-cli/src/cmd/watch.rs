//! `msc watch`: drive a live view over an export and report each tick.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::bail;
use chrono::{DateTime, Utc};
use clap::Args;
use mailscope_core::config::MailscopeConfig;
use mailscope_live::{Coordinator, CoordinatorOptions, ViewId, ViewTarget, Zoom};
use serde::Serialize;
use tracing::debug;

use crate::input::load_source;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Watch one topic.
    #[arg(long, conflicts_with = "dm")]
    pub topic: Option<String>,

    /// Watch direct messages with one agent.
    #[arg(long)]
    pub dm: Option<String>,

    /// Window size: 1h, 4h, 24h, 7d or all.
    #[arg(long, default_value = "1h")]
    pub zoom: Zoom,

    /// Pan back this many windows before the first tick.
    #[arg(long, default_value_t = 0)]
    pub pan: u16,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 1)]
    pub ticks: u32,

    /// Fixed clock for every tick (RFC 3339). Defaults to the wall clock.
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,

    /// Agent whose DMs the all-topics view includes.
    #[arg(long)]
    pub self_agent: Option<String>,
}

#[derive(Debug, Serialize)]
struct TickReport {
    tick: u32,
    recomputed: bool,
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
    messages: usize,
    threads: usize,
    agents: usize,
    busiest_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct WatchReport {
    target: String,
    zoom: String,
    loaded: usize,
    has_older: bool,
    topics: usize,
    known_agents: usize,
    ticks: Vec<TickReport>,
}

pub fn run_watch(
    args: &WatchArgs,
    config: &MailscopeConfig,
    input: &Path,
    output: OutputMode,
) -> anyhow::Result<()> {
    let source = Arc::new(load_source(input)?);
    let mut options = CoordinatorOptions::from(config);
    if args.self_agent.is_some() {
        options.self_agent.clone_from(&args.self_agent);
    }
    let refresh = Duration::from_millis(config.live.refresh_interval_ms.max(1));

    let target = match (&args.topic, &args.dm) {
        (Some(topic), _) => ViewTarget::Topic(topic.clone()),
        (None, Some(agent)) => ViewTarget::Direct(agent.clone()),
        (None, None) => ViewTarget::All,
    };
    let clock = || args.now.unwrap_or_else(Utc::now);

    let mut coord = Coordinator::new(source, options);
    coord.subscribe_live()?;
    coord.refresh_metrics()?;
    let view = coord.open_view(target.clone(), args.zoom, clock())?;
    settle(&mut coord)?;
    if args.pan > 0 {
        coord.pan(view, -i32::from(args.pan), clock())?;
        settle(&mut coord)?;
    }

    let mut ticks = Vec::new();
    for tick in 1..=args.ticks {
        if tick > 1 && args.now.is_none() {
            coord.wait_for_events(refresh);
        } else {
            coord.process_pending();
        }
        let recomputed = coord.tick(clock()).contains(&view);
        ticks.push(tick_report(&coord, view, tick, recomputed));
    }

    let state = coord.view(view);
    let overview = coord.overview();
    let report = WatchReport {
        target: target.label(),
        zoom: args.zoom.to_string(),
        loaded: state.map_or(0, |v| v.messages().len()),
        has_older: state.is_some_and(mailscope_live::ViewState::has_older),
        topics: overview.map_or(0, |o| o.topics.len()),
        known_agents: overview.map_or(0, |o| o.agents.len()),
        ticks,
    };
    coord.shutdown();
    render_mode(output, &report, render_text, render_pretty)
}

fn settle(coord: &mut Coordinator) -> anyhow::Result<()> {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while coord.in_flight() > 0 {
        if Instant::now() >= deadline {
            bail!("message source did not answer within {}s", SETTLE_TIMEOUT.as_secs());
        }
        coord.wait_for_events(Duration::from_millis(50));
    }
    debug!("fetches settled");
    Ok(())
}

fn tick_report(coord: &Coordinator, view: ViewId, tick: u32, recomputed: bool) -> TickReport {
    let snapshot = coord.snapshot(view);
    let error = coord
        .view(view)
        .and_then(|v| v.last_error())
        .map(|fault| format!("[{}] {}", fault.code.code(), fault.message));
    TickReport {
        tick,
        recomputed,
        window_start: snapshot.as_ref().map(|s| s.window.start),
        window_end: snapshot.as_ref().map(|s| s.window.end),
        messages: snapshot.as_ref().map_or(0, |s| s.message_count),
        threads: snapshot.as_ref().map_or(0, |s| s.threads.len()),
        agents: snapshot.as_ref().map_or(0, |s| s.stats.active_agents),
        busiest_agent: snapshot
            .as_ref()
            .and_then(|s| s.stats.top_agents.first().map(|e| e.name.clone())),
        error,
    }
}

fn render_text(report: &WatchReport, w: &mut dyn Write) -> io::Result<()> {
    for tick in &report.ticks {
        writeln!(
            w,
            "tick {}  recomputed={}  messages={}  threads={}  agents={}",
            tick.tick, tick.recomputed, tick.messages, tick.threads, tick.agents
        )?;
        if let Some(error) = &tick.error {
            writeln!(w, "  error {error}")?;
        }
    }
    Ok(())
}

fn render_pretty(report: &WatchReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Watching {} ({})", report.target, report.zoom))?;
    pretty_kv(w, "Loaded", report.loaded.to_string())?;
    pretty_kv(w, "Older pages", if report.has_older { "available" } else { "none" })?;
    pretty_kv(w, "Topics", report.topics.to_string())?;
    writeln!(w)?;
    for tick in &report.ticks {
        let marker = if tick.recomputed { "*" } else { " " };
        writeln!(
            w,
            "{marker} #{:<3} {:>5} msg {:>4} threads {:>3} agents  {}",
            tick.tick,
            tick.messages,
            tick.threads,
            tick.agents,
            tick.busiest_agent.as_deref().unwrap_or("-")
        )?;
        if let Some(error) = &tick.error {
            writeln!(w, "       ! {error}")?;
        }
    }
    Ok(())
}
