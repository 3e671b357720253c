//! `msc heatmap`: message counts per agent or topic per time bucket.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use mailscope_analytics::{HeatmapMatrix, HeatmapMode, build_heatmap_matrix};
use mailscope_core::config::MailscopeConfig;

use crate::input::{load_messages, resolve_window};
use crate::output::{OutputMode, cell, pretty_section, render_mode};

const LEVEL_GLYPHS: [char; 4] = ['·', '░', '▒', '█'];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// One row per sender.
    #[default]
    Agent,
    /// One row per topic or DM target.
    Topic,
}

impl From<ModeArg> for HeatmapMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Agent => Self::ByAgent,
            ModeArg::Topic => Self::ByTopic,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct HeatmapArgs {
    /// Bucket size in seconds. Defaults to `stats.heatmap_bucket_secs`.
    #[arg(long, allow_negative_numbers = true)]
    pub bucket: Option<i64>,

    /// Row dimension.
    #[arg(long, value_enum, default_value_t = ModeArg::Agent)]
    pub mode: ModeArg,

    /// Window start (RFC 3339). Defaults to the first message.
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Window end, exclusive (RFC 3339). Defaults to just past the last message.
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,
}

pub fn run_heatmap(
    args: &HeatmapArgs,
    config: &MailscopeConfig,
    input: &Path,
    output: OutputMode,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let messages = load_messages(input)?;
    let (start, end) = resolve_window(&messages, args.since, args.until, now);
    let bucket = args.bucket.unwrap_or(config.stats.heatmap_bucket_secs);

    let matrix = build_heatmap_matrix(&messages, start, end, bucket, args.mode.into())
        .with_context(|| format!("cannot build heatmap with {bucket}s buckets"))?;
    render_mode(output, &matrix, render_text, render_pretty)
}

fn render_text(matrix: &HeatmapMatrix, w: &mut dyn Write) -> io::Result<()> {
    for row in &matrix.rows {
        let cells: Vec<String> = row.cells.iter().map(u64::to_string).collect();
        writeln!(w, "{}  {}  {}", row.label, row.total, cells.join(" "))?;
    }
    Ok(())
}

fn render_pretty(matrix: &HeatmapMatrix, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(
        w,
        &format!(
            "Heatmap by {} ({} x {}s from {})",
            matrix.mode.label(),
            matrix.columns.len(),
            matrix.bucket_secs,
            matrix.window.start.format("%Y-%m-%d %H:%M")
        ),
    )?;
    for row in &matrix.rows {
        let strip: String = row
            .cells
            .iter()
            .map(|&count| LEVEL_GLYPHS[usize::from(matrix.level(count))])
            .collect();
        writeln!(w, "{} {strip} {:>6}", cell(&row.label, 16), row.total)?;
    }
    writeln!(
        w,
        "{} {}",
        cell("", 16),
        format_args!(
            "levels: {} 0  {} <={}  {} <={}  {} more",
            LEVEL_GLYPHS[0],
            LEVEL_GLYPHS[1],
            matrix.thresholds[0],
            LEVEL_GLYPHS[2],
            matrix.thresholds[1],
            LEVEL_GLYPHS[3]
        )
    )
}
