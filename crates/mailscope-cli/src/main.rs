#![forbid(unsafe_code)]

mod cmd;
mod input;
mod output;

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use mailscope_core::config::{MailscopeConfig, resolve_config};
use mailscope_core::timing;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "mailscope: analytics over multi-agent message exports",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit command timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Output format: pretty, text or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Config file to use instead of the project/user lookup.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Message export, one JSON message per line.
    #[arg(short, long, global = true, value_name = "PATH")]
    input: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }

    fn input_path(&self) -> anyhow::Result<&Path> {
        self.input
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no message export given; pass --input <PATH>"))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Reports",
        about = "List reply threads",
        long_about = "Group messages into reply threads and list them by latest activity.",
        after_help = "EXAMPLES:\n    # Most recently active threads\n    msc threads -i mail.jsonl\n\n    # One thread in full, indented by reply depth\n    msc threads -i mail.jsonl --around msg-42\n\n    # Emit machine-readable output\n    msc threads -i mail.jsonl --json"
    )]
    Threads(cmd::threads::ThreadsArgs),

    #[command(
        next_help_heading = "Reports",
        about = "Show who talks to whom",
        long_about = "Build the agent communication graph with a topic overlay.",
        after_help = "EXAMPLES:\n    # Full graph\n    msc graph -i mail.jsonl\n\n    # Keep the 6 busiest agents, collapse the rest\n    msc graph -i mail.jsonl --max-nodes 6\n\n    # Edge list for scripts\n    msc graph -i mail.jsonl --format text"
    )]
    Graph(cmd::graph::GraphArgs),

    #[command(
        next_help_heading = "Reports",
        about = "Activity statistics",
        long_about = "Counts, rankings, reply latency and thread sizes over a time window.",
        after_help = "EXAMPLES:\n    # Whole export\n    msc stats -i mail.jsonl\n\n    # One day\n    msc stats -i mail.jsonl --since 2026-03-01T00:00:00Z --until 2026-03-02T00:00:00Z\n\n    # Emit machine-readable output\n    msc stats -i mail.jsonl --json"
    )]
    Stats(cmd::stats::StatsArgs),

    #[command(
        next_help_heading = "Reports",
        about = "Activity heatmap",
        long_about = "Message counts per agent or topic per time bucket.",
        after_help = "EXAMPLES:\n    # Hourly buckets per agent\n    msc heatmap -i mail.jsonl\n\n    # 15 minute buckets per topic\n    msc heatmap -i mail.jsonl --mode topic --bucket 900"
    )]
    Heatmap(cmd::heatmap::HeatmapArgs),

    #[command(
        next_help_heading = "Live",
        about = "Drive a live view",
        long_about = "Open a live view over the export, subscribe to pushes and report each refresh tick.",
        after_help = "EXAMPLES:\n    # Last hour across all topics\n    msc watch -i mail.jsonl\n\n    # One topic, whole history, fixed clock\n    msc watch -i mail.jsonl --topic build --zoom all --now 2026-03-01T12:00:00Z\n\n    # Five ticks at the configured refresh interval\n    msc watch -i mail.jsonl --ticks 5"
    )]
    Watch(cmd::watch::WatchArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("MAILSCOPE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "mailscope=debug,info"
        } else {
            "mailscope=info,warn"
        })
    });

    let format = env::var("MAILSCOPE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, config: &MailscopeConfig, output: OutputMode) -> anyhow::Result<()> {
    let now = Utc::now();
    match &cli.command {
        Commands::Threads(args) => timing::timed("cmd.threads", || {
            cmd::threads::run_threads(args, config, cli.input_path()?, output)
        }),
        Commands::Graph(args) => timing::timed("cmd.graph", || {
            cmd::graph::run_graph(args, config, cli.input_path()?, output)
        }),
        Commands::Stats(args) => timing::timed("cmd.stats", || {
            cmd::stats::run_stats(args, config, cli.input_path()?, output, now)
        }),
        Commands::Heatmap(args) => timing::timed("cmd.heatmap", || {
            cmd::heatmap::run_heatmap(args, config, cli.input_path()?, output, now)
        }),
        Commands::Watch(args) => timing::timed("cmd.watch", || {
            cmd::watch::run_watch(args, config, cli.input_path()?, output)
        }),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let timing_enabled = cli.timing || timing::timing_enabled_from_env();
    timing::set_timing_enabled(timing_enabled);
    timing::clear_timings();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let output = cli.output_mode();
    let project_root = env::current_dir()?;
    let command_result = resolve_config(&project_root, cli.config.as_deref())
        .context("failed to load configuration")
        .and_then(|config| run(&cli, &config, output));

    if timing_enabled {
        let report = timing::collect_report();
        if report.is_empty() {
            eprintln!("timing report: no samples recorded");
        } else {
            eprintln!("timing report:");
            eprintln!("{}", report.display_table());
            eprintln!("timing report (json):");
            eprintln!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
    }

    if let Err(err) = command_result {
        render_error(output, &CliError::from(&err))?;
        std::process::exit(1);
    }
    Ok(())
}
