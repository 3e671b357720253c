//! `msc threads`: reply threads, or one thread in full.

use std::io::{self, Write};
use std::path::Path;

use anyhow::bail;
use clap::Args;
use mailscope_analytics::{
    Thread, ThreadOptions, ThreadSummary, build_threads_with, flatten_thread,
    is_cross_target_reply, sort_by_activity, summarize_thread,
};
use mailscope_core::config::MailscopeConfig;
use serde::Serialize;

use crate::input::load_messages;
use crate::output::{OutputMode, cell, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct ThreadsArgs {
    /// Show the full thread containing this message ID.
    #[arg(long, value_name = "ID")]
    pub around: Option<String>,

    /// Maximum number of threads to list.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Override the display depth clamp.
    #[arg(long)]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ThreadList {
    total: usize,
    threads: Vec<ThreadSummary>,
}

#[derive(Debug, Serialize)]
struct ThreadLine {
    id: String,
    from: String,
    to: String,
    time: String,
    depth: usize,
    true_depth: usize,
    depth_overflow: bool,
    cross_target: bool,
    preview: String,
}

#[derive(Debug, Serialize)]
struct ThreadView {
    summary: ThreadSummary,
    depth: usize,
    messages: Vec<ThreadLine>,
}

pub fn run_threads(
    args: &ThreadsArgs,
    config: &MailscopeConfig,
    input: &Path,
    output: OutputMode,
) -> anyhow::Result<()> {
    let messages = load_messages(input)?;
    let mut options = ThreadOptions::from(&config.threads);
    if let Some(depth) = args.max_depth {
        options.max_display_depth = depth;
    }
    let mut threads = build_threads_with(&messages, &options);

    if let Some(id) = &args.around {
        let Some(thread) = threads.iter().find(|t| t.position(id).is_some()) else {
            bail!("no message with id '{id}' in {}", input.display());
        };
        let view = thread_view(thread);
        return render_mode(output, &view, render_thread_text, render_thread_pretty);
    }

    sort_by_activity(&mut threads);
    let list = ThreadList {
        total: threads.len(),
        threads: threads.iter().take(args.limit).map(summarize_thread).collect(),
    };
    render_mode(output, &list, render_list_text, render_list_pretty)
}

fn thread_view(thread: &Thread) -> ThreadView {
    let messages = flatten_thread(thread)
        .into_iter()
        .map(|node| ThreadLine {
            id: node.message.id.clone(),
            from: node.message.from.clone(),
            to: node.message.to.clone(),
            time: node.message.time.to_rfc3339(),
            depth: node.depth,
            true_depth: node.true_depth,
            depth_overflow: node.depth_overflow,
            cross_target: is_cross_target_reply(thread, node),
            preview: node.message.body.lines().next().unwrap_or_default().to_string(),
        })
        .collect();
    ThreadView {
        summary: summarize_thread(thread),
        depth: thread.depth(),
        messages,
    }
}

fn render_list_text(list: &ThreadList, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "ROOT  MESSAGES  AGENTS  LAST  TITLE")?;
    for t in &list.threads {
        writeln!(
            w,
            "{}  {}  {}  {}  {}",
            t.root_id,
            t.message_count,
            t.participant_count,
            t.last_activity.to_rfc3339(),
            t.title
        )?;
    }
    Ok(())
}

fn render_list_pretty(list: &ThreadList, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Threads ({} of {})", list.threads.len(), list.total))?;
    for t in &list.threads {
        writeln!(
            w,
            "{} {:>4} msg {:>3} agents  {}  {}",
            cell(&t.root_id, 22),
            t.message_count,
            t.participant_count,
            t.last_activity.format("%Y-%m-%d %H:%M"),
            cell(&t.title, 30)
        )?;
    }
    Ok(())
}

fn render_thread_text(view: &ThreadView, w: &mut dyn Write) -> io::Result<()> {
    for line in &view.messages {
        writeln!(
            w,
            "{}  {}  {}  {}  {}  {}",
            line.depth, line.id, line.from, line.to, line.time, line.preview
        )?;
    }
    Ok(())
}

fn render_thread_pretty(view: &ThreadView, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &view.summary.title)?;
    pretty_kv(w, "Messages", view.summary.message_count.to_string())?;
    pretty_kv(w, "Agents", view.summary.participant_count.to_string())?;
    pretty_kv(w, "Depth", view.depth.to_string())?;
    writeln!(w)?;
    for line in &view.messages {
        let indent = "  ".repeat(line.depth);
        let marker = if line.depth_overflow { "+" } else { "" };
        let routed = if line.cross_target { format!(" -> {}", line.to) } else { String::new() };
        writeln!(w, "{indent}{marker}{}{routed}: {}", line.from, cell(&line.preview, 50))?;
    }
    Ok(())
}
