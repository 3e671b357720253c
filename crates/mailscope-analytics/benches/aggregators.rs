use chrono::{DateTime, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mailscope_analytics::graph::build_graph_snapshot;
use mailscope_analytics::stats::{HeatmapMode, build_heatmap_matrix, compute_stats};
use mailscope_analytics::thread::build_threads;
use mailscope_core::Message;

const TIERS: [(&str, usize); 3] = [("1k", 1_000), ("10k", 10_000), ("50k", 50_000)];
const AGENTS: usize = 40;
const TOPICS: usize = 12;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("valid ts")
}

/// Deterministic corpus: round-robin senders, a mix of topics and DMs, and
/// roughly half the messages replying to a recent predecessor.
fn corpus(size: usize) -> Vec<Message> {
    let mut state = 0x9E37_79B9_u64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    (0..size)
        .map(|i| {
            let r = next();
            let from = format!("agent-{:02}", r % AGENTS as u64);
            let to = if r % 5 == 0 {
                format!("@agent-{:02}", (r >> 8) % AGENTS as u64)
            } else {
                format!("topic-{:02}", (r >> 16) % TOPICS as u64)
            };
            let secs = i64::try_from(i).expect("tier fits") * 7;
            let msg = Message::new(format!("m{i:06}"), from, to, at(secs), "bench");
            if i > 0 && r % 2 == 0 {
                let back = usize::try_from((r >> 24) % 20).expect("small") + 1;
                msg.with_reply_to(format!("m{:06}", i.saturating_sub(back)))
            } else {
                msg
            }
        })
        .collect()
}

fn bench_aggregators(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregators");

    for (name, size) in TIERS {
        let messages = corpus(size);
        let end = at(i64::try_from(size).expect("tier fits") * 7 + 1);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("threads", name), &messages, |b, m| {
            b.iter(|| black_box(build_threads(m)));
        });
        group.bench_with_input(BenchmarkId::new("graph", name), &messages, |b, m| {
            b.iter(|| black_box(build_graph_snapshot(m, 12)));
        });
        group.bench_with_input(BenchmarkId::new("stats", name), &messages, |b, m| {
            b.iter(|| black_box(compute_stats(m, at(0), end)));
        });
        group.bench_with_input(BenchmarkId::new("heatmap", name), &messages, |b, m| {
            b.iter(|| black_box(build_heatmap_matrix(m, at(0), end, 3_600, HeatmapMode::ByAgent)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_aggregators);
criterion_main!(benches);
