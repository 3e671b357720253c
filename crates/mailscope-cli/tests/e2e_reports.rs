//! End-to-end checks of the `msc` reports over a small JSON-lines export.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const EXPORT: &str = r#"{"id":"m1","from":"alice","to":"build","time":"2026-03-01T10:00:00Z","body":"Kickoff\nfull plan below"}
{"id":"m2","from":"bob","to":"build","time":"2026-03-01T10:05:00Z","body":"on it","reply_to":"m1"}
{"id":"m3","from":"carol","to":"build","time":"2026-03-01T10:20:00Z","body":"done","reply_to":"m2"}

{"id":"m4","from":"dave","to":"@alice","time":"2026-03-01T11:00:00Z","body":"ping"}
{"id":"m5","from":"erin","to":"ops","time":"2026-03-01T12:00:00Z","body":{"kind":"alert","level":2}}
"#;

fn workspace() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("mail.jsonl");
    fs::write(&path, EXPORT).expect("write export");
    (dir, path)
}

fn msc(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("msc"));
    cmd.current_dir(dir)
        .env("MAILSCOPE_LOG", "error")
        .env("XDG_CONFIG_HOME", dir)
        .env_remove("FORMAT")
        .env_remove("MAILSCOPE_TIMING");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run msc");
    assert!(
        output.status.success(),
        "msc failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn threads_group_the_reply_chain() {
    let (dir, input) = workspace();
    let json = json_stdout(msc(dir.path()).arg("threads").arg("-i").arg(&input).arg("--json"));

    assert_eq!(json["total"], 3);
    let threads = json["threads"].as_array().expect("threads array");
    // Latest activity first.
    assert_eq!(threads[0]["root_id"], "m5");
    let chain = threads
        .iter()
        .find(|t| t["root_id"] == "m1")
        .expect("m1 thread");
    assert_eq!(chain["message_count"], 3);
    assert_eq!(chain["participant_count"], 3);
    assert_eq!(chain["title"], "Kickoff");
}

#[test]
fn around_shows_the_thread_in_order() {
    let (dir, input) = workspace();
    let json = json_stdout(
        msc(dir.path())
            .args(["threads", "--around", "m3", "--json", "-i"])
            .arg(&input),
    );

    let lines = json["messages"].as_array().expect("messages");
    let ids: Vec<&str> = lines.iter().filter_map(|l| l["id"].as_str()).collect();
    assert_eq!(ids, ["m1", "m2", "m3"]);
    let depths: Vec<u64> = lines.iter().filter_map(|l| l["depth"].as_u64()).collect();
    assert_eq!(depths, [0, 1, 2]);
    assert_eq!(json["depth"], 2);
}

#[test]
fn around_unknown_id_fails() {
    let (dir, input) = workspace();
    msc(dir.path())
        .args(["threads", "--around", "nope", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no message with id 'nope'"));
}

#[test]
fn graph_collapses_past_the_node_budget() {
    let (dir, input) = workspace();
    let json = json_stdout(
        msc(dir.path())
            .args(["graph", "--max-nodes", "2", "--json", "-i"])
            .arg(&input),
    );

    let nodes = json["nodes"].as_array().expect("nodes");
    let last = nodes.last().expect("at least one node");
    assert_eq!(last["name"], "others");
    assert_eq!(last["synthetic"], true);
    assert!(json["summary"]["node_count"].as_u64().is_some());
}

#[test]
fn graph_text_is_an_edge_list() {
    let (dir, input) = workspace();
    msc(dir.path())
        .args(["graph", "--format", "text", "-i"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("FROM  TO  COUNT"))
        .stdout(predicate::str::contains("dave  alice  1"));
}

#[test]
fn stats_cover_the_whole_export() {
    let (dir, input) = workspace();
    let json = json_stdout(msc(dir.path()).args(["stats", "--json", "-i"]).arg(&input));

    assert_eq!(json["total_messages"], 5);
    assert_eq!(json["direct_messages"], 1);
    assert_eq!(json["active_agents"], 5);
    // Replies after 5m and 15m.
    assert_eq!(json["latency"]["samples"], 2);
    assert_eq!(json["latency"]["median_ms"], 600_000);
    assert_eq!(json["top_topics"][0]["name"], "build");
}

#[test]
fn config_file_overrides_defaults() {
    let (dir, input) = workspace();
    let config = dir.path().join("custom.toml");
    fs::write(&config, "[stats]\ntop_n = 1\n").expect("write config");

    let json = json_stdout(
        msc(dir.path())
            .args(["stats", "--json", "--config"])
            .arg(&config)
            .arg("-i")
            .arg(&input),
    );
    assert_eq!(json["top_agents"].as_array().map(Vec::len), Some(1));
}

#[test]
fn project_config_is_picked_up() {
    let (dir, input) = workspace();
    fs::create_dir_all(dir.path().join(".mailscope")).expect("mkdir");
    fs::write(
        dir.path().join(".mailscope/config.toml"),
        "[graph]\nmax_nodes = 1\n",
    )
    .expect("write config");

    let json = json_stdout(msc(dir.path()).args(["graph", "--json", "-i"]).arg(&input));
    let names: Vec<&str> = json["nodes"]
        .as_array()
        .expect("nodes")
        .iter()
        .filter_map(|n| n["name"].as_str())
        .collect();
    assert!(names.contains(&"others"), "nodes: {names:?}");
}

#[test]
fn broken_config_reports_config_code() {
    let (dir, input) = workspace();
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[stats\n").expect("write config");

    msc(dir.path())
        .args(["stats", "--config"])
        .arg(&config)
        .arg("-i")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("M1001"));
}

#[test]
fn heatmap_counts_each_sender() {
    let (dir, input) = workspace();
    let json = json_stdout(
        msc(dir.path())
            .args(["heatmap", "--bucket", "3600", "--json", "-i"])
            .arg(&input),
    );

    let rows = json["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 5);
    let total: u64 = rows.iter().filter_map(|r| r["total"].as_u64()).sum();
    assert_eq!(total, 5);
    assert_eq!(json["columns"].as_array().map(Vec::len), Some(3));
}

#[test]
fn huge_bucket_is_one_column() {
    let (dir, input) = workspace();
    let json = json_stdout(
        msc(dir.path())
            .args(["heatmap", "--bucket", "9223372036854775", "--json", "-i"])
            .arg(&input),
    );

    assert_eq!(json["columns"].as_array().map(Vec::len), Some(1));
    let total: u64 = json["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .filter_map(|r| r["total"].as_u64())
        .sum();
    assert_eq!(total, 5);
}

#[test]
fn zero_bucket_is_rejected() {
    let (dir, input) = workspace();
    msc(dir.path())
        .args(["heatmap", "--bucket", "0", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("M3001"));
}

#[test]
fn malformed_line_names_its_position() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("bad.jsonl");
    fs::write(
        &input,
        "{\"id\":\"a\",\"from\":\"x\",\"to\":\"t\",\"time\":\"2026-03-01T10:00:00Z\"}\n{not json\n",
    )
    .expect("write export");

    msc(dir.path())
        .args(["stats", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("M4001"))
        .stderr(predicate::str::contains(":2: invalid message"));
}

#[test]
fn json_errors_are_structured() {
    let (dir, input) = workspace();
    let output = msc(dir.path())
        .args(["heatmap", "--bucket", "-5", "--json", "-i"])
        .arg(&input)
        .output()
        .expect("run msc");
    assert!(!output.status.success());
    let json: Value = serde_json::from_slice(&output.stderr).expect("stderr is JSON");
    assert_eq!(json["error"]["error_code"], "M3001");
}

#[test]
fn missing_input_flag_fails() {
    let dir = TempDir::new().expect("tempdir");
    msc(dir.path())
        .arg("threads")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--input"));
}

#[test]
fn timing_report_goes_to_stderr() {
    let (dir, input) = workspace();
    msc(dir.path())
        .args(["--timing", "stats", "--format", "text", "-i"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("messages  5"))
        .stderr(predicate::str::contains("timing report"))
        .stderr(predicate::str::contains("cmd.stats"));
}

#[test]
fn watch_reports_a_tick() {
    let (dir, input) = workspace();
    let json = json_stdout(
        msc(dir.path())
            .args([
                "watch",
                "--zoom",
                "all",
                "--now",
                "2026-03-01T13:00:00Z",
                "--json",
                "-i",
            ])
            .arg(&input),
    );

    assert_eq!(json["target"], "*");
    assert_eq!(json["zoom"], "all");
    // Direct messages only join the all-topics view for the self agent.
    assert_eq!(json["loaded"], 4);
    assert_eq!(json["topics"], 2);
    let tick = &json["ticks"][0];
    assert_eq!(tick["recomputed"], true);
    assert_eq!(tick["messages"], 4);
    assert_eq!(tick["threads"], 2);
}

#[test]
fn watch_second_tick_skips_unchanged_tail() {
    let (dir, input) = workspace();
    let json = json_stdout(
        msc(dir.path())
            .args([
                "watch",
                "--topic",
                "build",
                "--zoom",
                "all",
                "--ticks",
                "2",
                "--now",
                "2026-03-01T13:00:00Z",
                "--json",
                "-i",
            ])
            .arg(&input),
    );

    let ticks = json["ticks"].as_array().expect("ticks");
    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks[0]["recomputed"], true);
    assert_eq!(ticks[0]["messages"], 3);
    assert_eq!(ticks[1]["recomputed"], false);
    assert_eq!(ticks[1]["messages"], 3);
}

#[test]
fn watch_self_agent_sees_direct_messages() {
    let (dir, input) = workspace();
    let json = json_stdout(
        msc(dir.path())
            .args([
                "watch",
                "--self-agent",
                "alice",
                "--zoom",
                "all",
                "--now",
                "2026-03-01T13:00:00Z",
                "--json",
                "-i",
            ])
            .arg(&input),
    );
    assert_eq!(json["loaded"], 5);
}
