//! End-to-end coordinator behaviour over real worker and pump threads.
//!
//! Every test drives the coordinator the way a dashboard loop would: issue
//! calls, drain events until the fetches settle, then tick with an injected
//! `now`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use mailscope_core::model::{
    AgentInfo, DmConversation, MessageFilter, SearchHit, SubscriptionFilter, TopicInfo,
};
use mailscope_core::source::{MemorySource, MessageSource, Subscription};
use mailscope_core::{ErrorCode, Message, SourceError};
use mailscope_live::{Coordinator, CoordinatorOptions, LiveError, ViewId, ViewTarget, Zoom};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("valid ts")
}

fn post(id: &str, from: &str, to: &str, secs: i64) -> Message {
    Message::new(id, from, to, at(secs), format!("body of {id}"))
}

fn coordinator(
    source: Arc<dyn MessageSource>,
    tail_limit: usize,
    page_size: usize,
) -> Coordinator {
    let options = CoordinatorOptions {
        tail_limit,
        page_size,
        ..CoordinatorOptions::default()
    };
    Coordinator::new(source, options)
}

/// Drain events until no fetch is outstanding.
fn settle(coord: &mut Coordinator) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while coord.in_flight() > 0 {
        assert!(Instant::now() < deadline, "fetches did not settle");
        coord.wait_for_events(Duration::from_millis(20));
    }
}

/// Drain events until `done` holds.
fn wait_until(coord: &mut Coordinator, mut done: impl FnMut(&Coordinator) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(coord) {
        assert!(Instant::now() < deadline, "condition not reached");
        coord.wait_for_events(Duration::from_millis(20));
    }
}

fn has_message(coord: &Coordinator, id: ViewId, msg_id: &str) -> bool {
    coord
        .view(id)
        .is_some_and(|v| v.messages().iter().any(|m| m.id == msg_id))
}

fn ids(coord: &Coordinator, id: ViewId) -> Vec<String> {
    coord
        .view(id)
        .map(|v| v.messages().iter().map(|m| m.id.clone()).collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Scripted source
// ---------------------------------------------------------------------------

type Reply = (Duration, Result<Vec<Message>, SourceError>);

/// Answers `messages` calls from a queue, each after its own delay.
struct ScriptedSource {
    replies: Mutex<VecDeque<Reply>>,
}

impl ScriptedSource {
    fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }
}

impl MessageSource for ScriptedSource {
    fn topics(&self) -> Result<Vec<TopicInfo>, SourceError> {
        Ok(Vec::new())
    }

    fn messages(
        &self,
        _topic: &str,
        _filter: &MessageFilter,
    ) -> Result<Vec<Message>, SourceError> {
        let reply = self.replies.lock().expect("lock").pop_front();
        match reply {
            Some((delay, result)) => {
                thread::sleep(delay);
                result
            }
            None => Ok(Vec::new()),
        }
    }

    fn dm_conversations(&self, _self_agent: &str) -> Result<Vec<DmConversation>, SourceError> {
        Ok(Vec::new())
    }

    fn dms(&self, _agent: &str, _filter: &MessageFilter) -> Result<Vec<Message>, SourceError> {
        Ok(Vec::new())
    }

    fn agents(&self) -> Result<Vec<AgentInfo>, SourceError> {
        Ok(Vec::new())
    }

    fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SourceError> {
        Ok(Vec::new())
    }

    fn subscribe(&self, _filter: &SubscriptionFilter) -> Result<Subscription, SourceError> {
        Err(SourceError::Unavailable("scripted source has no pushes".into()))
    }
}

// ---------------------------------------------------------------------------
// Dedup and routing
// ---------------------------------------------------------------------------

#[test]
fn polled_and_pushed_copy_is_kept_once() {
    let source = Arc::new(MemorySource::with_messages([post("m1", "amy", "ops", 3_000)]));
    let mut coord = coordinator(source.clone(), 500, 200);
    let now = at(3_600);

    coord.subscribe_live().expect("subscribe");
    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::OneHour, now)
        .expect("open");
    settle(&mut coord);

    // Arrives by push, then again through the reload.
    assert_eq!(source.publish(post("m2", "bob", "ops", 3_100)), 1);
    coord.reload(view, now).expect("reload");
    settle(&mut coord);
    wait_until(&mut coord, |c| has_message(c, view, "m2"));
    coord.wait_for_events(Duration::from_millis(50));

    assert_eq!(ids(&coord, view), ["m1", "m2"]);
    coord.tick(now);
    let snapshot = coord.snapshot(view).expect("snapshot");
    assert_eq!(snapshot.message_count, 2);
}

#[test]
fn pushes_are_routed_by_target() {
    let source = Arc::new(MemorySource::new());
    let options = CoordinatorOptions {
        self_agent: Some("amy".into()),
        ..CoordinatorOptions::default()
    };
    let mut coord = Coordinator::new(source.clone(), options);
    let now = at(3_600);

    coord.subscribe_live().expect("subscribe");
    let ops = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::OneHour, now)
        .expect("open");
    let dm = coord
        .open_view(ViewTarget::Direct("bob".into()), Zoom::OneHour, now)
        .expect("open");
    let all = coord.open_view(ViewTarget::All, Zoom::OneHour, now).expect("open");
    settle(&mut coord);

    source.publish(post("t1", "cat", "ops", 3_500));
    source.publish(post("d1", "bob", "@amy", 3_510));
    source.publish(post("d2", "cat", "@dan", 3_520));
    wait_until(&mut coord, |c| has_message(c, all, "d1"));
    coord.wait_for_events(Duration::from_millis(50));

    assert_eq!(ids(&coord, ops), ["t1"]);
    assert_eq!(ids(&coord, dm), ["d1"]);
    assert_eq!(ids(&coord, all), ["t1", "d1"]);
}

// ---------------------------------------------------------------------------
// Fetch outcomes
// ---------------------------------------------------------------------------

#[test]
fn superseded_reload_result_is_discarded() {
    let fresh = post("fresh", "amy", "ops", 3_000);
    let source = Arc::new(ScriptedSource::new([
        (
            Duration::from_millis(200),
            Err(SourceError::Unavailable("stale failure".into())),
        ),
        (Duration::ZERO, Ok(vec![fresh])),
    ]));
    let mut coord = coordinator(source, 500, 200);
    let now = at(3_600);

    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::OneHour, now)
        .expect("open");
    // Give the first worker time to claim the slow reply.
    thread::sleep(Duration::from_millis(30));
    coord.reload(view, now).expect("reload");
    settle(&mut coord);

    // Let the slow, superseded result arrive and be dropped.
    let deadline = Instant::now() + Duration::from_millis(400);
    while Instant::now() < deadline {
        coord.wait_for_events(Duration::from_millis(20));
    }

    let state = coord.view(view).expect("view");
    assert!(state.last_error().is_none());
    assert_eq!(ids(&coord, view), ["fresh"]);
}

#[test]
fn failed_reload_keeps_last_snapshot() {
    let source = Arc::new(MemorySource::with_messages([
        post("m1", "amy", "ops", 3_000),
        post("m2", "bob", "ops", 3_010),
    ]));
    let mut coord = coordinator(source.clone(), 500, 200);
    let now = at(3_600);

    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::OneHour, now)
        .expect("open");
    settle(&mut coord);
    assert_eq!(coord.tick(now), [view]);

    source.set_unavailable(Some("daemon restarting"));
    coord.reload(view, now).expect("reload");
    settle(&mut coord);

    let fault = coord.view(view).and_then(|v| v.last_error().cloned()).expect("fault");
    assert_eq!(fault.code, ErrorCode::SourceUnavailable);
    assert!(fault.message.contains("daemon restarting"));
    assert!(coord.tick(now).is_empty(), "unchanged input must not recompute");
    assert_eq!(coord.snapshot(view).expect("kept").message_count, 2);

    source.set_unavailable(None);
    coord.reload(view, now).expect("reload");
    settle(&mut coord);
    assert!(coord.view(view).expect("view").last_error().is_none());
}

#[test]
fn failed_initial_load_yields_no_snapshot() {
    let source = Arc::new(MemorySource::with_messages([post("m1", "amy", "ops", 3_000)]));
    source.set_unavailable(Some("down"));
    let mut coord = coordinator(source.clone(), 500, 200);
    let now = at(3_600);

    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::OneHour, now)
        .expect("open");
    settle(&mut coord);

    assert!(coord.tick(now).is_empty());
    let state = coord.view(view).expect("view");
    assert!(!state.is_loaded());
    assert!(state.snapshot().is_none(), "no data must not look like an empty window");
    let fault = state.last_error().expect("fault");
    assert_eq!(fault.code, ErrorCode::SourceUnavailable);

    source.set_unavailable(None);
    coord.reload(view, now).expect("reload");
    settle(&mut coord);
    assert_eq!(coord.tick(now), [view]);
    assert_eq!(coord.snapshot(view).expect("snap").message_count, 1);
    assert!(coord.view(view).expect("view").last_error().is_none());
}

#[test]
fn pending_initial_load_defers_snapshot() {
    let source = Arc::new(MemorySource::with_messages([post("m1", "amy", "ops", 3_000)]));
    source.set_fetch_delay(Some(Duration::from_millis(150)));
    let mut coord = coordinator(source, 500, 200);
    let now = at(3_600);

    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::OneHour, now)
        .expect("open");
    assert!(coord.tick(now).is_empty());
    assert!(coord.snapshot(view).is_none());

    settle(&mut coord);
    assert_eq!(coord.tick(now), [view]);
    assert_eq!(coord.snapshot(view).expect("snap").message_count, 1);
}

#[test]
fn empty_successful_load_yields_empty_snapshot() {
    let source = Arc::new(MemorySource::new());
    let mut coord = coordinator(source, 500, 200);
    let now = at(3_600);

    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::OneHour, now)
        .expect("open");
    settle(&mut coord);

    assert!(coord.view(view).expect("view").is_loaded());
    assert_eq!(coord.tick(now), [view]);
    assert_eq!(coord.snapshot(view).expect("snap").message_count, 0);
}

#[test]
fn metrics_refresh_fills_overview() {
    let source = Arc::new(MemorySource::with_messages([
        post("m1", "amy", "ops", 10),
        post("m2", "bob", "dev", 20),
        post("m3", "bob", "@amy", 30),
    ]));
    let options = CoordinatorOptions {
        self_agent: Some("amy".into()),
        ..CoordinatorOptions::default()
    };
    let mut coord = Coordinator::new(source, options);

    coord.refresh_metrics().expect("refresh");
    settle(&mut coord);

    let overview = coord.overview().expect("overview");
    let topics: Vec<_> = overview.topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(topics, ["dev", "ops"]);
    assert_eq!(overview.conversations.len(), 1);
    assert_eq!(overview.conversations[0].agent, "bob");
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[test]
fn older_pages_walk_back_until_exhausted() {
    let source = Arc::new(MemorySource::with_messages(
        (0..10).map(|i| post(&format!("m{i}"), "amy", "ops", i)),
    ));
    let mut coord = coordinator(source, 4, 3);
    let now = at(100);

    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::All, now)
        .expect("open");
    settle(&mut coord);
    assert_eq!(ids(&coord, view), ["m6", "m7", "m8", "m9"]);
    assert!(coord.view(view).expect("view").has_older());

    assert!(coord.load_older(view).expect("page"));
    settle(&mut coord);
    assert_eq!(coord.view(view).expect("view").messages().len(), 7);
    assert!(coord.view(view).expect("view").has_older());

    assert!(coord.load_older(view).expect("page"));
    settle(&mut coord);
    assert_eq!(ids(&coord, view).first().map(String::as_str), Some("m0"));
    assert!(coord.view(view).expect("view").has_older());

    assert!(coord.load_older(view).expect("page"));
    settle(&mut coord);
    assert_eq!(coord.view(view).expect("view").messages().len(), 10);
    assert!(!coord.view(view).expect("view").has_older());
}

#[test]
fn only_one_older_page_in_flight() {
    let source = Arc::new(MemorySource::with_messages(
        (0..5).map(|i| post(&format!("m{i}"), "amy", "ops", i)),
    ));
    let mut coord = coordinator(source.clone(), 2, 2);
    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::All, at(100))
        .expect("open");
    settle(&mut coord);

    source.set_fetch_delay(Some(Duration::from_millis(100)));
    assert!(coord.load_older(view).expect("page"));
    assert!(!coord.load_older(view).expect("page"));
    settle(&mut coord);
    assert_eq!(coord.view(view).expect("view").messages().len(), 4);
}

// ---------------------------------------------------------------------------
// Windowing and recompute
// ---------------------------------------------------------------------------

#[test]
fn tail_view_skips_recompute_when_nothing_moved() {
    let source = Arc::new(MemorySource::with_messages([post("m1", "amy", "ops", 3_000)]));
    let mut coord = coordinator(source, 500, 200);
    let now = at(3_600);

    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::OneHour, now)
        .expect("open");
    settle(&mut coord);

    assert_eq!(coord.tick(now), [view]);
    assert!(coord.tick(now).is_empty());
    assert_eq!(coord.tick(at(3_601)), [view], "tail window moves with now");
}

#[test]
fn panned_view_recomputes_only_on_change() {
    let source = Arc::new(MemorySource::with_messages([
        post("a", "amy", "ops", 9_000),
        post("b", "bob", "ops", 5_000),
        post("c", "cat", "ops", 6_000),
    ]));
    let mut coord = coordinator(source.clone(), 500, 200);
    let now = at(10_000);

    coord.subscribe_live().expect("subscribe");
    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::OneHour, now)
        .expect("open");
    settle(&mut coord);
    assert_eq!(coord.tick(now), [view]);
    assert_eq!(coord.snapshot(view).expect("snap").message_count, 1);

    coord.pan(view, -1, now).expect("pan");
    settle(&mut coord);
    assert_eq!(coord.tick(now), [view]);
    assert_eq!(coord.snapshot(view).expect("snap").message_count, 2);

    assert!(coord.tick(now).is_empty());
    assert!(coord.tick(at(10_500)).is_empty(), "anchored window ignores now");

    // Inside the panned window.
    source.publish(post("d", "amy", "ops", 6_100));
    wait_until(&mut coord, |c| has_message(c, view, "d"));
    assert_eq!(coord.tick(now), [view]);
    assert_eq!(coord.snapshot(view).expect("snap").message_count, 3);

    // Outside it.
    source.publish(post("e", "amy", "ops", 9_500));
    wait_until(&mut coord, |c| has_message(c, view, "e"));
    assert!(!coord.view(view).expect("view").is_dirty());
    assert!(coord.tick(now).is_empty());

    coord.follow_tail(view, now).expect("follow");
    settle(&mut coord);
    assert_eq!(coord.tick(now), [view]);
    assert_eq!(coord.snapshot(view).expect("snap").message_count, 2);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn shutdown_unblocks_subscription() {
    let source = Arc::new(MemorySource::new());
    let mut coord = coordinator(source.clone(), 500, 200);
    coord.subscribe_live().expect("subscribe");
    assert!(coord.is_subscribed());
    assert_eq!(source.subscriber_count(), 1);

    coord.shutdown();
    assert!(!coord.is_subscribed());
    assert_eq!(source.subscriber_count(), 0);
    assert!(matches!(
        coord.open_view(ViewTarget::All, Zoom::OneHour, at(0)),
        Err(LiveError::ShutDown)
    ));
    coord.shutdown();
}

#[test]
fn closed_view_ignores_late_results() {
    let source = Arc::new(MemorySource::with_messages([post("m1", "amy", "ops", 10)]));
    source.set_fetch_delay(Some(Duration::from_millis(50)));
    let mut coord = coordinator(source, 500, 200);

    let view = coord
        .open_view(ViewTarget::Topic("ops".into()), Zoom::All, at(100))
        .expect("open");
    coord.close_view(view).expect("close");
    assert_eq!(coord.in_flight(), 0);
    assert!(matches!(coord.close_view(view), Err(LiveError::UnknownView(_))));

    thread::sleep(Duration::from_millis(120));
    coord.process_pending();
    assert!(coord.view(view).is_none());
}
