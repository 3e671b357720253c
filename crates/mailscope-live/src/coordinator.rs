//! The live window coordinator.
//!
//! # Overview
//!
//! A [`Coordinator`] owns every open view and is driven from a single
//! thread: the caller's event loop. Source calls never run on that thread.
//! Each fetch is handed to a short-lived worker (see [`crate::fetch`]), and
//! the push subscription is drained by a pump thread. Both report back
//! over one `mpsc` channel that the loop drains with
//! [`Coordinator::process_pending`] or [`Coordinator::wait_for_events`].
//!
//! ## Recompute
//!
//! [`Coordinator::tick`] re-runs the analytics over each view that needs
//! it. Tail-following views are recomputed on every tick because their
//! window moves with `now`. Panned views are recomputed only after a pan,
//! zoom, filter change, fetch or in-window push marked them dirty. In both
//! cases a content fingerprint of the selected input is compared against
//! the one the current snapshot was built from, and an unchanged input
//! skips the recompute.
//!
//! ## Failure
//!
//! A failed fetch is recorded on the view as its `last_error`; the view
//! keeps its messages and last snapshot. A view is not recomputed until one
//! of its fetches has succeeded, so a view whose first load failed reports
//! the error with no snapshot rather than an empty one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use mailscope_analytics::{AnalyticsOptions, AnalyticsSnapshot, analyze};
use mailscope_core::config::MailscopeConfig;
use mailscope_core::fingerprint::fingerprint;
use mailscope_core::model::{Message, SubscriptionFilter};
use mailscope_core::source::{CancelHandle, MessageSource};
use mailscope_core::timing::timed;
use tracing::{debug, info, warn};

use crate::error::LiveError;
use crate::fetch::{
    FetchJob, FetchPayload, FetchPurpose, FetchResult, FetchTracker, SourceOverview,
    older_page_filter, reload_filter, spawn_fetch,
};
use crate::view::{ViewFault, ViewFilter, ViewId, ViewState, ViewTarget};
use crate::window::{ViewWindow, Zoom};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Messages kept by a tail-following view (`0` = unbounded).
    pub tail_limit: usize,
    /// Messages requested per older-page fetch.
    pub page_size: usize,
    /// Agent whose DMs the `All` target includes.
    pub self_agent: Option<String>,
    pub analytics: AnalyticsOptions,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from(&MailscopeConfig::default())
    }
}

impl From<&MailscopeConfig> for CoordinatorOptions {
    fn from(config: &MailscopeConfig) -> Self {
        Self {
            tail_limit: config.live.tail_limit,
            page_size: config.live.page_size,
            self_agent: config.live.self_agent.clone(),
            analytics: AnalyticsOptions::from(config),
        }
    }
}

/// Messages delivered to the coordinator's event loop.
#[derive(Debug)]
pub(crate) enum Event {
    Fetched(FetchResult),
    Pushed(Box<Message>),
    SubscriptionClosed,
}

#[derive(Debug)]
struct Pump {
    cancel: CancelHandle,
    join: Option<JoinHandle<()>>,
}

impl Pump {
    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("subscription pump panicked");
            }
        }
    }
}

pub struct Coordinator {
    source: Arc<dyn MessageSource>,
    options: CoordinatorOptions,
    views: BTreeMap<ViewId, ViewState>,
    next_id: u64,
    tracker: FetchTracker,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
    workers: Vec<JoinHandle<()>>,
    pump: Option<Pump>,
    overview: Option<SourceOverview>,
    overview_error: Option<ViewFault>,
    shut_down: bool,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("views", &self.views.len())
            .field("in_flight", &self.tracker.in_flight_count())
            .field("subscribed", &self.pump.is_some())
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    #[must_use]
    pub fn new(source: Arc<dyn MessageSource>, options: CoordinatorOptions) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            source,
            options,
            views: BTreeMap::new(),
            next_id: 1,
            tracker: FetchTracker::default(),
            events_tx,
            events_rx,
            workers: Vec::new(),
            pump: None,
            overview: None,
            overview_error: None,
            shut_down: false,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Open a tail-following view and start loading it.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::ShutDown`] after [`Self::shutdown`], or
    /// [`LiveError::Spawn`] if the fetch worker cannot be started.
    pub fn open_view(
        &mut self,
        target: ViewTarget,
        zoom: Zoom,
        now: DateTime<Utc>,
    ) -> Result<ViewId, LiveError> {
        self.ensure_running()?;
        let id = ViewId(self.next_id);
        self.next_id += 1;
        let cap = (self.options.tail_limit > 0).then_some(self.options.tail_limit);
        debug!(%id, target = %target.label(), %zoom, "opening view");
        self.views
            .insert(id, ViewState::new(id, target, ViewWindow::tail(zoom), cap));
        self.reload(id, now)?;
        Ok(id)
    }

    /// Close a view. Results still in flight for it are dropped on arrival.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::UnknownView`] if `id` is not open.
    pub fn close_view(&mut self, id: ViewId) -> Result<(), LiveError> {
        self.views.remove(&id).ok_or(LiveError::UnknownView(id))?;
        self.tracker.forget(id);
        debug!(%id, "closed view");
        Ok(())
    }

    #[must_use]
    pub fn view(&self, id: ViewId) -> Option<&ViewState> {
        self.views.get(&id)
    }

    pub fn view_ids(&self) -> impl Iterator<Item = ViewId> + '_ {
        self.views.keys().copied()
    }

    /// The last computed snapshot of a view.
    #[must_use]
    pub fn snapshot(&self, id: ViewId) -> Option<Arc<AnalyticsSnapshot>> {
        self.views.get(&id).and_then(ViewState::snapshot)
    }

    /// Re-fetch a view's current window. Supersedes any reload in flight.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::UnknownView`], [`LiveError::ShutDown`] or
    /// [`LiveError::Spawn`].
    pub fn reload(&mut self, id: ViewId, now: DateTime<Utc>) -> Result<(), LiveError> {
        self.ensure_running()?;
        let limit = self.options.tail_limit;
        let self_agent = self.options.self_agent.clone();
        let view = self.view_mut(id)?;
        let window = view.window;
        let since = window
            .zoom
            .span()
            .map(|_| window.bounds(now, None).0);
        let filter = reload_filter(since, window.window_end, limit);
        let target = view.target.clone();
        view.dirty = true;
        let job = FetchJob::Messages {
            target,
            filter,
            self_agent,
        };
        self.dispatch(Some(id), FetchPurpose::Reload, job)
    }

    /// Fetch the page before the view's oldest message.
    ///
    /// Returns `false` without fetching when the view holds no messages or a
    /// page fetch is already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::UnknownView`], [`LiveError::ShutDown`] or
    /// [`LiveError::Spawn`].
    pub fn load_older(&mut self, id: ViewId) -> Result<bool, LiveError> {
        self.ensure_running()?;
        if self.tracker.is_in_flight(Some(id), FetchPurpose::OlderPage) {
            debug!(%id, "older page already in flight");
            return Ok(false);
        }
        let page_size = self.options.page_size;
        let self_agent = self.options.self_agent.clone();
        let view = self.view_mut(id)?;
        let Some(oldest) = view.messages.oldest() else {
            return Ok(false);
        };
        let job = FetchJob::Messages {
            target: view.target.clone(),
            filter: older_page_filter(oldest, page_size),
            self_agent,
        };
        self.dispatch(Some(id), FetchPurpose::OlderPage, job)?;
        Ok(true)
    }

    /// Pan by `steps` window lengths; negative is back in time.
    ///
    /// An anchored window is re-fetched for its new range.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::UnknownView`], [`LiveError::ShutDown`] or
    /// [`LiveError::Spawn`].
    pub fn pan(&mut self, id: ViewId, steps: i32, now: DateTime<Utc>) -> Result<(), LiveError> {
        let view = self.view_mut(id)?;
        let before = view.window;
        view.window.pan(steps, now);
        if view.window == before {
            return Ok(());
        }
        view.dirty = true;
        if view.window.follows_tail() {
            Ok(())
        } else {
            self.reload(id, now)
        }
    }

    /// Change a view's zoom level, keeping its anchor.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::UnknownView`], [`LiveError::ShutDown`] or
    /// [`LiveError::Spawn`].
    pub fn set_zoom(
        &mut self,
        id: ViewId,
        zoom: Zoom,
        now: DateTime<Utc>,
    ) -> Result<(), LiveError> {
        let view = self.view_mut(id)?;
        if view.window.zoom == zoom {
            return Ok(());
        }
        view.window.set_zoom(zoom);
        self.reload(id, now)
    }

    /// Drop a view's pan anchor so it follows the live tail again.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::UnknownView`], [`LiveError::ShutDown`] or
    /// [`LiveError::Spawn`].
    pub fn follow_tail(&mut self, id: ViewId, now: DateTime<Utc>) -> Result<(), LiveError> {
        let view = self.view_mut(id)?;
        if view.window.follows_tail() {
            return Ok(());
        }
        view.window.follow_tail();
        self.reload(id, now)
    }

    /// Restrict what a view's aggregators see.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::UnknownView`] if `id` is not open.
    pub fn set_filter(&mut self, id: ViewId, filter: ViewFilter) -> Result<(), LiveError> {
        let view = self.view_mut(id)?;
        if view.filter != filter {
            view.filter = filter;
            view.dirty = true;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Source-wide listing
    // -----------------------------------------------------------------------

    /// Refresh topic, agent and conversation listings in the background.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::ShutDown`] or [`LiveError::Spawn`].
    pub fn refresh_metrics(&mut self) -> Result<(), LiveError> {
        self.ensure_running()?;
        let job = FetchJob::Overview {
            self_agent: self.options.self_agent.clone(),
        };
        self.dispatch(None, FetchPurpose::Metrics, job)
    }

    #[must_use]
    pub const fn overview(&self) -> Option<&SourceOverview> {
        self.overview.as_ref()
    }

    #[must_use]
    pub const fn overview_error(&self) -> Option<&ViewFault> {
        self.overview_error.as_ref()
    }

    /// Number of fetches issued and not yet applied.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight_count()
    }

    // -----------------------------------------------------------------------
    // Push subscription
    // -----------------------------------------------------------------------

    /// Start receiving pushed messages for every topic and DM. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Source`] if the subscription is refused,
    /// [`LiveError::ShutDown`] or [`LiveError::Spawn`].
    pub fn subscribe_live(&mut self) -> Result<(), LiveError> {
        self.ensure_running()?;
        if self.pump.is_some() {
            return Ok(());
        }
        let filter = SubscriptionFilter {
            topic: None,
            include_dm: true,
        };
        let mut subscription = self.source.subscribe(&filter)?;
        let cancel = subscription.cancel_handle();
        let events = self.events_tx.clone();
        let join = thread::Builder::new()
            .name("mailscope-push".into())
            .spawn(move || {
                while let Some(message) = subscription.recv() {
                    if events.send(Event::Pushed(Box::new(message))).is_err() {
                        return;
                    }
                }
                let _ = events.send(Event::SubscriptionClosed);
            })
            .map_err(|source| LiveError::Spawn {
                what: "subscription pump",
                source,
            })?;
        info!("live subscription started");
        self.pump = Some(Pump {
            cancel,
            join: Some(join),
        });
        Ok(())
    }

    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.pump.is_some()
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Apply every event already delivered. Returns how many were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => {
                    self.apply(event);
                    applied += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        self.reap_workers();
        applied
    }

    /// Wait up to `timeout` for at least one event, then apply everything
    /// pending. Returns how many events were applied.
    pub fn wait_for_events(&mut self, timeout: Duration) -> usize {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.apply(event);
                1 + self.process_pending()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Recompute loaded views that need it. Returns the ids whose snapshot
    /// changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<ViewId> {
        let mut recomputed = Vec::new();
        for view in self.views.values_mut() {
            if !view.loaded || (!view.dirty && !view.window.follows_tail()) {
                continue;
            }
            if recompute(view, now, &self.options.analytics) {
                recomputed.push(view.id);
            }
        }
        recomputed
    }

    /// Cancel the subscription and wait for every background thread.
    /// Idempotent; also run on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if let Some(mut pump) = self.pump.take() {
            pump.stop();
            info!("live subscription stopped");
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("fetch worker panicked");
            }
        }
        debug!(views = self.views.len(), "coordinator shut down");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    const fn ensure_running(&self) -> Result<(), LiveError> {
        if self.shut_down {
            Err(LiveError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn view_mut(&mut self, id: ViewId) -> Result<&mut ViewState, LiveError> {
        self.views.get_mut(&id).ok_or(LiveError::UnknownView(id))
    }

    fn dispatch(
        &mut self,
        view: Option<ViewId>,
        purpose: FetchPurpose,
        job: FetchJob,
    ) -> Result<(), LiveError> {
        self.reap_workers();
        let generation = self.tracker.issue(view, purpose);
        let handle = spawn_fetch(
            Arc::clone(&self.source),
            job,
            view,
            purpose,
            generation,
            self.events_tx.clone(),
        )
        .map_err(|source| LiveError::Spawn {
            what: "fetch worker",
            source,
        })?;
        self.workers.push(handle);
        Ok(())
    }

    fn reap_workers(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) =
            self.workers.drain(..).partition(JoinHandle::is_finished);
        self.workers = running;
        for worker in done {
            if worker.join().is_err() {
                warn!("fetch worker panicked");
            }
        }
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Fetched(result) => self.apply_fetch(result),
            Event::Pushed(message) => self.apply_push(*message),
            Event::SubscriptionClosed => {
                info!("live subscription closed by source");
                if let Some(mut pump) = self.pump.take() {
                    pump.stop();
                }
            }
        }
    }

    fn apply_fetch(&mut self, result: FetchResult) {
        let FetchResult {
            view: id,
            purpose,
            generation,
            limit,
            outcome,
        } = result;
        if !self.tracker.complete(id, purpose, generation) {
            debug!(?id, purpose = purpose.label(), generation, "discarding stale fetch result");
            return;
        }

        let Some(id) = id else {
            match outcome {
                Ok(FetchPayload::Overview(overview)) => {
                    self.overview = Some(overview);
                    self.overview_error = None;
                }
                Ok(FetchPayload::Messages(_)) => {}
                Err(err) => {
                    warn!(error = %err, "metrics refresh failed");
                    self.overview_error = Some(ViewFault::from(&err));
                }
            }
            return;
        };
        let Some(view) = self.views.get_mut(&id) else {
            debug!(%id, "fetch result for closed view");
            return;
        };

        match outcome {
            Ok(FetchPayload::Messages(batch)) => {
                let full = limit > 0 && batch.len() >= limit;
                let added = match purpose {
                    FetchPurpose::OlderPage => {
                        let added = view.absorb_older(batch);
                        view.has_older = full;
                        added
                    }
                    FetchPurpose::Reload | FetchPurpose::Metrics => {
                        let added = view.absorb(batch);
                        view.has_older |= full;
                        added
                    }
                };
                debug!(%id, purpose = purpose.label(), added = added.len(), "applied fetch");
                if !added.is_empty() || view.last_error.is_some() || !view.loaded {
                    view.dirty = true;
                }
                view.loaded = true;
                view.last_error = None;
            }
            Ok(FetchPayload::Overview(_)) => {}
            Err(err) => {
                warn!(
                    %id,
                    purpose = purpose.label(),
                    error = %err,
                    "fetch failed, keeping last snapshot"
                );
                view.last_error = Some(ViewFault::from(&err));
            }
        }
    }

    fn apply_push(&mut self, message: Message) {
        let self_agent = self.options.self_agent.as_deref();
        for view in self.views.values_mut() {
            if !view.target.matches(&message, self_agent) {
                continue;
            }
            let in_window = view.in_last_window(message.time);
            let added = view.absorb([message.clone()]);
            if !added.is_empty() && in_window {
                view.dirty = true;
            }
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Returns `true` if a new snapshot was stored.
fn recompute(view: &mut ViewState, now: DateTime<Utc>, options: &AnalyticsOptions) -> bool {
    let (start, end) = view.window.bounds(now, view.messages.oldest());
    let selected = view.select(start, end);
    let input = format!(
        "{}|{}|{}|{}",
        fingerprint(&selected),
        start.timestamp_micros(),
        end.timestamp_micros(),
        view.filter_tag()
    );
    view.dirty = false;
    view.last_bounds = Some((start, end));

    if view.computed_from.as_deref() == Some(input.as_str()) {
        debug!(id = %view.id, "input unchanged, skipping recompute");
        return false;
    }
    match timed("recompute", || analyze(&selected, start, end, options)) {
        Ok(snapshot) => {
            view.snapshot = Some(Arc::new(snapshot));
            view.computed_from = Some(input);
            true
        }
        Err(err) => {
            warn!(id = %view.id, error = %err, "recompute rejected window");
            view.last_error = Some(ViewFault::from(&err));
            false
        }
    }
}
