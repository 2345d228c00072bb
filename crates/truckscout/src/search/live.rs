use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, trace};
use truckscout_data::Position;

use super::{SearchConfig, SearchState};
use crate::index::{EntityIndex, IndexSnapshot};

#[derive(Debug)]
enum SearchEvent {
    Query(String),
    Origin(Option<Position>),
    Flush,
}

/// An interactive search session.
///
/// Query edits are debounced by [`SearchConfig::debounce`]; origin changes and
/// index changes re-evaluate immediately. The origin is either set directly or
/// followed from a watch channel. The latest [`SearchState`] is
/// published through a watch channel. Dropping the session stops its task.
///
/// Must be created inside a Tokio runtime.
#[derive(Debug)]
pub struct LiveSearch {
    events: mpsc::UnboundedSender<SearchEvent>,
    state: watch::Receiver<Arc<SearchState>>,
    task: JoinHandle<()>,
}

impl LiveSearch {
    pub fn spawn(index: &EntityIndex, config: SearchConfig) -> Self {
        Self::spawn_with_origin(index, config, None)
    }

    pub fn spawn_with_origin(
        index: &EntityIndex,
        config: SearchConfig,
        origin: Option<Position>,
    ) -> Self {
        let (_, feed) = watch::channel(origin);
        Self::spawn_following(index, config, feed)
    }

    /// Take the origin from `origin_feed`, re-evaluating whenever it changes.
    pub fn spawn_following(
        index: &EntityIndex,
        config: SearchConfig,
        origin_feed: watch::Receiver<Option<Position>>,
    ) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let index_rx = index.subscribe();
        let mut initial = SearchState {
            origin: *origin_feed.borrow(),
            ..SearchState::default()
        };
        // Evaluate the empty query up front so a show-all policy lists results
        // before the first event arrives.
        initial.recompute(&current(&index_rx), &config);
        let (state_tx, state) = watch::channel(Arc::new(initial.clone()));
        let task = tokio::spawn(run(
            rx,
            index_rx,
            origin_feed,
            config,
            initial,
            state_tx,
        ));
        Self {
            events,
            state,
            task,
        }
    }

    fn send(&self, event: SearchEvent) {
        if let Err(e) = self.events.send(event) {
            debug!(event = ?e.0, "Live search task has stopped, dropping event");
        }
    }

    /// Replace the query text. Re-evaluates once edits pause for the debounce period.
    pub fn set_query(&self, text: impl Into<String>) {
        self.send(SearchEvent::Query(text.into()));
    }

    /// Replace the origin and re-evaluate immediately.
    pub fn set_origin(&self, origin: Option<Position>) {
        self.send(SearchEvent::Origin(origin));
    }

    /// Apply a pending query edit without waiting for the debounce period.
    pub fn flush(&self) {
        self.send(SearchEvent::Flush);
    }

    /// The latest published state.
    pub fn state(&self) -> Arc<SearchState> {
        Arc::clone(&self.state.borrow())
    }

    /// Results of the latest evaluation.
    pub fn results(&self) -> Vec<super::RankedResult> {
        self.state.borrow().results.clone()
    }

    /// A receiver that is notified every time the results are recomputed.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SearchState>> {
        self.state.clone()
    }

    /// Wait for the next recomputation and return it.
    ///
    /// Returns `None` once the session task has stopped.
    pub async fn changed(&mut self) -> Option<Arc<SearchState>> {
        self.state.changed().await.ok()?;
        Some(Arc::clone(&self.state.borrow_and_update()))
    }
}

impl Drop for LiveSearch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn current(index: &watch::Receiver<Arc<IndexSnapshot>>) -> Arc<IndexSnapshot> {
    Arc::clone(&index.borrow())
}

fn publish(
    state: &mut SearchState,
    snapshot: &IndexSnapshot,
    config: &SearchConfig,
    tx: &watch::Sender<Arc<SearchState>>,
) {
    state.recompute(snapshot, config);
    trace!(
        revision = state.revision,
        results = state.results.len(),
        "Live search recomputed"
    );
    tx.send_replace(Arc::new(state.clone()));
}

async fn run(
    mut events: mpsc::UnboundedReceiver<SearchEvent>,
    mut index: watch::Receiver<Arc<IndexSnapshot>>,
    mut origin_feed: watch::Receiver<Option<Position>>,
    config: SearchConfig,
    mut state: SearchState,
    tx: watch::Sender<Arc<SearchState>>,
) {
    let mut pending: Option<(String, Instant)> = None;
    let mut index_open = true;
    let mut origin_open = true;

    loop {
        let deadline = pending.as_ref().map(|(_, at)| *at);
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SearchEvent::Query(text) if config.debounce.is_zero() => {
                        state.query_text = text;
                        publish(&mut state, &current(&index), &config, &tx);
                    }
                    SearchEvent::Query(text) => {
                        pending = Some((text, Instant::now() + config.debounce));
                    }
                    SearchEvent::Origin(origin) => {
                        state.origin = origin;
                        publish(&mut state, &current(&index), &config, &tx);
                    }
                    SearchEvent::Flush => {
                        if let Some((text, _)) = pending.take() {
                            state.query_text = text;
                            publish(&mut state, &current(&index), &config, &tx);
                        }
                    }
                }
            }
            changed = index.changed(), if index_open => {
                if changed.is_err() {
                    debug!("Entity index dropped, live search keeps its last snapshot");
                    index_open = false;
                    continue;
                }
                let snapshot = Arc::clone(&index.borrow_and_update());
                publish(&mut state, &snapshot, &config, &tx);
            }
            changed = origin_feed.changed(), if origin_open => {
                if changed.is_err() {
                    origin_open = false;
                    continue;
                }
                state.origin = *origin_feed.borrow_and_update();
                publish(&mut state, &current(&index), &config, &tx);
            }
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some((text, _)) = pending.take() {
                    state.query_text = text;
                    publish(&mut state, &current(&index), &config, &tx);
                }
            }
        }
    }
    debug!("Live search task finished");
}
