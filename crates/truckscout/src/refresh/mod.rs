//! Refresh coordination: when and how the entity index is repopulated.
//!
//! ```text
//! Idle -> Loading -> Ready
//!                 -> Failed -> Loading (retry)
//! Ready -> Loading (explicit refresh, or origin moved past the threshold)
//! ```
//!
//! Every `load()` takes a generation number. A load whose generation is no longer
//! the newest when it completes is discarded, so a slow, older request can never
//! overwrite a newer one. A failed load keeps the previous index contents.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use truckscout_data::{EntityStore, Position, map_documents};

use crate::{
    geo::distance_km,
    index::EntityIndex,
    providers::{PositionProvider, ProviderError},
};

pub use error::RefreshError;

mod error {
    use std::time::Duration;

    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum RefreshError {
        #[error("Fetch failed: {0}")]
        FetchFailed(String),
        #[error("Fetch timed out after {0:?}")]
        Timeout(Duration),
        #[error("Position unavailable: {0}")]
        PositionUnavailable(String),
        #[error("Load cancelled before completing")]
        Cancelled,
    }
}

/// Configuration for the refresh coordinator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefreshConfig {
    /// A new origin at least this far (km) from the one that triggered the last
    /// refresh triggers another. `0.0` refreshes on every fix.
    pub distance_threshold_km: f64,
    /// Upper bound on a single store fetch.
    pub fetch_timeout: Duration,
    /// Contents older than this are considered stale; `None` never expires.
    pub max_age: Option<Duration>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            distance_threshold_km: 0.0,
            fetch_timeout: Duration::from_secs(10),
            max_age: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RefreshStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The index now holds the fetched entities.
    Loaded { entities: usize, rejected: usize },
    /// A newer load was issued while this one was in flight; the result was dropped.
    Superseded,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    status: RefreshStatus,
    last_error: Option<RefreshError>,
    last_loaded_at: Option<DateTime<Utc>>,
    refresh_origin: Option<Position>,
}

pub struct RefreshCoordinator {
    store: Arc<dyn EntityStore>,
    index: Arc<EntityIndex>,
    config: RefreshConfig,
    generation: AtomicU64,
    state: Mutex<CoordinatorState>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("config", &self.config)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn EntityStore>, index: Arc<EntityIndex>, config: RefreshConfig) -> Self {
        Self {
            store,
            index,
            config,
            generation: AtomicU64::new(0),
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn index(&self) -> &Arc<EntityIndex> {
        &self.index
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn status(&self) -> RefreshStatus {
        self.state().status.clone()
    }

    /// The error recorded by the most recent failed load, cleared by a successful one.
    pub fn last_error(&self) -> Option<RefreshError> {
        self.state().last_error.clone()
    }

    pub fn last_loaded_at(&self) -> Option<DateTime<Utc>> {
        self.state().last_loaded_at
    }

    /// Fetch every entity from the store and swap them into the index.
    #[instrument(name = "Load entities", level = "info", skip(self))]
    pub async fn load(&self) -> Result<LoadOutcome, RefreshError> {
        let (generation, previous) = {
            let mut state = self.state();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let previous = std::mem::replace(&mut state.status, RefreshStatus::Loading);
            (generation, previous)
        };
        let mut guard = CancelGuard {
            coordinator: self,
            generation,
            previous: Some(previous),
        };
        let t_load = std::time::Instant::now();

        let fetched = match tokio::time::timeout(self.config.fetch_timeout, self.store.fetch_all())
            .await
        {
            Ok(Ok(docs)) => Ok(docs),
            Ok(Err(e)) => Err(RefreshError::FetchFailed(e.to_string())),
            Err(_) => Err(RefreshError::Timeout(self.config.fetch_timeout)),
        };
        guard.disarm();

        // Check and apply under the lock so two completing loads cannot interleave.
        let mut state = self.state();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Discarding superseded load");
            return Ok(LoadOutcome::Superseded);
        }

        match fetched {
            Ok(docs) => {
                let batch = map_documents(docs);
                let outcome = LoadOutcome::Loaded {
                    entities: batch.entities.len(),
                    rejected: batch.rejected.len(),
                };
                self.index.replace_all(batch.entities);
                state.status = RefreshStatus::Ready;
                state.last_error = None;
                state.last_loaded_at = Some(Utc::now());
                info!(
                    generation,
                    ?outcome,
                    elapsed = ?t_load.elapsed(),
                    "Entity load complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(generation, error = %e, "Entity load failed, keeping previous index");
                state.status = RefreshStatus::Failed {
                    message: e.to_string(),
                };
                state.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Whether moving to `origin` should trigger a refresh, without recording it.
    pub fn should_refresh_for(&self, origin: Position) -> bool {
        if !origin.is_valid() {
            return false;
        }
        match self.state().refresh_origin {
            None => true,
            Some(previous) => distance_km(previous, origin) >= self.config.distance_threshold_km,
        }
    }

    /// Record a new origin. Returns `true` when it should trigger a refresh, in
    /// which case it becomes the reference point for the next comparison.
    pub fn observe_position(&self, origin: Option<Position>) -> bool {
        let Some(origin) = origin.filter(Position::is_valid) else {
            return false;
        };
        let trigger = self.should_refresh_for(origin);
        if trigger {
            self.state().refresh_origin = Some(origin);
        }
        debug!(?origin, trigger, "Observed position");
        trigger
    }

    /// Whether the index should be (re)loaded: never loaded, last load failed, or
    /// contents older than `max_age`.
    pub fn needs_refresh(&self) -> bool {
        let state = self.state();
        match (&state.status, state.last_loaded_at) {
            (RefreshStatus::Loading, _) => false,
            (RefreshStatus::Idle | RefreshStatus::Failed { .. }, _) | (_, None) => true,
            (RefreshStatus::Ready, Some(at)) => self.config.max_age.is_some_and(|max_age| {
                chrono::Duration::from_std(max_age)
                    .is_ok_and(|max_age| Utc::now().signed_duration_since(at) > max_age)
            }),
        }
    }
}

/// Puts the status back when a `load()` future is dropped mid-fetch.
///
/// Only the newest load may touch the status. If it was started over another
/// in-flight load, that older load will be discarded as superseded, so the status
/// becomes `Failed` and a later `needs_refresh()` asks for a reload.
struct CancelGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    generation: u64,
    previous: Option<RefreshStatus>,
}

impl CancelGuard<'_> {
    fn disarm(&mut self) {
        self.previous = None;
    }
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        let mut state = self.coordinator.state();
        if self.coordinator.generation.load(Ordering::SeqCst) != self.generation {
            return;
        }
        debug!(generation = self.generation, ?previous, "Load cancelled");
        state.status = match previous {
            RefreshStatus::Loading => {
                let e = RefreshError::Cancelled;
                let failed = RefreshStatus::Failed {
                    message: e.to_string(),
                };
                state.last_error = Some(e);
                failed
            }
            other => other,
        };
    }
}

/// Get the device position, falling back to the last known fix.
///
/// Failures here only disable ranking, so the caller keeps going with no origin.
pub async fn locate(provider: &dyn PositionProvider) -> Result<Position, RefreshError> {
    let current_err = match provider.current_position().await {
        Ok(Some(position)) if position.is_valid() => return Ok(position),
        Ok(Some(position)) => format!("provider returned out-of-range fix {position:?}"),
        Ok(None) => "no current fix".to_string(),
        Err(e) => e.to_string(),
    };
    debug!(reason = %current_err, "Falling back to last known position");

    match provider.last_known_position().await {
        Ok(Some(position)) if position.is_valid() => Ok(position),
        Ok(_) => Err(RefreshError::PositionUnavailable(current_err)),
        Err(e @ (ProviderError::PermissionDenied | ProviderError::Disabled)) => {
            Err(RefreshError::PositionUnavailable(e.to_string()))
        }
        Err(e) => Err(RefreshError::PositionUnavailable(format!(
            "{current_err}; last known: {e}"
        ))),
    }
}
