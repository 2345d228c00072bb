//! The main [`ProximitySearcher`] interface.
//!
//! It ties the pieces together: an entity store feeding a [`RefreshCoordinator`],
//! the [`EntityIndex`] it fills, a position provider supplying the origin, and the
//! query engine ranking index contents against that origin.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use truckscout::{
//!     Position, ProximitySearcher,
//!     data::{InMemoryStore, TestDataConfig, sample_documents},
//!     providers::StaticPositionProvider,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), truckscout::error::TruckScoutError> {
//! let store = Arc::new(InMemoryStore::new(sample_documents(&TestDataConfig::minimal())));
//! let device = Arc::new(StaticPositionProvider::new(Some(Position::new(37.0, -122.0)?)));
//!
//! let searcher = ProximitySearcher::builder()
//!     .store(store)
//!     .position_provider(device)
//!     .build()?;
//! searcher.start().await?;
//!
//! let names: Vec<_> = searcher.search("taco").iter().map(|r| r.name().to_string()).collect();
//! assert_eq!(names, ["Taco Hut", "Taco Time"]);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, instrument, warn};
use truckscout_data::{EntityStore, Position};

use crate::{
    config::EngineConfig,
    error::{Result, TruckScoutError},
    index::EntityIndex,
    providers::{
        LabelProvider, PositionProvider, StaticPositionProvider, UNKNOWN_LOCATION,
        label_or_placeholder,
    },
    refresh::{self, LoadOutcome, RefreshCoordinator, RefreshError, RefreshStatus},
    search::{LiveSearch, RankedResult, search},
};

/// Proximity search over a store of entities, ranked from the device position.
///
/// Search never fails: when the store is unreachable the previous index contents
/// are searched, and when no position is available results come back unranked.
pub struct ProximitySearcher {
    index: Arc<EntityIndex>,
    store: Arc<dyn EntityStore>,
    positions: Arc<dyn PositionProvider>,
    labels: Option<Arc<dyn LabelProvider>>,
    coordinator: RefreshCoordinator,
    origin: watch::Sender<Option<Position>>,
    config: EngineConfig,
}

impl std::fmt::Debug for ProximitySearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProximitySearcher")
            .field("index", &self.index)
            .field("coordinator", &self.coordinator)
            .field("origin", &*self.origin.borrow())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProximitySearcher {
    pub fn builder() -> ProximitySearcherBuilder {
        ProximitySearcherBuilder::new()
    }

    /// Cold start: obtain a position, then load the index.
    ///
    /// A missing position is not an error; the load still runs and results are
    /// unranked until a fix arrives.
    #[instrument(name = "Start ProximitySearcher", level = "info", skip(self))]
    pub async fn start(&self) -> Result<LoadOutcome> {
        let t_start = std::time::Instant::now();
        if let Some(origin) = self.locate().await {
            self.set_origin(origin);
            self.coordinator.observe_position(Some(origin));
        }
        let outcome = self.refresh().await?;
        info!(
            elapsed_seconds = ?t_start.elapsed(),
            ?outcome,
            "ProximitySearcher start complete"
        );
        Ok(outcome)
    }

    /// Reload the index from the store. On failure the previous contents stay searchable.
    pub async fn refresh(&self) -> Result<LoadOutcome> {
        Ok(self.coordinator.load().await?)
    }

    /// Ask the position provider for a new fix and move the origin to it.
    ///
    /// Returns the origin in effect afterwards. Reloads the index when the origin
    /// moved past the configured threshold; a failed reload is reported through
    /// [`status`](Self::status) rather than returned.
    #[instrument(name = "Update position", level = "debug", skip(self))]
    pub async fn update_position(&self) -> Option<Position> {
        match self.locate().await {
            Some(origin) => {
                self.move_to(origin).await;
                Some(origin)
            }
            None => self.origin(),
        }
    }

    /// Move the origin to a fix obtained elsewhere. Out-of-range positions are ignored.
    pub async fn move_to(&self, origin: Position) {
        if !origin.is_valid() {
            warn!(?origin, "Ignoring out-of-range origin");
            return;
        }
        self.set_origin(origin);
        if self.coordinator.observe_position(Some(origin)) {
            if let Err(e) = self.coordinator.load().await {
                warn!(error = %e, "Refresh after position change failed");
            }
        }
    }

    fn set_origin(&self, origin: Position) {
        self.origin.send_replace(Some(origin));
    }

    async fn locate(&self) -> Option<Position> {
        match refresh::locate(self.positions.as_ref()).await {
            Ok(origin) => Some(origin),
            Err(e) => {
                warn!(error = %e, "No position available, results will be unranked");
                None
            }
        }
    }

    /// Filter by `query` and rank from the current origin.
    pub fn search(&self, query: &str) -> Vec<RankedResult> {
        search(
            self.origin(),
            query,
            &self.index.snapshot(),
            &self.config.search,
        )
    }

    /// An interactive session that follows this searcher's origin and index.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn live_search(&self) -> LiveSearch {
        LiveSearch::spawn_following(
            &self.index,
            self.config.search.clone(),
            self.origin.subscribe(),
        )
    }

    pub fn origin(&self) -> Option<Position> {
        *self.origin.borrow()
    }

    /// A place name for the current origin, or [`UNKNOWN_LOCATION`].
    pub async fn origin_label(&self) -> String {
        match (self.origin(), &self.labels) {
            (Some(origin), Some(labels)) => label_or_placeholder(labels.as_ref(), origin).await,
            _ => UNKNOWN_LOCATION.to_string(),
        }
    }

    /// Write the device position to the store as entity `id`'s location.
    ///
    /// The local index entry is updated as well, so searches see the move before
    /// the next refresh.
    #[instrument(name = "Publish position", level = "info", skip(self))]
    pub async fn publish_position(&self, id: &str) -> Result<Position> {
        let position = refresh::locate(self.positions.as_ref()).await?;
        self.store.update_position(id, position).await?;

        match self.index.get(id) {
            Some(entity) => {
                let moved = Arc::unwrap_or_clone(entity).with_position(position);
                self.index.upsert(moved);
            }
            None => info!(id, "Entity not indexed yet, visible after next refresh"),
        }
        info!(id, ?position, "Published position");
        Ok(position)
    }

    pub fn status(&self) -> RefreshStatus {
        self.coordinator.status()
    }

    pub fn last_error(&self) -> Option<RefreshError> {
        self.coordinator.last_error()
    }

    pub fn index(&self) -> &Arc<EntityIndex> {
        &self.index
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Builder for creating a [`ProximitySearcher`].
#[derive(Default)]
pub struct ProximitySearcherBuilder {
    store: Option<Arc<dyn EntityStore>>,
    positions: Option<Arc<dyn PositionProvider>>,
    labels: Option<Arc<dyn LabelProvider>>,
    index: Option<Arc<EntityIndex>>,
    config: EngineConfig,
}

impl ProximitySearcherBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entity store (required).
    #[must_use]
    pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the position provider. Without one, results stay unranked until
    /// [`ProximitySearcher::move_to`] is called.
    #[must_use]
    pub fn position_provider(mut self, positions: Arc<dyn PositionProvider>) -> Self {
        self.positions = Some(positions);
        self
    }

    #[must_use]
    pub fn label_provider(mut self, labels: Arc<dyn LabelProvider>) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Share an existing index instead of creating a fresh one.
    #[must_use]
    pub fn index(mut self, index: Arc<EntityIndex>) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the `ProximitySearcher`.
    pub fn build(self) -> Result<ProximitySearcher> {
        let store = self.store.ok_or_else(|| {
            TruckScoutError::ConfigError("An entity store is required".to_string())
        })?;
        let positions = self
            .positions
            .unwrap_or_else(|| Arc::new(StaticPositionProvider::default()));
        let index = self.index.unwrap_or_default();
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&index),
            self.config.refresh.clone(),
        );
        let (origin, _) = watch::channel(None);

        Ok(ProximitySearcher {
            index,
            store,
            positions,
            labels: self.labels,
            coordinator,
            origin,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use truckscout_data::{InMemoryStore, TestDataConfig, sample_documents};

    use super::*;

    fn pos(lat: f64, lon: f64) -> Position {
        Position::new(lat, lon).unwrap()
    }

    fn searcher(device: Option<Position>) -> (ProximitySearcher, Arc<StaticPositionProvider>) {
        let store = Arc::new(InMemoryStore::new(sample_documents(&TestDataConfig::minimal())));
        let device = Arc::new(StaticPositionProvider::new(device));
        let searcher = ProximitySearcher::builder()
            .store(store)
            .position_provider(device.clone())
            .build()
            .unwrap();
        (searcher, device)
    }

    #[test]
    fn test_builder_requires_store() {
        assert!(matches!(
            ProximitySearcher::builder().build(),
            Err(TruckScoutError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_start_without_position_is_unranked() {
        let (searcher, _) = searcher(None);
        searcher.start().await.unwrap();

        assert_eq!(searcher.origin(), None);
        assert_eq!(searcher.status(), RefreshStatus::Ready);
        let results = searcher.search("taco");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.distance_km.is_none()));
        assert_eq!(searcher.origin_label().await, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn test_update_position_reranks() {
        let (searcher, device) = searcher(Some(pos(37.0, -122.0)));
        searcher.start().await.unwrap();
        assert_eq!(searcher.search("taco")[0].id(), "t1");

        device.set(Some(pos(37.02, -122.0)));
        assert_eq!(searcher.update_position().await, Some(pos(37.02, -122.0)));
        assert_eq!(searcher.search("taco")[0].id(), "t2");
    }

    #[tokio::test]
    async fn test_publish_position_updates_index() {
        let (searcher, device) = searcher(Some(pos(37.0, -122.0)));
        searcher.start().await.unwrap();
        assert!(!searcher.index().snapshot().get("t3").unwrap().is_locatable());

        device.set(Some(pos(37.001, -122.0)));
        let published = searcher.publish_position("t3").await.unwrap();
        assert_eq!(published, pos(37.001, -122.0));
        assert!(searcher.index().snapshot().get("t3").unwrap().is_locatable());

        // The store has it too.
        searcher.refresh().await.unwrap();
        assert_eq!(searcher.index().get("t3").unwrap().position, Some(published));
    }

    #[tokio::test]
    async fn test_publish_position_unknown_id() {
        let (searcher, _) = searcher(Some(pos(37.0, -122.0)));
        assert!(matches!(
            searcher.publish_position("nope").await,
            Err(TruckScoutError::Data(_))
        ));
    }
}
