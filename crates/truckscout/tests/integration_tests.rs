//! Integration tests for `TruckScout` proximity search
//!
//! These tests run against the public API with in-memory collaborators and the
//! bundled sample fixtures.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use truckscout::{
    EmptyQueryPolicy, EngineConfigBuilder, EntityIndex, Position, ProximitySearcher,
    RefreshStatus, SearchConfig,
    data::{
        DataError, Entity, EntityStore, InMemoryStore, JsonFileStore, RawDocument,
        Result as DataResult, TestDataConfig, sample_documents,
    },
    providers::{LabelProvider, ProviderError, StaticPositionProvider, UNKNOWN_LOCATION},
    refresh::RefreshError,
    search::search,
};

fn setup_test_env() {
    let _ = truckscout::init_logging(tracing::Level::WARN);
}

fn pos(lat: f64, lon: f64) -> Position {
    Position::new(lat, lon).expect("valid test position")
}

/// Wraps an in-memory store and fails every fetch while `offline` is set.
struct FlakyStore {
    inner: InMemoryStore,
    offline: AtomicBool,
}

impl FlakyStore {
    fn new(docs: Vec<RawDocument>) -> Self {
        Self {
            inner: InMemoryStore::new(docs),
            offline: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn fetch_all(&self) -> DataResult<Vec<RawDocument>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DataError::Store("network unreachable".into()));
        }
        self.inner.fetch_all().await
    }

    async fn update_position(&self, id: &str, position: Position) -> DataResult<()> {
        self.inner.update_position(id, position).await
    }
}

struct RecordingLabels(Mutex<Vec<Position>>);

#[async_trait]
impl LabelProvider for RecordingLabels {
    async fn reverse_geocode(&self, position: Position) -> Result<String, ProviderError> {
        self.0.lock().unwrap().push(position);
        Ok("Mission District".to_string())
    }
}

#[tokio::test]
async fn test_full_workflow() {
    setup_test_env();

    let store = Arc::new(InMemoryStore::new(sample_documents(&TestDataConfig::minimal())));
    let device = Arc::new(StaticPositionProvider::new(Some(pos(37.0, -122.0))));
    let searcher = ProximitySearcher::builder()
        .store(store)
        .position_provider(device)
        .build()
        .expect("Should create searcher");

    // 1. Cold start
    searcher.start().await.expect("Start should succeed");
    assert_eq!(searcher.status(), RefreshStatus::Ready);
    assert_eq!(searcher.index().len(), 3);

    // 2. Search ranked from the device
    let results = searcher.search("Taco");
    let ids: Vec<_> = results.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["t1", "t2"]);
    assert_eq!(results[0].distance_km, Some(0.0));
    let d = results[1].distance_km.expect("Taco Time is located");
    assert!((d - 1.11).abs() < 0.01, "got {d}");

    // 3. Empty query shows nothing by default
    assert!(searcher.search("").is_empty());
    assert!(searcher.search("   ").is_empty());

    // 4. Unlocatable truck is still searchable
    let burgers = searcher.search("burger");
    assert_eq!(burgers.len(), 1);
    assert_eq!(burgers[0].distance_km, None);
}

#[tokio::test]
async fn test_refresh_failure_keeps_previous_results() {
    setup_test_env();

    let store = Arc::new(FlakyStore::new(sample_documents(&TestDataConfig::minimal())));
    let searcher = ProximitySearcher::builder()
        .store(store.clone())
        .position_provider(Arc::new(StaticPositionProvider::new(Some(pos(37.0, -122.0)))))
        .build()
        .expect("Should create searcher");
    searcher.start().await.expect("Start should succeed");
    let before = searcher.index().all();

    store.offline.store(true, Ordering::SeqCst);
    let err = searcher.refresh().await.expect_err("Refresh should fail");
    assert!(err.to_string().contains("network unreachable"));

    assert!(matches!(searcher.status(), RefreshStatus::Failed { .. }));
    assert!(matches!(
        searcher.last_error(),
        Some(RefreshError::FetchFailed(_))
    ));
    assert_eq!(searcher.index().all(), before);
    assert_eq!(searcher.search("taco").len(), 2);

    // Retry once the store is back.
    store.offline.store(false, Ordering::SeqCst);
    searcher.refresh().await.expect("Retry should succeed");
    assert_eq!(searcher.status(), RefreshStatus::Ready);
}

#[tokio::test]
async fn test_no_position_degrades_to_unranked() {
    setup_test_env();

    let store = Arc::new(InMemoryStore::new(sample_documents(&TestDataConfig::minimal())));
    let searcher = ProximitySearcher::builder()
        .store(store)
        .build()
        .expect("Should create searcher");
    searcher.start().await.expect("Start should succeed without a position");

    let results = searcher.search("a");
    let ids: Vec<_> = results.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["t1", "t2", "t3"]);
    assert!(results.iter().all(|r| r.distance_km.is_none()));

    // A fix arriving later ranks the same query.
    searcher.move_to(pos(37.02, -122.0)).await;
    assert_eq!(searcher.search("taco")[0].id(), "t2");
}

#[tokio::test]
async fn test_refresh_threshold_on_movement() {
    setup_test_env();

    let store = Arc::new(InMemoryStore::new(sample_documents(&TestDataConfig::minimal())));
    let device = Arc::new(StaticPositionProvider::new(Some(pos(37.0, -122.0))));
    let config = EngineConfigBuilder::new()
        .refresh_threshold_km(1.0)
        .build()
        .expect("Valid config");
    let searcher = ProximitySearcher::builder()
        .store(store.clone())
        .position_provider(device.clone())
        .config(config)
        .build()
        .expect("Should create searcher");
    searcher.start().await.expect("Start should succeed");

    store
        .put(RawDocument::new("t9").with_field("name", "Taco Nueve"))
        .await;

    // A short hop does not reload.
    device.set(Some(pos(37.005, -122.0)));
    searcher.update_position().await;
    assert!(searcher.index().get("t9").is_none());

    // Moving past the threshold does.
    device.set(Some(pos(37.02, -122.0)));
    searcher.update_position().await;
    assert!(searcher.index().get("t9").is_some());
}

#[tokio::test]
async fn test_origin_label() {
    setup_test_env();

    let store = Arc::new(InMemoryStore::default());
    let labels = Arc::new(RecordingLabels(Mutex::new(Vec::new())));
    let searcher = ProximitySearcher::builder()
        .store(store)
        .label_provider(labels.clone())
        .build()
        .expect("Should create searcher");

    assert_eq!(searcher.origin_label().await, UNKNOWN_LOCATION);

    searcher.move_to(pos(37.76, -122.42)).await;
    assert_eq!(searcher.origin_label().await, "Mission District");
    assert_eq!(labels.0.lock().unwrap().as_slice(), &[pos(37.76, -122.42)]);
}

#[tokio::test(start_paused = true)]
async fn test_live_search_follows_searcher() {
    setup_test_env();

    let store = Arc::new(InMemoryStore::new(sample_documents(&TestDataConfig::minimal())));
    let device = Arc::new(StaticPositionProvider::new(Some(pos(37.0, -122.0))));
    let config = EngineConfigBuilder::interactive()
        .build()
        .expect("Valid config");
    let searcher = ProximitySearcher::builder()
        .store(store)
        .position_provider(device.clone())
        .config(config)
        .build()
        .expect("Should create searcher");
    searcher.start().await.expect("Start should succeed");

    let mut live = searcher.live_search();
    let initial = live.state().revision;
    live.set_query("t");
    live.set_query("ta");
    live.set_query("taco");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        live.state().revision,
        initial,
        "debounce window still open"
    );

    let state = live.changed().await.expect("Session alive");
    assert_eq!(state.query_text, "taco");
    assert_eq!(state.results[0].id(), "t1");

    // Device moves: the session re-ranks without a query edit.
    device.set(Some(pos(37.02, -122.0)));
    searcher.update_position().await;
    let mut state = live.changed().await.expect("Session alive");
    // The reload that follows the move publishes again; settle on the latest.
    while state.origin != Some(pos(37.02, -122.0)) {
        state = live.changed().await.expect("Session alive");
    }
    assert_eq!(live.results()[0].id(), "t2");
}

#[tokio::test]
async fn test_json_store_round_trip_through_engine() {
    setup_test_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("trucks.json");
    let store = Arc::new(
        JsonFileStore::create(path.clone(), &sample_documents(&TestDataConfig::sample()))
            .await
            .expect("Should write store file"),
    );
    let device = Arc::new(StaticPositionProvider::new(Some(pos(37.0, -122.0))));
    let searcher = ProximitySearcher::builder()
        .store(store.clone())
        .position_provider(device.clone())
        .build()
        .expect("Should create searcher");

    let outcome = searcher.start().await.expect("Start should succeed");
    assert_eq!(
        outcome,
        truckscout::LoadOutcome::Loaded {
            entities: 6,
            rejected: 1
        }
    );

    device.set(Some(pos(37.05, -122.05)));
    searcher
        .publish_position("t3")
        .await
        .expect("Publish should succeed");

    let reread = JsonFileStore::new(path).fetch_all().await.expect("Reread");
    let burger = reread.iter().find(|d| d.id == "t3").expect("t3 present");
    let entity = Entity::try_from(burger.clone()).expect("t3 maps");
    assert_eq!(entity.position, Some(pos(37.05, -122.05)));
}

#[test]
fn test_search_properties_on_sample_data() {
    setup_test_env();

    let index = EntityIndex::new();
    let batch = truckscout::data::map_documents(sample_documents(&TestDataConfig::sample()));
    index.replace_all(batch.entities);
    let snapshot = index.snapshot();
    let config = SearchConfig {
        empty_query_policy: EmptyQueryPolicy::ShowAll,
        ..SearchConfig::default()
    };

    for origin in [pos(37.0, -122.0), pos(36.9, -121.9), pos(37.1, -122.1)] {
        let results = search(Some(origin), "", &snapshot, &config);
        assert_eq!(results.len(), snapshot.len());

        // Located results are non-decreasing and precede unlocated ones.
        let first_unlocated = results
            .iter()
            .position(|r| r.distance_km.is_none())
            .unwrap_or(results.len());
        assert!(results[first_unlocated..].iter().all(|r| r.distance_km.is_none()));
        for pair in results[..first_unlocated].windows(2) {
            assert!(pair[0].distance_km <= pair[1].distance_km);
        }
    }

    // Filtering is a case-insensitive substring match.
    for query in ["TACO", "taco", "Taco", " taco "] {
        let names: Vec<_> = search(None, query, &snapshot, &config)
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["Taco Hut", "Taco Time"]);
    }
}
