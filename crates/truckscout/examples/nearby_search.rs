//! Nearby truck search
//!
//! This example demonstrates the full engine:
//! - Loading trucks from a store into the index
//! - Searching by name, ranked from the device position
//! - Moving the device and re-ranking
//! - A debounced live search session

use std::{sync::Arc, time::Duration};

use truckscout::{
    EngineConfigBuilder, Position, ProximitySearcher, RankedResult,
    data::{InMemoryStore, TestDataConfig, sample_documents},
    providers::StaticPositionProvider,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryStore::new(sample_documents(&TestDataConfig::sample())));
    let device = Arc::new(StaticPositionProvider::new(Some(Position::new(37.0, -122.0)?)));

    let config = EngineConfigBuilder::interactive()
        .refresh_threshold_km(1.0)
        .build()?;
    let searcher = ProximitySearcher::builder()
        .store(store)
        .position_provider(device.clone())
        .config(config)
        .build()?;

    let outcome = searcher.start().await?;
    println!("Loaded: {outcome:?}");

    println!("\nSearching for 'taco' from (37.0, -122.0):");
    print_results(&searcher.search("taco"));

    // Move north past Taco Time
    device.set(Some(Position::new(37.02, -122.0)?));
    searcher.update_position().await;
    println!("\nSearching for 'taco' from (37.02, -122.0):");
    print_results(&searcher.search("taco"));

    // Type-ahead: only the last edit is evaluated
    let mut live = searcher.live_search();
    for text in ["c", "cu", "cur", "curry"] {
        live.set_query(text);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    if let Some(state) = live.changed().await {
        println!("\nLive search for '{}':", state.query_text);
        print_results(&state.results);
    }

    Ok(())
}

fn print_results(results: &[RankedResult]) {
    if results.is_empty() {
        println!("  (no matches)");
    }
    for (i, result) in results.iter().enumerate() {
        let distance = result
            .distance_km
            .map_or_else(|| "unknown distance".to_string(), |d| format!("{d:.2} km"));
        println!(
            "  {}. {} - {} - {}",
            i + 1,
            result.name(),
            distance,
            result.entity.menu().unwrap_or("no menu")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_env() {
        let _ = truckscout::init_logging(tracing::Level::WARN);
    }

    #[test]
    fn test_nearby_search_example() {
        setup_test_env();
        assert!(
            main().is_ok(),
            "Nearby search example should run successfully"
        );
    }
}
