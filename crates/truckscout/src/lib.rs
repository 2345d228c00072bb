//! `TruckScout` - Proximity Search for Mobile Vendors
//!
//! `TruckScout` keeps an in-memory index of entities (food trucks) loaded from a
//! document store, filters them by a case-insensitive name query and ranks the
//! matches by great-circle distance from the device position.
//!
//! # Quick Start
//!
//! ```rust
//! use truckscout::{EntityIndex, Position, SearchConfig, data::Entity, search::search};
//!
//! let index = EntityIndex::new();
//! index.replace_all(vec![
//!     Entity::new("t1", "Taco Hut").with_position(Position::new(37.0, -122.0)?),
//!     Entity::new("t2", "Taco Time").with_position(Position::new(37.01, -122.0)?),
//!     Entity::new("t3", "Burger Bar"),
//! ]);
//!
//! let here = Position::new(37.0, -122.0)?;
//! for result in search(Some(here), "taco", &index.snapshot(), &SearchConfig::default()) {
//!     println!("{} ({:.2} km)", result.name(), result.distance_km.unwrap_or_default());
//! }
//! # Ok::<(), truckscout::error::TruckScoutError>(())
//! ```
//!
//! For the full engine (store loading, refresh on movement, debounced live
//! search) see [`ProximitySearcher`].
//!
//! # Features
//!
//! - **Distance ranking**: Haversine distance on a 6371 km sphere, stable for ties
//! - **Atomic refresh**: Readers see the old or the new index, never a mix
//! - **Stale-load protection**: A slow, superseded fetch never overwrites a newer one
//! - **Live search**: Debounced re-evaluation as the query, origin or index change
//! - **Degrades gracefully**: Store and position failures never break search
use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod config;
mod core;
pub mod error;
pub mod geo;
mod index;
pub mod providers;
pub mod refresh;
pub mod search;

pub use core::{ProximitySearcher, ProximitySearcherBuilder};

pub use config::{EngineConfig, EngineConfigBuilder, SearchConfigBuilder};
pub use index::{EntityIndex, IndexEntry, IndexSnapshot};
pub use refresh::{LoadOutcome, RefreshConfig, RefreshCoordinator, RefreshStatus};
pub use search::{EmptyQueryPolicy, LiveSearch, RankedResult, SearchConfig, SearchState};
pub use truckscout_data as data;
pub use truckscout_data::{Entity, Position};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the `TruckScout` library.
///
/// `RUST_LOG` takes precedence over `level` when set. Safe to call more than
/// once; only the first call installs a subscriber.
///
/// # Examples
///
/// ```rust
/// use tracing::Level;
/// use truckscout::init_logging;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), truckscout::error::TruckScoutError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static (), error::TruckScoutError> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive("tokio=warn".parse()?);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init();
        Ok(())
    })
}
