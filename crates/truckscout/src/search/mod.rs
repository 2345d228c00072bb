//! Query engine: filter by name, rank by distance from the origin.
//!
//! [`search`] is the pure, infallible core. [`LiveSearch`] wraps it in a
//! background task that re-evaluates as the query text, origin or index change,
//! debouncing query edits.

mod live;

use std::{sync::Arc, time::Duration};

use tracing::{trace, warn};
use truckscout_data::{Entity, Position};

use crate::{geo::distance_km, index::IndexSnapshot};

pub use live::LiveSearch;

/// What an empty (or whitespace-only) query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EmptyQueryPolicy {
    /// No results until the user types something.
    #[default]
    ShowNothing,
    /// Every entity, ranked by distance when an origin is known.
    ShowAll,
}

/// Configuration for the query engine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchConfig {
    pub empty_query_policy: EmptyQueryPolicy,
    /// Quiet period after the last query edit before a live search re-evaluates.
    pub debounce: Duration,
    /// Maximum number of results; `None` returns every match.
    pub limit: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            empty_query_policy: EmptyQueryPolicy::ShowNothing,
            debounce: Duration::from_millis(250),
            limit: None,
        }
    }
}

impl SearchConfig {
    pub fn builder() -> crate::SearchConfigBuilder {
        crate::SearchConfigBuilder::new()
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub entity: Arc<Entity>,
    /// Distance from the origin; `None` when there is no origin or the entity is unlocatable.
    pub distance_km: Option<f64>,
}

impl RankedResult {
    pub fn id(&self) -> &str {
        &self.entity.id
    }

    pub fn name(&self) -> &str {
        &self.entity.name
    }
}

/// Session-scoped search inputs and their latest output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub origin: Option<Position>,
    pub query_text: String,
    pub results: Vec<RankedResult>,
    /// Number of times `results` has been recomputed.
    pub revision: u64,
}

impl SearchState {
    pub fn recompute(&mut self, index: &IndexSnapshot, config: &SearchConfig) {
        self.results = search(self.origin, &self.query_text, index, config);
        self.revision += 1;
    }
}

fn matches_query(entity: &Entity, needle_lower: &str) -> bool {
    needle_lower.is_empty() || entity.name.to_lowercase().contains(needle_lower)
}

/// Filter `index` by `query` and rank by distance from `origin`.
///
/// - An entity matches when its name contains the trimmed query, ignoring case.
/// - With an origin, located matches come first in ascending distance; ties and
///   unlocatable matches keep index order, unlocatable ones after all located ones.
/// - Without an origin, matches are returned in index order with no distance.
/// - An empty query follows [`SearchConfig::empty_query_policy`].
///
/// # Examples
///
/// ```rust
/// use truckscout::{EntityIndex, Position, SearchConfig, data::Entity, search::search};
///
/// let index = EntityIndex::new();
/// index.replace_all(vec![
///     Entity::new("t1", "Taco Hut").with_position(Position::new(37.0, -122.0)?),
///     Entity::new("t2", "Taco Time").with_position(Position::new(37.01, -122.0)?),
///     Entity::new("t3", "Burger Bar"),
/// ]);
///
/// let origin = Position::new(37.0, -122.0)?;
/// let results = search(Some(origin), "taco", &index.snapshot(), &SearchConfig::default());
/// let names: Vec<_> = results.iter().map(|r| r.name()).collect();
/// assert_eq!(names, ["Taco Hut", "Taco Time"]);
/// # Ok::<(), truckscout::data::DataError>(())
/// ```
pub fn search(
    origin: Option<Position>,
    query: &str,
    index: &IndexSnapshot,
    config: &SearchConfig,
) -> Vec<RankedResult> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() && config.empty_query_policy == EmptyQueryPolicy::ShowNothing {
        return Vec::new();
    }

    let origin = origin.filter(|o| {
        let valid = o.is_valid();
        if !valid {
            warn!(?o, "Ignoring out-of-range origin");
        }
        valid
    });

    let matches = index
        .entries()
        .iter()
        .filter(|entry| matches_query(&entry.entity, &needle));

    let mut results: Vec<RankedResult> = match origin {
        None => matches
            .map(|entry| RankedResult {
                entity: Arc::clone(&entry.entity),
                distance_km: None,
            })
            .collect(),
        Some(origin) => {
            let mut located = Vec::new();
            let mut unlocated = Vec::new();
            for entry in matches {
                let result = RankedResult {
                    entity: Arc::clone(&entry.entity),
                    distance_km: entry.location.map(|at| distance_km(origin, at)),
                };
                if result.distance_km.is_some() {
                    located.push(result);
                } else {
                    unlocated.push(result);
                }
            }
            // Stable sort keeps index order for equal distances.
            located.sort_by(|a, b| {
                a.distance_km
                    .unwrap_or(f64::MAX)
                    .total_cmp(&b.distance_km.unwrap_or(f64::MAX))
            });
            located.extend(unlocated);
            located
        }
    };

    if let Some(limit) = config.limit {
        results.truncate(limit);
    }
    trace!(query, results = results.len(), "Search evaluated");
    results
}
