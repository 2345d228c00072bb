use std::time::Duration;

use crate::{
    error::TruckScoutError,
    refresh::RefreshConfig,
    search::{EmptyQueryPolicy, SearchConfig},
};

const MAX_DEBOUNCE: Duration = Duration::from_secs(5);

/// Complete engine configuration: query policy plus refresh policy.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    pub search: SearchConfig,
    pub refresh: RefreshConfig,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }
}

/// Builder for query engine configuration
#[derive(Debug, Clone, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    /// Set the maximum number of results to return
    pub fn limit(mut self, limit: usize) -> Self {
        self.config.limit = Some(limit);
        self
    }

    /// Set the quiet period after the last keystroke
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.debounce = debounce;
        self
    }

    pub fn empty_query_policy(mut self, policy: EmptyQueryPolicy) -> Self {
        self.config.empty_query_policy = policy;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> SearchConfig {
        self.config
    }
}

/// Builder for creating engine configurations with ergonomic defaults
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Create a builder tuned for type-ahead search (shorter debounce)
    pub fn interactive() -> Self {
        Self::new().debounce(Duration::from_millis(200))
    }

    /// Create a builder where an empty query lists every truck by distance
    pub fn show_all_nearby() -> Self {
        Self::new().empty_query_policy(EmptyQueryPolicy::ShowAll)
    }

    /// Set the maximum number of results to return
    pub fn limit(mut self, limit: usize) -> Self {
        self.config.search.limit = Some(limit);
        self
    }

    /// Set the quiet period after the last query edit (at most 5 s)
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.search.debounce = debounce;
        self
    }

    pub fn empty_query_policy(mut self, policy: EmptyQueryPolicy) -> Self {
        self.config.search.empty_query_policy = policy;
        self
    }

    /// Set how far (km) the origin must move before the index is reloaded
    pub fn refresh_threshold_km(mut self, km: f64) -> Self {
        self.config.refresh.distance_threshold_km = km;
        self
    }

    /// Set the upper bound on a single store fetch
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.refresh.fetch_timeout = timeout;
        self
    }

    /// Treat loaded contents as stale after `max_age`
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.config.refresh.max_age = Some(max_age);
        self
    }

    /// Validate and build the final configuration
    pub fn build(self) -> Result<EngineConfig, TruckScoutError> {
        let EngineConfig { search, refresh } = &self.config;
        let threshold = refresh.distance_threshold_km;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(TruckScoutError::ConfigError(format!(
                "Refresh threshold must be a non-negative distance, got {threshold}"
            )));
        }
        if refresh.fetch_timeout.is_zero() {
            return Err(TruckScoutError::ConfigError(
                "Fetch timeout must be greater than zero".to_string(),
            ));
        }
        if search.debounce > MAX_DEBOUNCE {
            return Err(TruckScoutError::ConfigError(format!(
                "Debounce must be at most {MAX_DEBOUNCE:?}, got {:?}",
                search.debounce
            )));
        }
        Ok(self.config)
    }
}
