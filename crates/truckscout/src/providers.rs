//! Device-side collaborators: positioning and reverse geocoding.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};
use truckscout_data::Position;

pub use error::ProviderError;

/// Shown when a position cannot be turned into a place name.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum ProviderError {
        #[error("Location permission denied")]
        PermissionDenied,
        #[error("Location services disabled")]
        Disabled,
        #[error("Provider unavailable: {0}")]
        Unavailable(String),
        #[error(transparent)]
        Other(#[from] anyhow::Error),
    }
}

#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// A fresh fix. `Ok(None)` means no fix is available right now.
    async fn current_position(&self) -> Result<Option<Position>, ProviderError>;

    /// The most recent cached fix, used when a fresh one cannot be obtained.
    async fn last_known_position(&self) -> Result<Option<Position>, ProviderError> {
        Ok(None)
    }
}

#[async_trait]
pub trait LabelProvider: Send + Sync {
    /// A human-readable place name for `position`.
    async fn reverse_geocode(&self, position: Position) -> Result<String, ProviderError>;
}

/// Best-effort label: any failure or empty answer becomes [`UNKNOWN_LOCATION`].
pub async fn label_or_placeholder(provider: &dyn LabelProvider, position: Position) -> String {
    match provider.reverse_geocode(position).await {
        Ok(label) if !label.trim().is_empty() => label,
        Ok(_) => {
            debug!(?position, "Empty reverse-geocode answer");
            UNKNOWN_LOCATION.to_string()
        }
        Err(e) => {
            warn!(?position, error = %e, "Reverse geocoding failed");
            UNKNOWN_LOCATION.to_string()
        }
    }
}

/// A provider with a settable fix, for embedding and tests.
#[derive(Debug, Default)]
pub struct StaticPositionProvider {
    current: Mutex<Option<Position>>,
    last_known: Mutex<Option<Position>>,
}

impl StaticPositionProvider {
    pub fn new(current: Option<Position>) -> Self {
        Self {
            current: Mutex::new(current),
            last_known: Mutex::new(current),
        }
    }

    /// Move the device. `None` simulates losing the fix; the last known one is kept.
    pub fn set(&self, position: Option<Position>) {
        if let Ok(mut current) = self.current.lock() {
            *current = position;
        }
        if position.is_some() {
            if let Ok(mut last) = self.last_known.lock() {
                *last = position;
            }
        }
    }
}

#[async_trait]
impl PositionProvider for StaticPositionProvider {
    async fn current_position(&self) -> Result<Option<Position>, ProviderError> {
        self.current
            .lock()
            .map(|p| *p)
            .map_err(|e| ProviderError::Unavailable(e.to_string()))
    }

    async fn last_known_position(&self) -> Result<Option<Position>, ProviderError> {
        self.last_known
            .lock()
            .map(|p| *p)
            .map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}
