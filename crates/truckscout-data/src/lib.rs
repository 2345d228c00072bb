//! Data layer for the truckscout proximity search engine.
//!
//! Holds the searchable [`Entity`] model, the mapping from loosely-typed store
//! documents into entities, and the [`EntityStore`] edge the engine pulls from.

pub mod document;
pub mod model;
pub mod store;
pub mod test_data;

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum DataError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
        #[error("Serialization error: {0}")]
        Serde(#[from] serde_json::Error),
        #[error("Invalid entity '{id}': {reason}")]
        InvalidEntity { id: String, reason: String },
        #[error("Invalid position: latitude {latitude}, longitude {longitude}")]
        InvalidPosition { latitude: f64, longitude: f64 },
        #[error("Store error: {0}")]
        Store(String),
        #[error("Entity not found: {0}")]
        NotFound(String),
    }

    pub type Result<T> = std::result::Result<T, DataError>;
}

pub use document::{MappedBatch, RawDocument, map_documents};
pub use error::{DataError, Result};
pub use model::{Attributes, Entity, Position};
pub use store::{EntityStore, InMemoryStore, JsonFileStore};
pub use test_data::{TestDataConfig, sample_documents};
