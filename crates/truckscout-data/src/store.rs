//! The external document store the engine reads entities from.
//!
//! The engine only needs a bulk read (`fetch_all`) plus a single-field write for
//! owners publishing their truck's position. Two implementations ship here: an
//! in-memory store for tests and embedding, and a JSON file store for demos.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::{
    DataError, Result,
    document::{LATITUDE_FIELD, LONGITUDE_FIELD, RawDocument},
    model::Position,
};

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Read every document. No filtering is pushed down.
    async fn fetch_all(&self) -> Result<Vec<RawDocument>>;

    /// Overwrite the coordinate fields of one document.
    async fn update_position(&self, id: &str, position: Position) -> Result<()>;
}

/// Documents held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    docs: RwLock<Vec<RawDocument>>,
}

impl InMemoryStore {
    pub fn new(docs: impl IntoIterator<Item = RawDocument>) -> Self {
        Self {
            docs: RwLock::new(docs.into_iter().collect()),
        }
    }

    /// Insert a document, replacing any existing one with the same id.
    pub async fn put(&self, doc: RawDocument) {
        let mut docs = self.docs.write().await;
        match docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
    }

    pub async fn delete(&self, id: &str) -> bool {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        docs.len() != before
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn fetch_all(&self) -> Result<Vec<RawDocument>> {
        let docs = self.docs.read().await.clone();
        debug!(count = docs.len(), "Fetched documents from memory");
        Ok(docs)
    }

    async fn update_position(&self, id: &str, position: Position) -> Result<()> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| DataError::NotFound(id.to_string()))?;
        doc.set_position(position);
        Ok(())
    }
}

/// Documents stored in a JSON file.
///
/// The file holds either an array of `{"id": ..., ...}` objects or an object keyed
/// by document id. Array elements that are not documents (no string `id`, not an
/// object) are skipped on read and left untouched by position updates.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `docs` to `path`, creating or truncating the file.
    pub async fn create(path: impl Into<PathBuf>, docs: &[RawDocument]) -> Result<Self> {
        let store = Self::new(path);
        store.write_value(docs).await?;
        Ok(store)
    }

    async fn read_value(&self) -> Result<Value> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_value<T: serde::Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

fn parse_documents(value: Value) -> Result<Vec<RawDocument>> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(element, item)| {
                serde_json::from_value(item)
                    .inspect_err(|e| {
                        warn!(element, error = %e, "Skipping malformed store document");
                    })
                    .ok()
            })
            .collect()),
        Value::Object(by_id) => Ok(by_id
            .into_iter()
            .map(|(id, fields)| RawDocument {
                id,
                fields: match fields {
                    Value::Object(fields) => fields,
                    _ => Map::new(),
                },
            })
            .collect()),
        other => Err(not_a_collection(&other)),
    }
}

/// The field map of document `id`, in either file layout.
fn document_fields_mut<'a>(value: &'a mut Value, id: &str) -> Result<&'a mut Map<String, Value>> {
    let fields = match value {
        Value::Array(items) => items
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|doc| doc.get("id").and_then(Value::as_str) == Some(id)),
        Value::Object(by_id) => by_id.get_mut(id).and_then(Value::as_object_mut),
        other => return Err(not_a_collection(other)),
    };
    fields.ok_or_else(|| DataError::NotFound(id.to_string()))
}

fn not_a_collection(value: &Value) -> DataError {
    DataError::Store(format!(
        "expected a JSON array or object of documents, found {value}"
    ))
}

#[async_trait]
impl EntityStore for JsonFileStore {
    #[instrument(name = "Read JSON store", level = "debug", skip(self), fields(path = ?self.path))]
    async fn fetch_all(&self) -> Result<Vec<RawDocument>> {
        let docs = parse_documents(self.read_value().await?)?;
        debug!(count = docs.len(), "Fetched documents from file");
        Ok(docs)
    }

    #[instrument(name = "Update position in JSON store", level = "info", skip(self))]
    async fn update_position(&self, id: &str, position: Position) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        // Edit the raw value so records this store cannot parse survive the rewrite.
        let mut value = self.read_value().await?;
        let fields = document_fields_mut(&mut value, id)?;
        fields.insert(LATITUDE_FIELD.to_string(), Value::from(position.latitude));
        fields.insert(LONGITUDE_FIELD.to_string(), Value::from(position.longitude));
        self.write_value(&value).await?;
        info!(id, "Position written");
        Ok(())
    }
}
