//! Mapping from loosely-typed store documents into [`Entity`] values.
//!
//! Store documents are arbitrary key/value maps. Missing fields fall back to
//! defaults (empty name, no position); only fields that are present with the
//! wrong type make a record invalid. A bad record is skipped and reported, it
//! never fails the whole batch.

use chrono::{DateTime, Utc};
use itertools::{Either, Itertools};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    DataError, Result,
    model::{Attributes, Entity, Position},
};

pub const NAME_FIELD: &str = "name";
pub const LATITUDE_FIELD: &str = "latitude";
pub const LONGITUDE_FIELD: &str = "longitude";
pub const LAST_UPDATED_FIELD: &str = "lastUpdated";

/// A document as returned by the external store: an id plus arbitrary fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set both coordinate fields.
    pub fn set_position(&mut self, position: Position) {
        self.fields
            .insert(LATITUDE_FIELD.to_string(), Value::from(position.latitude));
        self.fields
            .insert(LONGITUDE_FIELD.to_string(), Value::from(position.longitude));
    }
}

impl From<&Entity> for RawDocument {
    fn from(entity: &Entity) -> Self {
        let mut doc = Self::new(entity.id.clone()).with_field(NAME_FIELD, entity.name.clone());
        if let Some(position) = entity.position {
            doc.set_position(position);
        }
        if let Some(at) = entity.last_updated {
            doc.fields
                .insert(LAST_UPDATED_FIELD.to_string(), Value::from(at.to_rfc3339()));
        }
        for (key, value) in &entity.attributes {
            doc.fields.insert(key.clone(), value.clone());
        }
        doc
    }
}

impl TryFrom<RawDocument> for Entity {
    type Error = DataError;

    fn try_from(doc: RawDocument) -> Result<Self> {
        let RawDocument { id, mut fields } = doc;
        if id.trim().is_empty() {
            return Err(invalid(&id, "document id is empty"));
        }

        let name = match fields.remove(NAME_FIELD) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(invalid(&id, format!("name is not a string: {other}")));
            }
        };

        let latitude = take_coordinate(&id, &mut fields, LATITUDE_FIELD)?;
        let longitude = take_coordinate(&id, &mut fields, LONGITUDE_FIELD)?;
        let position = match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Position {
                latitude,
                longitude,
            }),
            (None, None) => None,
            _ => {
                debug!(id = %id, "Document has only one coordinate, treating as unlocatable");
                None
            }
        };

        let last_updated = fields
            .remove(LAST_UPDATED_FIELD)
            .and_then(|value| parse_timestamp(&id, &value));

        let attributes: Attributes = fields.into_iter().collect();

        Ok(Self {
            id,
            name,
            position,
            attributes,
            last_updated,
        })
    }
}

fn invalid(id: &str, reason: impl Into<String>) -> DataError {
    DataError::InvalidEntity {
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn take_coordinate(id: &str, fields: &mut Map<String, Value>, key: &str) -> Result<Option<f64>> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(id, format!("{key} is not representable as f64"))),
        Some(other) => Err(invalid(id, format!("{key} is not a number: {other}"))),
    }
}

fn parse_timestamp(id: &str, value: &Value) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };
    if parsed.is_none() && !value.is_null() {
        warn!(id, %value, "Ignoring unparseable lastUpdated");
    }
    parsed
}

/// Result of mapping a batch of documents.
#[derive(Debug, Default)]
pub struct MappedBatch {
    pub entities: Vec<Entity>,
    pub rejected: Vec<DataError>,
}

/// Map every document, skipping (and reporting) the ones that fail.
pub fn map_documents(docs: impl IntoIterator<Item = RawDocument>) -> MappedBatch {
    let (entities, rejected): (Vec<_>, Vec<_>) =
        docs.into_iter().partition_map(|doc| match Entity::try_from(doc) {
            Ok(entity) => Either::Left(entity),
            Err(e) => {
                warn!(error = %e, "Skipping document");
                Either::Right(e)
            }
        });
    MappedBatch { entities, rejected }
}
