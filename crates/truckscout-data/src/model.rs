use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DataError, Result};

/// Secondary fields carried through the engine untouched (menu text, hours, image URL, ...).
pub type Attributes = BTreeMap<String, Value>;

pub const MENU_KEY: &str = "menu";
pub const OPERATING_HOURS_KEY: &str = "operatingHours";
pub const IMAGE_URL_KEY: &str = "imageUrl";
pub const OWNER_ID_KEY: &str = "ownerId";

/// A latitude/longitude pair in degrees.
///
/// Values built through [`Position::new`] are always in range. The fields are public
/// so that raw store data can be carried as-is; use [`Position::is_valid`] before
/// feeding an unchecked value to distance math.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    /// Create a validated position.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use truckscout_data::Position;
    ///
    /// assert!(Position::new(37.77, -122.42).is_ok());
    /// assert!(Position::new(91.0, 0.0).is_err());
    /// ```
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let position = Self {
            latitude,
            longitude,
        };
        if position.is_valid() {
            Ok(position)
        } else {
            Err(DataError::InvalidPosition {
                latitude,
                longitude,
            })
        }
    }

    /// Latitude in [-90, 90], longitude in [-180, 180], both finite.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A searchable point of interest: one food truck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub position: Option<Position>,
    #[serde(default)]
    pub attributes: Attributes,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position: None,
            attributes: Attributes::new(),
            last_updated: None,
        }
    }

    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_last_updated(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }

    /// The position, but only when it is usable for distance ranking.
    pub fn valid_position(&self) -> Option<Position> {
        self.position.filter(Position::is_valid)
    }

    pub fn is_locatable(&self) -> bool {
        self.valid_position().is_some()
    }

    fn text_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn menu(&self) -> Option<&str> {
        self.text_attribute(MENU_KEY)
    }

    pub fn operating_hours(&self) -> Option<&str> {
        self.text_attribute(OPERATING_HOURS_KEY)
    }

    pub fn image_url(&self) -> Option<&str> {
        self.text_attribute(IMAGE_URL_KEY)
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.text_attribute(OWNER_ID_KEY)
    }
}
