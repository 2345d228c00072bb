use serde_json::json;
use tracing::info;

use crate::document::{LATITUDE_FIELD, LONGITUDE_FIELD, NAME_FIELD, RawDocument};

/// Configuration for sample document generation
#[derive(Debug, Clone)]
pub struct TestDataConfig {
    /// Number of located trucks to emit (capped by the bundled set)
    pub located_rows: usize,
    /// Include trucks without coordinates
    pub include_unlocatable: bool,
    /// Include one document that fails to map
    pub include_invalid: bool,
}

impl Default for TestDataConfig {
    fn default() -> Self {
        Self::sample()
    }
}

impl TestDataConfig {
    /// The three-truck fixture used in unit tests
    pub fn minimal() -> Self {
        Self {
            located_rows: 2,
            include_unlocatable: true,
            include_invalid: false,
        }
    }

    /// Every bundled truck, including the awkward records
    pub fn sample() -> Self {
        Self {
            located_rows: usize::MAX,
            include_unlocatable: true,
            include_invalid: true,
        }
    }
}

// (id, name, latitude, longitude, menu, hours)
const LOCATED: &[(&str, &str, f64, f64, &str, &str)] = &[
    ("t1", "Taco Hut", 37.0, -122.0, "Tacos, Quesadillas", "from 10:00 to 22:00"),
    ("t2", "Taco Time", 37.01, -122.0, "Tacos, Nachos", "from 11:00 to 23:00"),
    ("t4", "La Taqueria", 37.02, -122.01, "Burritos", "from 09:00 to 21:00"),
    ("t5", "Curry Up Now", 36.98, -121.99, "Tikka masala burritos", "from 12:00 to 20:00"),
    ("t6", "The Crepe Cart", 37.05, -122.05, "Crepes", "from 08:00 to 14:00"),
];

/// Build sample store documents.
///
/// The minimal set is the canonical scenario: `Taco Hut` at (37.0, -122.0),
/// `Taco Time` about 1.11 km north, and `Burger Bar` with no coordinates.
pub fn sample_documents(config: &TestDataConfig) -> Vec<RawDocument> {
    let mut docs: Vec<RawDocument> = LOCATED
        .iter()
        .take(config.located_rows)
        .map(|&(id, name, lat, lon, menu, hours)| {
            RawDocument::new(id)
                .with_field(NAME_FIELD, name)
                .with_field(LATITUDE_FIELD, lat)
                .with_field(LONGITUDE_FIELD, lon)
                .with_field("menu", menu)
                .with_field("operatingHours", hours)
                .with_field("lastUpdated", "2024-05-01T12:00:00Z")
        })
        .collect();

    if config.include_unlocatable {
        docs.push(
            RawDocument::new("t3")
                .with_field(NAME_FIELD, "Burger Bar")
                .with_field("menu", "Burgers, Fries"),
        );
    }

    if config.include_invalid {
        docs.push(
            RawDocument::new("t-bad")
                .with_field(NAME_FIELD, "Broken Truck")
                .with_field(LATITUDE_FIELD, json!("not-a-number"))
                .with_field(LONGITUDE_FIELD, 0.0),
        );
    }

    info!(count = docs.len(), ?config, "Created sample documents");
    docs
}
