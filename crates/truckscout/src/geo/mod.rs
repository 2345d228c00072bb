//! Great-circle distance between coordinates.

pub use truckscout_data::Position;

/// Mean Earth radius used for all distance math.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between `a` and `b` in kilometres.
///
/// Both positions must be valid; the entity index strips invalid positions
/// before they can reach this function.
///
/// # Examples
///
/// ```rust
/// use truckscout::{Position, geo::distance_km};
///
/// let a = Position::new(37.0, -122.0)?;
/// let b = Position::new(37.01, -122.0)?;
/// assert!((distance_km(a, b) - 1.112).abs() < 0.001);
/// # Ok::<(), truckscout::data::DataError>(())
/// ```
pub fn distance_km(a: Position, b: Position) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h just past 1 for antipodal points.
    let c = 2.0 * h.sqrt().min(1.0).asin();
    (EARTH_RADIUS_KM * c).max(0.0)
}
