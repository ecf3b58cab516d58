//! Target locations for search-interest extraction.

use std::fmt;

/// A geographical coordinate using latitude and longitude in decimal degrees.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use fishing_trends::LatLon;
///
/// let ames = LatLon(42.0308, -93.6319);
/// assert_eq!(ames.0, 42.0308); // Latitude
/// assert!(ames.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon(pub f64, pub f64);

impl LatLon {
    pub fn latitude(&self) -> f64 {
        self.0
    }

    pub fn longitude(&self) -> f64 {
        self.1
    }

    /// Both components are finite and inside [-90, 90] / [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.0.is_finite()
            && self.1.is_finite()
            && (-90.0..=90.0).contains(&self.0)
            && (-180.0..=180.0).contains(&self.1)
    }
}

/// One entry of the location catalog.
///
/// A location is queried at the search-interest provider through its `region`
/// key (e.g. a DMA code like `US-IA-679`) and placed on the map for temperature
/// downloads through its `coordinates`. At least one of the two is present.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Stable key referenced by every other table (e.g. `ames-ia`).
    pub id: String,
    pub display_name: String,
    /// Provider region key.
    pub region: Option<String>,
    pub coordinates: Option<LatLon>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}
