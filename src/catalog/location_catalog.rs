//! Loads and validates the fixed list of target locations.

use crate::tabular::{cell, line_of, read_text_csv, required_text_column, text_column};
use crate::types::location::{LatLon, Location};
use crate::validation::ValidationError;
use log::info;
use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;

const COLUMN_ID: &str = "id";
const COLUMN_DISPLAY_NAME: &str = "display_name";
const COLUMN_REGION: &str = "region";
const COLUMN_LATITUDE: &str = "latitude";
const COLUMN_LONGITUDE: &str = "longitude";

/// The validated, ordered list of target locations.
///
/// Row order of the source file is kept and defines the iteration order of every
/// extraction run, which makes reruns deterministic. Dereferences to `[Location]`.
#[derive(Debug, Clone)]
pub struct LocationCatalog {
    locations: Vec<Location>,
    index: HashMap<String, usize>,
}

impl LocationCatalog {
    /// Loads a catalog CSV with columns `id, display_name, region, latitude, longitude`.
    ///
    /// `region` may be omitted entirely when every location has coordinates.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the file cannot be read, a required column
    /// or field is missing, coordinates are malformed, a location has neither a
    /// region nor coordinates, or an id appears twice.
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let origin = path.display().to_string();
        let df = read_text_csv(path).map_err(|source| ValidationError::Read {
            origin: origin.clone(),
            source,
        })?;

        let ids = required_text_column(&df, &origin, COLUMN_ID)?;
        let names = required_text_column(&df, &origin, COLUMN_DISPLAY_NAME)?;
        let latitudes = required_text_column(&df, &origin, COLUMN_LATITUDE)?;
        let longitudes = required_text_column(&df, &origin, COLUMN_LONGITUDE)?;
        let regions = text_column(&df, COLUMN_REGION);

        let mut rows = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let line = line_of(idx);
            let missing = |field: &str| ValidationError::MissingField {
                origin: origin.clone(),
                line,
                field: field.to_string(),
            };
            let id = cell(ids, idx).ok_or_else(|| missing(COLUMN_ID))?;
            let display_name = cell(names, idx).ok_or_else(|| missing(COLUMN_DISPLAY_NAME))?;
            let coordinates = parse_coordinates(
                cell(latitudes, idx),
                cell(longitudes, idx),
            )
            .map_err(|detail| ValidationError::MalformedCoordinates {
                origin: origin.clone(),
                id: id.to_string(),
                line,
                detail,
            })?;

            rows.push((
                line,
                Location {
                    id: id.to_string(),
                    display_name: display_name.to_string(),
                    region: regions.and_then(|r| cell(r, idx)).map(str::to_string),
                    coordinates,
                },
            ));
        }

        let catalog = Self::build(&origin, rows)?;
        info!("Loaded {} locations from {}", catalog.len(), origin);
        Ok(catalog)
    }

    /// Builds a catalog from in-memory locations with the same checks as [`LocationCatalog::load`].
    pub fn from_locations(locations: Vec<Location>) -> Result<Self, ValidationError> {
        let rows = locations
            .into_iter()
            .enumerate()
            .map(|(idx, location)| (idx + 1, location))
            .collect();
        Self::build("<memory>", rows)
    }

    fn build(origin: &str, rows: Vec<(usize, Location)>) -> Result<Self, ValidationError> {
        let mut locations = Vec::with_capacity(rows.len());
        let mut index = HashMap::with_capacity(rows.len());
        let mut first_lines: HashMap<String, usize> = HashMap::with_capacity(rows.len());

        for (line, location) in rows {
            if location.id.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    origin: origin.to_string(),
                    line,
                    field: COLUMN_ID.to_string(),
                });
            }
            if location.display_name.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    origin: origin.to_string(),
                    line,
                    field: COLUMN_DISPLAY_NAME.to_string(),
                });
            }
            if let Some(coordinates) = location.coordinates {
                if !coordinates.is_valid() {
                    return Err(ValidationError::MalformedCoordinates {
                        origin: origin.to_string(),
                        id: location.id,
                        line,
                        detail: format!("{:?} is out of range", coordinates),
                    });
                }
            }
            if location.region.is_none() && location.coordinates.is_none() {
                return Err(ValidationError::NoGeography {
                    origin: origin.to_string(),
                    id: location.id,
                    line,
                });
            }
            if let Some(&first_line) = first_lines.get(&location.id) {
                return Err(ValidationError::DuplicateLocationId {
                    origin: origin.to_string(),
                    id: location.id,
                    line,
                    first_line,
                });
            }

            first_lines.insert(location.id.clone(), line);
            index.insert(location.id.clone(), locations.len());
            locations.push(location);
        }

        Ok(Self { locations, index })
    }

    pub fn get(&self, id: &str) -> Option<&Location> {
        self.index.get(id).map(|&idx| &self.locations[idx])
    }

    /// Position of `id` in catalog order.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }
}

impl Deref for LocationCatalog {
    type Target = [Location];

    fn deref(&self) -> &Self::Target {
        &self.locations
    }
}

/// Both cells empty means "no coordinates"; anything else must be a valid pair.
fn parse_coordinates(
    latitude: Option<&str>,
    longitude: Option<&str>,
) -> Result<Option<LatLon>, String> {
    match (latitude, longitude) {
        (None, None) => Ok(None),
        (Some(lat), Some(lon)) => {
            let lat: f64 = lat
                .parse()
                .map_err(|_| format!("latitude '{}' is not a number", lat))?;
            let lon: f64 = lon
                .parse()
                .map_err(|_| format!("longitude '{}' is not a number", lon))?;
            let coordinates = LatLon(lat, lon);
            if coordinates.is_valid() {
                Ok(Some(coordinates))
            } else {
                Err(format!("({}, {}) is out of range", lat, lon))
            }
        }
        (Some(_), None) => Err("latitude given without longitude".to_string()),
        (None, Some(_)) => Err("longitude given without latitude".to_string()),
    }
}
