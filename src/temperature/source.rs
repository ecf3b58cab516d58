//! Loads the independently sourced temperature table.

use crate::catalog::location_catalog::LocationCatalog;
use crate::tabular::{
    cell, line_of, read_text_csv, required_text_column, text_column, write_csv_atomic,
    TableWriteError,
};
use crate::types::observation::{TemperatureObservation, TemperatureUnit};
use crate::validation::ValidationError;
use chrono::{Datelike, NaiveDate, Weekday};
use log::{info, warn};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::Path;

const COLUMNS: [&str; 4] = ["location_id", "date", "temperature_value", "unit"];
/// Optional columns: daily maximum and minimum (in `unit`) and precipitation in mm.
const EXTRA_COLUMNS: [&str; 3] = ["temperature_max", "temperature_min", "precipitation_mm"];
const MEMORY_ORIGIN: &str = "<memory>";

/// Time resolution of a temperature dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureGranularity {
    /// Daily or irregular readings. Merged by averaging over the trend week.
    Daily,
    /// One reading per week, all on the same weekday.
    Weekly(Weekday),
}

/// Validated temperature readings, sorted by `(location_id, date)`, in one unit.
#[derive(Debug, Clone)]
pub struct TemperatureDataset {
    observations: Vec<TemperatureObservation>,
    unit: TemperatureUnit,
    granularity: TemperatureGranularity,
    spans: HashMap<String, Range<usize>>,
}

impl TemperatureDataset {
    /// Builds a dataset from readings that were not read from a file.
    ///
    /// Applies the same unit normalization, sorting and duplicate check as
    /// [`TemperatureSource::load`]; no catalog cross-check is made.
    pub fn from_observations(
        observations: Vec<TemperatureObservation>,
    ) -> Result<Self, ValidationError> {
        let mut seen = HashMap::with_capacity(observations.len());
        for (idx, observation) in observations.iter().enumerate() {
            if seen
                .insert((observation.location_id.as_str(), observation.date), idx)
                .is_some()
            {
                return Err(ValidationError::DuplicateReading {
                    origin: MEMORY_ORIGIN.to_string(),
                    line: idx + 1,
                    location_id: observation.location_id.clone(),
                    date: observation.date,
                });
            }
        }
        Ok(Self::assemble(observations))
    }

    fn assemble(mut observations: Vec<TemperatureObservation>) -> Self {
        let unit = normalize_units(&mut observations);
        observations.sort_by(|a, b| {
            a.location_id
                .cmp(&b.location_id)
                .then_with(|| a.date.cmp(&b.date))
        });

        let mut spans: HashMap<String, Range<usize>> = HashMap::new();
        for (idx, observation) in observations.iter().enumerate() {
            spans
                .entry(observation.location_id.clone())
                .and_modify(|span| span.end = idx + 1)
                .or_insert(idx..idx + 1);
        }

        let granularity = detect_granularity(&observations, &spans);
        Self {
            observations,
            unit,
            granularity,
            spans,
        }
    }

    pub fn observations(&self) -> &[TemperatureObservation] {
        &self.observations
    }

    /// Readings for one location, sorted by date. Empty if the location has none.
    pub fn for_location(&self, location_id: &str) -> &[TemperatureObservation] {
        self.spans
            .get(location_id)
            .map(|span| &self.observations[span.clone()])
            .unwrap_or(&[])
    }

    pub fn unit(&self) -> TemperatureUnit {
        self.unit
    }

    pub fn granularity(&self) -> TemperatureGranularity {
        self.granularity
    }

    /// The weekday every reading of a weekly dataset is dated on.
    pub fn weekly_anchor(&self) -> Option<Weekday> {
        match self.granularity {
            TemperatureGranularity::Weekly(anchor) => Some(anchor),
            TemperatureGranularity::Daily => None,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Converts everything to Celsius if more than one unit is present.
fn normalize_units(observations: &mut [TemperatureObservation]) -> TemperatureUnit {
    let Some(first) = observations.first().map(|o| o.unit) else {
        return TemperatureUnit::Celsius;
    };
    if observations.iter().all(|o| o.unit == first) {
        return first;
    }
    warn!("Temperature readings mix units, converting all to Celsius");
    observations
        .iter_mut()
        .for_each(TemperatureObservation::convert_to_celsius);
    TemperatureUnit::Celsius
}

fn detect_granularity(
    observations: &[TemperatureObservation],
    spans: &HashMap<String, Range<usize>>,
) -> TemperatureGranularity {
    let Some(weekday) = observations.first().map(|o| o.date.weekday()) else {
        return TemperatureGranularity::Daily;
    };
    let repeated = spans.values().any(|span| span.len() > 1);
    if repeated && observations.iter().all(|o| o.date.weekday() == weekday) {
        TemperatureGranularity::Weekly(weekday)
    } else {
        TemperatureGranularity::Daily
    }
}

pub struct TemperatureSource;

impl TemperatureSource {
    /// Reads a temperature CSV (`location_id, date, temperature_value, unit`).
    ///
    /// Every `location_id` must exist in `catalog`. Dates are `YYYY-MM-DD`.
    /// `temperature_max`, `temperature_min` and `precipitation_mm` columns are
    /// read when present; their cells may be empty.
    pub fn load(
        path: &Path,
        catalog: &LocationCatalog,
    ) -> Result<TemperatureDataset, ValidationError> {
        let origin = path.display().to_string();
        let df = read_text_csv(path).map_err(|source| ValidationError::Read {
            origin: origin.clone(),
            source,
        })?;

        let location_ids = required_text_column(&df, &origin, COLUMNS[0])?;
        let dates = required_text_column(&df, &origin, COLUMNS[1])?;
        let values = required_text_column(&df, &origin, COLUMNS[2])?;
        let units = required_text_column(&df, &origin, COLUMNS[3])?;
        let extras = EXTRA_COLUMNS.map(|name| text_column(&df, name));

        let mut observations = Vec::with_capacity(df.height());
        let mut seen = HashSet::with_capacity(df.height());
        for idx in 0..df.height() {
            let line = line_of(idx);
            let missing = |field: &str| ValidationError::MissingField {
                origin: origin.clone(),
                line,
                field: field.to_string(),
            };

            let location_id = cell(location_ids, idx).ok_or_else(|| missing(COLUMNS[0]))?;
            if !catalog.contains(location_id) {
                return Err(ValidationError::UnknownLocation {
                    origin: origin.clone(),
                    line,
                    location_id: location_id.to_string(),
                });
            }

            let date = cell(dates, idx).ok_or_else(|| missing(COLUMNS[1]))?;
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                ValidationError::UnparsableDate {
                    origin: origin.clone(),
                    line,
                    value: date.to_string(),
                }
            })?;

            let value = cell(values, idx).ok_or_else(|| missing(COLUMNS[2]))?;
            let temperature_value = value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ValidationError::UnparsableValue {
                    origin: origin.clone(),
                    line,
                    value: value.to_string(),
                })?;

            let unit = cell(units, idx).ok_or_else(|| missing(COLUMNS[3]))?;
            let unit = unit
                .parse::<TemperatureUnit>()
                .map_err(|_| ValidationError::UnknownUnit {
                    origin: origin.clone(),
                    line,
                    value: unit.to_string(),
                })?;

            let mut extra = [None; EXTRA_COLUMNS.len()];
            for (slot, column) in extra.iter_mut().zip(extras) {
                let Some(value) = column.and_then(|column| cell(column, idx)) else {
                    continue;
                };
                *slot = Some(value.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(
                    || ValidationError::UnparsableValue {
                        origin: origin.clone(),
                        line,
                        value: value.to_string(),
                    },
                )?);
            }
            let [temperature_max, temperature_min, precipitation_mm] = extra;

            if !seen.insert((location_id.to_string(), date)) {
                return Err(ValidationError::DuplicateReading {
                    origin: origin.clone(),
                    line,
                    location_id: location_id.to_string(),
                    date,
                });
            }

            observations.push(TemperatureObservation {
                location_id: location_id.to_string(),
                date,
                temperature_value,
                unit,
                temperature_max,
                temperature_min,
                precipitation_mm,
            });
        }

        let dataset = TemperatureDataset::assemble(observations);
        info!(
            "Loaded {} temperature readings ({:?}, {}) from {}",
            dataset.len(),
            dataset.granularity(),
            dataset.unit(),
            origin
        );
        Ok(dataset)
    }
}

/// Writes readings in the format [`TemperatureSource::load`] reads, including the
/// optional columns. Absent values are written as empty cells.
pub fn write_temperature_csv(
    path: &Path,
    observations: &[TemperatureObservation],
) -> Result<(), TableWriteError> {
    let df = df!(
        COLUMNS[0] => observations.iter().map(|o| o.location_id.as_str()).collect::<Vec<_>>(),
        COLUMNS[1] => observations
            .iter()
            .map(|o| o.date.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>(),
        COLUMNS[2] => observations.iter().map(|o| o.temperature_value).collect::<Vec<_>>(),
        COLUMNS[3] => observations.iter().map(|o| o.unit.symbol()).collect::<Vec<_>>(),
        EXTRA_COLUMNS[0] => observations.iter().map(|o| o.temperature_max).collect::<Vec<_>>(),
        EXTRA_COLUMNS[1] => observations.iter().map(|o| o.temperature_min).collect::<Vec<_>>(),
        EXTRA_COLUMNS[2] => observations.iter().map(|o| o.precipitation_mm).collect::<Vec<_>>()
    )
    .map_err(|e| TableWriteError::Encode(path.to_path_buf(), e))?;
    write_csv_atomic(df, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::location::Location;
    use tempfile::tempdir;

    fn catalog() -> LocationCatalog {
        LocationCatalog::from_locations(
            ["ames-ia", "duluth-mn"]
                .into_iter()
                .map(|id| Location {
                    id: id.to_string(),
                    display_name: id.to_string(),
                    region: Some("US".to_string()),
                    coordinates: None,
                })
                .collect(),
        )
        .unwrap()
    }

    fn load_text(text: &str) -> Result<TemperatureDataset, ValidationError> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("temperature.csv");
        std::fs::write(&path, text).unwrap();
        TemperatureSource::load(&path, &catalog())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_sorts_and_indexes_by_location() {
        let dataset = load_text(
            "location_id,date,temperature_value,unit\n\
             duluth-mn,2023-06-04,12.5,C\n\
             ames-ia,2023-06-09,21.0,C\n\
             ames-ia,2023-06-03,18.2,C\n",
        )
        .unwrap();

        let ames: Vec<NaiveDate> = dataset.for_location("ames-ia").iter().map(|o| o.date).collect();
        assert_eq!(ames, vec![date(2023, 6, 3), date(2023, 6, 9)]);
        assert_eq!(dataset.for_location("duluth-mn").len(), 1);
        assert!(dataset.for_location("nowhere").is_empty());
        assert_eq!(dataset.granularity(), TemperatureGranularity::Daily);
        assert_eq!(dataset.unit(), TemperatureUnit::Celsius);
    }

    #[test]
    fn test_mixed_units_are_normalized_to_celsius() {
        let dataset = load_text(
            "location_id,date,temperature_value,unit\n\
             ames-ia,2023-06-03,50,°F\n\
             ames-ia,2023-06-04,10,celsius\n",
        )
        .unwrap();

        assert_eq!(dataset.unit(), TemperatureUnit::Celsius);
        let values: Vec<f64> = dataset.observations().iter().map(|o| o.temperature_value).collect();
        assert!((values[0] - 10.0).abs() < 1e-9);
        assert!((values[1] - 10.0).abs() < 1e-9);
        assert!(dataset
            .observations()
            .iter()
            .all(|o| o.unit == TemperatureUnit::Celsius));
    }

    #[test]
    fn test_single_unit_is_kept() {
        let dataset = load_text("location_id,date,temperature_value,unit\names-ia,2023-06-03,65,F\n").unwrap();
        assert_eq!(dataset.unit(), TemperatureUnit::Fahrenheit);
        assert_eq!(dataset.observations()[0].temperature_value, 65.0);
    }

    #[test]
    fn test_same_weekday_readings_are_weekly() {
        let dataset = load_text(
            "location_id,date,temperature_value,unit\n\
             ames-ia,2023-06-05,18,C\n\
             ames-ia,2023-06-12,19,C\n\
             duluth-mn,2023-06-05,11,C\n",
        )
        .unwrap();
        assert_eq!(dataset.granularity(), TemperatureGranularity::Weekly(Weekday::Mon));
        assert_eq!(dataset.weekly_anchor(), Some(Weekday::Mon));
    }

    #[test]
    fn test_sunday_labelled_weekly_summary_keeps_its_anchor() {
        let dataset = load_text(
            "location_id,date,temperature_value,unit,temperature_max,temperature_min,precipitation_mm\n\
             ames-ia,2023-06-04,18.1,C,24.0,11.5,3.2\n\
             ames-ia,2023-06-11,19.4,C,26.1,12.0,\n",
        )
        .unwrap();

        assert_eq!(dataset.weekly_anchor(), Some(Weekday::Sun));
        let first = &dataset.for_location("ames-ia")[0];
        assert_eq!(first.temperature_max, Some(24.0));
        assert_eq!(first.temperature_min, Some(11.5));
        assert_eq!(first.precipitation_mm, Some(3.2));
        assert_eq!(dataset.for_location("ames-ia")[1].precipitation_mm, None);
    }

    #[test]
    fn test_bad_optional_cell_is_reported() {
        let err = load_text(
            "location_id,date,temperature_value,unit,precipitation_mm\n\
             ames-ia,2023-06-03,18.2,C,lots\n",
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnparsableValue { line: 2, .. }), "{err}");
    }

    #[test]
    fn test_duplicate_reading_is_rejected() {
        let err = load_text(
            "location_id,date,temperature_value,unit\n\
             ames-ia,2023-06-03,18.2,C\n\
             ames-ia,2023-06-03,18.4,C\n",
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateReading { line: 3, .. }), "{err}");
    }

    #[test]
    fn test_unknown_location_is_rejected() {
        let err = load_text("location_id,date,temperature_value,unit\nfargo-nd,2023-06-03,18.2,C\n").unwrap_err();
        assert!(matches!(err, ValidationError::UnknownLocation { line: 2, .. }), "{err}");
    }

    #[test]
    fn test_bad_cells_are_reported() {
        let header = "location_id,date,temperature_value,unit\n";
        let cases = [
            ("ames-ia,06/03/2023,18.2,C\n", "date"),
            ("ames-ia,2023-06-03,warm,C\n", "value"),
            ("ames-ia,2023-06-03,18.2,R\n", "unit"),
        ];
        for (row, kind) in cases {
            let err = load_text(&format!("{header}{row}")).unwrap_err();
            let matched = match kind {
                "date" => matches!(err, ValidationError::UnparsableDate { .. }),
                "value" => matches!(err, ValidationError::UnparsableValue { .. }),
                _ => matches!(err, ValidationError::UnknownUnit { .. }),
            };
            assert!(matched, "{kind}: {err}");
        }
    }

    #[test]
    fn test_written_csv_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("temperature.csv");
        let readings = vec![
            TemperatureObservation {
                temperature_max: Some(24.0),
                temperature_min: Some(11.5),
                precipitation_mm: Some(0.4),
                ..TemperatureObservation::new("ames-ia", date(2023, 6, 3), 18.2, TemperatureUnit::Celsius)
            },
            TemperatureObservation::new("ames-ia", date(2023, 6, 4), 19.0, TemperatureUnit::Celsius),
        ];

        write_temperature_csv(&path, &readings).unwrap();
        let dataset = TemperatureSource::load(&path, &catalog()).unwrap();
        assert_eq!(dataset.observations(), readings.as_slice());
    }

    #[test]
    fn test_in_memory_duplicates_are_rejected() {
        let reading =
            TemperatureObservation::new("ames-ia", date(2023, 6, 3), 18.2, TemperatureUnit::Celsius);
        let err = TemperatureDataset::from_observations(vec![reading.clone(), reading]).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateReading { line: 2, .. }));
    }
}
