//! Row types flowing through the pipeline: extracted trend points, temperature
//! readings and the merged records handed to the dashboard.

use crate::types::search_term::SearchTerm;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Weekly search interest for one (location, term) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrendObservation {
    pub location_id: String,
    pub term: SearchTerm,
    /// Aligned to the configured week start.
    pub week_start_date: NaiveDate,
    /// Provider-normalized interest, 0–100.
    pub interest_score: u8,
}

impl TrendObservation {
    /// The upsert key of the extraction table.
    pub fn key(&self) -> (String, SearchTerm, NaiveDate) {
        (
            self.location_id.clone(),
            self.term.clone(),
            self.week_start_date,
        )
    }
}

/// Unit of a temperature reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "C",
            TemperatureUnit::Fahrenheit => "F",
            TemperatureUnit::Kelvin => "K",
        }
    }

    pub fn to_celsius(&self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
            TemperatureUnit::Kelvin => value - 273.15,
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = ();

    /// Accepts `C`, `°C`, `celsius` and the equivalents for Fahrenheit and Kelvin, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "°c" | "celsius" => Ok(TemperatureUnit::Celsius),
            "f" | "°f" | "fahrenheit" => Ok(TemperatureUnit::Fahrenheit),
            "k" | "kelvin" => Ok(TemperatureUnit::Kelvin),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A temperature reading for one location on one day (or week).
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureObservation {
    pub location_id: String,
    pub date: NaiveDate,
    /// Mean temperature.
    pub temperature_value: f64,
    pub unit: TemperatureUnit,
    /// Highest temperature of the period, in `unit`.
    pub temperature_max: Option<f64>,
    /// Lowest temperature of the period, in `unit`.
    pub temperature_min: Option<f64>,
    /// Precipitation total of the period in millimetres.
    pub precipitation_mm: Option<f64>,
}

impl TemperatureObservation {
    /// A mean-only reading.
    pub fn new(
        location_id: impl Into<String>,
        date: NaiveDate,
        temperature_value: f64,
        unit: TemperatureUnit,
    ) -> Self {
        Self {
            location_id: location_id.into(),
            date,
            temperature_value,
            unit,
            temperature_max: None,
            temperature_min: None,
            precipitation_mm: None,
        }
    }

    /// Converts every temperature field to Celsius.
    pub fn convert_to_celsius(&mut self) {
        let unit = self.unit;
        self.temperature_value = unit.to_celsius(self.temperature_value);
        self.temperature_max = self.temperature_max.map(|v| unit.to_celsius(v));
        self.temperature_min = self.temperature_min.map(|v| unit.to_celsius(v));
        self.unit = TemperatureUnit::Celsius;
    }
}

/// How a temperature value was attached to a trend observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    /// Aggregate of the readings inside the trend week (or the reading on the week start for weekly data).
    Exact,
    /// No reading in the week; the closest reading within the configured tolerance was used.
    NearestWithinTolerance,
    /// Nothing within tolerance. Temperature fields are empty.
    Missing,
}

impl MatchQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchQuality::Exact => "exact",
            MatchQuality::NearestWithinTolerance => "nearest_within_tolerance",
            MatchQuality::Missing => "missing",
        }
    }
}

impl fmt::Display for MatchQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trend observation joined with its temperature match.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub location_id: String,
    pub term: SearchTerm,
    pub week_start_date: NaiveDate,
    pub interest_score: u8,
    pub temperature_value: Option<f64>,
    pub temperature_source_date: Option<NaiveDate>,
    pub match_quality: MatchQuality,
    /// Highest maximum among the matched readings.
    pub temperature_max: Option<f64>,
    /// Lowest minimum among the matched readings.
    pub temperature_min: Option<f64>,
    /// Sum of the matched readings' precipitation.
    pub precipitation_mm: Option<f64>,
}
