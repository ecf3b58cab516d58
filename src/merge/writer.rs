//! The merged table handed to the dashboard.

use crate::tabular::{write_csv_atomic, TableWriteError};
use crate::types::observation::MergedRecord;
use polars::prelude::*;
use std::path::Path;

/// Writes merged records in the given order, replacing `path` atomically.
///
/// Columns: `location_id, term, week_start_date, interest_score,
/// temperature_value, temperature_source_date, match_quality, temperature_max,
/// temperature_min, precipitation_mm`. Temperature cells are empty for `missing`
/// records, and the last three are empty when the temperature data lacks them.
pub fn write_merged_csv(path: &Path, records: &[MergedRecord]) -> Result<(), TableWriteError> {
    let df = merged_frame(records).map_err(|e| TableWriteError::Encode(path.to_path_buf(), e))?;
    write_csv_atomic(df, path)
}

fn merged_frame(records: &[MergedRecord]) -> PolarsResult<DataFrame> {
    df!(
        "location_id" => records.iter().map(|r| r.location_id.as_str()).collect::<Vec<_>>(),
        "term" => records.iter().map(|r| r.term.as_str()).collect::<Vec<_>>(),
        "week_start_date" => records
            .iter()
            .map(|r| r.week_start_date.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>(),
        "interest_score" => records.iter().map(|r| i64::from(r.interest_score)).collect::<Vec<_>>(),
        "temperature_value" => records.iter().map(|r| r.temperature_value).collect::<Vec<_>>(),
        "temperature_source_date" => records
            .iter()
            .map(|r| r.temperature_source_date.map(|d| d.format("%Y-%m-%d").to_string()))
            .collect::<Vec<_>>(),
        "match_quality" => records.iter().map(|r| r.match_quality.as_str()).collect::<Vec<_>>(),
        "temperature_max" => records.iter().map(|r| r.temperature_max).collect::<Vec<_>>(),
        "temperature_min" => records.iter().map(|r| r.temperature_min).collect::<Vec<_>>(),
        "precipitation_mm" => records.iter().map(|r| r.precipitation_mm).collect::<Vec<_>>()
    )
}
