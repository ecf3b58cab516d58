use chrono::NaiveDate;
use polars::error::PolarsError;
use thiserror::Error;

/// Malformed or inconsistent input data.
///
/// Fatal for the loader that detects it. `origin` names the file (or `<memory>`
/// for in-process input) and `line` is the 1-based line in that file.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Failed to read table '{origin}'")]
    Read {
        origin: String,
        #[source]
        source: PolarsError,
    },

    #[error("Required column '{column}' not found in '{origin}'")]
    MissingColumn { origin: String, column: String },

    #[error("Missing required field '{field}' at {origin}:{line}")]
    MissingField {
        origin: String,
        line: usize,
        field: String,
    },

    #[error("Duplicate location id '{id}' at {origin}:{line} (first seen at line {first_line})")]
    DuplicateLocationId {
        origin: String,
        id: String,
        line: usize,
        first_line: usize,
    },

    #[error("Malformed coordinates for location '{id}' at {origin}:{line}: {detail}")]
    MalformedCoordinates {
        origin: String,
        id: String,
        line: usize,
        detail: String,
    },

    #[error("Location '{id}' at {origin}:{line} has neither a region key nor coordinates")]
    NoGeography {
        origin: String,
        id: String,
        line: usize,
    },

    #[error("Unparsable date '{value}' at {origin}:{line}")]
    UnparsableDate {
        origin: String,
        line: usize,
        value: String,
    },

    #[error("Unparsable temperature value '{value}' at {origin}:{line}")]
    UnparsableValue {
        origin: String,
        line: usize,
        value: String,
    },

    #[error("Unknown temperature unit '{value}' at {origin}:{line}")]
    UnknownUnit {
        origin: String,
        line: usize,
        value: String,
    },

    #[error("Location id '{location_id}' at {origin}:{line} is not in the location catalog")]
    UnknownLocation {
        origin: String,
        line: usize,
        location_id: String,
    },

    #[error("Duplicate temperature reading for '{location_id}' on {date} at {origin}:{line}")]
    DuplicateReading {
        origin: String,
        line: usize,
        location_id: String,
        date: NaiveDate,
    },

    #[error("No search terms configured")]
    NoSearchTerms,

    #[error("Blank search term configured")]
    BlankSearchTerm,

    #[error("Search term '{0}' configured more than once")]
    DuplicateSearchTerm(String),
}
