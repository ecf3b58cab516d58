//! CSV helpers shared by every table the pipeline reads or writes.
//!
//! Inputs are read with every column as text so that each loader can report
//! precisely which cell failed to parse. Outputs are written to a temporary
//! file next to the destination and renamed into place, so a reader never
//! observes a half-written table.

use crate::validation::ValidationError;
use polars::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableWriteError {
    #[error("I/O error writing table '{0}'")]
    Io(PathBuf, #[source] io::Error),

    #[error("Encoding error writing table '{0}'")]
    Encode(PathBuf, #[source] PolarsError),
}

/// Reads a headed CSV file with every column typed as a string.
pub(crate) fn read_text_csv(path: &Path) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
}

/// A string column of a text table, if present.
pub(crate) fn text_column<'a>(df: &'a DataFrame, name: &str) -> Option<&'a StringChunked> {
    df.column(name).ok().and_then(|column| column.str().ok())
}

/// A string column that must be present.
pub(crate) fn required_text_column<'a>(
    df: &'a DataFrame,
    origin: &str,
    name: &str,
) -> Result<&'a StringChunked, ValidationError> {
    text_column(df, name).ok_or_else(|| ValidationError::MissingColumn {
        origin: origin.to_string(),
        column: name.to_string(),
    })
}

/// A trimmed, non-empty cell. Empty strings and nulls are both treated as absent.
pub(crate) fn cell(column: &StringChunked, idx: usize) -> Option<&str> {
    column
        .get(idx)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Line number of data row `idx` in the source file (header is line 1).
pub(crate) fn line_of(idx: usize) -> usize {
    idx + 2
}

/// Writes `df` as CSV to `path`, replacing any existing file atomically.
pub(crate) fn write_csv_atomic(mut df: DataFrame, path: &Path) -> Result<(), TableWriteError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| TableWriteError::Io(dir.clone(), e))?;

    let mut staging =
        NamedTempFile::new_in(&dir).map_err(|e| TableWriteError::Io(path.to_path_buf(), e))?;
    CsvWriter::new(staging.as_file_mut())
        .include_header(true)
        .finish(&mut df)
        .map_err(|e| TableWriteError::Encode(path.to_path_buf(), e))?;
    staging
        .persist(path)
        .map_err(|e| TableWriteError::Io(path.to_path_buf(), e.error))?;
    Ok(())
}
