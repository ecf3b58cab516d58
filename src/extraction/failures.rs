//! The machine-readable list of pairs a run had to skip.

use crate::extraction::error::FailureReportError;
use crate::trends::error::FetchError;
use crate::types::search_term::SearchTerm;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidQuery,
    ProviderError,
    RateLimited,
}

impl From<&FetchError> for FailureReason {
    fn from(error: &FetchError) -> Self {
        match error {
            FetchError::InvalidQuery { .. } => FailureReason::InvalidQuery,
            FetchError::Provider { .. } => FailureReason::ProviderError,
            FetchError::RateLimited { .. } => FailureReason::RateLimited,
        }
    }
}

/// A (location, term) pair that was given up on, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFailure {
    pub location_id: String,
    pub term: SearchTerm,
    pub reason: FailureReason,
    pub detail: String,
    /// Provider calls made for the pair.
    pub attempts: u32,
}

impl PartialFailure {
    pub fn from_error(location_id: &str, term: &SearchTerm, error: &FetchError, attempts: u32) -> Self {
        Self {
            location_id: location_id.to_string(),
            term: term.clone(),
            reason: FailureReason::from(error),
            detail: error.to_string(),
            attempts,
        }
    }
}

/// Writes the failures as a JSON array, replacing `path` atomically.
pub fn write_failure_report(
    path: &Path,
    failures: &[PartialFailure],
) -> Result<(), FailureReportError> {
    let io_err = |e| FailureReportError::Io(path.to_path_buf(), e);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let staging = NamedTempFile::new_in(&dir).map_err(io_err)?;
    let mut writer = BufWriter::new(staging);
    serde_json::to_writer_pretty(&mut writer, failures)
        .map_err(|e| FailureReportError::Json(path.to_path_buf(), e))?;
    writer.flush().map_err(io_err)?;
    let staging = writer
        .into_inner()
        .map_err(|e| FailureReportError::Io(path.to_path_buf(), e.into_error()))?;
    staging.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

pub fn read_failure_report(path: &Path) -> Result<Vec<PartialFailure>, FailureReportError> {
    let file = File::open(path).map_err(|e| FailureReportError::Io(path.to_path_buf(), e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| FailureReportError::Json(path.to_path_buf(), e))
}
