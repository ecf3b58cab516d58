use crate::extraction::failures::PartialFailure;
use crate::tabular::TableWriteError;
use crate::validation::ValidationError;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read extraction table '{0}'")]
    Read(PathBuf, #[source] PolarsError),

    #[error("Extraction table '{path}' is corrupt at line {line}: {detail}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    #[error(transparent)]
    Write(#[from] TableWriteError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum FailureReportError {
    #[error("I/O error on failure report '{0}'")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode or decode failure report '{0}'")]
    Json(PathBuf, #[source] serde_json::Error),
}

/// Conditions that end an extraction run.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Location catalog is empty")]
    EmptyCatalog,

    #[error(transparent)]
    InvalidConfig(#[from] ValidationError),

    #[error("All {} attempted pairs failed", failures.len())]
    AllPairsFailed { failures: Vec<PartialFailure> },

    #[error(transparent)]
    Store(#[from] StoreError),
}
