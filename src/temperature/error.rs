use crate::tabular::TableWriteError;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemperatureDownloadError {
    #[error("Could not determine system cache directory")]
    CacheDirResolution,

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}: {reason}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        reason: String,
    },

    #[error("Unexpected archive response for location '{location_id}': {detail}")]
    MalformedResponse { location_id: String, detail: String },

    #[error("I/O error on parquet cache file '{0}'")]
    CacheIo(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode or decode parquet cache file '{0}'")]
    CachePolars(PathBuf, #[source] PolarsError),

    #[error(transparent)]
    Write(#[from] TableWriteError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
