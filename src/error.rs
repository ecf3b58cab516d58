use crate::extraction::error::{ExtractionError, FailureReportError, StoreError};
use crate::tabular::TableWriteError;
use crate::temperature::error::TemperatureDownloadError;
use crate::validation::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    FailureReport(#[from] FailureReportError),

    #[error(transparent)]
    Write(#[from] TableWriteError),

    #[error(transparent)]
    TemperatureDownload(#[from] TemperatureDownloadError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
