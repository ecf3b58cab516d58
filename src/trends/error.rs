use std::time::Duration;
use thiserror::Error;

/// Failure of a single (location, term) fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The provider asked us to slow down. Retryable after `retry_after`.
    #[error("Rate limited by provider, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Transient provider or transport failure. Retryable with backoff.
    #[error("Provider error (status {status:?}): {message}")]
    Provider {
        /// HTTP status when one was received; `None` for transport errors and timeouts.
        status: Option<u16>,
        message: String,
    },

    /// The provider rejected the query for this location/term. Never retried.
    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidQuery { .. })
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        FetchError::Provider {
            status: None,
            message: message.into(),
        }
    }
}
