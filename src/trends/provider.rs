use crate::trends::error::FetchError;
use crate::types::date_range::DateRange;
use crate::types::search_term::SearchTerm;
use async_trait::async_trait;
use chrono::NaiveDate;

/// One point of a provider's interest-over-time series, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTrendPoint {
    /// First day of the provider's week, in the provider's own week convention.
    pub date: NaiveDate,
    pub value: i64,
}

/// A source of weekly search-interest series.
///
/// Each call is exactly one request to the provider. An empty vector means the
/// provider has no data for the query.
#[async_trait]
pub trait TrendsProvider: Send + Sync {
    async fn interest_over_time(
        &self,
        region: &str,
        term: &SearchTerm,
        range: DateRange,
    ) -> Result<Vec<RawTrendPoint>, FetchError>;
}
