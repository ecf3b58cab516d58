//! Weekly fishing-related search interest per location, joined with temperature.
//!
//! A run loads a [`LocationCatalog`], extracts one weekly series per
//! (location, search term) pair through a [`TrendsProvider`] under a shared rate
//! limit, saves the series to an extraction table, and merges that table with a
//! [`TemperatureDataset`] into one record per trend week. See [`Pipeline`].

mod catalog;
mod error;
mod extraction;
mod merge;
mod pipeline;
mod tabular;
mod temperature;
mod trends;
mod types;
mod validation;

pub use error::PipelineError;
pub use pipeline::*;

pub use catalog::location_catalog::LocationCatalog;
pub use validation::ValidationError;

pub use trends::error::FetchError;
pub use trends::fetcher::TrendSeriesFetcher;
pub use trends::provider::{RawTrendPoint, TrendsProvider};
pub use trends::serpapi::SerpApiTrends;

pub use extraction::canonical::CanonicalOrder;
pub use extraction::error::{ExtractionError, FailureReportError, StoreError};
pub use extraction::failures::{
    read_failure_report, write_failure_report, FailureReason, PartialFailure,
};
pub use extraction::orchestrator::{
    ExtractionConfig, ExtractionOrchestrator, ExtractionOutcome, Jitter,
};
pub use extraction::rate_limiter::{RateLimitConfig, RateLimiter, SharedRateLimiter};
pub use extraction::retry::RetryPolicy;
pub use extraction::store::{ExtractionStore, WriteMode};

pub use temperature::error::TemperatureDownloadError;
pub use temperature::open_meteo::{DownloadSummary, OpenMeteoArchive};
pub use temperature::source::{
    write_temperature_csv, TemperatureDataset, TemperatureGranularity, TemperatureSource,
};

pub use merge::engine::{merge, MergeConfig, MergeSummary, WeeklyLabel};
pub use merge::writer::write_merged_csv;

pub use tabular::TableWriteError;

pub use types::date_range::{DateRange, WeekAlignment, WeekStart};
pub use types::location::{LatLon, Location};
pub use types::observation::{
    MatchQuality, MergedRecord, TemperatureObservation, TemperatureUnit, TrendObservation,
};
pub use types::search_term::{default_search_terms, SearchTerm};
