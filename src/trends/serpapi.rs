//! Google Trends interest-over-time through the SerpApi `google_trends` engine.

use crate::trends::error::FetchError;
use crate::trends::provider::{RawTrendPoint, TrendsProvider};
use crate::types::date_range::DateRange;
use crate::types::search_term::SearchTerm;
use async_trait::async_trait;
use bon::bon;
use chrono::DateTime;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://serpapi.com/search.json";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
const NO_RESULTS_MARKER: &str = "hasn't returned any results";
/// Google Trends timezone offset in minutes (US Central).
const TIMEZONE_OFFSET: &str = "360";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    error: Option<String>,
    interest_over_time: Option<InterestOverTime>,
}

#[derive(Debug, Deserialize)]
struct InterestOverTime {
    #[serde(default)]
    timeline_data: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    timestamp: String,
    #[serde(default)]
    values: Vec<TimelineValue>,
}

#[derive(Debug, Deserialize)]
struct TimelineValue {
    query: Option<String>,
    value: Option<String>,
    extracted_value: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// HTTP client for the SerpApi Google Trends engine.
pub struct SerpApiTrends {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[bon]
impl SerpApiTrends {
    /// Creates a client.
    ///
    /// * `.api_key(String)`: **Required.** SerpApi key.
    /// * `.endpoint(String)`: Optional. Defaults to the public SerpApi endpoint.
    /// * `.timeout(Duration)`: Optional per-request timeout. Defaults to 25 seconds.
    #[builder]
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key,
        })
    }
}

#[async_trait]
impl TrendsProvider for SerpApiTrends {
    async fn interest_over_time(
        &self,
        region: &str,
        term: &SearchTerm,
        range: DateRange,
    ) -> Result<Vec<RawTrendPoint>, FetchError> {
        let timeframe = range.to_string();
        debug!("Requesting '{}' in {} for {}", term, region, timeframe);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", "google_trends"),
                ("data_type", "TIMESERIES"),
                ("hl", "en-US"),
                ("tz", TIMEZONE_OFFSET),
                ("q", term.as_str()),
                ("geo", region),
                ("date", timeframe.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Provider {
                status: None,
                message: format!("request for '{}' in {} failed: {}", term, region, e),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            warn!(
                "Provider rate limit (HTTP 429) for '{}' in {}, retry after {:?}",
                term, region, retry_after
            );
            return Err(FetchError::RateLimited { retry_after });
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            let reason = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(FetchError::InvalidQuery { reason });
        }
        if !status.is_success() {
            return Err(FetchError::Provider {
                status: Some(status.as_u16()),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let body = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| FetchError::malformed(format!("undecodable response: {}", e)))?;
        parse_timeline(body, term)
    }
}

fn parse_timeline(body: SearchResponse, term: &SearchTerm) -> Result<Vec<RawTrendPoint>, FetchError> {
    let Some(interest) = body.interest_over_time else {
        return match body.error {
            Some(message) if !message.contains(NO_RESULTS_MARKER) => {
                Err(FetchError::malformed(message))
            }
            _ => Ok(Vec::new()),
        };
    };

    interest
        .timeline_data
        .into_iter()
        .map(|point| {
            let seconds: i64 = point.timestamp.parse().map_err(|_| {
                FetchError::malformed(format!("bad timestamp '{}'", point.timestamp))
            })?;
            let date = DateTime::from_timestamp(seconds, 0)
                .ok_or_else(|| FetchError::malformed(format!("timestamp {} out of range", seconds)))?
                .date_naive();

            let value = point
                .values
                .iter()
                .find(|v| v.query.as_deref() == Some(term.as_str()))
                .or_else(|| point.values.first())
                .and_then(extract_value)
                .ok_or_else(|| FetchError::malformed(format!("no value for week of {}", date)))?;

            Ok(RawTrendPoint { date, value })
        })
        .collect()
}

/// Google reports scores below 1 as `"<1"`, which counts as zero.
fn extract_value(value: &TimelineValue) -> Option<i64> {
    value.extracted_value.or_else(|| {
        let text = value.value.as_deref()?.trim();
        if text == "<1" {
            Some(0)
        } else {
            text.parse().ok()
        }
    })
}
