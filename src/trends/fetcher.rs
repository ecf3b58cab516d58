//! Turns raw provider series into canonical weekly [`TrendObservation`]s.

use crate::trends::error::FetchError;
use crate::trends::provider::{RawTrendPoint, TrendsProvider};
use crate::types::date_range::{DateRange, WeekAlignment, WeekStart};
use crate::types::location::Location;
use crate::types::observation::TrendObservation;
use crate::types::search_term::SearchTerm;
use chrono::{Duration, NaiveDate};
use log::{debug, warn};
use std::collections::BTreeMap;

pub struct TrendSeriesFetcher<P> {
    provider: P,
    week_start: WeekStart,
    alignment: WeekAlignment,
}

impl<P: TrendsProvider> TrendSeriesFetcher<P> {
    /// Labels are aligned with [`WeekAlignment::Floor`] unless changed with
    /// [`with_alignment`](Self::with_alignment).
    pub fn new(provider: P, week_start: WeekStart) -> Self {
        Self {
            provider,
            week_start,
            alignment: WeekAlignment::default(),
        }
    }

    pub fn with_alignment(mut self, alignment: WeekAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn week_start(&self) -> WeekStart {
        self.week_start
    }

    pub fn alignment(&self) -> WeekAlignment {
        self.alignment
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Fetches the weekly series for one (location, term) pair.
    ///
    /// Makes exactly one provider call. Points are aligned to the configured week
    /// start, clipped to `range` and sorted. An empty vector means the provider
    /// has no data for this pair.
    ///
    /// # Errors
    ///
    /// * [`FetchError::InvalidQuery`] if the location has no region key or the
    ///   provider rejects the query.
    /// * [`FetchError::RateLimited`] / [`FetchError::Provider`] from the provider,
    ///   and `Provider` for out-of-range scores or a series with a missing week
    ///   in the middle.
    pub async fn fetch(
        &self,
        location: &Location,
        term: &SearchTerm,
        range: DateRange,
    ) -> Result<Vec<TrendObservation>, FetchError> {
        let region = location
            .region
            .as_deref()
            .ok_or_else(|| FetchError::InvalidQuery {
                reason: format!("location '{}' has no region key", location.id),
            })?;

        let raw = self.provider.interest_over_time(region, term, range).await?;
        debug!(
            "Provider returned {} points for '{}' in {}",
            raw.len(),
            term,
            location.id
        );
        let weeks = normalize(
            &raw,
            self.week_start,
            self.alignment,
            range,
            &location.id,
            term,
        )?;

        Ok(weeks
            .into_iter()
            .map(|(week_start_date, interest_score)| TrendObservation {
                location_id: location.id.clone(),
                term: term.clone(),
                week_start_date,
                interest_score,
            })
            .collect())
    }
}

/// Aligns, clips, validates and de-duplicates raw points into a week → score map.
fn normalize(
    raw: &[RawTrendPoint],
    week_start: WeekStart,
    alignment: WeekAlignment,
    range: DateRange,
    location_id: &str,
    term: &SearchTerm,
) -> Result<BTreeMap<NaiveDate, u8>, FetchError> {
    let mut weeks = BTreeMap::new();
    for point in raw {
        let week = alignment.apply(week_start, point.date);
        if !range.contains(week) {
            continue;
        }
        let score = u8::try_from(point.value)
            .ok()
            .filter(|score| *score <= 100)
            .ok_or_else(|| {
                FetchError::malformed(format!(
                    "score {} for week of {} is outside 0-100",
                    point.value, point.date
                ))
            })?;
        if weeks.contains_key(&week) {
            warn!(
                "Provider returned two points for week {} of '{}' in {}, keeping the first",
                week, term, location_id
            );
            continue;
        }
        weeks.insert(week, score);
    }

    let (Some(&first), Some(&last)) = (weeks.keys().next(), weeks.keys().next_back()) else {
        return Ok(weeks);
    };

    let expected = ((last - first).num_days() / 7 + 1) as usize;
    if weeks.len() != expected {
        let missing = weeks
            .keys()
            .zip(weeks.keys().skip(1))
            .find(|(a, b)| **b - **a != Duration::days(7))
            .map(|(a, _)| *a + Duration::days(7))
            .unwrap_or(first);
        return Err(FetchError::malformed(format!(
            "series for '{}' in {} has no value for week of {}",
            term, location_id, missing
        )));
    }

    let boundaries = range.week_starts(week_start);
    if boundaries.first() != Some(&first) || boundaries.last() != Some(&last) {
        warn!(
            "Series for '{}' in {} covers {}..={} of {}",
            term, location_id, first, last, range
        );
    }
    Ok(weeks)
}
