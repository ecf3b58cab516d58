//! Joins weekly trend observations with temperature readings.
//!
//! For each trend week the readings of the same location inside the week window
//! are aggregated: mean of the means, highest maximum, lowest minimum and total
//! precipitation. If the window is empty, the nearest single reading within the
//! tolerance is used instead, and beyond that the record is marked missing.
//! Pure: no I/O, output order equals input order.

use crate::temperature::source::{TemperatureDataset, TemperatureGranularity};
use crate::types::observation::{
    MatchQuality, MergedRecord, TemperatureObservation, TrendObservation,
};
use bon::Builder;
use chrono::{Duration, NaiveDate};

/// Which end of its seven-day period a weekly reading is dated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WeeklyLabel {
    /// Dated on the last day, as weekly resampling to Sunday produces.
    #[default]
    PeriodEnd,
    /// Dated on the first day.
    PeriodStart,
}

impl WeeklyLabel {
    /// Days from the first day of the period to the label.
    fn offset_days(self) -> i64 {
        match self {
            WeeklyLabel::PeriodEnd => 6,
            WeeklyLabel::PeriodStart => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct MergeConfig {
    /// How far outside the week window a reading may lie and still be used.
    #[builder(default = 7)]
    pub tolerance_days: i64,
    /// How weekly temperature readings are dated. Ignored for daily data.
    #[builder(default)]
    pub weekly_label: WeeklyLabel,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            tolerance_days: 7,
            weekly_label: WeeklyLabel::default(),
        }
    }
}

/// Number of merged records per match quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub exact: usize,
    pub nearest_within_tolerance: usize,
    pub missing: usize,
}

impl MergeSummary {
    fn record(&mut self, quality: MatchQuality) {
        match quality {
            MatchQuality::Exact => self.exact += 1,
            MatchQuality::NearestWithinTolerance => self.nearest_within_tolerance += 1,
            MatchQuality::Missing => self.missing += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.exact + self.nearest_within_tolerance + self.missing
    }
}

/// Produces exactly one [`MergedRecord`] per trend observation, in input order.
///
/// Daily readings match the week `[week_start, week_start + 6]`. A weekly
/// reading matches the trend week that shares at least four days with the
/// seven-day period it summarizes.
pub fn merge(
    trends: &[TrendObservation],
    temperature: &TemperatureDataset,
    config: &MergeConfig,
) -> (Vec<MergedRecord>, MergeSummary) {
    let granularity = temperature.granularity();
    let mut summary = MergeSummary::default();
    let records = trends
        .iter()
        .map(|trend| {
            let readings = temperature.for_location(&trend.location_id);
            let (start, end) = reading_window(granularity, config.weekly_label, trend.week_start_date);
            let weather = match find_readings(readings, start, end, config.tolerance_days) {
                WeekMatch::Inside(inside) => {
                    let source_date = match granularity {
                        TemperatureGranularity::Daily => trend.week_start_date,
                        TemperatureGranularity::Weekly(_) => inside[0].date,
                    };
                    Weather::aggregate(inside, source_date, MatchQuality::Exact)
                }
                WeekMatch::Nearest(reading) => Weather::aggregate(
                    std::slice::from_ref(reading),
                    reading.date,
                    MatchQuality::NearestWithinTolerance,
                ),
                WeekMatch::Missing => Weather::missing(),
            };
            summary.record(weather.quality);
            MergedRecord {
                location_id: trend.location_id.clone(),
                term: trend.term.clone(),
                week_start_date: trend.week_start_date,
                interest_score: trend.interest_score,
                temperature_value: weather.mean,
                temperature_source_date: weather.source_date,
                match_quality: weather.quality,
                temperature_max: weather.max,
                temperature_min: weather.min,
                precipitation_mm: weather.precipitation_mm,
            }
        })
        .collect();
    (records, summary)
}

/// Inclusive range of reading dates that belong to the trend week starting at `week_start`.
fn reading_window(
    granularity: TemperatureGranularity,
    label: WeeklyLabel,
    week_start: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    match granularity {
        TemperatureGranularity::Daily => (week_start, week_start + Duration::days(6)),
        TemperatureGranularity::Weekly(_) => {
            // A period starting within 3 days of the week start overlaps it by 4+ days.
            let label_of_aligned_period = week_start + Duration::days(label.offset_days());
            (
                label_of_aligned_period - Duration::days(3),
                label_of_aligned_period + Duration::days(3),
            )
        }
    }
}

enum WeekMatch<'a> {
    Inside(&'a [TemperatureObservation]),
    Nearest(&'a TemperatureObservation),
    Missing,
}

/// `readings` are sorted by date.
fn find_readings(
    readings: &[TemperatureObservation],
    start: NaiveDate,
    end: NaiveDate,
    tolerance_days: i64,
) -> WeekMatch<'_> {
    let first_in = readings.partition_point(|r| r.date < start);
    let first_after = readings.partition_point(|r| r.date <= end);

    let inside = &readings[first_in..first_after];
    if !inside.is_empty() {
        return WeekMatch::Inside(inside);
    }

    let before = first_in
        .checked_sub(1)
        .map(|idx| &readings[idx])
        .map(|r| ((start - r.date).num_days(), r));
    let after = readings
        .get(first_after)
        .map(|r| ((r.date - end).num_days(), r));

    let nearest = match (before, after) {
        (Some(b), Some(a)) => Some(if a.0 < b.0 { a } else { b }),
        (b, a) => b.or(a),
    };
    match nearest {
        Some((distance, reading)) if distance <= tolerance_days => WeekMatch::Nearest(reading),
        _ => WeekMatch::Missing,
    }
}

/// Temperature fields of one merged record.
struct Weather {
    mean: Option<f64>,
    max: Option<f64>,
    min: Option<f64>,
    precipitation_mm: Option<f64>,
    source_date: Option<NaiveDate>,
    quality: MatchQuality,
}

impl Weather {
    /// `readings` is non-empty.
    fn aggregate(
        readings: &[TemperatureObservation],
        source_date: NaiveDate,
        quality: MatchQuality,
    ) -> Self {
        let mean =
            readings.iter().map(|r| r.temperature_value).sum::<f64>() / readings.len() as f64;
        let max = readings
            .iter()
            .filter_map(|r| r.temperature_max)
            .reduce(f64::max);
        let min = readings
            .iter()
            .filter_map(|r| r.temperature_min)
            .reduce(f64::min);
        let precipitation_mm = readings
            .iter()
            .filter_map(|r| r.precipitation_mm)
            .reduce(|total, mm| total + mm);
        Self {
            mean: Some(mean),
            max,
            min,
            precipitation_mm,
            source_date: Some(source_date),
            quality,
        }
    }

    fn missing() -> Self {
        Self {
            mean: None,
            max: None,
            min: None,
            precipitation_mm: None,
            source_date: None,
            quality: MatchQuality::Missing,
        }
    }
}
