//! Inclusive date ranges and the weekly boundaries trend series are aligned to.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::fmt;

/// The weekday on which a trend week begins.
///
/// Every `week_start_date` in the pipeline falls on this weekday so that series
/// from different locations and terms line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekStart(pub Weekday);

impl Default for WeekStart {
    /// ISO weeks start on Monday.
    fn default() -> Self {
        WeekStart(Weekday::Mon)
    }
}

impl WeekStart {
    /// Days between the most recent week boundary and `date` (0..=6).
    pub fn offset(self, date: NaiveDate) -> i64 {
        let current = date.weekday().num_days_from_monday() as i64;
        let start = self.0.num_days_from_monday() as i64;
        (current - start).rem_euclid(7)
    }

    pub fn is_boundary(self, date: NaiveDate) -> bool {
        self.offset(date) == 0
    }

    /// The latest week boundary on or before `date`.
    pub fn floor(self, date: NaiveDate) -> NaiveDate {
        date - Duration::days(self.offset(date))
    }

    /// The earliest week boundary on or after `date`.
    pub fn ceil(self, date: NaiveDate) -> NaiveDate {
        match self.offset(date) {
            0 => date,
            offset => date + Duration::days(7 - offset),
        }
    }

    /// Snaps `date` to the nearest week boundary, preferring the earlier one on a tie.
    pub fn nearest(self, date: NaiveDate) -> NaiveDate {
        let offset = self.offset(date);
        if offset <= 3 {
            date - Duration::days(offset)
        } else {
            date + Duration::days(7 - offset)
        }
    }
}

/// How the date a provider labels a week with is mapped onto a week boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WeekAlignment {
    /// The boundary on or before the label. A Sunday-dated provider week joins
    /// the ISO week that ends on that Sunday.
    #[default]
    Floor,
    /// The nearest boundary, earlier on a tie. A Sunday-dated provider week joins
    /// the Monday week that shares six of its seven days.
    Nearest,
}

impl WeekAlignment {
    pub fn apply(self, week_start: WeekStart, date: NaiveDate) -> NaiveDate {
        match self {
            WeekAlignment::Floor => week_start.floor(date),
            WeekAlignment::Nearest => week_start.nearest(date),
        }
    }
}

/// An inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Returns `None` when `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// January 1st through December 31st of `year`.
    pub fn year(year: i32) -> Option<Self> {
        Self::new(
            NaiveDate::from_ymd_opt(year, 1, 1)?,
            NaiveDate::from_ymd_opt(year, 12, 31)?,
        )
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Calendar years touched by the range, in order.
    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start.year()..=self.end.year()
    }

    /// Every week boundary that lies inside the range.
    pub fn week_starts(&self, week_start: WeekStart) -> Vec<NaiveDate> {
        let mut weeks = Vec::new();
        let mut current = week_start.ceil(self.start);
        while current <= self.end {
            weeks.push(current);
            current += Duration::days(7);
        }
        weeks
    }
}

impl fmt::Display for DateRange {
    /// Formats as `YYYY-MM-DD YYYY-MM-DD`, the timeframe syntax trend providers accept.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn nearest_moves_sunday_to_following_monday() {
        let ws = WeekStart::default();
        assert_eq!(ws.nearest(date(2023, 6, 4)), date(2023, 6, 5));
        assert_eq!(ws.nearest(date(2023, 6, 5)), date(2023, 6, 5));
        // Thursday is 3 days after Monday and 4 before the next: round down.
        assert_eq!(ws.nearest(date(2023, 6, 8)), date(2023, 6, 5));
        assert_eq!(ws.nearest(date(2023, 6, 9)), date(2023, 6, 12));
        assert_eq!(WeekAlignment::Nearest.apply(ws, date(2023, 6, 4)), date(2023, 6, 5));
    }

    #[test]
    fn floor_alignment_keeps_the_iso_week_of_the_label() {
        let ws = WeekStart::default();
        // Sunday 2023-06-04 closes ISO week 22, which starts Monday 05-29.
        let sunday = date(2023, 6, 4);
        let aligned = WeekAlignment::default().apply(ws, sunday);
        assert_eq!(aligned, date(2023, 5, 29));
        assert_eq!(aligned.iso_week().week(), 22);

        for week in 0..53 {
            let label = date(2023, 1, 1) + Duration::weeks(week);
            let aligned = WeekAlignment::Floor.apply(ws, label);
            assert_eq!(aligned.iso_week(), label.iso_week(), "label {label}");
            assert!(ws.is_boundary(aligned));
        }
    }

    #[test]
    fn floor_and_ceil_respect_custom_week_start() {
        let ws = WeekStart(Weekday::Sun);
        assert_eq!(ws.floor(date(2023, 6, 7)), date(2023, 6, 4));
        assert_eq!(ws.ceil(date(2023, 6, 7)), date(2023, 6, 11));
        assert!(ws.is_boundary(date(2023, 6, 4)));
    }

    #[test]
    fn week_starts_cover_range_without_gaps() {
        let range = DateRange::year(2023).unwrap();
        let weeks = range.week_starts(WeekStart::default());
        assert_eq!(weeks.first(), Some(&date(2023, 1, 2)));
        assert_eq!(weeks.last(), Some(&date(2023, 12, 25)));
        assert_eq!(weeks.len(), 52);
        assert!(weeks.windows(2).all(|w| w[1] - w[0] == Duration::days(7)));
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(DateRange::new(date(2023, 2, 1), date(2023, 1, 1)).is_none());
        assert_eq!(
            DateRange::year(2022).unwrap().to_string(),
            "2022-01-01 2022-12-31"
        );
    }
}
