//! The persisted extraction table, keyed by `(location_id, term, week_start_date)`.

use crate::extraction::canonical::CanonicalOrder;
use crate::extraction::error::StoreError;
use crate::tabular::{cell, line_of, read_text_csv, write_csv_atomic, TableWriteError};
use crate::types::date_range::DateRange;
use crate::types::observation::TrendObservation;
use crate::types::search_term::SearchTerm;
use chrono::NaiveDate;
use log::{info, warn};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::task;

const COLUMNS: [&str; 4] = ["location_id", "term", "week_start_date", "interest_score"];

/// What happens to an existing table when a run opens it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Keep saved rows; new observations overwrite rows with the same key.
    #[default]
    Upsert,
    /// Start from an empty table. An existing file is emptied (header only) when
    /// the store is opened, so it never disagrees with what the run merges.
    Replace,
}

type Key = (String, SearchTerm, NaiveDate);

pub struct ExtractionStore {
    path: PathBuf,
    rows: BTreeMap<Key, u8>,
}

impl ExtractionStore {
    /// Opens the table at `path`. A missing file is an empty table.
    pub fn open(path: &Path, mode: WriteMode) -> Result<Self, StoreError> {
        let mut store = Self {
            path: path.to_path_buf(),
            rows: BTreeMap::new(),
        };
        if !path.exists() {
            return Ok(store);
        }
        match mode {
            WriteMode::Upsert => {
                store.load()?;
                info!(
                    "Loaded {} saved rows from {}",
                    store.rows.len(),
                    path.display()
                );
            }
            WriteMode::Replace => {
                let empty = to_frame(&[]).map_err(|e| TableWriteError::Encode(path.to_path_buf(), e))?;
                write_csv_atomic(empty, path)?;
                warn!("Cleared saved rows in {}", path.display());
            }
        }
        Ok(store)
    }

    fn load(&mut self) -> Result<(), StoreError> {
        let df = read_text_csv(&self.path).map_err(|e| StoreError::Read(self.path.clone(), e))?;
        let corrupt = |line: usize, detail: String| StoreError::Corrupt {
            path: self.path.clone(),
            line,
            detail,
        };

        let mut columns = Vec::with_capacity(COLUMNS.len());
        for name in COLUMNS {
            let column = df
                .column(name)
                .and_then(|c| c.str())
                .map_err(|_| corrupt(1, format!("missing column '{}'", name)))?;
            columns.push(column);
        }

        for idx in 0..df.height() {
            let line = line_of(idx);
            let field = |col: usize| {
                cell(columns[col], idx)
                    .ok_or_else(|| corrupt(line, format!("empty '{}'", COLUMNS[col])))
            };
            let location_id = field(0)?;
            let term = field(1)?;
            let week = field(2)?;
            let week = NaiveDate::parse_from_str(week, "%Y-%m-%d")
                .map_err(|_| corrupt(line, format!("bad date '{}'", week)))?;
            let score = field(3)?;
            let score = score
                .parse::<u8>()
                .ok()
                .filter(|s| *s <= 100)
                .ok_or_else(|| corrupt(line, format!("bad score '{}'", score)))?;

            self.rows.insert(
                (location_id.to_string(), SearchTerm::new(term), week),
                score,
            );
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether any row exists for the pair inside `range`.
    pub fn has_pair_within(&self, location_id: &str, term: &SearchTerm, range: DateRange) -> bool {
        let from = (location_id.to_string(), term.clone(), range.start());
        let to = (location_id.to_string(), term.clone(), range.end());
        self.rows.range(from..=to).next().is_some()
    }

    /// Inserts or overwrites rows by key. Returns how many keys were new.
    pub fn upsert(&mut self, observations: &[TrendObservation]) -> usize {
        observations
            .iter()
            .filter(|o| self.rows.insert(o.key(), o.interest_score).is_none())
            .count()
    }

    /// All rows in canonical order.
    pub fn observations(&self, order: &CanonicalOrder) -> Vec<TrendObservation> {
        let mut observations: Vec<TrendObservation> = self
            .rows
            .iter()
            .map(|((location_id, term, week), score)| TrendObservation {
                location_id: location_id.clone(),
                term: term.clone(),
                week_start_date: *week,
                interest_score: *score,
            })
            .collect();
        observations.sort_by(|a, b| {
            order.compare(
                (a.location_id.as_str(), &a.term, a.week_start_date),
                (b.location_id.as_str(), &b.term, b.week_start_date),
            )
        });
        observations
    }

    /// Rewrites the table file in canonical order. The old file stays intact until
    /// the new one is complete.
    pub async fn flush(&self, order: &CanonicalOrder) -> Result<(), StoreError> {
        let observations = self.observations(order);
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let df = to_frame(&observations)
                .map_err(|e| TableWriteError::Encode(path.clone(), e))?;
            write_csv_atomic(df, &path)
        })
        .await??;
        Ok(())
    }
}

fn to_frame(observations: &[TrendObservation]) -> PolarsResult<DataFrame> {
    df!(
        COLUMNS[0] => observations.iter().map(|o| o.location_id.as_str()).collect::<Vec<_>>(),
        COLUMNS[1] => observations.iter().map(|o| o.term.as_str()).collect::<Vec<_>>(),
        COLUMNS[2] => observations
            .iter()
            .map(|o| o.week_start_date.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>(),
        COLUMNS[3] => observations.iter().map(|o| i64::from(o.interest_score)).collect::<Vec<_>>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn obs(location: &str, term: &str, day: u32, score: u8) -> TrendObservation {
        TrendObservation {
            location_id: location.to_string(),
            term: SearchTerm::from(term),
            week_start_date: NaiveDate::from_ymd_opt(2023, 6, day).unwrap(),
            interest_score: score,
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_key_and_survives_reopen() -> Result<(), StoreError> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extraction.csv");
        let order = CanonicalOrder::default();

        let mut store = ExtractionStore::open(&path, WriteMode::Upsert)?;
        assert_eq!(store.upsert(&[obs("ames-ia", "Fishing", 5, 42), obs("ames-ia", "Fishing", 12, 40)]), 2);
        store.flush(&order).await?;

        let mut reopened = ExtractionStore::open(&path, WriteMode::Upsert)?;
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.upsert(&[obs("ames-ia", "Fishing", 5, 50)]), 0);
        reopened.flush(&order).await?;

        let rows = ExtractionStore::open(&path, WriteMode::Upsert)?.observations(&order);
        assert_eq!(rows, vec![obs("ames-ia", "Fishing", 5, 50), obs("ames-ia", "Fishing", 12, 40)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_mode_ignores_saved_rows() -> Result<(), StoreError> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extraction.csv");
        let mut store = ExtractionStore::open(&path, WriteMode::Upsert)?;
        store.upsert(&[obs("ames-ia", "Fishing", 5, 42)]);
        store.flush(&CanonicalOrder::default()).await?;

        let replaced = ExtractionStore::open(&path, WriteMode::Replace)?;
        assert!(replaced.is_empty());

        // Nothing was written by the replacing run, yet the file no longer holds the old rows.
        let reopened = ExtractionStore::open(&path, WriteMode::Upsert)?;
        assert!(reopened.is_empty());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim_end(),
            "location_id,term,week_start_date,interest_score"
        );
        Ok(())
    }

    #[test]
    fn test_has_pair_within_range() {
        let dir = tempdir().unwrap();
        let mut store = ExtractionStore::open(&dir.path().join("t.csv"), WriteMode::Upsert).unwrap();
        store.upsert(&[obs("ames-ia", "Fishing", 12, 1)]);
        let term = SearchTerm::from("Fishing");

        let june = DateRange::new(
            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
        )
        .unwrap();
        let july = DateRange::new(
            NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 7, 31).unwrap(),
        )
        .unwrap();
        assert!(store.has_pair_within("ames-ia", &term, june));
        assert!(!store.has_pair_within("ames-ia", &term, july));
        assert!(!store.has_pair_within("ames-ia", &SearchTerm::from("Ice Fishing"), june));
    }

    #[test]
    fn test_corrupt_row_is_reported_with_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extraction.csv");
        std::fs::write(
            &path,
            "location_id,term,week_start_date,interest_score\names-ia,Fishing,2023-06-05,42\names-ia,Fishing,June 12,40\n",
        )
        .unwrap();

        let err = ExtractionStore::open(&path, WriteMode::Upsert).err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { line: 3, .. }), "{err:?}");
    }
}
