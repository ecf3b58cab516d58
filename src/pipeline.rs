//! One batch run end to end: load inputs, extract, report failures, merge.

use crate::catalog::location_catalog::LocationCatalog;
use crate::error::PipelineError;
use crate::extraction::canonical::CanonicalOrder;
use crate::extraction::error::ExtractionError;
use crate::extraction::failures::{read_failure_report, write_failure_report};
use crate::extraction::orchestrator::{ExtractionConfig, ExtractionOrchestrator, ExtractionOutcome};
use crate::extraction::store::{ExtractionStore, WriteMode};
use crate::merge::engine::{merge, MergeConfig, MergeSummary};
use crate::merge::writer::write_merged_csv;
use crate::temperature::source::{TemperatureDataset, TemperatureSource};
use crate::trends::fetcher::TrendSeriesFetcher;
use crate::trends::provider::TrendsProvider;
use crate::types::date_range::{WeekAlignment, WeekStart};
use bon::Builder;
use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::task;
use tokio_util::sync::CancellationToken;

const DEFAULT_FAILURES_FILE: &str = "failures.json";

#[derive(Debug, Clone, Builder)]
pub struct PipelineConfig {
    /// Location catalog CSV.
    pub locations_path: PathBuf,
    /// Temperature CSV.
    pub temperature_path: PathBuf,
    /// Extraction table, read on start and rewritten after every fetched pair.
    pub extraction_path: PathBuf,
    /// Merged output CSV.
    pub merged_path: PathBuf,
    /// Failure report. Defaults to `failures.json` next to the merged output.
    pub failures_path: Option<PathBuf>,
    pub extraction: ExtractionConfig,
    #[builder(default)]
    pub write_mode: WriteMode,
    #[builder(default)]
    pub merge: MergeConfig,
    #[builder(default)]
    pub week_start: WeekStart,
    /// How provider week labels map onto `week_start` boundaries.
    #[builder(default)]
    pub week_alignment: WeekAlignment,
}

impl PipelineConfig {
    pub fn failures_path(&self) -> PathBuf {
        self.failures_path
            .clone()
            .unwrap_or_else(|| self.merged_path.with_file_name(DEFAULT_FAILURES_FILE))
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub extraction: ExtractionOutcome,
    pub merge: MergeSummary,
    /// Rows in the merged output (the whole saved extraction table).
    pub merged_rows: usize,
    pub merged_path: PathBuf,
    pub failures_path: PathBuf,
}

pub struct Pipeline<P> {
    orchestrator: ExtractionOrchestrator<P>,
    config: PipelineConfig,
}

impl<P: TrendsProvider> Pipeline<P> {
    pub fn new(provider: P, config: PipelineConfig) -> Self {
        let orchestrator = ExtractionOrchestrator::new(
            TrendSeriesFetcher::new(provider, config.week_start)
                .with_alignment(config.week_alignment),
            config.extraction.clone(),
        );
        Self {
            orchestrator,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extracts the full grid, then merges the saved extraction table with the
    /// temperature data.
    ///
    /// All inputs are validated before the first provider call. The failure
    /// report is written even when every pair failed.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport, PipelineError> {
        let (catalog, temperature) = self.load_inputs()?;
        let mut store = ExtractionStore::open(&self.config.extraction_path, self.config.write_mode)?;

        let outcome = self.orchestrator.run(&catalog, &mut store, cancel).await;
        self.finish(&catalog, &temperature, &store, outcome).await
    }

    /// Re-runs only the pairs listed in the last failure report.
    ///
    /// Saved rows are always kept, whatever the configured write mode.
    pub async fn rerun_failures(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let (catalog, temperature) = self.load_inputs()?;
        let failures_path = self.config.failures_path();
        let pairs: Vec<_> = read_failure_report(&failures_path)?
            .into_iter()
            .map(|failure| (failure.location_id, failure.term))
            .collect();
        info!(
            "Re-running {} failed pairs from {}",
            pairs.len(),
            failures_path.display()
        );

        let mut store = ExtractionStore::open(&self.config.extraction_path, WriteMode::Upsert)?;
        let outcome = self
            .orchestrator
            .run_pairs(&catalog, &pairs, &mut store, cancel)
            .await;
        self.finish(&catalog, &temperature, &store, outcome).await
    }

    /// Merges the saved extraction table without calling the provider.
    pub async fn merge_saved(&self) -> Result<(MergeSummary, usize), PipelineError> {
        let (catalog, temperature) = self.load_inputs()?;
        let store = ExtractionStore::open(&self.config.extraction_path, WriteMode::Upsert)?;
        self.merge_store(&catalog, &temperature, &store).await
    }

    fn load_inputs(&self) -> Result<(LocationCatalog, TemperatureDataset), PipelineError> {
        let catalog = LocationCatalog::load(&self.config.locations_path)?;
        self.config.extraction.validate()?;
        let temperature = TemperatureSource::load(&self.config.temperature_path, &catalog)?;
        Ok((catalog, temperature))
    }

    async fn finish(
        &self,
        catalog: &LocationCatalog,
        temperature: &TemperatureDataset,
        store: &ExtractionStore,
        outcome: Result<ExtractionOutcome, ExtractionError>,
    ) -> Result<RunReport, PipelineError> {
        let failures_path = self.config.failures_path();
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(ExtractionError::AllPairsFailed { failures }) => {
                write_report(&failures_path, failures.clone()).await?;
                return Err(ExtractionError::AllPairsFailed { failures }.into());
            }
            Err(e) => return Err(e.into()),
        };

        write_report(&failures_path, outcome.failures.clone()).await?;
        if !outcome.failures.is_empty() {
            warn!(
                "{} pairs failed, see {}",
                outcome.failures.len(),
                failures_path.display()
            );
        }

        let (summary, merged_rows) = self.merge_store(catalog, temperature, store).await?;
        Ok(RunReport {
            extraction: outcome,
            merge: summary,
            merged_rows,
            merged_path: self.config.merged_path.clone(),
            failures_path,
        })
    }

    async fn merge_store(
        &self,
        catalog: &LocationCatalog,
        temperature: &TemperatureDataset,
        store: &ExtractionStore,
    ) -> Result<(MergeSummary, usize), PipelineError> {
        let order = CanonicalOrder::new(catalog, &self.config.extraction.search_terms);
        let trends = store.observations(&order);
        if let Some(anchor) = temperature.weekly_anchor() {
            info!(
                "Temperature data is weekly, dated on {} ({:?} of each period)",
                anchor, self.config.merge.weekly_label
            );
        }
        let (records, summary) = merge(&trends, temperature, &self.config.merge);
        info!(
            "Merged {} rows: {} exact, {} nearest, {} missing",
            summary.total(),
            summary.exact,
            summary.nearest_within_tolerance,
            summary.missing
        );

        let merged_rows = records.len();
        let path = self.config.merged_path.clone();
        task::spawn_blocking(move || write_merged_csv(&path, &records)).await??;
        Ok((summary, merged_rows))
    }
}

async fn write_report(
    path: &Path,
    failures: Vec<crate::extraction::failures::PartialFailure>,
) -> Result<(), PipelineError> {
    let path = path.to_path_buf();
    task::spawn_blocking(move || write_failure_report(&path, &failures)).await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::failures::FailureReason;
    use crate::trends::error::FetchError;
    use crate::trends::provider::RawTrendPoint;
    use crate::types::date_range::DateRange;
    use crate::types::search_term::SearchTerm;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    /// Full June series for every pair, except the listed `(region, term)` pairs
    /// which fail with a clone of the given error.
    struct StubProvider {
        failing: Vec<(&'static str, &'static str, FetchError)>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TrendsProvider for StubProvider {
        async fn interest_over_time(
            &self,
            region: &str,
            term: &SearchTerm,
            _range: DateRange,
        ) -> Result<Vec<RawTrendPoint>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((_, _, error)) = self
                .failing
                .iter()
                .find(|(r, t, _)| *r == region && *t == term.as_str())
            {
                return Err(error.clone());
            }
            Ok([5, 12, 19, 26]
                .into_iter()
                .map(|day| RawTrendPoint {
                    date: NaiveDate::from_ymd_opt(2023, 6, day).unwrap(),
                    value: 40 + i64::from(day),
                })
                .collect())
        }
    }

    fn stub(failing: Vec<(&'static str, &'static str, FetchError)>) -> (StubProvider, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            StubProvider {
                failing,
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn invalid_query() -> FetchError {
        FetchError::InvalidQuery {
            reason: "not enough search volume".to_string(),
        }
    }

    fn write_inputs(dir: &Path, catalog: &str) -> PipelineConfig {
        std::fs::write(dir.join("locations.csv"), catalog).unwrap();
        std::fs::write(
            dir.join("temperature.csv"),
            "location_id,date,temperature_value,unit\n\
             ames-ia,2023-06-03,18.2,C\n\
             ames-ia,2023-06-09,21.0,C\n\
             duluth-mn,2023-06-20,12.0,C\n",
        )
        .unwrap();

        PipelineConfig::builder()
            .locations_path(dir.join("locations.csv"))
            .temperature_path(dir.join("temperature.csv"))
            .extraction_path(dir.join("extraction.csv"))
            .merged_path(dir.join("out").join("merged.csv"))
            .extraction(
                ExtractionConfig::builder()
                    .search_terms(vec!["Fishing".into(), "Ice Fishing".into()])
                    .date_range(
                        DateRange::new(
                            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
                            NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
                        )
                        .unwrap(),
                    )
                    .build(),
            )
            .build()
    }

    const CATALOG: &str = "id,display_name,region,latitude,longitude\n\
                           ames-ia,Ames,US-IA-679,42.0308,-93.6319\n\
                           duluth-mn,Duluth,US-MN-676,46.7867,-92.1005\n";

    fn setup() -> (TempDir, PipelineConfig) {
        let dir = tempdir().unwrap();
        let config = write_inputs(dir.path(), CATALOG);
        (dir, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_catalog_id_fails_before_any_provider_call() {
        let dir = tempdir().unwrap();
        let config = write_inputs(
            dir.path(),
            "id,display_name,region,latitude,longitude\n\
             ames-ia,Ames,US-IA-679,,\n\
             ames-ia,Ames again,US-IA-679,,\n",
        );
        let (provider, calls) = stub(vec![]);

        let err = Pipeline::new(provider, config)
            .run(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Validation(crate::validation::ValidationError::DuplicateLocationId { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_query_pair_is_reported_and_the_rest_is_merged() {
        let (_dir, config) = setup();
        let (provider, _) = stub(vec![("US-IA-679", "Ice Fishing", invalid_query())]);
        let pipeline = Pipeline::new(provider, config);

        let report = pipeline.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.extraction.failures.len(), 1);
        assert_eq!(report.extraction.failures[0].reason, FailureReason::InvalidQuery);
        assert_eq!(report.merged_rows, 3 * 4);
        assert_eq!(report.merge.total(), 12);

        let failures = read_failure_report(&report.failures_path).unwrap();
        assert_eq!(failures, report.extraction.failures);
        assert_eq!(report.failures_path, report.merged_path.with_file_name("failures.json"));

        let merged = std::fs::read_to_string(&report.merged_path).unwrap();
        let rows: Vec<&str> = merged.lines().skip(1).collect();
        assert_eq!(rows.len(), 12);
        assert!(rows[0].starts_with("ames-ia,Fishing,2023-06-05,45,21"));
        assert!(rows[0].contains(",2023-06-05,exact,"));
        assert!(!rows.iter().any(|r| r.starts_with("ames-ia,Ice Fishing")));
        assert!(rows.iter().any(|r| r.starts_with("duluth-mn,Ice Fishing,2023-06-26")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_is_idempotent() {
        let (_dir, config) = setup();
        let (provider, _) = stub(vec![]);
        let pipeline = Pipeline::new(provider, config);

        let first = pipeline.run(&CancellationToken::new()).await.unwrap();
        let extraction = std::fs::read(&pipeline.config().extraction_path).unwrap();
        let merged = std::fs::read(&first.merged_path).unwrap();

        let second = pipeline.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(second.merged_rows, first.merged_rows);
        assert_eq!(std::fs::read(&pipeline.config().extraction_path).unwrap(), extraction);
        assert_eq!(std::fs::read(&second.merged_path).unwrap(), merged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_pairs_failing_still_writes_the_report() {
        let (_dir, config) = setup();
        let (provider, _) = stub(vec![
            ("US-IA-679", "Fishing", invalid_query()),
            ("US-IA-679", "Ice Fishing", invalid_query()),
            ("US-MN-676", "Fishing", invalid_query()),
            ("US-MN-676", "Ice Fishing", invalid_query()),
        ]);
        let pipeline = Pipeline::new(provider, config);

        let err = pipeline.run(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Extraction(ExtractionError::AllPairsFailed { .. })
        ));
        let failures = read_failure_report(&pipeline.config().failures_path()).unwrap();
        assert_eq!(failures.len(), 4);
        assert!(!pipeline.config().merged_path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_failures_fills_the_gaps() {
        let (_dir, config) = setup();
        let provider_error = FetchError::Provider {
            status: Some(500),
            message: "backend error".to_string(),
        };
        let (flaky, _) = stub(vec![("US-MN-676", "Ice Fishing", provider_error)]);
        let first = Pipeline::new(flaky, config.clone())
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.extraction.failures.len(), 1);
        assert_eq!(first.merged_rows, 12);

        let (healthy, calls) = stub(vec![]);
        let second = Pipeline::new(healthy, config)
            .rerun_failures(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(second.extraction.failures.is_empty());
        assert_eq!(second.merged_rows, 16);
        assert!(read_failure_report(&second.failures_path).unwrap().is_empty());
    }
}
