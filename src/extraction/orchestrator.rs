//! Drives the fetcher across the (location × term) grid.
//!
//! All pairs share one rate limiter. Provider errors are retried per pair with
//! exponential backoff, rate-limit answers pause every pair, and pairs that still
//! fail are recorded as partial failures while the run carries on. Each
//! successful pair is upserted into the extraction table immediately, so an
//! interrupted run keeps everything fetched so far.

use crate::catalog::location_catalog::LocationCatalog;
use crate::extraction::canonical::CanonicalOrder;
use crate::extraction::error::ExtractionError;
use crate::extraction::failures::PartialFailure;
use crate::extraction::rate_limiter::{RateLimitConfig, SharedRateLimiter};
use crate::extraction::retry::RetryPolicy;
use crate::extraction::store::ExtractionStore;
use crate::trends::error::FetchError;
use crate::trends::fetcher::TrendSeriesFetcher;
use crate::trends::provider::TrendsProvider;
use crate::types::date_range::DateRange;
use crate::types::location::Location;
use crate::types::observation::TrendObservation;
use crate::types::search_term::{default_search_terms, SearchTerm};
use crate::validation::ValidationError;
use bon::Builder;
use futures_util::{stream, StreamExt, TryStreamExt};
use log::{info, warn};
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Random pause before each provider call, drawn uniformly from `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Jitter {
    fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = (self.max.as_millis() as u64).max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

#[derive(Debug, Clone, Builder)]
pub struct ExtractionConfig {
    /// Queried in this order for every location.
    #[builder(default = default_search_terms())]
    pub search_terms: Vec<SearchTerm>,
    pub date_range: DateRange,
    #[builder(default)]
    pub rate_limit: RateLimitConfig,
    #[builder(default)]
    pub retry: RetryPolicy,
    /// Grid cells in flight at once.
    #[builder(default = 1)]
    pub concurrency: usize,
    pub jitter: Option<Jitter>,
    /// Skip pairs that already have rows inside `date_range` in the saved table.
    #[builder(default)]
    pub skip_completed: bool,
    /// Process at most this many locations (those with pending pairs) per run.
    pub max_locations_per_run: Option<usize>,
}

impl ExtractionConfig {
    /// Search terms must be non-empty, non-blank and unique.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.search_terms.is_empty() {
            return Err(ValidationError::NoSearchTerms);
        }
        let mut seen = HashSet::with_capacity(self.search_terms.len());
        for term in &self.search_terms {
            if term.as_str().trim().is_empty() {
                return Err(ValidationError::BlankSearchTerm);
            }
            if !seen.insert(term) {
                return Err(ValidationError::DuplicateSearchTerm(term.to_string()));
            }
        }
        Ok(())
    }
}

/// Result of a completed (possibly cancelled) extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// Everything fetched by this run, in canonical order.
    pub observations: Vec<TrendObservation>,
    /// Pairs that were given up on, in canonical order.
    pub failures: Vec<PartialFailure>,
    pub pairs_attempted: usize,
    /// Pairs not attempted because they were already complete, over the per-run
    /// location limit, or unknown to the catalog.
    pub pairs_skipped: usize,
    pub cancelled: bool,
}

/// Shared state of one run, handed to every grid cell.
struct RunContext<'s> {
    limiter: SharedRateLimiter,
    failures: Mutex<Vec<PartialFailure>>,
    store: Mutex<&'s mut ExtractionStore>,
    order: CanonicalOrder,
}

enum CellOutcome {
    Fetched(Vec<TrendObservation>),
    Failed,
    Cancelled,
}

pub struct ExtractionOrchestrator<P> {
    fetcher: TrendSeriesFetcher<P>,
    config: ExtractionConfig,
}

impl<P: TrendsProvider> ExtractionOrchestrator<P> {
    pub fn new(fetcher: TrendSeriesFetcher<P>, config: ExtractionConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Runs the full grid: catalog order × configured term order.
    ///
    /// # Errors
    ///
    /// Only run-terminating conditions: an empty catalog, invalid search terms,
    /// every attempted pair failing, or the extraction table not being writable.
    /// Individual pair failures are reported in [`ExtractionOutcome::failures`].
    pub async fn run(
        &self,
        catalog: &LocationCatalog,
        store: &mut ExtractionStore,
        cancel: &CancellationToken,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        if catalog.is_empty() {
            return Err(ExtractionError::EmptyCatalog);
        }
        self.config.validate()?;

        let mut pairs = Vec::new();
        let mut skipped = 0;
        let mut locations_taken = 0;
        for location in catalog.iter() {
            let pending: Vec<&SearchTerm> = self
                .config
                .search_terms
                .iter()
                .filter(|term| {
                    !(self.config.skip_completed
                        && store.has_pair_within(&location.id, term, self.config.date_range))
                })
                .collect();
            skipped += self.config.search_terms.len() - pending.len();
            if pending.is_empty() {
                continue;
            }
            if self
                .config
                .max_locations_per_run
                .is_some_and(|max| locations_taken >= max)
            {
                skipped += pending.len();
                continue;
            }
            locations_taken += 1;
            pairs.extend(pending.into_iter().map(|term| (location, term.clone())));
        }
        if skipped > 0 {
            info!("Skipping {} pairs (already complete or over the per-run limit)", skipped);
        }

        let mut outcome = self.execute(catalog, pairs, store, cancel).await?;
        outcome.pairs_skipped += skipped;
        Ok(outcome)
    }

    /// Runs only the given pairs, e.g. those listed in an earlier failure report.
    ///
    /// Pairs whose location is not in the catalog are skipped with a warning.
    pub async fn run_pairs(
        &self,
        catalog: &LocationCatalog,
        pairs: &[(String, SearchTerm)],
        store: &mut ExtractionStore,
        cancel: &CancellationToken,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        if catalog.is_empty() {
            return Err(ExtractionError::EmptyCatalog);
        }

        let mut resolved = Vec::with_capacity(pairs.len());
        let mut seen = HashSet::with_capacity(pairs.len());
        let mut skipped = 0;
        for (location_id, term) in pairs {
            match catalog.get(location_id) {
                Some(location) if seen.insert((location_id, term)) => {
                    resolved.push((location, term.clone()));
                }
                Some(_) => {}
                None => {
                    warn!("Skipping '{}' for unknown location '{}'", term, location_id);
                    skipped += 1;
                }
            }
        }

        let mut outcome = self.execute(catalog, resolved, store, cancel).await?;
        outcome.pairs_skipped += skipped;
        Ok(outcome)
    }

    async fn execute(
        &self,
        catalog: &LocationCatalog,
        mut pairs: Vec<(&Location, SearchTerm)>,
        store: &mut ExtractionStore,
        cancel: &CancellationToken,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let order = CanonicalOrder::new(catalog, &self.config.search_terms);
        pairs.sort_by(|a, b| {
            order.compare_pairs((a.0.id.as_str(), &a.1), (b.0.id.as_str(), &b.1))
        });

        info!(
            "Extracting {} pairs for {} with concurrency {}",
            pairs.len(),
            self.config.date_range,
            self.config.concurrency.max(1)
        );

        let ctx = RunContext {
            limiter: SharedRateLimiter::new(self.config.rate_limit),
            failures: Mutex::new(Vec::new()),
            store: Mutex::new(store),
            order,
        };

        let results: Vec<CellOutcome> = stream::iter(pairs.iter())
            .map(|(location, term)| self.run_cell(&ctx, location, term, cancel))
            .buffer_unordered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        let mut outcome = ExtractionOutcome::default();
        let mut fetched_pairs = 0;
        for result in results {
            match result {
                CellOutcome::Fetched(observations) => {
                    fetched_pairs += 1;
                    outcome.observations.extend(observations);
                }
                CellOutcome::Failed => {}
                CellOutcome::Cancelled => outcome.cancelled = true,
            }
        }

        let RunContext {
            failures, order, ..
        } = ctx;
        outcome.failures = failures.into_inner();
        outcome.failures.sort_by(|a, b| {
            order.compare_pairs(
                (a.location_id.as_str(), &a.term),
                (b.location_id.as_str(), &b.term),
            )
        });
        outcome.observations.sort_by(|a, b| {
            order.compare(
                (a.location_id.as_str(), &a.term, a.week_start_date),
                (b.location_id.as_str(), &b.term, b.week_start_date),
            )
        });
        outcome.pairs_attempted = fetched_pairs + outcome.failures.len();

        info!(
            "Extraction finished: {} pairs fetched ({} rows), {} failed{}",
            fetched_pairs,
            outcome.observations.len(),
            outcome.failures.len(),
            if outcome.cancelled { ", cancelled" } else { "" }
        );

        if outcome.pairs_attempted > 0 && fetched_pairs == 0 {
            return Err(ExtractionError::AllPairsFailed {
                failures: outcome.failures,
            });
        }
        Ok(outcome)
    }

    /// Fetches one pair with retries. Only store failures are returned as errors.
    async fn run_cell(
        &self,
        ctx: &RunContext<'_>,
        location: &Location,
        term: &SearchTerm,
        cancel: &CancellationToken,
    ) -> Result<CellOutcome, ExtractionError> {
        let retry = self.config.retry;
        let mut calls = 0u32;
        let mut provider_failures = 0u32;
        let mut rate_limit_waits = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Ok(CellOutcome::Cancelled);
            }
            if let Some(jitter) = self.config.jitter {
                if !sleep_or_cancel(jitter.sample(), cancel).await {
                    return Ok(CellOutcome::Cancelled);
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(CellOutcome::Cancelled),
                _ = ctx.limiter.acquire() => {}
            }

            calls += 1;
            info!("Fetching '{}' for {} (call {})", term, location, calls);
            let error = match self
                .fetcher
                .fetch(location, term, self.config.date_range)
                .await
            {
                Ok(observations) => {
                    if observations.is_empty() {
                        warn!("No data for '{}' in {}", term, location.id);
                    } else {
                        let mut store = ctx.store.lock().await;
                        store.upsert(&observations);
                        store.flush(&ctx.order).await?;
                    }
                    return Ok(CellOutcome::Fetched(observations));
                }
                Err(error) => error,
            };

            let give_up = match &error {
                FetchError::InvalidQuery { .. } => true,
                FetchError::RateLimited { retry_after } => {
                    rate_limit_waits += 1;
                    if rate_limit_waits > retry.max_rate_limit_waits {
                        true
                    } else {
                        ctx.limiter.pause_for(*retry_after).await;
                        false
                    }
                }
                FetchError::Provider { .. } => {
                    provider_failures += 1;
                    if provider_failures >= retry.max_attempts {
                        true
                    } else {
                        let delay = retry.backoff(provider_failures);
                        warn!(
                            "'{}' in {} failed ({}), retrying in {:.1}s",
                            term,
                            location.id,
                            error,
                            delay.as_secs_f64()
                        );
                        if !sleep_or_cancel(delay, cancel).await {
                            return Ok(CellOutcome::Cancelled);
                        }
                        false
                    }
                }
            };

            if give_up {
                warn!(
                    "Giving up on '{}' in {} after {} calls: {}",
                    term, location.id, calls, error
                );
                ctx.failures.lock().await.push(PartialFailure::from_error(
                    &location.id,
                    term,
                    &error,
                    calls,
                ));
                return Ok(CellOutcome::Failed);
            }
        }
    }
}

/// Sleeps for `delay`; returns `false` if the run was cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(delay) => true,
    }
}
