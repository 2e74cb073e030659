//! Query engine facade.
//!
//! Wires the optimiser, the matching pipeline and the batch fetcher
//! together behind one entry point:
//!
//! ```text
//! query ──► subject check ──► range validation ──► estimate / crop
//!       ──► matching set ──► batched hydration ──► QueryResult
//! ```

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::cancel::guarded;
use crate::config::{ObservaConfig, QueryConfig};
use crate::error::{Error, Result};
use crate::fetch::{FetchTimings, ObservationBatchFetcher};
use crate::matching::{ExecutionHints, MatchingPlan, MatchingSet, MatchingSetGenerator};
use crate::model::ObservationRow;
use crate::optimiser::{CroppedQuery, QueryCostOptimiser};
use crate::query::ObservationQueryContext;
use crate::store::StatisticsStore;
use crate::time_period::TimePeriodRangeResolver;

/// Estimate of a query against the cell budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostReport {
    /// Worst-case number of cells.
    pub estimate: u64,
    /// Configured ceiling.
    pub max_allowed: u64,
    /// The estimate exceeds the ceiling.
    pub cropping_required: bool,
}

/// Stage durations of one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryTimings {
    /// Estimation and cropping.
    pub optimise: Duration,
    /// Matching set generation.
    pub matching: Duration,
    /// Hydration phases.
    pub fetch: FetchTimings,
    /// Whole query.
    pub total: Duration,
}

/// Outcome of [`ObservationQueryEngine::query`].
#[derive(Debug)]
pub struct QueryResult {
    /// The query as executed, after cropping.
    pub query: ObservationQueryContext,
    /// Cropping was applied.
    pub cropped: bool,
    /// Estimate of the executed query.
    pub estimate: u64,
    /// Hydrated rows, ascending by id.
    pub observations: Vec<ObservationRow>,
    /// Handle to the matched ids. Dropping it releases the working table.
    pub matching_set: MatchingSet,
    /// Stage durations.
    pub timings: QueryTimings,
}

/// Runs faceted observation queries against a [`StatisticsStore`].
pub struct ObservationQueryEngine<S> {
    store: Arc<S>,
    config: QueryConfig,
    optimiser: QueryCostOptimiser,
    generator: MatchingSetGenerator,
    fetcher: ObservationBatchFetcher,
}

impl<S: StatisticsStore> ObservationQueryEngine<S> {
    /// Creates an engine over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails validation.
    pub fn new(store: impl Into<Arc<S>>, config: &ObservaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: store.into(),
            config: config.query.clone(),
            optimiser: QueryCostOptimiser::new(&config.query),
            generator: MatchingSetGenerator::new(ExecutionHints::with_max_degree_of_parallelism(
                config.storage.max_degree_of_parallelism,
            )),
            fetcher: ObservationBatchFetcher::new(config.fetch.batch_size)?,
        })
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Estimates `query` without running it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SubjectNotFound`], a validation error or a
    /// storage error.
    pub async fn estimate(&self, query: &ObservationQueryContext) -> Result<CostReport> {
        self.validate(query).await?;
        let estimate = self
            .optimiser
            .estimate_max_cells(self.store.as_ref(), query)
            .await?;
        Ok(CostReport {
            estimate,
            max_allowed: self.config.max_table_cells,
            cropping_required: estimate > self.config.max_table_cells,
        })
    }

    /// Crops `query` to the cell budget without running it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SubjectNotFound`], a validation error or a
    /// storage error.
    pub async fn crop(&self, query: &ObservationQueryContext) -> Result<CroppedQuery> {
        self.validate(query).await?;
        self.optimiser.crop(self.store.as_ref(), query).await
    }

    /// Builds the matching plan the engine would execute for `query`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SubjectNotFound`], a validation error or a
    /// storage error.
    pub async fn plan(&self, query: &ObservationQueryContext) -> Result<MatchingPlan> {
        let cropped = self.crop(query).await?;
        self.generator
            .plan(self.store.as_ref(), &cropped.query)
            .await
    }

    /// Runs `query`.
    ///
    /// Zero matches is a success with no rows.
    ///
    /// # Errors
    ///
    /// - [`Error::SubjectNotFound`] for an unknown subject
    /// - [`Error::InvalidTimePeriodRange`] for a malformed range
    /// - [`Error::QueryTooLarge`] when the cropped query is still over
    ///   budget and `query.reject_oversized_queries` is set
    /// - [`Error::Cancelled`] when `cancel` fires
    /// - storage errors
    pub async fn query(
        &self,
        query: &ObservationQueryContext,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let mut timings = QueryTimings::default();

        guarded(cancel, "validation", self.validate(query)).await?;

        let stage = Instant::now();
        let cropped = guarded(
            cancel,
            "cost estimation",
            self.optimiser.crop(self.store.as_ref(), query),
        )
        .await?;
        timings.optimise = stage.elapsed();

        if cropped.estimate > self.config.max_table_cells && self.config.reject_oversized_queries {
            tracing::warn!(
                subject_id = %query.subject_id,
                estimate = cropped.estimate,
                max = self.config.max_table_cells,
                "Rejecting oversized query"
            );
            return Err(Error::QueryTooLarge {
                estimate: cropped.estimate,
                max: self.config.max_table_cells,
            });
        }

        let stage = Instant::now();
        let mut matching_set = self
            .generator
            .generate(self.store.as_ref(), &cropped.query, cancel)
            .await?;
        timings.matching = stage.elapsed();

        let fetched = self
            .fetcher
            .fetch(&mut matching_set, &cropped.query.indicator_ids, cancel)
            .await?;
        timings.fetch = fetched.timings;
        timings.total = started.elapsed();

        tracing::info!(
            subject_id = %query.subject_id,
            cropped = cropped.is_cropped(),
            estimate = cropped.estimate,
            observations = fetched.observations.len(),
            elapsed_ms = timings.total.as_millis() as u64,
            "Query completed"
        );

        Ok(QueryResult {
            cropped: cropped.is_cropped(),
            estimate: cropped.estimate,
            query: cropped.query,
            observations: fetched.observations,
            matching_set,
            timings,
        })
    }

    async fn validate(&self, query: &ObservationQueryContext) -> Result<()> {
        if !self.store.subject_exists(query.subject_id).await? {
            return Err(Error::SubjectNotFound(query.subject_id));
        }
        if let Some(range) = &query.time_period {
            TimePeriodRangeResolver::resolve(range)?;
        }
        Ok(())
    }
}
