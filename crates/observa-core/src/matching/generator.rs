//! Staged matching pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::plan::{CandidateCriteria, ExecutionHints, MatchingPlan};
use crate::cancel::guarded;
use crate::error::Result;
use crate::model::{FilterItemId, ObservationId, ObservationRow};
use crate::predicate::LocationPredicateBuilder;
use crate::query::ObservationQueryContext;
use crate::store::{FilterRepository, LocationRepository, ObservationStore, StoreSession, WorkingTable};
use crate::time_period::TimePeriodRangeResolver;

/// The exact set of observations matching a query.
///
/// Owns the storage session and its working table. The table is dropped
/// when the set goes out of scope, including on error and cancellation.
pub struct MatchingSet {
    session: Box<dyn StoreSession>,
    table: WorkingTable,
    plan: MatchingPlan,
    candidate_count: u64,
    matched_count: u64,
}

impl MatchingSet {
    /// Returns the working table holding the matched ids.
    #[must_use]
    pub fn table(&self) -> &WorkingTable {
        &self.table
    }

    /// Returns the plan the set was produced with.
    #[must_use]
    pub fn plan(&self) -> &MatchingPlan {
        &self.plan
    }

    /// Number of candidates loaded before filter elimination.
    #[must_use]
    pub fn candidate_count(&self) -> u64 {
        self.candidate_count
    }

    /// Number of ids left after filter elimination.
    #[must_use]
    pub fn matched_count(&self) -> u64 {
        self.matched_count
    }

    /// Returns true if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matched_count == 0
    }

    /// Reads the matched ids, ascending.
    pub async fn ids(&mut self) -> Result<Vec<ObservationId>> {
        self.session.matched_ids(&self.table).await
    }

    /// Hydrates a batch of matched observations on the owning session.
    pub async fn hydrate(&mut self, ids: &[ObservationId]) -> Result<Vec<ObservationRow>> {
        self.session.fetch_observations(ids).await
    }
}

impl fmt::Debug for MatchingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchingSet")
            .field("table", &self.table)
            .field("candidate_count", &self.candidate_count)
            .field("matched_count", &self.matched_count)
            .finish_non_exhaustive()
    }
}

impl Drop for MatchingSet {
    fn drop(&mut self) {
        self.session.release_working_table(&self.table);
    }
}

/// Runs the matching pipeline.
#[derive(Debug, Clone, Default)]
pub struct MatchingSetGenerator {
    hints: ExecutionHints,
}

impl MatchingSetGenerator {
    /// Creates a generator issuing statements with `hints`.
    #[must_use]
    pub fn new(hints: ExecutionHints) -> Self {
        Self { hints }
    }

    /// Builds the plan for `query` without touching the fact table.
    ///
    /// # Errors
    ///
    /// Fails on a malformed time range or a repository error.
    pub async fn plan<S>(&self, store: &S, query: &ObservationQueryContext) -> Result<MatchingPlan>
    where
        S: FilterRepository + LocationRepository + ?Sized,
    {
        let time_periods = query
            .time_period
            .as_ref()
            .map(TimePeriodRangeResolver::resolve)
            .transpose()?;
        let location_ids =
            LocationPredicateBuilder::from_query(&query.location_ids, query.locations.as_ref())
                .resolve(store)
                .await?;
        let filters = store.get_filters_and_items(query.subject_id).await?;
        let selected: BTreeSet<FilterItemId> = query.filter_item_ids.iter().copied().collect();

        let candidates = CandidateCriteria {
            subject_id: query.subject_id,
            time_periods,
            location_ids,
        };
        Ok(MatchingPlan::build(candidates, &filters, &selected, self.hints))
    }

    /// Plans and executes `query`.
    ///
    /// # Errors
    ///
    /// Fails on validation or storage errors, or when `cancel` fires.
    pub async fn generate<S>(
        &self,
        store: &S,
        query: &ObservationQueryContext,
        cancel: &CancellationToken,
    ) -> Result<MatchingSet>
    where
        S: ObservationStore + FilterRepository + LocationRepository + ?Sized,
    {
        let plan = guarded(cancel, "planning", self.plan(store, query)).await?;
        self.execute(store, plan, cancel).await
    }

    /// Executes a previously built plan on a new session.
    ///
    /// # Errors
    ///
    /// Fails on storage errors or when `cancel` fires.
    pub async fn execute<S>(
        &self,
        store: &S,
        plan: MatchingPlan,
        cancel: &CancellationToken,
    ) -> Result<MatchingSet>
    where
        S: ObservationStore + ?Sized,
    {
        let started = Instant::now();
        let session = guarded(cancel, "open session", store.open_session()).await?;
        let mut set = MatchingSet {
            session,
            table: WorkingTable::generate(),
            plan,
            candidate_count: 0,
            matched_count: 0,
        };

        guarded(
            cancel,
            "create working table",
            set.session.create_working_table(&set.table),
        )
        .await?;

        let stage = Instant::now();
        let loaded = guarded(
            cancel,
            "load candidates",
            set.session
                .load_candidates(&set.table, &set.plan.candidates, &set.plan.hints),
        )
        .await?;
        set.candidate_count = loaded;
        set.matched_count = loaded;
        tracing::debug!(
            table = set.table.name(),
            candidates = loaded,
            elapsed_ms = stage.elapsed().as_millis() as u64,
            "Loaded candidates"
        );

        if loaded == 0 {
            tracing::debug!(table = set.table.name(), "No candidates, skipping eliminations");
            return Ok(set);
        }

        guarded(cancel, "index working table", set.session.index_working_table(&set.table)).await?;

        for elimination in &set.plan.eliminations {
            if set.matched_count == 0 {
                break;
            }
            let stage = Instant::now();
            let removed = guarded(
                cancel,
                "filter elimination",
                set.session.eliminate(&set.table, elimination, &set.plan.hints),
            )
            .await?;
            set.matched_count = set.matched_count.saturating_sub(removed);
            tracing::debug!(
                filter_id = %elimination.filter_id,
                polarity = %elimination.polarity,
                selectiveness = elimination.selectiveness,
                removed,
                remaining = set.matched_count,
                elapsed_ms = stage.elapsed().as_millis() as u64,
                "Applied filter elimination"
            );
        }

        guarded(cancel, "refresh statistics", set.session.refresh_statistics(&set.table)).await?;
        set.matched_count = guarded(cancel, "count", set.session.count(&set.table)).await?;

        tracing::debug!(
            table = set.table.name(),
            candidates = set.candidate_count,
            matched = set.matched_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Matching set generated"
        );
        Ok(set)
    }
}
