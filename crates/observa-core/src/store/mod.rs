//! Storage collaborators.
//!
//! The engine talks to storage only through the traits in this module:
//!
//! - [`ObservationStore`] / [`StoreSession`]: ephemeral working tables over
//!   the observation fact table.
//! - [`SubjectRepository`], [`FilterRepository`], [`LocationRepository`]:
//!   read-only metadata lookups.
//!
//! Two adapters ship with the crate: [`MemoryObservationStore`] for tests
//! and embedding, and [`SqliteObservationStore`] backed by `rusqlite`.

mod fixture;
mod memory;
mod sqlite;


pub use fixture::Fixture;
pub use memory::MemoryObservationStore;
pub use sqlite::SqliteObservationStore;

use async_trait::async_trait;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::Result;
use crate::matching::{CandidateCriteria, ExecutionHints, FilterElimination};
use crate::model::{
    Filter, FilterId, FilterItemId, GeographicLevel, Indicator, Location, LocationId,
    ObservationId, ObservationRow, SubjectId, TimePeriod,
};
use crate::predicate::Predicate;

/// Name of an ephemeral, session-scoped table of observation ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkingTable {
    name: String,
}

impl WorkingTable {
    /// Generates a fresh, collision-free table name.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            name: format!("matched_observation_{}", Uuid::new_v4().simple()),
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the per-filter scratch table.
    #[must_use]
    pub fn filter_table_name(&self) -> String {
        format!("{}_filter", self.name)
    }
}

/// Source of storage sessions.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Opens an independent session. Working tables never leak across
    /// sessions.
    async fn open_session(&self) -> Result<Box<dyn StoreSession>>;
}

/// A single storage connection running one command at a time.
#[async_trait]
pub trait StoreSession: Send {
    /// Creates an empty, unindexed working table.
    async fn create_working_table(&mut self, table: &WorkingTable) -> Result<()>;

    /// Bulk-loads candidate ids. Returns the number loaded.
    async fn load_candidates(
        &mut self,
        table: &WorkingTable,
        criteria: &CandidateCriteria,
        hints: &ExecutionHints,
    ) -> Result<u64>;

    /// Adds a unique index on the loaded ids.
    async fn index_working_table(&mut self, table: &WorkingTable) -> Result<()>;

    /// Applies one filter elimination step. Returns the number removed.
    async fn eliminate(
        &mut self,
        table: &WorkingTable,
        elimination: &FilterElimination,
        hints: &ExecutionHints,
    ) -> Result<u64>;

    /// Refreshes planner statistics for the working table.
    async fn refresh_statistics(&mut self, table: &WorkingTable) -> Result<()>;

    /// Counts the ids currently in the working table.
    async fn count(&mut self, table: &WorkingTable) -> Result<u64>;

    /// Returns the ids in the working table, ascending.
    async fn matched_ids(&mut self, table: &WorkingTable) -> Result<Vec<ObservationId>>;

    /// Hydrates the given observations, in the order of `ids`.
    async fn fetch_observations(&mut self, ids: &[ObservationId]) -> Result<Vec<ObservationRow>>;

    /// Drops the working table. Never fails; errors are logged.
    ///
    /// Must not block the calling thread. Adapters may finish the drop in
    /// the background as long as later calls on the session observe it.
    fn release_working_table(&mut self, table: &WorkingTable);
}

/// Subject metadata lookups.
#[async_trait]
pub trait SubjectRepository: Send + Sync {
    /// Returns true if the subject exists.
    async fn subject_exists(&self, subject_id: SubjectId) -> Result<bool>;

    /// Returns every indicator of the subject.
    async fn indicators(&self, subject_id: SubjectId) -> Result<Vec<Indicator>>;

    /// Returns the distinct time periods present in the subject, ascending.
    async fn time_periods(&self, subject_id: SubjectId) -> Result<Vec<TimePeriod>>;
}

/// Filter hierarchy lookups.
#[async_trait]
pub trait FilterRepository: Send + Sync {
    /// Returns the filters of the subject with their groups and items.
    async fn get_filters_and_items(&self, subject_id: SubjectId) -> Result<Vec<Filter>>;

    /// Counts `item_ids` per owning filter. Unknown ids are ignored.
    async fn count_items_by_filter(
        &self,
        item_ids: &[FilterItemId],
    ) -> Result<BTreeMap<FilterId, usize>>;
}

/// Location lookups.
#[async_trait]
pub trait LocationRepository: Send + Sync {
    /// Returns the known locations among `ids`.
    async fn get_locations(&self, ids: &[LocationId]) -> Result<Vec<Location>>;

    /// Returns every location of `level`.
    async fn locations_by_level(&self, level: GeographicLevel) -> Result<Vec<Location>>;

    /// Returns every location matching `predicate`.
    async fn find_locations(&self, predicate: &Predicate) -> Result<Vec<Location>>;

    /// Returns the distinct locations observed in the subject.
    async fn locations_for_subject(&self, subject_id: SubjectId) -> Result<Vec<Location>>;
}

/// Everything the query engine needs from storage.
pub trait StatisticsStore:
    ObservationStore + SubjectRepository + FilterRepository + LocationRepository
{
}

impl<T> StatisticsStore for T where
    T: ObservationStore + SubjectRepository + FilterRepository + LocationRepository
{
}
