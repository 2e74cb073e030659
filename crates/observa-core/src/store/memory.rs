//! In-process store.
//!
//! Holds every table in memory behind a `parking_lot::RwLock`. Sessions
//! keep their own working tables, so concurrent queries never observe
//! each other's intermediate results.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use super::fixture::{validate_observation, Fixture};
use super::{
    FilterRepository, LocationRepository, ObservationStore, StoreSession, SubjectRepository,
    WorkingTable,
};
use crate::error::{Error, Result};
use crate::matching::{CandidateCriteria, ExecutionHints, FilterElimination};
use crate::model::{
    Filter, FilterId, FilterItemId, GeographicLevel, HydratedFilterItem, Indicator, Location,
    LocationId, Observation, ObservationId, ObservationRow, Subject, SubjectId, TimePeriod,
};
use crate::predicate::Predicate;

#[derive(Debug, Default)]
struct MemoryTables {
    subjects: BTreeMap<SubjectId, Subject>,
    locations: BTreeMap<LocationId, Location>,
    observations: BTreeMap<ObservationId, Observation>,
    natural_keys: HashSet<String>,
    /// Owning filter and label of every known filter item.
    items: HashMap<FilterItemId, (FilterId, String)>,
}

impl MemoryTables {
    fn insert_observation(&mut self, observation: Observation) -> Result<()> {
        let subject = self.subjects.get(&observation.subject_id).ok_or_else(|| {
            Error::InvalidData(format!(
                "observation {} references unknown subject {}",
                observation.id, observation.subject_id
            ))
        })?;
        if !self.locations.contains_key(&observation.location_id) {
            return Err(Error::InvalidData(format!(
                "observation {} references unknown location {}",
                observation.id, observation.location_id
            )));
        }
        validate_observation(subject, &observation)?;
        if self.observations.contains_key(&observation.id) {
            return Err(Error::InvalidData(format!(
                "duplicate observation id {}",
                observation.id
            )));
        }
        if !self.natural_keys.insert(observation.natural_key()) {
            return Err(Error::InvalidData(format!(
                "observation {} duplicates an existing row",
                observation.id
            )));
        }
        self.observations.insert(observation.id, observation);
        Ok(())
    }

    fn hydrate(&self, id: ObservationId) -> Result<ObservationRow> {
        let observation = self
            .observations
            .get(&id)
            .ok_or_else(|| Error::Storage(format!("observation {id} not found")))?;
        let location = self
            .locations
            .get(&observation.location_id)
            .cloned()
            .ok_or_else(|| {
                Error::Storage(format!("location {} not found", observation.location_id))
            })?;

        let mut filter_items = Vec::with_capacity(observation.filter_item_ids.len());
        for item_id in &observation.filter_item_ids {
            let (filter_id, label) = self
                .items
                .get(item_id)
                .ok_or_else(|| Error::Storage(format!("filter item {item_id} not found")))?;
            filter_items.push(HydratedFilterItem {
                id: *item_id,
                filter_id: *filter_id,
                label: label.clone(),
            });
        }
        filter_items.sort_by_key(|item| (item.filter_id, item.id));

        Ok(ObservationRow {
            id: observation.id,
            subject_id: observation.subject_id,
            location,
            year: observation.year,
            time_identifier: observation.time_identifier,
            filter_items,
            measures: observation.measures.clone(),
        })
    }
}

/// In-memory [`ObservationStore`] and repositories.
#[derive(Debug, Clone, Default)]
pub struct MemoryObservationStore {
    data: Arc<RwLock<MemoryTables>>,
}

impl MemoryObservationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `fixture`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] if the fixture is inconsistent.
    pub fn from_fixture(fixture: &Fixture) -> Result<Self> {
        let store = Self::new();
        store.load_fixture(fixture)?;
        Ok(store)
    }

    /// Adds or replaces a subject.
    pub fn insert_subject(&self, subject: Subject) {
        let mut data = self.data.write();
        for filter in &subject.filters {
            for item in filter.items() {
                data.items.insert(item.id, (filter.id, item.label.clone()));
            }
        }
        data.subjects.insert(subject.id, subject);
    }

    /// Adds or replaces a location.
    pub fn insert_location(&self, location: Location) {
        self.data.write().locations.insert(location.id, location);
    }

    /// Adds observations. Returns the number inserted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] on the first row that references an
    /// unknown subject or location, breaks the one-item-per-filter rule or
    /// duplicates an existing row. Rows before it stay inserted.
    pub fn insert_observations(
        &self,
        observations: impl IntoIterator<Item = Observation>,
    ) -> Result<usize> {
        let mut data = self.data.write();
        let mut inserted = 0;
        for observation in observations {
            data.insert_observation(observation)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Loads every table of `fixture`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] if an observation is inconsistent.
    pub fn load_fixture(&self, fixture: &Fixture) -> Result<()> {
        for subject in &fixture.subjects {
            self.insert_subject(subject.clone());
        }
        for location in &fixture.locations {
            self.insert_location(location.clone());
        }
        let inserted = self.insert_observations(fixture.observations.iter().cloned())?;
        tracing::debug!(
            subjects = fixture.subjects.len(),
            locations = fixture.locations.len(),
            observations = inserted,
            "Loaded fixture into memory store"
        );
        Ok(())
    }

    /// Returns the number of stored observations.
    #[must_use]
    pub fn observation_count(&self) -> usize {
        self.data.read().observations.len()
    }
}

#[async_trait]
impl ObservationStore for MemoryObservationStore {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>> {
        Ok(Box::new(MemorySession {
            data: Arc::clone(&self.data),
            tables: HashMap::new(),
        }))
    }
}

#[async_trait]
impl SubjectRepository for MemoryObservationStore {
    async fn subject_exists(&self, subject_id: SubjectId) -> Result<bool> {
        Ok(self.data.read().subjects.contains_key(&subject_id))
    }

    async fn indicators(&self, subject_id: SubjectId) -> Result<Vec<Indicator>> {
        Ok(self
            .data
            .read()
            .subjects
            .get(&subject_id)
            .map(|subject| subject.indicators().cloned().collect())
            .unwrap_or_default())
    }

    async fn time_periods(&self, subject_id: SubjectId) -> Result<Vec<TimePeriod>> {
        let data = self.data.read();
        let periods: BTreeSet<TimePeriod> = data
            .observations
            .values()
            .filter(|o| o.subject_id == subject_id)
            .map(Observation::time_period)
            .collect();
        Ok(periods.into_iter().collect())
    }
}

#[async_trait]
impl FilterRepository for MemoryObservationStore {
    async fn get_filters_and_items(&self, subject_id: SubjectId) -> Result<Vec<Filter>> {
        Ok(self
            .data
            .read()
            .subjects
            .get(&subject_id)
            .map(|subject| subject.filters.clone())
            .unwrap_or_default())
    }

    async fn count_items_by_filter(
        &self,
        item_ids: &[FilterItemId],
    ) -> Result<BTreeMap<FilterId, usize>> {
        let data = self.data.read();
        let mut counts = BTreeMap::new();
        let unique: BTreeSet<&FilterItemId> = item_ids.iter().collect();
        for item_id in unique {
            if let Some((filter_id, _)) = data.items.get(item_id) {
                *counts.entry(*filter_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl LocationRepository for MemoryObservationStore {
    async fn get_locations(&self, ids: &[LocationId]) -> Result<Vec<Location>> {
        let data = self.data.read();
        let unique: BTreeSet<&LocationId> = ids.iter().collect();
        Ok(unique
            .into_iter()
            .filter_map(|id| data.locations.get(id).cloned())
            .collect())
    }

    async fn locations_by_level(&self, level: GeographicLevel) -> Result<Vec<Location>> {
        self.find_locations(&Predicate::level_eq(level)).await
    }

    async fn find_locations(&self, predicate: &Predicate) -> Result<Vec<Location>> {
        Ok(self
            .data
            .read()
            .locations
            .values()
            .filter(|location| predicate.matches(location))
            .cloned()
            .collect())
    }

    async fn locations_for_subject(&self, subject_id: SubjectId) -> Result<Vec<Location>> {
        let data = self.data.read();
        let ids: BTreeSet<LocationId> = data
            .observations
            .values()
            .filter(|o| o.subject_id == subject_id)
            .map(|o| o.location_id)
            .collect();
        Ok(ids
            .iter()
            .filter_map(|id| data.locations.get(id).cloned())
            .collect())
    }
}

/// Rows of a working table before and after indexing.
#[derive(Debug)]
enum WorkingRows {
    Heap(Vec<ObservationId>),
    Indexed(BTreeSet<ObservationId>),
}

impl WorkingRows {
    fn len(&self) -> usize {
        match self {
            Self::Heap(rows) => rows.len(),
            Self::Indexed(rows) => rows.len(),
        }
    }

    fn retain(&mut self, mut keep: impl FnMut(&ObservationId) -> bool) {
        match self {
            Self::Heap(rows) => rows.retain(|id| keep(id)),
            Self::Indexed(rows) => rows.retain(|id| keep(id)),
        }
    }

    fn sorted_ids(&self) -> Vec<ObservationId> {
        match self {
            Self::Heap(rows) => {
                let mut ids = rows.clone();
                ids.sort_unstable();
                ids
            }
            Self::Indexed(rows) => rows.iter().copied().collect(),
        }
    }
}

struct MemorySession {
    data: Arc<RwLock<MemoryTables>>,
    tables: HashMap<String, WorkingRows>,
}

impl MemorySession {
    fn table_mut(&mut self, table: &WorkingTable) -> Result<&mut WorkingRows> {
        self.tables
            .get_mut(table.name())
            .ok_or_else(|| Error::Storage(format!("working table '{}' does not exist", table.name())))
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn create_working_table(&mut self, table: &WorkingTable) -> Result<()> {
        if self.tables.contains_key(table.name()) {
            return Err(Error::Storage(format!(
                "working table '{}' already exists",
                table.name()
            )));
        }
        self.tables
            .insert(table.name().to_string(), WorkingRows::Heap(Vec::new()));
        Ok(())
    }

    async fn load_candidates(
        &mut self,
        table: &WorkingTable,
        criteria: &CandidateCriteria,
        hints: &ExecutionHints,
    ) -> Result<u64> {
        tracing::trace!(table = table.name(), %hints, "Loading candidates");
        let candidates: Vec<ObservationId> = {
            let data = self.data.read();
            let periods: Option<HashSet<TimePeriod>> = criteria
                .time_periods
                .as_ref()
                .map(|periods| periods.iter().copied().collect());
            let locations: Option<HashSet<LocationId>> = criteria
                .location_ids
                .as_ref()
                .map(|ids| ids.iter().copied().collect());
            data.observations
                .values()
                .filter(|o| o.subject_id == criteria.subject_id)
                .filter(|o| periods.as_ref().is_none_or(|p| p.contains(&o.time_period())))
                .filter(|o| locations.as_ref().is_none_or(|l| l.contains(&o.location_id)))
                .map(|o| o.id)
                .collect()
        };

        let rows = self.table_mut(table)?;
        let loaded = candidates.len() as u64;
        match rows {
            WorkingRows::Heap(existing) => existing.extend(candidates),
            WorkingRows::Indexed(existing) => existing.extend(candidates),
        }
        Ok(loaded)
    }

    async fn index_working_table(&mut self, table: &WorkingTable) -> Result<()> {
        let rows = self.table_mut(table)?;
        if let WorkingRows::Heap(ids) = rows {
            let indexed: BTreeSet<ObservationId> = ids.iter().copied().collect();
            if indexed.len() != ids.len() {
                return Err(Error::Storage(format!(
                    "cannot create unique index on '{}': duplicate ids",
                    table.name()
                )));
            }
            *rows = WorkingRows::Indexed(indexed);
        }
        Ok(())
    }

    async fn eliminate(
        &mut self,
        table: &WorkingTable,
        elimination: &FilterElimination,
        hints: &ExecutionHints,
    ) -> Result<u64> {
        tracing::trace!(table = table.name(), %hints, "Eliminating candidates");
        let shared = Arc::clone(&self.data);
        let data = shared.read();
        let rows = self.table_mut(table)?;
        let before = rows.len();
        rows.retain(|id| {
            data.observations
                .get(id)
                .is_some_and(|o| elimination.retains(&o.filter_item_ids))
        });
        Ok((before - rows.len()) as u64)
    }

    async fn refresh_statistics(&mut self, table: &WorkingTable) -> Result<()> {
        let rows = self.table_mut(table)?.len();
        tracing::trace!(table = table.name(), rows, "Statistics refreshed");
        Ok(())
    }

    async fn count(&mut self, table: &WorkingTable) -> Result<u64> {
        Ok(self.table_mut(table)?.len() as u64)
    }

    async fn matched_ids(&mut self, table: &WorkingTable) -> Result<Vec<ObservationId>> {
        Ok(self.table_mut(table)?.sorted_ids())
    }

    async fn fetch_observations(&mut self, ids: &[ObservationId]) -> Result<Vec<ObservationRow>> {
        let data = self.data.read();
        ids.iter().map(|id| data.hydrate(*id)).collect()
    }

    fn release_working_table(&mut self, table: &WorkingTable) {
        if self.tables.remove(table.name()).is_some() {
            tracing::trace!(table = table.name(), "Released working table");
        }
    }
}
