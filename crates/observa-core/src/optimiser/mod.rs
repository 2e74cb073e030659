//! Query cost estimation and cropping.
//!
//! The worst-case size of a query result is
//! `indicators × locations × time periods × Π(selected items per filter)`.
//! When that exceeds `query.max_table_cells` the query is cropped, first
//! by capping the time range, then by capping the location selection.

#[cfg(test)]
mod optimiser_tests;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::QueryConfig;
use crate::error::Result;
use crate::model::{Filter, GeographicLevel, Location, LocationId};
use crate::predicate::LocationPredicateBuilder;
use crate::query::ObservationQueryContext;
use crate::store::{FilterRepository, LocationRepository, SubjectRepository};
use crate::time_period::TimePeriodRangeResolver;

/// Outcome of [`QueryCostOptimiser::crop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CroppedQuery {
    /// The effective query.
    pub query: ObservationQueryContext,
    /// Estimate of the effective query.
    pub estimate: u64,
    /// Estimate before cropping.
    pub original_estimate: u64,
    /// The time range was limited.
    pub time_periods_cropped: bool,
    /// The location selection was capped.
    pub locations_cropped: bool,
}

impl CroppedQuery {
    /// Returns true if any cropping phase changed the query.
    #[must_use]
    pub fn is_cropped(&self) -> bool {
        self.time_periods_cropped || self.locations_cropped
    }
}

/// Estimates and crops queries against a cell budget.
#[derive(Debug, Clone)]
pub struct QueryCostOptimiser {
    config: QueryConfig,
}

impl QueryCostOptimiser {
    /// Creates an optimiser with the given limits.
    #[must_use]
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Returns the configured cell ceiling.
    #[must_use]
    pub fn max_table_cells(&self) -> u64 {
        self.config.max_table_cells
    }

    /// Estimates the worst-case number of cells `query` can produce.
    ///
    /// Unconstrained facets count everything the subject has. Filters with
    /// no selected item do not contribute, nor do items outside the
    /// subject's filters.
    ///
    /// # Errors
    ///
    /// Fails on a malformed time range or a repository error.
    pub async fn estimate_max_cells<S>(&self, store: &S, query: &ObservationQueryContext) -> Result<u64>
    where
        S: SubjectRepository + FilterRepository + LocationRepository + ?Sized,
    {
        let indicators = if query.indicator_ids.is_empty() {
            store.indicators(query.subject_id).await?.len()
        } else {
            query.indicator_ids.iter().collect::<BTreeSet<_>>().len()
        };

        let locations =
            match LocationPredicateBuilder::from_query(&query.location_ids, query.locations.as_ref())
                .resolve(store)
                .await?
            {
                Some(ids) => ids.len(),
                None => store.locations_for_subject(query.subject_id).await?.len(),
            };

        let time_periods = match &query.time_period {
            Some(range) => TimePeriodRangeResolver::resolve(range)?.len(),
            None => store.time_periods(query.subject_id).await?.len(),
        };

        let subject_items: BTreeSet<_> = store
            .get_filters_and_items(query.subject_id)
            .await?
            .iter()
            .flat_map(Filter::item_ids)
            .collect();
        let selected_items: Vec<_> = query
            .filter_item_ids
            .iter()
            .filter(|id| subject_items.contains(*id))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let items_by_filter = store.count_items_by_filter(&selected_items).await?;

        let estimate = items_by_filter
            .values()
            .filter(|count| **count > 0)
            .fold(
                (indicators as u64)
                    .saturating_mul(locations as u64)
                    .saturating_mul(time_periods as u64),
                |acc, count| acc.saturating_mul(*count as u64),
            );
        Ok(estimate)
    }

    /// Returns true if `query` exceeds the cell ceiling.
    ///
    /// # Errors
    ///
    /// Fails on a malformed time range or a repository error.
    pub async fn is_cropping_required<S>(&self, store: &S, query: &ObservationQueryContext) -> Result<bool>
    where
        S: SubjectRepository + FilterRepository + LocationRepository + ?Sized,
    {
        Ok(self.estimate_max_cells(store, query).await? > self.config.max_table_cells)
    }

    /// Crops `query` until it fits the ceiling or no phase is left.
    ///
    /// Cropping is best effort: filter item cardinality alone can keep the
    /// estimate over budget.
    ///
    /// # Errors
    ///
    /// Fails on a malformed time range or a repository error.
    pub async fn crop<S>(&self, store: &S, query: &ObservationQueryContext) -> Result<CroppedQuery>
    where
        S: SubjectRepository + FilterRepository + LocationRepository + ?Sized,
    {
        let original_estimate = self.estimate_max_cells(store, query).await?;
        let mut cropped = CroppedQuery {
            query: query.clone(),
            estimate: original_estimate,
            original_estimate,
            time_periods_cropped: false,
            locations_cropped: false,
        };
        if original_estimate <= self.config.max_table_cells {
            return Ok(cropped);
        }

        if let Some(range) = cropped.query.time_period.as_mut() {
            let before = TimePeriodRangeResolver::resolve(range)?.len();
            let limit = range
                .limit
                .map_or(self.config.max_time_periods, |limit| limit.min(self.config.max_time_periods));
            range.limit = Some(limit);
            cropped.time_periods_cropped = before > limit;
            cropped.estimate = self.estimate_max_cells(store, &cropped.query).await?;
            tracing::info!(
                subject_id = %query.subject_id,
                limit,
                estimate = cropped.estimate,
                "Cropped time periods"
            );
        }

        if cropped.estimate > self.config.max_table_cells {
            let selected = self.selected_locations(store, &cropped.query).await?;
            let capped = self.cap_locations(&selected);
            cropped.locations_cropped = capped.len() < selected.len();
            cropped.query.location_ids = capped;
            cropped.query.locations = None;
            cropped.estimate = self.estimate_max_cells(store, &cropped.query).await?;
            tracing::info!(
                subject_id = %query.subject_id,
                locations = cropped.query.location_ids.len(),
                estimate = cropped.estimate,
                "Cropped locations"
            );
        }

        if cropped.estimate > self.config.max_table_cells {
            tracing::warn!(
                subject_id = %query.subject_id,
                estimate = cropped.estimate,
                max = self.config.max_table_cells,
                "Query still over budget after cropping"
            );
        }
        Ok(cropped)
    }

    async fn selected_locations<S>(
        &self,
        store: &S,
        query: &ObservationQueryContext,
    ) -> Result<Vec<Location>>
    where
        S: LocationRepository + ?Sized,
    {
        match LocationPredicateBuilder::from_query(&query.location_ids, query.locations.as_ref())
            .resolve(store)
            .await?
        {
            Some(ids) => store.get_locations(&ids).await,
            None => store.locations_for_subject(query.subject_id).await,
        }
    }

    /// Caps a location selection.
    ///
    /// Locations are grouped by level in level order, sorted by id within
    /// a level, capped per level, then capped overall.
    #[must_use]
    pub fn cap_locations(&self, locations: &[Location]) -> Vec<LocationId> {
        let mut by_level: BTreeMap<GeographicLevel, BTreeSet<LocationId>> = BTreeMap::new();
        for location in locations {
            by_level
                .entry(location.geographic_level)
                .or_default()
                .insert(location.id);
        }

        by_level
            .into_iter()
            .flat_map(|(level, ids)| ids.into_iter().take(self.level_cap(level)))
            .take(self.config.max_locations)
            .collect()
    }

    fn level_cap(&self, level: GeographicLevel) -> usize {
        match level {
            GeographicLevel::Country => self.config.country_location_cap,
            _ => self.config.default_location_cap,
        }
    }
}
