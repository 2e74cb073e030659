//! Query context types.
//!
//! An [`ObservationQueryContext`] is constructed per request and never
//! persisted. Absent or empty facets mean "unconstrained".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{FilterItemId, GeographicLevel, IndicatorId, LocationId, SubjectId, TimeIdentifier};

/// A faceted observation query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationQueryContext {
    /// Subject (dataset) to query.
    pub subject_id: SubjectId,
    /// Selected locations by id.
    #[serde(default)]
    pub location_ids: Vec<LocationId>,
    /// Legacy per-level attribute code selections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<LocationQuery>,
    /// Time period range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_period: Option<TimePeriodQuery>,
    /// Selected filter items across all filters.
    #[serde(default)]
    pub filter_item_ids: Vec<FilterItemId>,
    /// Selected indicators. Empty selects every indicator.
    #[serde(default)]
    pub indicator_ids: Vec<IndicatorId>,
}

impl ObservationQueryContext {
    /// Creates an unconstrained query over `subject_id`.
    #[must_use]
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            location_ids: Vec::new(),
            locations: None,
            time_period: None,
            filter_item_ids: Vec::new(),
            indicator_ids: Vec::new(),
        }
    }

    /// Sets the selected location ids.
    #[must_use]
    pub fn with_location_ids(mut self, ids: impl IntoIterator<Item = LocationId>) -> Self {
        self.location_ids = ids.into_iter().collect();
        self
    }

    /// Sets the legacy location code selection.
    #[must_use]
    pub fn with_locations(mut self, locations: LocationQuery) -> Self {
        self.locations = Some(locations);
        self
    }

    /// Sets the time period range.
    #[must_use]
    pub fn with_time_period(mut self, time_period: TimePeriodQuery) -> Self {
        self.time_period = Some(time_period);
        self
    }

    /// Sets the selected filter items.
    #[must_use]
    pub fn with_filter_items(mut self, ids: impl IntoIterator<Item = FilterItemId>) -> Self {
        self.filter_item_ids = ids.into_iter().collect();
        self
    }

    /// Sets the selected indicators.
    #[must_use]
    pub fn with_indicators(mut self, ids: impl IntoIterator<Item = IndicatorId>) -> Self {
        self.indicator_ids = ids.into_iter().collect();
        self
    }

    /// Returns true if the legacy code facet selects anything.
    #[must_use]
    pub fn has_location_codes(&self) -> bool {
        self.locations
            .as_ref()
            .is_some_and(|locations| !locations.is_unconstrained())
    }
}

/// A `(start_year, start_code) .. (end_year, end_code)` range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriodQuery {
    /// First year.
    pub start_year: i32,
    /// Code of the first period.
    pub start_code: TimeIdentifier,
    /// Last year.
    pub end_year: i32,
    /// Code of the last period.
    pub end_code: TimeIdentifier,
    /// Keep only the first `limit` periods of the range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl TimePeriodQuery {
    /// Creates an unlimited range.
    #[must_use]
    pub const fn new(
        start_year: i32,
        start_code: TimeIdentifier,
        end_year: i32,
        end_code: TimeIdentifier,
    ) -> Self {
        Self {
            start_year,
            start_code,
            end_year,
            end_code,
            limit: None,
        }
    }

    /// Sets the truncation limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Legacy location selection by attribute codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationQuery {
    /// Restrict matches to a single level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geographic_level: Option<GeographicLevel>,
    /// Selected attribute codes per level.
    #[serde(default)]
    pub codes: BTreeMap<GeographicLevel, Vec<String>>,
}

impl LocationQuery {
    /// Adds codes for `level`.
    #[must_use]
    pub fn with_codes<I, S>(mut self, level: GeographicLevel, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codes
            .entry(level)
            .or_default()
            .extend(codes.into_iter().map(Into::into));
        self
    }

    /// Sets the explicit level filter.
    #[must_use]
    pub fn with_level(mut self, level: GeographicLevel) -> Self {
        self.geographic_level = Some(level);
        self
    }

    /// Returns true if neither a level nor any code is selected.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.geographic_level.is_none() && self.codes.values().all(Vec::is_empty)
    }
}
