//! Observation rows and time periods.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::{
    FilterId, FilterItemId, IndicatorId, Location, LocationId, ObservationId, SubjectId,
    TimeIdentifier,
};

/// A concrete `(year, code)` period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimePeriod {
    /// Four-digit year.
    pub year: i32,
    /// Period code within the year.
    pub identifier: TimeIdentifier,
}

impl TimePeriod {
    /// Creates a time period.
    #[must_use]
    pub const fn new(year: i32, identifier: TimeIdentifier) -> Self {
        Self { year, identifier }
    }
}

impl PartialOrd for TimePeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimePeriod {
    fn cmp(&self, other: &Self) -> Ordering {
        self.year
            .cmp(&other.year)
            .then_with(|| self.identifier.ordinal().cmp(&other.identifier.ordinal()))
            .then_with(|| self.identifier.code().cmp(&other.identifier.code()))
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.year, self.identifier)
    }
}

/// One fact row.
///
/// Unique by `(subject_id, location_id, year, time_identifier, filter_item_ids)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Observation id.
    pub id: ObservationId,
    /// Owning subject.
    pub subject_id: SubjectId,
    /// Location the row describes.
    pub location_id: LocationId,
    /// Four-digit year.
    pub year: i32,
    /// Period code within the year.
    pub time_identifier: TimeIdentifier,
    /// Exactly one item per filter of the subject.
    pub filter_item_ids: BTreeSet<FilterItemId>,
    /// Indicator values, kept as published text.
    #[serde(default)]
    pub measures: BTreeMap<IndicatorId, String>,
}

impl Observation {
    /// Returns the time period of this row.
    #[must_use]
    pub const fn time_period(&self) -> TimePeriod {
        TimePeriod::new(self.year, self.time_identifier)
    }

    /// Returns the natural key the row is unique by.
    #[must_use]
    pub fn natural_key(&self) -> String {
        let items: Vec<String> = self.filter_item_ids.iter().map(ToString::to_string).collect();
        format!(
            "{}|{}|{}|{}|{}",
            self.subject_id,
            self.location_id,
            self.year,
            self.time_identifier,
            items.join(",")
        )
    }
}

/// A filter item attached to a hydrated row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydratedFilterItem {
    /// Item id.
    pub id: FilterItemId,
    /// Filter the item belongs to.
    pub filter_id: FilterId,
    /// Display label.
    pub label: String,
}

/// A fully hydrated observation, location and filter items included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRow {
    /// Observation id.
    pub id: ObservationId,
    /// Owning subject.
    pub subject_id: SubjectId,
    /// Resolved location.
    pub location: Location,
    /// Four-digit year.
    pub year: i32,
    /// Period code within the year.
    pub time_identifier: TimeIdentifier,
    /// Items sorted by filter id.
    pub filter_items: Vec<HydratedFilterItem>,
    /// Indicator values.
    pub measures: BTreeMap<IndicatorId, String>,
}

impl ObservationRow {
    /// Returns the time period of this row.
    #[must_use]
    pub const fn time_period(&self) -> TimePeriod {
        TimePeriod::new(self.year, self.time_identifier)
    }

    /// Keeps only the measures of `indicator_ids`. An empty slice keeps all.
    pub fn retain_indicators(&mut self, indicator_ids: &[IndicatorId]) {
        if indicator_ids.is_empty() {
            return;
        }
        self.measures.retain(|id, _| indicator_ids.contains(id));
    }
}
