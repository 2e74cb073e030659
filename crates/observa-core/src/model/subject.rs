//! Subjects and their filter and indicator hierarchies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{FilterGroupId, FilterId, FilterItemId, IndicatorId, SubjectId};

const TOTAL_LABEL: &str = "Total";

/// Returns true if `label` follows the "Total" convention.
#[must_use]
pub fn is_total_label(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(TOTAL_LABEL)
}

/// A published dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject id.
    pub id: SubjectId,
    /// Display name.
    pub name: String,
    /// Categorical dimensions. Every observation carries one item per filter.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Measure columns.
    #[serde(default)]
    pub indicator_groups: Vec<IndicatorGroup>,
}

impl Subject {
    /// Iterates over every indicator of the subject.
    pub fn indicators(&self) -> impl Iterator<Item = &Indicator> {
        self.indicator_groups
            .iter()
            .flat_map(|group| group.indicators.iter())
    }

    /// Finds the filter owning `item_id`.
    #[must_use]
    pub fn filter_of_item(&self, item_id: FilterItemId) -> Option<&Filter> {
        self.filters
            .iter()
            .find(|filter| filter.items().any(|item| item.id == item_id))
    }
}

/// A categorical dimension such as "School type".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Filter id.
    pub id: FilterId,
    /// Display label.
    pub label: String,
    /// Column name in published data files.
    pub name: String,
    /// Optional hint shown next to the label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Item groups.
    #[serde(default)]
    pub groups: Vec<FilterGroup>,
}

impl Filter {
    /// Iterates over every item in every group.
    pub fn items(&self) -> impl Iterator<Item = &FilterItem> {
        self.groups.iter().flat_map(|group| group.items.iter())
    }

    /// Returns the ids of every item of this filter.
    #[must_use]
    pub fn item_ids(&self) -> BTreeSet<FilterItemId> {
        self.items().map(|item| item.id).collect()
    }

    /// Returns the "Total" item if the filter has one.
    #[must_use]
    pub fn total_item(&self) -> Option<&FilterItem> {
        self.items().find(|item| is_total_label(&item.label))
    }

    /// Moves "Total" groups, and "Total" items within each group, first.
    ///
    /// The relative order of everything else is preserved.
    pub fn normalise_order(&mut self) {
        self.groups.sort_by_key(|group| !is_total_label(&group.label));
        for group in &mut self.groups {
            group.items.sort_by_key(|item| !is_total_label(&item.label));
        }
    }
}

/// A group of filter items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    /// Group id.
    pub id: FilterGroupId,
    /// Display label.
    pub label: String,
    /// Selectable leaf values.
    #[serde(default)]
    pub items: Vec<FilterItem>,
}

/// A selectable filter value such as "Primary".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterItem {
    /// Item id.
    pub id: FilterItemId,
    /// Display label.
    pub label: String,
}

/// A group of indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorGroup {
    /// Group id.
    pub id: uuid::Uuid,
    /// Display label.
    pub label: String,
    /// Indicators in the group.
    #[serde(default)]
    pub indicators: Vec<Indicator>,
}

/// A named numeric measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    /// Indicator id.
    pub id: IndicatorId,
    /// Display label.
    pub label: String,
    /// Column name in published data files.
    pub name: String,
    /// Unit suffix such as `%`.
    #[serde(default)]
    pub unit: String,
    /// Display precision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_places: Option<u8>,
}
