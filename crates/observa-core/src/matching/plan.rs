//! Store-agnostic matching plans.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::model::{Filter, FilterId, FilterItemId, LocationId, SubjectId, TimePeriod};

/// Constraints used to bulk-load candidate ids.
///
/// `None` leaves a facet unconstrained. `Some` of an empty list matches
/// nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCriteria {
    /// Subject whose observations are loaded.
    pub subject_id: SubjectId,
    /// Accepted time periods.
    pub time_periods: Option<Vec<TimePeriod>>,
    /// Accepted locations.
    pub location_ids: Option<Vec<LocationId>>,
}

impl CandidateCriteria {
    /// Returns true if some facet can never match.
    #[must_use]
    pub fn is_empty_selection(&self) -> bool {
        self.time_periods.as_ref().is_some_and(Vec::is_empty)
            || self.location_ids.as_ref().is_some_and(Vec::is_empty)
    }
}

/// Which association is required of a surviving candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Keep candidates associated with an item of the materialised set.
    Exists,
    /// Keep candidates associated with no item of the materialised set.
    NotExists,
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists => f.write_str("EXISTS"),
            Self::NotExists => f.write_str("NOT EXISTS"),
        }
    }
}

/// One elimination step for a single filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterElimination {
    /// Filter being applied.
    pub filter_id: FilterId,
    /// Number of selected items of the filter.
    pub selected_count: usize,
    /// Number of items of the filter.
    pub total_count: usize,
    /// `total_count / selected_count`; higher discriminates more.
    pub selectiveness: f64,
    /// Association required of surviving candidates.
    pub polarity: Polarity,
    /// The smaller of the selected and unselected partitions.
    pub item_ids: BTreeSet<FilterItemId>,
}

impl FilterElimination {
    /// Returns true if a row carrying `item_ids` survives this step.
    #[must_use]
    pub fn retains(&self, item_ids: &BTreeSet<FilterItemId>) -> bool {
        let associated = !self.item_ids.is_disjoint(item_ids);
        match self.polarity {
            Polarity::Exists => associated,
            Polarity::NotExists => !associated,
        }
    }
}

/// Bulk load and delete hints.
///
/// Relational stores with lock and parallelism hints honour them; others
/// only log them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHints {
    /// Take a table-level lock on the working table.
    pub table_lock: bool,
    /// Cap on parallel workers per statement.
    pub max_degree_of_parallelism: u16,
    /// Recompile the statement plan against current statistics.
    pub recompile: bool,
}

impl Default for ExecutionHints {
    fn default() -> Self {
        Self {
            table_lock: true,
            max_degree_of_parallelism: 4,
            recompile: true,
        }
    }
}

impl ExecutionHints {
    /// Creates hints with the given parallelism cap.
    #[must_use]
    pub fn with_max_degree_of_parallelism(max_degree_of_parallelism: u16) -> Self {
        Self {
            max_degree_of_parallelism,
            ..Self::default()
        }
    }
}

impl fmt::Display for ExecutionHints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut options = vec![format!("MAXDOP {}", self.max_degree_of_parallelism)];
        if self.recompile {
            options.push("RECOMPILE".to_string());
        }
        if self.table_lock {
            write!(f, "WITH (TABLOCK) ")?;
        }
        write!(f, "OPTION ({})", options.join(", "))
    }
}

/// Parameters of one matching run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingPlan {
    /// Candidate load constraints.
    pub candidates: CandidateCriteria,
    /// Elimination steps, most selective first.
    pub eliminations: Vec<FilterElimination>,
    /// Statement hints.
    pub hints: ExecutionHints,
}

impl MatchingPlan {
    /// Builds the plan for `selected_items` over the subject's `filters`.
    #[must_use]
    pub fn build(
        candidates: CandidateCriteria,
        filters: &[Filter],
        selected_items: &BTreeSet<FilterItemId>,
        hints: ExecutionHints,
    ) -> Self {
        Self {
            candidates,
            eliminations: plan_eliminations(filters, selected_items),
            hints,
        }
    }
}

/// Orders the filter elimination steps.
///
/// Filters with no selected item, or with every item selected, are
/// skipped. The rest are sorted by selectiveness descending, ties broken
/// by filter id ascending.
#[must_use]
pub fn plan_eliminations(
    filters: &[Filter],
    selected_items: &BTreeSet<FilterItemId>,
) -> Vec<FilterElimination> {
    let mut eliminations: Vec<FilterElimination> = filters
        .iter()
        .filter_map(|filter| elimination_for(filter, selected_items))
        .collect();

    eliminations.sort_by(|a, b| {
        b.selectiveness
            .total_cmp(&a.selectiveness)
            .then_with(|| a.filter_id.cmp(&b.filter_id))
    });
    eliminations
}

fn elimination_for(
    filter: &Filter,
    selected_items: &BTreeSet<FilterItemId>,
) -> Option<FilterElimination> {
    let all = filter.item_ids();
    let (selected, unselected): (BTreeSet<FilterItemId>, BTreeSet<FilterItemId>) =
        all.iter().partition(|id| selected_items.contains(*id));

    if selected.is_empty() || unselected.is_empty() {
        return None;
    }

    let total_count = all.len();
    let selected_count = selected.len();
    let (polarity, item_ids) = match selected.len().cmp(&unselected.len()) {
        Ordering::Less | Ordering::Equal => (Polarity::Exists, selected),
        Ordering::Greater => (Polarity::NotExists, unselected),
    };

    Some(FilterElimination {
        filter_id: filter.id,
        selected_count,
        total_count,
        selectiveness: total_count as f64 / selected_count as f64,
        polarity,
        item_ids,
    })
}
