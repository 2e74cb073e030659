//! Predicate evaluation against in-memory locations.

use super::Predicate;
use crate::model::{Location, ObservationRow};

pub(super) fn evaluate(predicate: &Predicate, location: &Location) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::LevelEq { level } => location.geographic_level == *level,
        Predicate::LocationIdIn { ids } => ids.contains(&location.id),
        Predicate::AttributeCodeIn { level, codes } => location
            .attribute_code(*level)
            .is_some_and(|code| codes.iter().any(|c| c == code)),
        Predicate::OldCodeIn { level, codes } => location
            .old_attribute_code(*level)
            .is_some_and(|code| codes.iter().any(|c| c == code)),
        Predicate::And { predicates } => predicates.iter().all(|p| evaluate(p, location)),
        Predicate::Or { predicates } => predicates.iter().any(|p| evaluate(p, location)),
    }
}

impl Predicate {
    /// Evaluates the predicate against the location of a hydrated row.
    #[must_use]
    pub fn matches_row(&self, row: &ObservationRow) -> bool {
        evaluate(self, &row.location)
    }
}
