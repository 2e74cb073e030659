//! Builder methods for creating Predicate instances.

use super::Predicate;
use crate::model::{GeographicLevel, LocationId};

impl Predicate {
    /// Creates a level equality predicate.
    #[must_use]
    pub fn level_eq(level: GeographicLevel) -> Self {
        Self::LevelEq { level }
    }

    /// Creates a location id membership predicate.
    #[must_use]
    pub fn location_id_in(ids: impl IntoIterator<Item = LocationId>) -> Self {
        Self::LocationIdIn {
            ids: ids.into_iter().collect(),
        }
    }

    /// Creates an attribute code membership predicate.
    #[must_use]
    pub fn attribute_code_in<I, S>(level: GeographicLevel, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AttributeCodeIn {
            level,
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a legacy code membership predicate.
    #[must_use]
    pub fn old_code_in<I, S>(level: GeographicLevel, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OldCodeIn {
            level,
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a conjunction.
    ///
    /// `True` operands are dropped and a single remaining operand is
    /// returned as is. No operands at all yields `True`.
    #[must_use]
    pub fn and(predicates: Vec<Predicate>) -> Self {
        let mut predicates: Vec<Predicate> =
            predicates.into_iter().filter(|p| !p.is_true()).collect();
        match predicates.len() {
            0 => Self::True,
            1 => predicates.remove(0),
            _ => Self::And { predicates },
        }
    }

    /// Creates a disjunction.
    ///
    /// Any `True` operand makes the whole disjunction `True`, as does an
    /// empty operand list: an absent facet is unconstrained.
    #[must_use]
    pub fn or(mut predicates: Vec<Predicate>) -> Self {
        if predicates.is_empty() || predicates.iter().any(Predicate::is_true) {
            return Self::True;
        }
        if predicates.len() == 1 {
            return predicates.remove(0);
        }
        Self::Or { predicates }
    }
}
