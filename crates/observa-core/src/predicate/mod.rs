//! Location predicates.
//!
//! A [`Predicate`] is a portable description of a geographic facet
//! selection. The same value evaluates in memory against a [`Location`]
//! (or a hydrated observation row) and renders to parameterised SQL for
//! relational stores.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use observa_core::{GeographicLevel, LocationPredicateBuilder};
//!
//! let predicate = LocationPredicateBuilder::new()
//!     .codes(GeographicLevel::Region, ["E12000001"])
//!     .codes(GeographicLevel::LocalAuthority, ["201", "E09000002"])
//!     .build();
//!
//! assert!(predicate.matches(&location));
//! ```

mod builders;
mod location;
mod matching;
mod sql;

#[cfg(test)]
mod predicate_tests;

pub use location::LocationPredicateBuilder;
pub use sql::SqlFragment;

use serde::{Deserialize, Serialize};

use crate::model::{GeographicLevel, Location, LocationId};

/// A condition over a [`Location`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// Matches everything.
    True,
    /// Location is of `level`.
    LevelEq {
        /// Required level.
        level: GeographicLevel,
    },
    /// Location id is one of `ids`.
    LocationIdIn {
        /// Accepted ids.
        ids: Vec<LocationId>,
    },
    /// Attribute code for `level` is one of `codes`.
    AttributeCodeIn {
        /// Level whose attribute code is checked.
        level: GeographicLevel,
        /// Accepted codes.
        codes: Vec<String>,
    },
    /// Legacy code for `level` is one of `codes`.
    OldCodeIn {
        /// Level whose legacy code is checked.
        level: GeographicLevel,
        /// Accepted legacy codes.
        codes: Vec<String>,
    },
    /// All sub-predicates match.
    And {
        /// Conjuncts.
        predicates: Vec<Predicate>,
    },
    /// At least one sub-predicate matches.
    Or {
        /// Disjuncts.
        predicates: Vec<Predicate>,
    },
}

impl Default for Predicate {
    fn default() -> Self {
        Self::True
    }
}

impl Predicate {
    /// Returns true if this predicate places no constraint.
    #[must_use]
    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }

    /// Evaluates the predicate against a location.
    #[must_use]
    pub fn matches(&self, location: &Location) -> bool {
        matching::evaluate(self, location)
    }

    /// Renders the predicate as a SQL boolean expression over `alias`.
    #[must_use]
    pub fn to_sql(&self, alias: &str) -> SqlFragment {
        sql::render(self, alias)
    }
}
