//! Matching set generation.
//!
//! Produces the exact set of observation ids matching every facet of a
//! query by running a staged pipeline against a storage session:
//!
//! 1. create an unindexed working table,
//! 2. bulk-load candidates constrained by subject, time periods and
//!    locations,
//! 3. add a unique index,
//! 4. apply one elimination per discriminating filter, most selective
//!    first,
//! 5. refresh the working table statistics.
//!
//! The resulting [`MatchingSet`] owns the session and drops the working
//! table when it goes out of scope.

mod generator;
mod plan;


pub use generator::{MatchingSet, MatchingSetGenerator};
pub use plan::{
    plan_eliminations, CandidateCriteria, ExecutionHints, FilterElimination, MatchingPlan,
    Polarity,
};
