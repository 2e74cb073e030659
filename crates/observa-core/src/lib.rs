//! # `Observa` Core
//!
//! Faceted query engine for published statistical observations.
//!
//! A statistics subject (dataset) owns a large fact table of observations,
//! each tagged with a location, a time period and one filter item per
//! filter. `Observa` answers conjunctive facet queries over that table:
//!
//! - **Time periods**: ranges such as `2012 Q1 .. 2014 Q2` are expanded to
//!   concrete `(year, code)` tuples ([`time_period`]).
//! - **Locations**: geographic selections by id or by per-level codes are
//!   compiled to a portable [`Predicate`] ([`predicate`]).
//! - **Filters**: selected filter items are matched through a staged,
//!   selectivity-ordered elimination pipeline over an ephemeral working
//!   table ([`matching`]).
//! - **Hydration**: matched ids are resolved into full rows in bounded
//!   batches ([`fetch`]).
//! - **Cost control**: the worst-case number of table cells is estimated up
//!   front and oversized queries are cropped ([`optimiser`]).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use observa_core::{ObservationQueryEngine, ObservaConfig, store::SqliteObservationStore};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = SqliteObservationStore::open("./statistics.db")?;
//! let engine = ObservationQueryEngine::new(store, &ObservaConfig::default())?;
//!
//! let result = engine.query(query, &CancellationToken::new()).await?;
//! println!("{} observations", result.observations.len());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]

mod cancel;
pub mod config;
pub mod engine;
#[cfg(test)]
mod engine_tests;
pub mod error;
pub mod fetch;
pub mod matching;
pub mod model;
pub mod optimiser;
pub mod predicate;
pub mod query;
pub mod store;
#[cfg(test)]
mod test_support;
pub mod time_period;

pub use config::{ObservaConfig, QueryConfig};
pub use engine::{CostReport, ObservationQueryEngine, QueryResult, QueryTimings};
pub use error::{Error, ErrorKind, Result};
pub use fetch::{FetchTimings, FetchedObservations, ObservationBatchFetcher};
pub use matching::{ExecutionHints, MatchingPlan, MatchingSet, MatchingSetGenerator};
pub use model::{
    Filter, FilterGroup, FilterItem, GeographicLevel, Indicator, IndicatorGroup, Location,
    Observation, ObservationRow, Subject, TimeIdentifier, TimePeriod,
};
pub use optimiser::{CroppedQuery, QueryCostOptimiser};
pub use predicate::{LocationPredicateBuilder, Predicate};
pub use query::{LocationQuery, ObservationQueryContext, TimePeriodQuery};
pub use store::{Fixture, MemoryObservationStore, SqliteObservationStore, StatisticsStore};
pub use time_period::{InvalidRangeError, TimePeriodRangeResolver};
