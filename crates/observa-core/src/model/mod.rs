//! Domain model: subjects, filters, indicators, locations, time
//! identifiers and observations.
//!
//! Everything here is plain data. Subjects are immutable once published,
//! so the engine only ever reads these types.

mod geography;
mod observation;
mod subject;
mod time_identifier;


pub use geography::{GeographicLevel, Location, UnknownGeographicLevel};
pub use observation::{HydratedFilterItem, Observation, ObservationRow, TimePeriod};
pub use subject::{is_total_label, Filter, FilterGroup, FilterItem, Indicator, IndicatorGroup, Subject};
pub use time_identifier::{
    AssociatedRange, TimeIdentifier, TimeIdentifierCategory, UnknownTimeIdentifier,
};

use uuid::Uuid;

/// Identifier of a [`Subject`].
pub type SubjectId = Uuid;
/// Identifier of a [`Location`].
pub type LocationId = Uuid;
/// Identifier of a [`Filter`].
pub type FilterId = Uuid;
/// Identifier of a [`FilterGroup`].
pub type FilterGroupId = Uuid;
/// Identifier of a [`FilterItem`].
pub type FilterItemId = Uuid;
/// Identifier of an [`Indicator`].
pub type IndicatorId = Uuid;
/// Identifier of an [`Observation`].
pub type ObservationId = Uuid;
