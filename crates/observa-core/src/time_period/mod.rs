//! Time period range resolution.
//!
//! Expands `(start_year, start_code) .. (end_year, end_code)` into the
//! ordered list of concrete [`TimePeriod`]s it covers.
//!
//! ```rust,ignore
//! use observa_core::{TimeIdentifier, TimePeriodRangeResolver};
//!
//! let periods = TimePeriodRangeResolver::range(
//!     2012,
//!     TimeIdentifier::CalendarYearQ3,
//!     2013,
//!     TimeIdentifier::CalendarYearQ2,
//! )?;
//! assert_eq!(periods.len(), 4);
//! ```


use thiserror::Error;

use crate::model::{TimeIdentifier, TimePeriod};
use crate::query::TimePeriodQuery;

const MIN_YEAR: i32 = 1000;
const MAX_YEAR: i32 = 9999;

/// Reasons a time period range is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidRangeError {
    /// Start year is not a positive four-digit number.
    #[error("start year {0} is not a four-digit year")]
    InvalidStartYear(i32),

    /// End year is not a positive four-digit number.
    #[error("end year {0} is not a four-digit year")]
    InvalidEndYear(i32),

    /// Start year is later than end year.
    #[error("start year {start_year} is after end year {end_year}")]
    StartAfterEnd {
        /// Requested start year.
        start_year: i32,
        /// Requested end year.
        end_year: i32,
    },

    /// Start and end codes belong to different categories.
    #[error("time identifiers {start} and {end} are not alike")]
    NotAlike {
        /// Requested start code.
        start: TimeIdentifier,
        /// Requested end code.
        end: TimeIdentifier,
    },

    /// Same-year range whose end code precedes its start code.
    #[error("time identifier {end} precedes {start} within year {year}")]
    EndBeforeStart {
        /// The shared year.
        year: i32,
        /// Requested start code.
        start: TimeIdentifier,
        /// Requested end code.
        end: TimeIdentifier,
    },
}

fn is_valid_year(year: i32) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&year)
}

/// Expands time period ranges.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimePeriodRangeResolver;

impl TimePeriodRangeResolver {
    /// Expands the inclusive range into ordered `(year, code)` tuples.
    ///
    /// Year-like codes produce one tuple per year, all carrying
    /// `start_code`. Range codes walk the associated range: the tail of
    /// the start year, the full range for years strictly between and the
    /// head of the end year.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRangeError`] naming the first violated rule.
    pub fn range(
        start_year: i32,
        start_code: TimeIdentifier,
        end_year: i32,
        end_code: TimeIdentifier,
    ) -> Result<Vec<TimePeriod>, InvalidRangeError> {
        if !is_valid_year(start_year) {
            return Err(InvalidRangeError::InvalidStartYear(start_year));
        }
        if !is_valid_year(end_year) {
            return Err(InvalidRangeError::InvalidEndYear(end_year));
        }
        if start_year > end_year {
            return Err(InvalidRangeError::StartAfterEnd {
                start_year,
                end_year,
            });
        }
        if !start_code.is_alike(&end_code) {
            return Err(InvalidRangeError::NotAlike {
                start: start_code,
                end: end_code,
            });
        }

        let Some(range) = start_code.associated_range() else {
            return Ok((start_year..=end_year)
                .map(|year| TimePeriod::new(year, start_code))
                .collect());
        };

        let members = range.members();
        let not_alike = || InvalidRangeError::NotAlike {
            start: start_code,
            end: end_code,
        };
        let start_index = range.position(start_code).ok_or_else(not_alike)?;
        let end_index = range.position(end_code).ok_or_else(not_alike)?;

        if start_year == end_year {
            if end_index < start_index {
                return Err(InvalidRangeError::EndBeforeStart {
                    year: start_year,
                    start: start_code,
                    end: end_code,
                });
            }
            return Ok(members[start_index..=end_index]
                .iter()
                .map(|code| TimePeriod::new(start_year, *code))
                .collect());
        }

        let mut periods = Vec::new();
        periods.extend(
            members[start_index..]
                .iter()
                .map(|code| TimePeriod::new(start_year, *code)),
        );
        for year in (start_year + 1)..end_year {
            periods.extend(members.iter().map(|code| TimePeriod::new(year, *code)));
        }
        periods.extend(
            members[..=end_index]
                .iter()
                .map(|code| TimePeriod::new(end_year, *code)),
        );
        Ok(periods)
    }

    /// Expands `query` and applies its `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRangeError`] if the range is malformed.
    pub fn resolve(query: &TimePeriodQuery) -> Result<Vec<TimePeriod>, InvalidRangeError> {
        let mut periods = Self::range(
            query.start_year,
            query.start_code,
            query.end_year,
            query.end_code,
        )?;
        if let Some(limit) = query.limit {
            periods.truncate(limit);
        }
        Ok(periods)
    }
}
