//! Time period codes.
//!
//! Every [`TimeIdentifier`] belongs to exactly one [`TimeIdentifierCategory`].
//! Year-like identifiers (`AY`, `CY`, `FY`, `TY`, `RY`) describe a whole
//! year. All others are members of an [`AssociatedRange`]: a fixed ordinal
//! sequence of sub-year periods such as quarters or terms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of weeks in a week range.
const WEEKS_PER_YEAR: u8 = 52;
/// Number of months in a month range.
const MONTHS_PER_YEAR: u8 = 12;

/// An enumerated period code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeIdentifier {
    /// `AY`
    AcademicYear,
    /// `AYQ1`
    AcademicYearQ1,
    /// `AYQ2`
    AcademicYearQ2,
    /// `AYQ3`
    AcademicYearQ3,
    /// `AYQ4`
    AcademicYearQ4,
    /// `CY`
    CalendarYear,
    /// `CYQ1`
    CalendarYearQ1,
    /// `CYQ2`
    CalendarYearQ2,
    /// `CYQ3`
    CalendarYearQ3,
    /// `CYQ4`
    CalendarYearQ4,
    /// `FY`
    FinancialYear,
    /// `FYQ1`
    FinancialYearQ1,
    /// `FYQ2`
    FinancialYearQ2,
    /// `FYQ3`
    FinancialYearQ3,
    /// `FYQ4`
    FinancialYearQ4,
    /// `P1`
    FinancialYearPart1,
    /// `P2`
    FinancialYearPart2,
    /// `TY`
    TaxYear,
    /// `TYQ1`
    TaxYearQ1,
    /// `TYQ2`
    TaxYearQ2,
    /// `TYQ3`
    TaxYearQ3,
    /// `TYQ4`
    TaxYearQ4,
    /// `RY`
    ReportingYear,
    /// `T1`
    AutumnTerm,
    /// `T1T2`
    AutumnSpringTerm,
    /// `T2`
    SpringTerm,
    /// `T3`
    SummerTerm,
    /// `M1` .. `M12`
    Month(u8),
    /// `W1` .. `W52`
    Week(u8),
}

/// Category a [`TimeIdentifier`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeIdentifierCategory {
    /// Academic year and its quarters.
    AcademicYear,
    /// Calendar year and its quarters.
    CalendarYear,
    /// Financial year, its quarters and parts.
    FinancialYear,
    /// Tax year and its quarters.
    TaxYear,
    /// Reporting year.
    ReportingYear,
    /// Months.
    Month,
    /// School terms.
    Term,
    /// Weeks.
    Week,
}

/// Fixed in-year sequence of sub-year identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociatedRange {
    /// `AYQ1..AYQ4`
    AcademicYearQuarters,
    /// `CYQ1..CYQ4`
    CalendarYearQuarters,
    /// `FYQ1..FYQ4`
    FinancialYearQuarters,
    /// `TYQ1..TYQ4`
    TaxYearQuarters,
    /// `P1, P2`
    FinancialYearParts,
    /// `T1, T1T2, T2, T3`
    Terms,
    /// `M1..M12`
    Months,
    /// `W1..W52`
    Weeks,
}

impl AssociatedRange {
    /// Returns the members of the range in ordinal order.
    #[must_use]
    pub fn members(&self) -> Vec<TimeIdentifier> {
        use TimeIdentifier as T;
        match self {
            Self::AcademicYearQuarters => vec![
                T::AcademicYearQ1,
                T::AcademicYearQ2,
                T::AcademicYearQ3,
                T::AcademicYearQ4,
            ],
            Self::CalendarYearQuarters => vec![
                T::CalendarYearQ1,
                T::CalendarYearQ2,
                T::CalendarYearQ3,
                T::CalendarYearQ4,
            ],
            Self::FinancialYearQuarters => vec![
                T::FinancialYearQ1,
                T::FinancialYearQ2,
                T::FinancialYearQ3,
                T::FinancialYearQ4,
            ],
            Self::TaxYearQuarters => vec![T::TaxYearQ1, T::TaxYearQ2, T::TaxYearQ3, T::TaxYearQ4],
            Self::FinancialYearParts => vec![T::FinancialYearPart1, T::FinancialYearPart2],
            Self::Terms => vec![
                T::AutumnTerm,
                T::AutumnSpringTerm,
                T::SpringTerm,
                T::SummerTerm,
            ],
            Self::Months => (1..=MONTHS_PER_YEAR).map(T::Month).collect(),
            Self::Weeks => (1..=WEEKS_PER_YEAR).map(T::Week).collect(),
        }
    }

    /// Returns the ordinal position of `identifier` within this range.
    #[must_use]
    pub fn position(&self, identifier: TimeIdentifier) -> Option<usize> {
        self.members().iter().position(|member| *member == identifier)
    }
}

impl TimeIdentifier {
    /// Returns the short code (e.g. `CYQ1`).
    #[must_use]
    pub fn code(&self) -> String {
        let fixed = match self {
            Self::AcademicYear => "AY",
            Self::AcademicYearQ1 => "AYQ1",
            Self::AcademicYearQ2 => "AYQ2",
            Self::AcademicYearQ3 => "AYQ3",
            Self::AcademicYearQ4 => "AYQ4",
            Self::CalendarYear => "CY",
            Self::CalendarYearQ1 => "CYQ1",
            Self::CalendarYearQ2 => "CYQ2",
            Self::CalendarYearQ3 => "CYQ3",
            Self::CalendarYearQ4 => "CYQ4",
            Self::FinancialYear => "FY",
            Self::FinancialYearQ1 => "FYQ1",
            Self::FinancialYearQ2 => "FYQ2",
            Self::FinancialYearQ3 => "FYQ3",
            Self::FinancialYearQ4 => "FYQ4",
            Self::FinancialYearPart1 => "P1",
            Self::FinancialYearPart2 => "P2",
            Self::TaxYear => "TY",
            Self::TaxYearQ1 => "TYQ1",
            Self::TaxYearQ2 => "TYQ2",
            Self::TaxYearQ3 => "TYQ3",
            Self::TaxYearQ4 => "TYQ4",
            Self::ReportingYear => "RY",
            Self::AutumnTerm => "T1",
            Self::AutumnSpringTerm => "T1T2",
            Self::SpringTerm => "T2",
            Self::SummerTerm => "T3",
            Self::Month(month) => return format!("M{month}"),
            Self::Week(week) => return format!("W{week}"),
        };
        fixed.to_string()
    }

    /// Returns the category of this identifier.
    #[must_use]
    pub const fn category(&self) -> TimeIdentifierCategory {
        use TimeIdentifierCategory as C;
        match self {
            Self::AcademicYear
            | Self::AcademicYearQ1
            | Self::AcademicYearQ2
            | Self::AcademicYearQ3
            | Self::AcademicYearQ4 => C::AcademicYear,
            Self::CalendarYear
            | Self::CalendarYearQ1
            | Self::CalendarYearQ2
            | Self::CalendarYearQ3
            | Self::CalendarYearQ4 => C::CalendarYear,
            Self::FinancialYear
            | Self::FinancialYearQ1
            | Self::FinancialYearQ2
            | Self::FinancialYearQ3
            | Self::FinancialYearQ4
            | Self::FinancialYearPart1
            | Self::FinancialYearPart2 => C::FinancialYear,
            Self::TaxYear
            | Self::TaxYearQ1
            | Self::TaxYearQ2
            | Self::TaxYearQ3
            | Self::TaxYearQ4 => C::TaxYear,
            Self::ReportingYear => C::ReportingYear,
            Self::AutumnTerm | Self::AutumnSpringTerm | Self::SpringTerm | Self::SummerTerm => {
                C::Term
            }
            Self::Month(_) => C::Month,
            Self::Week(_) => C::Week,
        }
    }

    /// Returns true for identifiers that describe a whole year.
    #[must_use]
    pub const fn is_year(&self) -> bool {
        matches!(
            self,
            Self::AcademicYear
                | Self::CalendarYear
                | Self::FinancialYear
                | Self::TaxYear
                | Self::ReportingYear
        )
    }

    /// Returns the range this identifier is a member of, `None` for years.
    #[must_use]
    pub const fn associated_range(&self) -> Option<AssociatedRange> {
        use AssociatedRange as R;
        match self {
            Self::AcademicYearQ1
            | Self::AcademicYearQ2
            | Self::AcademicYearQ3
            | Self::AcademicYearQ4 => Some(R::AcademicYearQuarters),
            Self::CalendarYearQ1
            | Self::CalendarYearQ2
            | Self::CalendarYearQ3
            | Self::CalendarYearQ4 => Some(R::CalendarYearQuarters),
            Self::FinancialYearQ1
            | Self::FinancialYearQ2
            | Self::FinancialYearQ3
            | Self::FinancialYearQ4 => Some(R::FinancialYearQuarters),
            Self::TaxYearQ1 | Self::TaxYearQ2 | Self::TaxYearQ3 | Self::TaxYearQ4 => {
                Some(R::TaxYearQuarters)
            }
            Self::FinancialYearPart1 | Self::FinancialYearPart2 => Some(R::FinancialYearParts),
            Self::AutumnTerm | Self::AutumnSpringTerm | Self::SpringTerm | Self::SummerTerm => {
                Some(R::Terms)
            }
            Self::Month(_) => Some(R::Months),
            Self::Week(_) => Some(R::Weeks),
            Self::AcademicYear
            | Self::CalendarYear
            | Self::FinancialYear
            | Self::TaxYear
            | Self::ReportingYear => None,
        }
    }

    /// Returns true if a range may span from `self` to `other`: both are
    /// year-like, or both belong to the same associated range.
    #[must_use]
    pub fn is_alike(&self, other: &TimeIdentifier) -> bool {
        if self.is_year() && other.is_year() {
            return true;
        }
        match (self.associated_range(), other.associated_range()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Ordering key within a year: years first, then range ordinal.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.associated_range()
            .and_then(|range| range.position(*self))
            .map_or(0, |position| position + 1)
    }
}

impl fmt::Display for TimeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Error returned when parsing an unknown time identifier code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown time identifier code '{0}'")]
pub struct UnknownTimeIdentifier(pub String);

impl FromStr for TimeIdentifier {
    type Err = UnknownTimeIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownTimeIdentifier(s.to_string());
        let identifier = match s {
            "AY" => Self::AcademicYear,
            "AYQ1" => Self::AcademicYearQ1,
            "AYQ2" => Self::AcademicYearQ2,
            "AYQ3" => Self::AcademicYearQ3,
            "AYQ4" => Self::AcademicYearQ4,
            "CY" => Self::CalendarYear,
            "CYQ1" => Self::CalendarYearQ1,
            "CYQ2" => Self::CalendarYearQ2,
            "CYQ3" => Self::CalendarYearQ3,
            "CYQ4" => Self::CalendarYearQ4,
            "FY" => Self::FinancialYear,
            "FYQ1" => Self::FinancialYearQ1,
            "FYQ2" => Self::FinancialYearQ2,
            "FYQ3" => Self::FinancialYearQ3,
            "FYQ4" => Self::FinancialYearQ4,
            "P1" => Self::FinancialYearPart1,
            "P2" => Self::FinancialYearPart2,
            "TY" => Self::TaxYear,
            "TYQ1" => Self::TaxYearQ1,
            "TYQ2" => Self::TaxYearQ2,
            "TYQ3" => Self::TaxYearQ3,
            "TYQ4" => Self::TaxYearQ4,
            "RY" => Self::ReportingYear,
            "T1" => Self::AutumnTerm,
            "T1T2" => Self::AutumnSpringTerm,
            "T2" => Self::SpringTerm,
            "T3" => Self::SummerTerm,
            _ => {
                let mut chars = s.chars();
                let prefix = chars.next();
                let number: u8 = chars.as_str().parse().map_err(|_| unknown())?;
                match prefix {
                    Some('M') if (1..=MONTHS_PER_YEAR).contains(&number) => Self::Month(number),
                    Some('W') if (1..=WEEKS_PER_YEAR).contains(&number) => Self::Week(number),
                    _ => return Err(unknown()),
                }
            }
        };
        Ok(identifier)
    }
}

impl TryFrom<String> for TimeIdentifier {
    type Error = UnknownTimeIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeIdentifier> for String {
    fn from(value: TimeIdentifier) -> Self {
        value.code()
    }
}
