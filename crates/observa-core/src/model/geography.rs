//! Geographic levels and locations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::LocationId;

/// Granularity tier of a [`Location`].
///
/// The declaration order is the level iteration order used when cropping
/// location selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GeographicLevel {
    /// A country (e.g. England).
    Country,
    /// English devolved area.
    EnglishDevolvedArea,
    /// Higher or further education institution.
    Institution,
    /// Local authority. Also carries a legacy 3-character code.
    LocalAuthority,
    /// Local authority district.
    LocalAuthorityDistrict,
    /// Local enterprise partnership.
    LocalEnterprisePartnership,
    /// Local skills improvement plan area.
    LocalSkillsImprovementPlanArea,
    /// Mayoral combined authority.
    MayoralCombinedAuthority,
    /// Multi-academy trust.
    MultiAcademyTrust,
    /// Opportunity area.
    OpportunityArea,
    /// Parliamentary constituency.
    ParliamentaryConstituency,
    /// Planning area.
    PlanningArea,
    /// Training provider.
    Provider,
    /// Region (e.g. North East).
    Region,
    /// Regional schools commissioner region.
    RscRegion,
    /// Individual school.
    School,
    /// Academy sponsor.
    Sponsor,
    /// Electoral ward.
    Ward,
}

impl GeographicLevel {
    /// Every level, in iteration order.
    pub const ALL: [GeographicLevel; 18] = [
        Self::Country,
        Self::EnglishDevolvedArea,
        Self::Institution,
        Self::LocalAuthority,
        Self::LocalAuthorityDistrict,
        Self::LocalEnterprisePartnership,
        Self::LocalSkillsImprovementPlanArea,
        Self::MayoralCombinedAuthority,
        Self::MultiAcademyTrust,
        Self::OpportunityArea,
        Self::ParliamentaryConstituency,
        Self::PlanningArea,
        Self::Provider,
        Self::Region,
        Self::RscRegion,
        Self::School,
        Self::Sponsor,
        Self::Ward,
    ];

    /// Returns the stable name used in storage and JSON.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Country => "Country",
            Self::EnglishDevolvedArea => "EnglishDevolvedArea",
            Self::Institution => "Institution",
            Self::LocalAuthority => "LocalAuthority",
            Self::LocalAuthorityDistrict => "LocalAuthorityDistrict",
            Self::LocalEnterprisePartnership => "LocalEnterprisePartnership",
            Self::LocalSkillsImprovementPlanArea => "LocalSkillsImprovementPlanArea",
            Self::MayoralCombinedAuthority => "MayoralCombinedAuthority",
            Self::MultiAcademyTrust => "MultiAcademyTrust",
            Self::OpportunityArea => "OpportunityArea",
            Self::ParliamentaryConstituency => "ParliamentaryConstituency",
            Self::PlanningArea => "PlanningArea",
            Self::Provider => "Provider",
            Self::Region => "Region",
            Self::RscRegion => "RscRegion",
            Self::School => "School",
            Self::Sponsor => "Sponsor",
            Self::Ward => "Ward",
        }
    }

    /// Returns true if locations of this level carry a legacy old code.
    #[must_use]
    pub const fn has_old_code(&self) -> bool {
        matches!(self, Self::LocalAuthority)
    }
}

impl fmt::Display for GeographicLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown geographic level name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown geographic level '{0}'")]
pub struct UnknownGeographicLevel(pub String);

impl FromStr for GeographicLevel {
    type Err = UnknownGeographicLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| UnknownGeographicLevel(s.to_string()))
    }
}

/// A geographic entity.
///
/// Only the attribute code of the location's own level is stored, so a
/// lookup for any other level is always absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Location id.
    pub id: LocationId,
    /// Granularity of this location.
    pub geographic_level: GeographicLevel,
    /// Attribute code for `geographic_level` (e.g. `E09000001`).
    pub code: String,
    /// Display name.
    pub name: String,
    /// Legacy 3-character code, local authorities only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_code: Option<String>,
}

impl Location {
    /// Creates a location without a legacy code.
    #[must_use]
    pub fn new(
        id: LocationId,
        geographic_level: GeographicLevel,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            geographic_level,
            code: code.into(),
            name: name.into(),
            old_code: None,
        }
    }

    /// Sets the legacy code. Ignored for levels without one.
    #[must_use]
    pub fn with_old_code(mut self, old_code: impl Into<String>) -> Self {
        if self.geographic_level.has_old_code() {
            self.old_code = Some(old_code.into());
        }
        self
    }

    /// Returns the attribute code of this location for `level`.
    ///
    /// `None` for every level other than the location's own.
    #[must_use]
    pub fn attribute_code(&self, level: GeographicLevel) -> Option<&str> {
        (level == self.geographic_level).then_some(self.code.as_str())
    }

    /// Returns the legacy code of this location for `level`, if any.
    #[must_use]
    pub fn old_attribute_code(&self, level: GeographicLevel) -> Option<&str> {
        if level == self.geographic_level && level.has_old_code() {
            self.old_code.as_deref()
        } else {
            None
        }
    }
}
