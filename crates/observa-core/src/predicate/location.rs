//! Builder that compiles geographic facet selections into a [`Predicate`].

use std::collections::BTreeMap;

use super::Predicate;
use crate::error::Result;
use crate::model::{GeographicLevel, LocationId};
use crate::query::LocationQuery;
use crate::store::LocationRepository;

/// Length of a legacy local authority code.
const OLD_CODE_LEN: usize = 3;

/// Builds a location [`Predicate`] from ids, per-level codes and an
/// optional explicit level.
///
/// The result is `level AND ids AND (clause(level_1) OR clause(level_2) ...)`.
/// Each per-level clause checks code membership for its level and, unless
/// an explicit level was given, also requires `geographic_level == level`
/// so codes never cross-match between levels. Empty facets are dropped.
#[derive(Debug, Clone, Default)]
pub struct LocationPredicateBuilder {
    level: Option<GeographicLevel>,
    location_ids: Vec<LocationId>,
    codes: BTreeMap<GeographicLevel, Vec<String>>,
}

impl LocationPredicateBuilder {
    /// Creates an unconstrained builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a builder from query facets.
    #[must_use]
    pub fn from_query(location_ids: &[LocationId], locations: Option<&LocationQuery>) -> Self {
        let mut builder = Self::new().location_ids(location_ids.iter().copied());
        if let Some(locations) = locations {
            builder.level = locations.geographic_level;
            for (level, codes) in &locations.codes {
                builder = builder.codes(*level, codes.iter().cloned());
            }
        }
        builder
    }

    /// Restricts matches to one level.
    #[must_use]
    pub fn level(mut self, level: GeographicLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Restricts matches to the given ids.
    #[must_use]
    pub fn location_ids(mut self, ids: impl IntoIterator<Item = LocationId>) -> Self {
        self.location_ids.extend(ids);
        self
    }

    /// Adds selected attribute codes for `level`.
    #[must_use]
    pub fn codes<I, S>(mut self, level: GeographicLevel, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codes
            .entry(level)
            .or_default()
            .extend(codes.into_iter().map(Into::into));
        self
    }

    /// Builds the predicate.
    #[must_use]
    pub fn build(&self) -> Predicate {
        let mut conjuncts = Vec::new();

        if let Some(level) = self.level {
            conjuncts.push(Predicate::level_eq(level));
        }
        if !self.location_ids.is_empty() {
            conjuncts.push(Predicate::location_id_in(self.location_ids.iter().copied()));
        }

        let clauses: Vec<Predicate> = self
            .codes
            .iter()
            .filter(|(_, codes)| !codes.is_empty())
            .map(|(level, codes)| self.level_clause(*level, codes))
            .collect();
        if !clauses.is_empty() {
            conjuncts.push(Predicate::or(clauses));
        }

        Predicate::and(conjuncts)
    }

    /// Resolves the selection to concrete, sorted location ids.
    ///
    /// `None` means unconstrained. A selection by ids alone is returned
    /// without a repository lookup.
    pub async fn resolve<R>(&self, repository: &R) -> Result<Option<Vec<LocationId>>>
    where
        R: LocationRepository + ?Sized,
    {
        let mut ids = match self.build() {
            Predicate::True => return Ok(None),
            Predicate::LocationIdIn { ids } => ids,
            predicate => repository
                .find_locations(&predicate)
                .await?
                .into_iter()
                .map(|location| location.id)
                .collect(),
        };
        ids.sort_unstable();
        ids.dedup();
        Ok(Some(ids))
    }

    fn level_clause(&self, level: GeographicLevel, codes: &[String]) -> Predicate {
        let code_match = if level.has_old_code() {
            let (old, new): (Vec<&String>, Vec<&String>) = codes
                .iter()
                .partition(|code| code.chars().count() == OLD_CODE_LEN);
            let mut alternatives = Vec::new();
            if !old.is_empty() {
                alternatives.push(Predicate::old_code_in(level, old.into_iter().cloned()));
            }
            if !new.is_empty() {
                alternatives.push(Predicate::attribute_code_in(level, new.into_iter().cloned()));
            }
            Predicate::or(alternatives)
        } else {
            Predicate::attribute_code_in(level, codes.iter().cloned())
        };

        if self.level.is_some() {
            code_match
        } else {
            Predicate::and(vec![Predicate::level_eq(level), code_match])
        }
    }
}
