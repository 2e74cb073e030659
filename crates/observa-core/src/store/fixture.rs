//! JSON fixtures for loading subjects, locations and observations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{Location, Observation, Subject};

const MIN_YEAR: i32 = 1000;
const MAX_YEAR: i32 = 9999;

/// A self-contained data set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    /// Subjects with their filter and indicator hierarchies.
    #[serde(default)]
    pub subjects: Vec<Subject>,
    /// Locations referenced by observations.
    #[serde(default)]
    pub locations: Vec<Location>,
    /// Fact rows.
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl Fixture {
    /// Parses a fixture from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a fixture from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serializes the fixture as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Checks an observation against its subject's filter hierarchy.
///
/// Every observation carries exactly one item per filter and no item
/// from outside the subject.
pub(crate) fn validate_observation(subject: &Subject, observation: &Observation) -> Result<()> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&observation.year) {
        return Err(Error::InvalidData(format!(
            "observation {} has year {} which is not a four-digit year",
            observation.id, observation.year
        )));
    }

    let mut known: BTreeSet<_> = BTreeSet::new();
    for filter in &subject.filters {
        let items = filter.item_ids();
        let carried = observation
            .filter_item_ids
            .iter()
            .filter(|id| items.contains(*id))
            .count();
        if carried != 1 {
            return Err(Error::InvalidData(format!(
                "observation {} carries {} items of filter '{}', expected exactly 1",
                observation.id, carried, filter.label
            )));
        }
        known.extend(items);
    }

    if let Some(foreign) = observation
        .filter_item_ids
        .iter()
        .find(|id| !known.contains(*id))
    {
        return Err(Error::InvalidData(format!(
            "observation {} references filter item {} outside subject {}",
            observation.id, foreign, subject.id
        )));
    }
    Ok(())
}
