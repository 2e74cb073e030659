//! Seeded scenario shared by the integration tests.
//!
//! One subject with three filters of 2, 5 and 10 items, 50 locations over
//! three geographic levels, calendar years 2016 to 2018 and 1000 distinct
//! observations drawn from the 15000 possible combinations.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use uuid::Uuid;

use observa_core::model::{FilterItemId, LocationId};
use observa_core::{
    Filter, FilterGroup, FilterItem, Fixture, GeographicLevel, Indicator, IndicatorGroup,
    Location, Observation, ObservationQueryContext, Subject, TimeIdentifier, TimePeriodQuery,
};

pub const YEARS: [i32; 3] = [2016, 2017, 2018];
pub const FILTER_SIZES: [usize; 3] = [2, 5, 10];
pub const OBSERVATIONS: usize = 1000;

pub struct Scenario {
    pub fixture: Fixture,
    pub subject_id: Uuid,
    /// Item ids per filter, in filter order.
    pub filters: Vec<Vec<FilterItemId>>,
    pub indicators: Vec<Uuid>,
}

impl Scenario {
    pub fn locations(&self) -> &[Location] {
        &self.fixture.locations
    }

    pub fn location(&self, id: LocationId) -> &Location {
        self.fixture
            .locations
            .iter()
            .find(|l| l.id == id)
            .expect("known location")
    }
}

fn next_id(rng: &mut StdRng) -> Uuid {
    Uuid::from_u128(rng.gen())
}

pub fn scenario(seed: u64) -> Scenario {
    let mut rng = StdRng::seed_from_u64(seed);
    let subject_id = next_id(&mut rng);

    let mut filters = Vec::new();
    let mut filter_items = Vec::new();
    for (position, size) in FILTER_SIZES.iter().enumerate() {
        let items: Vec<FilterItem> = (0..*size)
            .map(|n| FilterItem {
                id: next_id(&mut rng),
                label: format!("Item {position}.{n}"),
            })
            .collect();
        filter_items.push(items.iter().map(|item| item.id).collect::<Vec<_>>());
        filters.push(Filter {
            id: next_id(&mut rng),
            label: format!("Filter {position}"),
            name: format!("filter_{position}"),
            hint: None,
            groups: vec![FilterGroup {
                id: next_id(&mut rng),
                label: "Default".to_string(),
                items,
            }],
        });
    }

    let indicators: Vec<Indicator> = (0..3)
        .map(|n| Indicator {
            id: next_id(&mut rng),
            label: format!("Indicator {n}"),
            name: format!("indicator_{n}"),
            unit: String::new(),
            decimal_places: None,
        })
        .collect();
    let indicator_ids: Vec<Uuid> = indicators.iter().map(|i| i.id).collect();

    let mut locations = vec![Location::new(
        next_id(&mut rng),
        GeographicLevel::Country,
        "E92000001",
        "England",
    )];
    for n in 1..=9 {
        locations.push(Location::new(
            next_id(&mut rng),
            GeographicLevel::Region,
            format!("E1200000{n}"),
            format!("Region {n}"),
        ));
    }
    for n in 1..=40 {
        locations.push(
            Location::new(
                next_id(&mut rng),
                GeographicLevel::LocalAuthority,
                format!("E0900{n:04}"),
                format!("Authority {n}"),
            )
            .with_old_code(format!("{}", 100 + n)),
        );
    }

    let mut seen = HashSet::new();
    let mut observations = Vec::with_capacity(OBSERVATIONS);
    while observations.len() < OBSERVATIONS {
        let location = locations.choose(&mut rng).expect("locations").id;
        let year = *YEARS.choose(&mut rng).expect("years");
        let items: BTreeSet<FilterItemId> = filter_items
            .iter()
            .map(|ids| *ids.choose(&mut rng).expect("items"))
            .collect();
        if !seen.insert((location, year, items.clone())) {
            continue;
        }
        let measures: BTreeMap<Uuid, String> = indicator_ids
            .iter()
            .map(|id| (*id, rng.gen_range(0..10_000).to_string()))
            .collect();
        observations.push(Observation {
            id: next_id(&mut rng),
            subject_id,
            location_id: location,
            year,
            time_identifier: TimeIdentifier::CalendarYear,
            filter_item_ids: items,
            measures,
        });
    }

    let subject = Subject {
        id: subject_id,
        name: "Seeded subject".to_string(),
        filters,
        indicator_groups: vec![IndicatorGroup {
            id: next_id(&mut rng),
            label: "Default".to_string(),
            indicators,
        }],
    };

    Scenario {
        fixture: Fixture {
            subjects: vec![subject],
            locations,
            observations,
        },
        subject_id,
        filters: filter_items,
        indicators: indicator_ids,
    }
}

/// A random query: each facet is left open or narrowed at random.
pub fn random_query(rng: &mut StdRng, scenario: &Scenario) -> ObservationQueryContext {
    let mut query = ObservationQueryContext::new(scenario.subject_id);

    if rng.gen_bool(0.7) {
        let count = rng.gen_range(1..=12);
        query = query.with_location_ids(
            scenario
                .locations()
                .choose_multiple(rng, count)
                .map(|l| l.id),
        );
    }

    if rng.gen_bool(0.6) {
        let start = rng.gen_range(0..YEARS.len());
        let end = rng.gen_range(start..YEARS.len());
        query = query.with_time_period(TimePeriodQuery::new(
            YEARS[start],
            TimeIdentifier::CalendarYear,
            YEARS[end],
            TimeIdentifier::CalendarYear,
        ));
    }

    let mut items = Vec::new();
    for filter in &scenario.filters {
        if rng.gen_bool(0.6) {
            let count = rng.gen_range(1..=filter.len());
            items.extend(filter.choose_multiple(rng, count).copied());
        }
    }
    items.shuffle(rng);
    query.with_filter_items(items)
}

/// Matches `query` by scanning every observation.
///
/// Only the id location facet is understood.
pub fn brute_force(scenario: &Scenario, query: &ObservationQueryContext) -> Vec<Uuid> {
    let selected: HashSet<FilterItemId> = query.filter_item_ids.iter().copied().collect();
    let years: Option<Vec<i32>> = query.time_period.as_ref().map(|range| {
        YEARS
            .iter()
            .copied()
            .filter(|year| (range.start_year..=range.end_year).contains(year))
            .collect()
    });

    let mut ids: Vec<Uuid> = scenario
        .fixture
        .observations
        .iter()
        .filter(|o| query.location_ids.is_empty() || query.location_ids.contains(&o.location_id))
        .filter(|o| years.as_ref().is_none_or(|years| years.contains(&o.year)))
        .filter(|o| {
            scenario.filters.iter().all(|filter| {
                let chosen: Vec<&FilterItemId> =
                    filter.iter().filter(|id| selected.contains(*id)).collect();
                chosen.is_empty() || chosen.iter().any(|id| o.filter_item_ids.contains(*id))
            })
        })
        .map(|o| o.id)
        .collect();
    ids.sort_unstable();
    ids
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
