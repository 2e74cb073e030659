//! Shared fixture for unit tests.
//!
//! One subject with two filters (school type: Total, Primary, Secondary;
//! gender: Male, Female), two indicators, five locations across three
//! levels and calendar years 2018 and 2019. Every combination is present,
//! giving 5 × 2 × 3 × 2 = 60 observations.

use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::model::{
    Filter, FilterGroup, FilterItem, FilterItemId, GeographicLevel, Indicator, IndicatorGroup,
    IndicatorId, Location, LocationId, Observation, Subject, SubjectId, TimeIdentifier,
};
use crate::store::{Fixture, MemoryObservationStore};

pub(crate) const YEARS: [i32; 2] = [2018, 2019];

pub(crate) struct TestData {
    pub subject_id: SubjectId,
    pub school_type: Uuid,
    pub gender: Uuid,
    pub total: FilterItemId,
    pub primary: FilterItemId,
    pub secondary: FilterItemId,
    pub male: FilterItemId,
    pub female: FilterItemId,
    pub enrolments: IndicatorId,
    pub absence_rate: IndicatorId,
    pub england: LocationId,
    pub north_east: LocationId,
    pub north_west: LocationId,
    pub city_of_london: LocationId,
    pub barking: LocationId,
    pub fixture: Fixture,
}

impl TestData {
    pub fn all_locations(&self) -> Vec<LocationId> {
        vec![
            self.england,
            self.north_east,
            self.north_west,
            self.city_of_london,
            self.barking,
        ]
    }

    pub fn memory_store(&self) -> MemoryObservationStore {
        MemoryObservationStore::from_fixture(&self.fixture).expect("valid fixture")
    }

    /// Observations satisfying `keep`, as sorted ids.
    pub fn expected_ids(&self, keep: impl Fn(&Observation) -> bool) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .fixture
            .observations
            .iter()
            .filter(|o| keep(o))
            .map(|o| o.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn item(n: u128, label: &str) -> FilterItem {
    FilterItem {
        id: id(n),
        label: label.to_string(),
    }
}

pub(crate) fn test_data() -> TestData {
    let subject_id = id(1);
    let school_type = id(10);
    let gender = id(20);
    let (total, primary, secondary) = (id(11), id(12), id(13));
    let (male, female) = (id(21), id(22));
    let (enrolments, absence_rate) = (id(31), id(32));

    let subject = Subject {
        id: subject_id,
        name: "Pupil absence".to_string(),
        filters: vec![
            Filter {
                id: school_type,
                label: "School type".to_string(),
                name: "school_type".to_string(),
                hint: None,
                groups: vec![FilterGroup {
                    id: id(101),
                    label: "Default".to_string(),
                    items: vec![
                        item(11, "Total"),
                        item(12, "Primary"),
                        item(13, "Secondary"),
                    ],
                }],
            },
            Filter {
                id: gender,
                label: "Gender".to_string(),
                name: "gender".to_string(),
                hint: Some("Pupil gender".to_string()),
                groups: vec![FilterGroup {
                    id: id(201),
                    label: "Default".to_string(),
                    items: vec![item(21, "Male"), item(22, "Female")],
                }],
            },
        ],
        indicator_groups: vec![IndicatorGroup {
            id: id(301),
            label: "Absence".to_string(),
            indicators: vec![
                Indicator {
                    id: enrolments,
                    label: "Enrolments".to_string(),
                    name: "enrolments".to_string(),
                    unit: String::new(),
                    decimal_places: Some(0),
                },
                Indicator {
                    id: absence_rate,
                    label: "Absence rate".to_string(),
                    name: "sess_overall_percent".to_string(),
                    unit: "%".to_string(),
                    decimal_places: Some(1),
                },
            ],
        }],
    };

    let england = id(1001);
    let north_east = id(1002);
    let north_west = id(1003);
    let city_of_london = id(1004);
    let barking = id(1005);
    let locations = vec![
        Location::new(england, GeographicLevel::Country, "E92000001", "England"),
        Location::new(north_east, GeographicLevel::Region, "E12000001", "North East"),
        Location::new(north_west, GeographicLevel::Region, "E12000002", "North West"),
        Location::new(
            city_of_london,
            GeographicLevel::LocalAuthority,
            "E09000001",
            "City of London",
        )
        .with_old_code("201"),
        Location::new(
            barking,
            GeographicLevel::LocalAuthority,
            "E09000002",
            "Barking and Dagenham",
        )
        .with_old_code("301"),
    ];

    let mut observations = Vec::new();
    let mut next = 10_000u128;
    for location in &locations {
        for year in YEARS {
            for school in [total, primary, secondary] {
                for sex in [male, female] {
                    next += 1;
                    let mut measures = BTreeMap::new();
                    measures.insert(enrolments, (next % 997).to_string());
                    measures.insert(absence_rate, format!("{}.{}", next % 10, next % 7));
                    observations.push(Observation {
                        id: id(next),
                        subject_id,
                        location_id: location.id,
                        year,
                        time_identifier: TimeIdentifier::CalendarYear,
                        filter_item_ids: BTreeSet::from([school, sex]),
                        measures,
                    });
                }
            }
        }
    }

    TestData {
        subject_id,
        school_type,
        gender,
        total,
        primary,
        secondary,
        male,
        female,
        enrolments,
        absence_rate,
        england,
        north_east,
        north_west,
        city_of_london,
        barking,
        fixture: Fixture {
            subjects: vec![subject],
            locations,
            observations,
        },
    }
}
