//! Tests for cost estimation and cropping.

use proptest::prelude::*;

use super::*;
use crate::model::{GeographicLevel, TimeIdentifier};
use crate::query::{LocationQuery, TimePeriodQuery};
use crate::test_support::{test_data, TestData};

fn optimiser(max_table_cells: u64) -> QueryCostOptimiser {
    QueryCostOptimiser::new(&QueryConfig {
        max_table_cells,
        ..QueryConfig::default()
    })
}

fn both_years() -> TimePeriodQuery {
    TimePeriodQuery::new(2018, TimeIdentifier::CalendarYear, 2019, TimeIdentifier::CalendarYear)
}

fn location(data: &TestData, id: LocationId) -> Location {
    data.fixture
        .locations
        .iter()
        .find(|l| l.id == id)
        .cloned()
        .expect("known location")
}

#[tokio::test]
async fn test_estimate_counts_everything_when_unconstrained() {
    // Arrange
    let data = test_data();
    let store = data.memory_store();
    let query = ObservationQueryContext::new(data.subject_id);

    // Act
    let estimate = optimiser(25_000).estimate_max_cells(&store, &query).await.expect("estimate");

    // Assert: 2 indicators × 5 locations × 2 periods
    assert_eq!(estimate, 20);
}

#[tokio::test]
async fn test_estimate_multiplies_selected_items_per_filter() {
    let data = test_data();
    let store = data.memory_store();
    let query = ObservationQueryContext::new(data.subject_id)
        .with_indicators([data.enrolments])
        .with_location_ids([data.england, data.barking, data.barking])
        .with_time_period(both_years())
        .with_filter_items([data.total, data.primary, data.male, data.female, data.male]);

    let estimate = optimiser(25_000).estimate_max_cells(&store, &query).await.expect("estimate");

    // 1 indicator × 2 locations × 2 periods × 2 school types × 2 genders
    assert_eq!(estimate, 16);
}

#[tokio::test]
async fn test_estimate_ignores_unknown_items() {
    let data = test_data();
    let store = data.memory_store();
    let query = ObservationQueryContext::new(data.subject_id)
        .with_filter_items([uuid::Uuid::from_u128(9_999)]);

    let estimate = optimiser(25_000).estimate_max_cells(&store, &query).await.expect("estimate");

    assert_eq!(estimate, 20);
}

#[tokio::test]
async fn test_estimate_ignores_items_of_other_subjects() {
    // Arrange
    let data = test_data();
    let store = data.memory_store();
    let other_items = [9_101, 9_102, 9_103].map(uuid::Uuid::from_u128);
    store.insert_subject(crate::model::Subject {
        id: uuid::Uuid::from_u128(9_000),
        name: "Pupil exclusions".to_string(),
        filters: vec![crate::model::Filter {
            id: uuid::Uuid::from_u128(9_010),
            label: "Phase".to_string(),
            name: "phase".to_string(),
            hint: None,
            groups: vec![crate::model::FilterGroup {
                id: uuid::Uuid::from_u128(9_011),
                label: "Default".to_string(),
                items: other_items
                    .iter()
                    .map(|id| crate::model::FilterItem {
                        id: *id,
                        label: id.to_string(),
                    })
                    .collect(),
            }],
        }],
        indicator_groups: Vec::new(),
    });
    let query = ObservationQueryContext::new(data.subject_id).with_filter_items(other_items);

    // Act
    let estimate = optimiser(25_000).estimate_max_cells(&store, &query).await.expect("estimate");

    // Assert
    assert_eq!(estimate, 20);
}

#[tokio::test]
async fn test_estimate_resolves_location_codes() {
    let data = test_data();
    let store = data.memory_store();
    let query = ObservationQueryContext::new(data.subject_id).with_locations(
        LocationQuery::default().with_codes(GeographicLevel::Region, ["E12000001", "E12000002"]),
    );

    let estimate = optimiser(25_000).estimate_max_cells(&store, &query).await.expect("estimate");

    assert_eq!(estimate, 8);
}

#[tokio::test]
async fn test_within_budget_is_returned_unchanged() {
    let data = test_data();
    let store = data.memory_store();
    let query = ObservationQueryContext::new(data.subject_id).with_time_period(both_years());
    let optimiser = optimiser(20);

    assert!(!optimiser.is_cropping_required(&store, &query).await.expect("check"));
    let cropped = optimiser.crop(&store, &query).await.expect("crop");

    assert!(!cropped.is_cropped());
    assert_eq!(cropped.query, query);
    assert_eq!(cropped.estimate, 20);
    assert_eq!(cropped.original_estimate, 20);
}

#[tokio::test]
async fn test_crop_limits_time_periods_first() {
    // Arrange
    let data = test_data();
    let store = data.memory_store();
    let query = ObservationQueryContext::new(data.subject_id).with_time_period(both_years());
    let optimiser = QueryCostOptimiser::new(&QueryConfig {
        max_table_cells: 10,
        max_time_periods: 1,
        ..QueryConfig::default()
    });

    // Act
    let cropped = optimiser.crop(&store, &query).await.expect("crop");

    // Assert
    assert!(cropped.time_periods_cropped);
    assert!(!cropped.locations_cropped);
    assert_eq!(cropped.query.time_period.as_ref().and_then(|t| t.limit), Some(1));
    assert!(cropped.query.location_ids.is_empty());
    assert_eq!(cropped.original_estimate, 20);
    assert_eq!(cropped.estimate, 10);
}

#[tokio::test]
async fn test_crop_caps_locations_when_time_is_not_enough() {
    let data = test_data();
    let store = data.memory_store();
    let query = ObservationQueryContext::new(data.subject_id).with_time_period(both_years());
    let optimiser = QueryCostOptimiser::new(&QueryConfig {
        max_table_cells: 4,
        max_time_periods: 1,
        max_locations: 3,
        ..QueryConfig::default()
    });

    let cropped = optimiser.crop(&store, &query).await.expect("crop");

    assert!(cropped.time_periods_cropped);
    assert!(cropped.locations_cropped);
    // Country first, then local authorities, regions dropped by the overall cap.
    assert_eq!(
        cropped.query.location_ids,
        vec![data.england, data.city_of_london, data.barking]
    );
    assert_eq!(cropped.estimate, 6);
    assert!(cropped.estimate > optimiser.max_table_cells(), "cropping is best effort");
}

#[tokio::test]
async fn test_crop_replaces_code_selection_with_ids() {
    let data = test_data();
    let store = data.memory_store();
    let query = ObservationQueryContext::new(data.subject_id).with_locations(
        LocationQuery::default()
            .with_codes(GeographicLevel::Country, ["E92000001"])
            .with_codes(GeographicLevel::LocalAuthority, ["201", "E09000002"]),
    );

    let cropped = optimiser(4).crop(&store, &query).await.expect("crop");

    assert!(!cropped.time_periods_cropped, "no range to limit");
    assert!(!cropped.locations_cropped, "selection already within caps");
    assert!(cropped.query.locations.is_none());
    assert_eq!(
        cropped.query.location_ids,
        vec![data.england, data.city_of_london, data.barking]
    );
    assert_eq!(cropped.estimate, 12);
}

#[tokio::test]
async fn test_crop_is_idempotent() {
    let data = test_data();
    let store = data.memory_store();
    let query = ObservationQueryContext::new(data.subject_id).with_time_period(both_years());
    let optimiser = QueryCostOptimiser::new(&QueryConfig {
        max_table_cells: 4,
        max_time_periods: 1,
        max_locations: 3,
        ..QueryConfig::default()
    });

    let once = optimiser.crop(&store, &query).await.expect("first crop");
    let twice = optimiser.crop(&store, &once.query).await.expect("second crop");

    assert_eq!(twice.query, once.query);
    assert_eq!(twice.estimate, once.estimate);
    assert!(!twice.is_cropped());
}

#[test]
fn test_cap_locations_per_level_and_overall() {
    let data = test_data();
    let optimiser = optimiser(1);
    let all: Vec<Location> = data
        .all_locations()
        .into_iter()
        .rev()
        .map(|id| location(&data, id))
        .collect();

    let capped = optimiser.cap_locations(&all);

    assert_eq!(
        capped,
        vec![data.england, data.city_of_london, data.barking, data.north_east, data.north_west]
    );
}

#[test]
fn test_cap_locations_respects_country_cap() {
    let optimiser = optimiser(1);
    let countries: Vec<Location> = (1..=3u128)
        .map(|n| {
            Location::new(
                uuid::Uuid::from_u128(n),
                GeographicLevel::Country,
                format!("C{n}"),
                format!("Country {n}"),
            )
        })
        .collect();

    assert_eq!(optimiser.cap_locations(&countries), vec![uuid::Uuid::from_u128(1)]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_cap_never_exceeds_limits(levels in proptest::collection::vec(0usize..4, 0..40)) {
        let pool = [
            GeographicLevel::Country,
            GeographicLevel::Region,
            GeographicLevel::LocalAuthority,
            GeographicLevel::Ward,
        ];
        let locations: Vec<Location> = levels
            .iter()
            .enumerate()
            .map(|(n, level)| {
                Location::new(
                    uuid::Uuid::from_u128(n as u128 + 1),
                    pool[*level],
                    format!("X{n}"),
                    format!("Location {n}"),
                )
            })
            .collect();
        let optimiser = optimiser(1);

        let capped = optimiser.cap_locations(&locations);

        prop_assert!(capped.len() <= QueryConfig::default().max_locations);
        let countries = capped
            .iter()
            .filter(|id| locations.iter().any(|l| l.id == **id && l.geographic_level == GeographicLevel::Country))
            .count();
        prop_assert!(countries <= 1);
        let recapped: Vec<Location> = locations
            .iter()
            .filter(|l| capped.contains(&l.id))
            .cloned()
            .collect();
        let mut again = optimiser.cap_locations(&recapped);
        let mut first = capped.clone();
        again.sort_unstable();
        first.sort_unstable();
        prop_assert_eq!(again, first);
    }
}
