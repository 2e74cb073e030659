//! Tests for the query engine facade.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::config::FetchConfig;
use crate::matching::Polarity;
use crate::model::TimeIdentifier;
use crate::query::TimePeriodQuery;
use crate::store::{MemoryObservationStore, SqliteObservationStore};
use crate::test_support::test_data;

fn config_with(query: QueryConfig) -> ObservaConfig {
    ObservaConfig {
        query,
        ..ObservaConfig::default()
    }
}

fn tight_config(reject_oversized_queries: bool) -> ObservaConfig {
    config_with(QueryConfig {
        max_table_cells: 4,
        max_time_periods: 1,
        max_locations: 3,
        reject_oversized_queries,
        ..QueryConfig::default()
    })
}

fn both_years() -> TimePeriodQuery {
    TimePeriodQuery::new(2018, TimeIdentifier::CalendarYear, 2019, TimeIdentifier::CalendarYear)
}

fn engine(store: MemoryObservationStore) -> ObservationQueryEngine<MemoryObservationStore> {
    engine_with(store, &ObservaConfig::default())
}

fn engine_with(
    store: MemoryObservationStore,
    config: &ObservaConfig,
) -> ObservationQueryEngine<MemoryObservationStore> {
    ObservationQueryEngine::new(store, config).expect("engine")
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = ObservaConfig {
        fetch: FetchConfig { batch_size: 0 },
        ..ObservaConfig::default()
    };

    let result =
        ObservationQueryEngine::<MemoryObservationStore>::new(MemoryObservationStore::new(), &config);

    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_unknown_subject() {
    let data = test_data();
    let engine = engine(data.memory_store());
    let query = ObservationQueryContext::new(uuid::Uuid::nil());

    let err = engine.query(&query, &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, Error::SubjectNotFound(id) if id.is_nil()));
    assert!(matches!(engine.estimate(&query).await, Err(Error::SubjectNotFound(_))));
}

#[tokio::test]
async fn test_malformed_range_is_rejected_before_storage_work() {
    let data = test_data();
    let engine = engine(data.memory_store());
    let query = ObservationQueryContext::new(data.subject_id).with_time_period(TimePeriodQuery::new(
        2019,
        TimeIdentifier::CalendarYear,
        2018,
        TimeIdentifier::CalendarYear,
    ));

    let err = engine.query(&query, &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, Error::InvalidTimePeriodRange(_)));
}

#[tokio::test]
async fn test_unconstrained_query_returns_every_row() {
    // Arrange
    let data = test_data();
    let engine = engine(data.memory_store());
    let query = ObservationQueryContext::new(data.subject_id);

    // Act
    let result = engine.query(&query, &CancellationToken::new()).await.expect("query");

    // Assert
    assert_eq!(result.observations.len(), 60);
    assert!(!result.cropped);
    assert_eq!(result.estimate, 20);
    assert_eq!(result.query, query);
    assert_eq!(result.matching_set.matched_count(), 60);
    assert!(result.timings.total >= result.timings.matching);
}

#[tokio::test]
async fn test_faceted_query_returns_the_conjunction() {
    let data = test_data();
    let engine = engine(data.memory_store());
    let query = ObservationQueryContext::new(data.subject_id)
        .with_location_ids([data.barking, data.north_east])
        .with_time_period(TimePeriodQuery::new(
            2019,
            TimeIdentifier::CalendarYear,
            2019,
            TimeIdentifier::CalendarYear,
        ))
        .with_filter_items([data.secondary, data.female])
        .with_indicators([data.enrolments]);

    let result = engine.query(&query, &CancellationToken::new()).await.expect("query");

    let expected = data.expected_ids(|o| {
        [data.barking, data.north_east].contains(&o.location_id)
            && o.year == 2019
            && o.filter_item_ids.contains(&data.secondary)
            && o.filter_item_ids.contains(&data.female)
    });
    let ids: Vec<_> = result.observations.iter().map(|row| row.id).collect();
    assert_eq!(ids, expected);
    assert_eq!(ids.len(), 2);
    assert!(result
        .observations
        .iter()
        .all(|row| row.measures.keys().eq([&data.enrolments])));
}

#[tokio::test]
async fn test_zero_matches_is_success() {
    let data = test_data();
    let engine = engine(data.memory_store());
    let query = ObservationQueryContext::new(data.subject_id).with_time_period(TimePeriodQuery::new(
        2030,
        TimeIdentifier::CalendarYear,
        2031,
        TimeIdentifier::CalendarYear,
    ));

    let result = engine.query(&query, &CancellationToken::new()).await.expect("query");

    assert!(result.observations.is_empty());
    assert!(result.matching_set.is_empty());
}

#[tokio::test]
async fn test_estimate_reports_budget() {
    let data = test_data();
    let engine = engine_with(data.memory_store(), &tight_config(true));

    let report = engine
        .estimate(&ObservationQueryContext::new(data.subject_id))
        .await
        .expect("estimate");

    assert_eq!(
        report,
        CostReport {
            estimate: 20,
            max_allowed: 4,
            cropping_required: true,
        }
    );
}

#[tokio::test]
async fn test_oversized_query_is_rejected_after_cropping() {
    let data = test_data();
    let engine = engine_with(data.memory_store(), &tight_config(true));
    let query = ObservationQueryContext::new(data.subject_id).with_time_period(both_years());

    let err = engine.query(&query, &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, Error::QueryTooLarge { estimate: 6, max: 4 }));
}

#[tokio::test]
async fn test_oversized_query_runs_cropped_when_allowed() {
    // Arrange
    let data = test_data();
    let engine = engine_with(data.memory_store(), &tight_config(false));
    let query = ObservationQueryContext::new(data.subject_id).with_time_period(both_years());

    // Act
    let result = engine.query(&query, &CancellationToken::new()).await.expect("query");

    // Assert
    assert!(result.cropped);
    assert_eq!(result.estimate, 6);
    assert_eq!(result.query.time_period.as_ref().and_then(|t| t.limit), Some(1));
    let kept = [data.england, data.city_of_london, data.barking];
    let expected = data.expected_ids(|o| kept.contains(&o.location_id) && o.year == 2018);
    let ids: Vec<_> = result.observations.iter().map(|row| row.id).collect();
    assert_eq!(ids, expected);
    assert_eq!(ids.len(), 18);
}

#[tokio::test]
async fn test_crop_and_plan_preview() {
    let data = test_data();
    let engine = engine_with(data.memory_store(), &tight_config(false));
    let query = ObservationQueryContext::new(data.subject_id)
        .with_time_period(both_years())
        .with_filter_items([data.female]);

    let cropped = engine.crop(&query).await.expect("crop");
    let plan = engine.plan(&query).await.expect("plan");

    assert!(cropped.time_periods_cropped);
    assert_eq!(
        plan.candidates.time_periods,
        Some(vec![crate::model::TimePeriod::new(2018, TimeIdentifier::CalendarYear)])
    );
    assert_eq!(plan.candidates.location_ids, Some(cropped.query.location_ids.clone()));
    assert_eq!(plan.eliminations.len(), 1);
    assert_eq!(plan.eliminations[0].filter_id, data.gender);
    assert_eq!(plan.eliminations[0].polarity, Polarity::Exists);
}

#[tokio::test]
async fn test_cancelled_query_fails() {
    let data = test_data();
    let engine = engine(data.memory_store());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .query(&ObservationQueryContext::new(data.subject_id), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_engine_over_shared_sqlite_store() {
    let data = test_data();
    let store = Arc::new(SqliteObservationStore::open_in_memory().expect("open"));
    store.load_fixture(&data.fixture).await.expect("load");
    let engine: ObservationQueryEngine<SqliteObservationStore> =
        ObservationQueryEngine::new(Arc::clone(&store), &ObservaConfig::default())
            .expect("engine");
    let query = ObservationQueryContext::new(data.subject_id)
        .with_filter_items([data.total])
        .with_location_ids([data.city_of_london]);

    let result = engine.query(&query, &CancellationToken::new()).await.expect("query");

    assert_eq!(result.observations.len(), 4);
    assert!(result
        .observations
        .iter()
        .all(|row| row.location.old_code.as_deref() == Some("201")));
    assert!(Arc::ptr_eq(engine.store(), &store));
}
