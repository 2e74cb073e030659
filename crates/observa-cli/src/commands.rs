//! Subcommand implementations.

use anyhow::Context;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use observa_core::model::Indicator;
use observa_core::store::SubjectRepository;
use observa_core::{
    CostReport, Fixture, MatchingPlan, ObservaConfig, ObservationQueryContext,
    ObservationQueryEngine, QueryResult, SqliteObservationStore,
};

/// Counts reported by `import`.
#[derive(Debug, Clone, Copy)]
pub struct ImportSummary {
    pub subjects: usize,
    pub locations: usize,
    pub observations: usize,
    pub total_observations: u64,
}

/// A query result with the indicator metadata needed to label it.
pub struct QueryOutcome {
    pub result: QueryResult,
    pub indicators: Vec<Indicator>,
}

fn open_store(config: &ObservaConfig) -> anyhow::Result<SqliteObservationStore> {
    SqliteObservationStore::open_with_config(&config.storage).with_context(|| {
        format!("Failed to open database '{}'", config.storage.database_path)
    })
}

fn engine(config: &ObservaConfig) -> anyhow::Result<ObservationQueryEngine<SqliteObservationStore>> {
    Ok(ObservationQueryEngine::new(open_store(config)?, config)?)
}

fn read_query(path: &Path) -> anyhow::Result<ObservationQueryContext> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read query file {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Invalid query context in {}", path.display()))
}

/// Creates the database and its schema.
pub fn init(config: &ObservaConfig) -> anyhow::Result<()> {
    open_store(config)?;
    Ok(())
}

/// Loads a JSON fixture.
pub async fn import(config: &ObservaConfig, path: &Path) -> anyhow::Result<ImportSummary> {
    let fixture = Fixture::from_path(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    let store = open_store(config)?;
    store.load_fixture(&fixture).await?;
    tracing::info!(path = %path.display(), "Fixture imported");
    Ok(ImportSummary {
        subjects: fixture.subjects.len(),
        locations: fixture.locations.len(),
        observations: fixture.observations.len(),
        total_observations: store.observation_count().await?,
    })
}

/// Estimates a query against the configured budget.
pub async fn estimate(config: &ObservaConfig, path: &Path) -> anyhow::Result<CostReport> {
    let query = read_query(path)?;
    Ok(engine(config)?.estimate(&query).await?)
}

/// Builds the matching plan of a query after cropping.
pub async fn plan(config: &ObservaConfig, path: &Path) -> anyhow::Result<MatchingPlan> {
    let query = read_query(path)?;
    Ok(engine(config)?.plan(&query).await?)
}

/// Runs a query.
pub async fn query(
    config: &ObservaConfig,
    path: &Path,
    cancel: &CancellationToken,
) -> anyhow::Result<QueryOutcome> {
    let query = read_query(path)?;
    let engine = engine(config)?;
    let result = engine.query(&query, cancel).await?;
    let mut indicators = engine.store().indicators(query.subject_id).await?;
    if !result.query.indicator_ids.is_empty() {
        indicators.retain(|indicator| result.query.indicator_ids.contains(&indicator.id));
    }
    Ok(QueryOutcome { result, indicators })
}
