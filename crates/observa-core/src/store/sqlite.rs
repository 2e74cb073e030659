//! SQLite-backed store.
//!
//! Metadata lookups and fixture loading share one connection. Every
//! session opens its own connection, so TEMP working tables are private to
//! the session and vanish with it. All statements run on the blocking
//! thread pool.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::fixture::{validate_observation, Fixture};
use super::{
    FilterRepository, LocationRepository, ObservationStore, StoreSession, SubjectRepository,
    WorkingTable,
};
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::matching::{CandidateCriteria, ExecutionHints, FilterElimination, Polarity};
use crate::model::{
    Filter, FilterGroup, FilterId, FilterItem, FilterItemId, GeographicLevel, HydratedFilterItem,
    Indicator, IndicatorId, Location, LocationId, ObservationId, ObservationRow, Subject,
    SubjectId, TimeIdentifier, TimePeriod,
};
use crate::predicate::Predicate;

const SCHEMA_V1: &str = include_str!("../../migrations/001_initial_schema.sql");
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Ids bound per `IN (...)` list.
const MAX_BOUND_IDS: usize = 500;

const LOCATION_COLUMNS: &str = "l.id, l.geographic_level, l.code, l.name, l.old_code";

/// Where session connections are opened.
#[derive(Debug, Clone)]
pub(super) enum Target {
    File(PathBuf),
    SharedMemory(String),
}

impl Target {
    pub(super) fn open(&self, busy_timeout: Duration) -> Result<Connection> {
        let conn = match self {
            Self::File(path) => Connection::open(path)?,
            Self::SharedMemory(uri) => Connection::open(uri)?,
        };
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }
}

/// SQLite [`ObservationStore`] and repositories.
#[derive(Debug, Clone)]
pub struct SqliteObservationStore {
    pub(super) target: Target,
    pub(super) busy_timeout: Duration,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteObservationStore {
    /// Opens (and if needed creates) a database file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_target(Target::File(path.as_ref().to_path_buf()), DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens the database described by `config`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or the schema cannot be created.
    pub fn open_with_config(config: &StorageConfig) -> Result<Self> {
        let path = PathBuf::from(&config.database_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_target(
            Target::File(path),
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    /// Opens a private shared-cache in-memory database.
    ///
    /// The database lives as long as the store.
    ///
    /// # Errors
    ///
    /// Fails if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let uri = format!(
            "file:observa_{}?mode=memory&cache=shared",
            Uuid::new_v4().simple()
        );
        Self::with_target(Target::SharedMemory(uri), DEFAULT_BUSY_TIMEOUT)
    }

    fn with_target(target: Target, busy_timeout: Duration) -> Result<Self> {
        let conn = target.open(busy_timeout)?;
        conn.execute_batch(SCHEMA_V1)?;
        tracing::debug!(database = ?target, "Opened SQLite store");
        Ok(Self {
            target,
            busy_timeout,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Loads every table of `fixture` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] if the fixture is inconsistent with
    /// itself or the stored data. Nothing is written in that case.
    pub async fn load_fixture(&self, fixture: &Fixture) -> Result<()> {
        let fixture = fixture.clone();
        run_blocking(&self.conn, move |conn| {
            let tx = conn.transaction()?;
            insert_fixture(&tx, &fixture).map_err(constraint_as_invalid_data)?;
            tx.commit()?;
            tracing::debug!(
                subjects = fixture.subjects.len(),
                locations = fixture.locations.len(),
                observations = fixture.observations.len(),
                "Loaded fixture into SQLite store"
            );
            Ok(())
        })
        .await
    }

    /// Returns the number of stored observations.
    ///
    /// # Errors
    ///
    /// Fails on a storage error.
    pub async fn observation_count(&self) -> Result<u64> {
        run_blocking(&self.conn, |conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM observation", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

async fn run_blocking<T, F>(conn: &Arc<Mutex<Connection>>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.lock();
        f(&mut guard)
    })
    .await
    .map_err(|e| Error::Internal(format!("blocking SQLite task failed: {e}")))?
}

fn constraint_as_invalid_data(err: Error) -> Error {
    match err {
        Error::Storage(message) if message.contains("constraint failed") => {
            Error::InvalidData(message)
        }
        other => other,
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn parse_id(text: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(text)?)
}

fn parse_level(text: &str) -> Result<GeographicLevel> {
    text.parse()
        .map_err(|e| Error::Storage(format!("corrupt location row: {e}")))
}

fn parse_time_identifier(text: &str) -> Result<TimeIdentifier> {
    text.parse()
        .map_err(|e| Error::Storage(format!("corrupt observation row: {e}")))
}

fn id_values(ids: &[Uuid]) -> Vec<Value> {
    ids.iter().map(|id| Value::Text(id.to_string())).collect()
}

/// Location columns as stored.
struct LocationRecord {
    id: String,
    level: String,
    code: String,
    name: String,
    old_code: Option<String>,
}

impl LocationRecord {
    fn read(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            level: row.get(offset + 1)?,
            code: row.get(offset + 2)?,
            name: row.get(offset + 3)?,
            old_code: row.get(offset + 4)?,
        })
    }

    fn into_location(self) -> Result<Location> {
        Ok(Location {
            id: parse_id(&self.id)?,
            geographic_level: parse_level(&self.level)?,
            code: self.code,
            name: self.name,
            old_code: self.old_code,
        })
    }
}

fn query_locations(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<Location>> {
    let mut stmt = conn.prepare(sql)?;
    let records = stmt
        .query_map(params_from_iter(values), |row| LocationRecord::read(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    records.into_iter().map(LocationRecord::into_location).collect()
}

fn read_filters(conn: &Connection, subject_id: SubjectId) -> Result<Vec<Filter>> {
    let mut filters_stmt = conn.prepare(
        "SELECT id, label, name, hint FROM filter WHERE subject_id = ? ORDER BY position",
    )?;
    let filter_rows = filters_stmt
        .query_map(params![subject_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut groups_stmt =
        conn.prepare("SELECT id, label FROM filter_group WHERE filter_id = ? ORDER BY position")?;
    let mut items_stmt = conn
        .prepare("SELECT id, label FROM filter_item WHERE filter_group_id = ? ORDER BY position")?;

    let mut filters = Vec::with_capacity(filter_rows.len());
    for (id, label, name, hint) in filter_rows {
        let group_rows = groups_stmt
            .query_map(params![id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut groups = Vec::with_capacity(group_rows.len());
        for (group_id, group_label) in group_rows {
            let items = items_stmt
                .query_map(params![group_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .map(|(item_id, item_label)| {
                    Ok(FilterItem {
                        id: parse_id(&item_id)?,
                        label: item_label,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            groups.push(FilterGroup {
                id: parse_id(&group_id)?,
                label: group_label,
                items,
            });
        }

        filters.push(Filter {
            id: parse_id(&id)?,
            label,
            name,
            hint,
            groups,
        });
    }
    Ok(filters)
}

fn subject_exists(conn: &Connection, subject_id: SubjectId) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM subject WHERE id = ?",
            params![subject_id.to_string()],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn insert_subject(tx: &Transaction<'_>, subject: &Subject) -> Result<()> {
    tx.execute(
        "INSERT INTO subject (id, name) VALUES (?, ?)",
        params![subject.id.to_string(), subject.name],
    )?;
    for (filter_pos, filter) in subject.filters.iter().enumerate() {
        tx.execute(
            "INSERT INTO filter (id, subject_id, label, name, hint, position) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                filter.id.to_string(),
                subject.id.to_string(),
                filter.label,
                filter.name,
                filter.hint,
                filter_pos as i64
            ],
        )?;
        for (group_pos, group) in filter.groups.iter().enumerate() {
            tx.execute(
                "INSERT INTO filter_group (id, filter_id, label, position) VALUES (?, ?, ?, ?)",
                params![group.id.to_string(), filter.id.to_string(), group.label, group_pos as i64],
            )?;
            for (item_pos, item) in group.items.iter().enumerate() {
                tx.execute(
                    "INSERT INTO filter_item (id, filter_group_id, label, position) VALUES (?, ?, ?, ?)",
                    params![item.id.to_string(), group.id.to_string(), item.label, item_pos as i64],
                )?;
            }
        }
    }
    for (group_pos, group) in subject.indicator_groups.iter().enumerate() {
        tx.execute(
            "INSERT INTO indicator_group (id, subject_id, label, position) VALUES (?, ?, ?, ?)",
            params![group.id.to_string(), subject.id.to_string(), group.label, group_pos as i64],
        )?;
        for (indicator_pos, indicator) in group.indicators.iter().enumerate() {
            tx.execute(
                "INSERT INTO indicator (id, indicator_group_id, label, name, unit, decimal_places, position) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    indicator.id.to_string(),
                    group.id.to_string(),
                    indicator.label,
                    indicator.name,
                    indicator.unit,
                    indicator.decimal_places,
                    indicator_pos as i64
                ],
            )?;
        }
    }
    Ok(())
}

fn insert_fixture(tx: &Transaction<'_>, fixture: &Fixture) -> Result<()> {
    for subject in &fixture.subjects {
        insert_subject(tx, subject)?;
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO location (id, geographic_level, code, name, old_code) VALUES (?, ?, ?, ?, ?)",
        )?;
        for location in &fixture.locations {
            stmt.execute(params![
                location.id.to_string(),
                location.geographic_level.as_str(),
                location.code,
                location.name,
                location.old_code
            ])?;
        }
    }

    let mut subjects: HashMap<SubjectId, Subject> = fixture
        .subjects
        .iter()
        .map(|subject| (subject.id, subject.clone()))
        .collect();

    let mut observation_stmt = tx.prepare(
        "INSERT INTO observation (id, subject_id, location_id, year, time_identifier, measures, natural_key) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )?;
    let mut item_stmt = tx.prepare(
        "INSERT INTO observation_filter_item (observation_id, filter_item_id) VALUES (?, ?)",
    )?;

    for observation in &fixture.observations {
        if !subjects.contains_key(&observation.subject_id) {
            if !subject_exists(tx, observation.subject_id)? {
                return Err(Error::InvalidData(format!(
                    "observation {} references unknown subject {}",
                    observation.id, observation.subject_id
                )));
            }
            let stored = Subject {
                id: observation.subject_id,
                name: String::new(),
                filters: read_filters(tx, observation.subject_id)?,
                indicator_groups: Vec::new(),
            };
            subjects.insert(stored.id, stored);
        }
        if let Some(subject) = subjects.get(&observation.subject_id) {
            validate_observation(subject, observation)?;
        }

        observation_stmt.execute(params![
            observation.id.to_string(),
            observation.subject_id.to_string(),
            observation.location_id.to_string(),
            observation.year,
            observation.time_identifier.code(),
            serde_json::to_string(&observation.measures)?,
            observation.natural_key()
        ])?;
        for item_id in &observation.filter_item_ids {
            item_stmt.execute(params![observation.id.to_string(), item_id.to_string()])?;
        }
    }
    Ok(())
}

#[async_trait]
impl ObservationStore for SqliteObservationStore {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>> {
        let target = self.target.clone();
        let busy_timeout = self.busy_timeout;
        let conn = tokio::task::spawn_blocking(move || target.open(busy_timeout))
            .await
            .map_err(|e| Error::Internal(format!("blocking SQLite task failed: {e}")))??;
        Ok(Box::new(SqliteSession::new(conn)))
    }
}

#[async_trait]
impl SubjectRepository for SqliteObservationStore {
    async fn subject_exists(&self, subject_id: SubjectId) -> Result<bool> {
        run_blocking(&self.conn, move |conn| subject_exists(conn, subject_id)).await
    }

    async fn indicators(&self, subject_id: SubjectId) -> Result<Vec<Indicator>> {
        run_blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT i.id, i.label, i.name, i.unit, i.decimal_places \
                 FROM indicator i JOIN indicator_group g ON g.id = i.indicator_group_id \
                 WHERE g.subject_id = ? ORDER BY g.position, i.position",
            )?;
            let rows = stmt
                .query_map(params![subject_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<u8>>(4)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|(id, label, name, unit, decimal_places)| {
                    Ok(Indicator {
                        id: parse_id(&id)?,
                        label,
                        name,
                        unit,
                        decimal_places,
                    })
                })
                .collect()
        })
        .await
    }

    async fn time_periods(&self, subject_id: SubjectId) -> Result<Vec<TimePeriod>> {
        run_blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT year, time_identifier FROM observation WHERE subject_id = ?",
            )?;
            let rows = stmt
                .query_map(params![subject_id.to_string()], |row| {
                    Ok((row.get::<_, i32>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let periods = rows
                .into_iter()
                .map(|(year, code)| Ok(TimePeriod::new(year, parse_time_identifier(&code)?)))
                .collect::<Result<BTreeSet<_>>>()?;
            Ok(periods.into_iter().collect())
        })
        .await
    }
}

#[async_trait]
impl FilterRepository for SqliteObservationStore {
    async fn get_filters_and_items(&self, subject_id: SubjectId) -> Result<Vec<Filter>> {
        run_blocking(&self.conn, move |conn| read_filters(conn, subject_id)).await
    }

    async fn count_items_by_filter(
        &self,
        item_ids: &[FilterItemId],
    ) -> Result<BTreeMap<FilterId, usize>> {
        if item_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let ids: Vec<FilterItemId> = item_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        run_blocking(&self.conn, move |conn| {
            let mut counts = BTreeMap::new();
            for chunk in ids.chunks(MAX_BOUND_IDS) {
                let sql = format!(
                    "SELECT g.filter_id, COUNT(DISTINCT i.id) FROM filter_item i \
                     JOIN filter_group g ON g.id = i.filter_group_id \
                     WHERE i.id IN ({}) GROUP BY g.filter_id",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(id_values(chunk)), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                for (filter_id, count) in rows {
                    *counts.entry(parse_id(&filter_id)?).or_insert(0) += count as usize;
                }
            }
            Ok(counts)
        })
        .await
    }
}

#[async_trait]
impl LocationRepository for SqliteObservationStore {
    async fn get_locations(&self, ids: &[LocationId]) -> Result<Vec<Location>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        run_blocking(&self.conn, move |conn| {
            let mut locations = Vec::with_capacity(ids.len());
            for chunk in ids.chunks(MAX_BOUND_IDS) {
                let sql = format!(
                    "SELECT {LOCATION_COLUMNS} FROM location l WHERE l.id IN ({})",
                    placeholders(chunk.len())
                );
                locations.extend(query_locations(conn, &sql, id_values(chunk))?);
            }
            locations.sort_by_key(|location| location.id);
            locations.dedup_by_key(|location| location.id);
            Ok(locations)
        })
        .await
    }

    async fn locations_by_level(&self, level: GeographicLevel) -> Result<Vec<Location>> {
        self.find_locations(&Predicate::level_eq(level)).await
    }

    async fn find_locations(&self, predicate: &Predicate) -> Result<Vec<Location>> {
        let fragment = predicate.to_sql("l");
        run_blocking(&self.conn, move |conn| {
            let sql = format!(
                "SELECT {LOCATION_COLUMNS} FROM location l WHERE {} ORDER BY l.id",
                fragment.sql
            );
            let values = fragment.params.into_iter().map(Value::Text).collect();
            query_locations(conn, &sql, values)
        })
        .await
    }

    async fn locations_for_subject(&self, subject_id: SubjectId) -> Result<Vec<Location>> {
        run_blocking(&self.conn, move |conn| {
            let sql = format!(
                "SELECT {LOCATION_COLUMNS} FROM location l WHERE l.id IN \
                 (SELECT DISTINCT location_id FROM observation WHERE subject_id = ?) \
                 ORDER BY l.geographic_level, l.id"
            );
            query_locations(conn, &sql, vec![Value::Text(subject_id.to_string())])
        })
        .await
    }
}

/// One private connection with its TEMP working tables.
pub(super) struct SqliteSession {
    pub(super) conn: Arc<Mutex<Connection>>,
    pending_releases: Vec<tokio::task::JoinHandle<()>>,
}

impl SqliteSession {
    pub(super) fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            pending_releases: Vec::new(),
        }
    }

    /// Runs `f` on the session connection after any offloaded release.
    async fn run<T, F>(&mut self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        for release in self.pending_releases.drain(..) {
            if let Err(e) = release.await {
                tracing::warn!(error = %e, "Working table release task failed");
            }
        }
        run_blocking(&self.conn, f).await
    }
}

/// Copies the accepted facets into TEMP tables and loads the candidates.
///
/// Period and location lists of any length stay clear of SQLite's
/// expression depth and bound parameter limits.
fn insert_candidates(conn: &mut Connection, table: &WorkingTable, criteria: &CandidateCriteria) -> Result<u64> {
    let name = quote(table.name());
    let periods = quote(&format!("{}_period", table.name()));
    let locations = quote(&format!("{}_location", table.name()));

    let tx = conn.transaction()?;
    let mut sql =
        format!("INSERT INTO temp.{name} (id) SELECT o.id FROM observation o WHERE o.subject_id = ?");
    let mut scratch = Vec::new();

    if let Some(accepted) = &criteria.time_periods {
        tx.execute_batch(&format!(
            "CREATE TEMP TABLE {periods} (year INTEGER NOT NULL, code TEXT NOT NULL, PRIMARY KEY (year, code));"
        ))?;
        {
            let mut stmt =
                tx.prepare(&format!("INSERT OR IGNORE INTO temp.{periods} (year, code) VALUES (?, ?)"))?;
            for period in accepted {
                stmt.execute(params![period.year, period.identifier.code()])?;
            }
        }
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM temp.{periods} p \
             WHERE p.year = o.year AND p.code = o.time_identifier)"
        ));
        scratch.push(periods);
    }

    if let Some(accepted) = &criteria.location_ids {
        tx.execute_batch(&format!("CREATE TEMP TABLE {locations} (id TEXT PRIMARY KEY);"))?;
        {
            let mut stmt = tx.prepare(&format!("INSERT OR IGNORE INTO temp.{locations} (id) VALUES (?)"))?;
            for id in accepted {
                stmt.execute(params![id.to_string()])?;
            }
        }
        sql.push_str(&format!(" AND o.location_id IN (SELECT id FROM temp.{locations})"));
        scratch.push(locations);
    }

    let loaded = tx.execute(&sql, params![criteria.subject_id.to_string()])?;
    for scratch_table in scratch {
        tx.execute_batch(&format!("DROP TABLE temp.{scratch_table};"))?;
    }
    tx.commit()?;
    Ok(loaded as u64)
}

#[async_trait]
impl StoreSession for SqliteSession {
    async fn create_working_table(&mut self, table: &WorkingTable) -> Result<()> {
        let name = quote(table.name());
        self.run(move |conn| {
            conn.execute_batch(&format!("CREATE TEMP TABLE {name} (id TEXT NOT NULL);"))?;
            Ok(())
        })
        .await
    }

    async fn load_candidates(
        &mut self,
        table: &WorkingTable,
        criteria: &CandidateCriteria,
        hints: &ExecutionHints,
    ) -> Result<u64> {
        tracing::trace!(table = table.name(), %hints, "Hints are advisory on SQLite");
        let table = table.clone();
        let criteria = criteria.clone();
        self.run(move |conn| insert_candidates(conn, &table, &criteria)).await
    }

    async fn index_working_table(&mut self, table: &WorkingTable) -> Result<()> {
        let name = quote(table.name());
        let index = quote(&format!("{}_id", table.name()));
        self.run(move |conn| {
            conn.execute_batch(&format!("CREATE UNIQUE INDEX temp.{index} ON {name} (id);"))?;
            Ok(())
        })
        .await
    }

    async fn eliminate(
        &mut self,
        table: &WorkingTable,
        elimination: &FilterElimination,
        hints: &ExecutionHints,
    ) -> Result<u64> {
        tracing::trace!(table = table.name(), %hints, "Hints are advisory on SQLite");
        let name = quote(table.name());
        let scratch = quote(&table.filter_table_name());
        // Rows are deleted when they fail the required association.
        let delete_when = match elimination.polarity {
            Polarity::Exists => "NOT EXISTS",
            Polarity::NotExists => "EXISTS",
        };
        let items = elimination.item_ids.iter().map(ToString::to_string).collect::<Vec<_>>();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(&format!("CREATE TEMP TABLE {scratch} (id TEXT PRIMARY KEY);"))?;
            {
                let mut stmt = tx.prepare(&format!("INSERT INTO temp.{scratch} (id) VALUES (?)"))?;
                for item in &items {
                    stmt.execute(params![item])?;
                }
            }
            let removed = tx.execute(
                &format!(
                    "DELETE FROM temp.{name} AS w WHERE {delete_when} (\
                     SELECT 1 FROM observation_filter_item ofi \
                     JOIN temp.{scratch} f ON f.id = ofi.filter_item_id \
                     WHERE ofi.observation_id = w.id)"
                ),
                [],
            )?;
            tx.execute_batch(&format!("DROP TABLE temp.{scratch};"))?;
            tx.commit()?;
            Ok(removed as u64)
        })
        .await
    }

    async fn refresh_statistics(&mut self, table: &WorkingTable) -> Result<()> {
        let name = quote(table.name());
        self.run(move |conn| {
            conn.execute_batch(&format!("ANALYZE temp.{name};"))?;
            Ok(())
        })
        .await
    }

    async fn count(&mut self, table: &WorkingTable) -> Result<u64> {
        let name = quote(table.name());
        self.run(move |conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM temp.{name}"), [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn matched_ids(&mut self, table: &WorkingTable) -> Result<Vec<ObservationId>> {
        let name = quote(table.name());
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT id FROM temp.{name}"))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let mut ids = rows
                .iter()
                .map(|id| parse_id(id))
                .collect::<Result<Vec<_>>>()?;
            ids.sort_unstable();
            Ok(ids)
        })
        .await
    }

    async fn fetch_observations(&mut self, ids: &[ObservationId]) -> Result<Vec<ObservationRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        self.run(move |conn| hydrate(conn, &ids)).await
    }

    fn release_working_table(&mut self, table: &WorkingTable) {
        let sql = format!(
            "DROP TABLE IF EXISTS temp.{}; DROP TABLE IF EXISTS temp.{};",
            quote(&table.filter_table_name()),
            quote(table.name())
        );
        let conn = Arc::clone(&self.conn);
        let name = table.name().to_string();
        let drop_tables = move || {
            if let Err(e) = conn.lock().execute_batch(&sql) {
                tracing::warn!(table = %name, error = %e, "Failed to release working table");
            }
        };
        // A cancelled statement may still hold the connection.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => self.pending_releases.push(handle.spawn_blocking(drop_tables)),
            Err(_) => drop_tables(),
        }
    }
}

fn hydrate(conn: &Connection, ids: &[ObservationId]) -> Result<Vec<ObservationRow>> {
    let marks = placeholders(ids.len());

    let mut stmt = conn.prepare(&format!(
        "SELECT o.id, o.subject_id, o.year, o.time_identifier, o.measures, {LOCATION_COLUMNS} \
         FROM observation o JOIN location l ON l.id = o.location_id WHERE o.id IN ({marks})"
    ))?;
    let records = stmt
        .query_map(params_from_iter(id_values(ids)), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                LocationRecord::read(row, 5)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut item_stmt = conn.prepare(&format!(
        "SELECT ofi.observation_id, i.id, g.filter_id, i.label FROM observation_filter_item ofi \
         JOIN filter_item i ON i.id = ofi.filter_item_id \
         JOIN filter_group g ON g.id = i.filter_group_id \
         WHERE ofi.observation_id IN ({marks})"
    ))?;
    let item_rows = item_stmt
        .query_map(params_from_iter(id_values(ids)), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut items: HashMap<ObservationId, Vec<HydratedFilterItem>> = HashMap::new();
    for (observation_id, item_id, filter_id, label) in item_rows {
        items
            .entry(parse_id(&observation_id)?)
            .or_default()
            .push(HydratedFilterItem {
                id: parse_id(&item_id)?,
                filter_id: parse_id(&filter_id)?,
                label,
            });
    }

    let mut rows: HashMap<ObservationId, ObservationRow> = HashMap::with_capacity(records.len());
    for (id, subject_id, year, code, measures, location) in records {
        let id = parse_id(&id)?;
        let measures: BTreeMap<IndicatorId, String> = serde_json::from_str(&measures)?;
        let mut filter_items = items.remove(&id).unwrap_or_default();
        filter_items.sort_by_key(|item| (item.filter_id, item.id));
        rows.insert(
            id,
            ObservationRow {
                id,
                subject_id: parse_id(&subject_id)?,
                location: location.into_location()?,
                year,
                time_identifier: parse_time_identifier(&code)?,
                filter_items,
                measures,
            },
        );
    }

    ids.iter()
        .map(|id| {
            rows.remove(id)
                .ok_or_else(|| Error::Storage(format!("observation {id} not found")))
        })
        .collect()
}
