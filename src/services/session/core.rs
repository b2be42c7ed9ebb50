//! The session: one live engine plus everything derived from it.
//!
//! A `Session` owns the engine, the schema catalog and both result caches.
//! It is driven by the worker one request at a time, so every operation
//! takes `&mut self` and nothing here is shared across threads.

use crate::config::SessionConfig;
use crate::errors::{Result, SessionError};
use crate::services::database::traits::{
    BoxedEngine, CatalogSnapshot, ResultSet, SchemaIntrospection, Value,
};
use crate::services::database::{EngineFactory, EngineSource};

use super::cache::{CacheKey, CacheStats, ResultCache};
use super::catalog::SchemaCatalog;
use super::demo::demo_script;
use super::export::{ExportSpec, to_csv};
use super::messages::PageRequest;
use super::mutation::MutationEngine;
use super::query_builder::{Filters, PageWindow, QueryBuilder, Sorters};
use super::statement::{
    StatementKind, classify_statement, is_read_only, is_volatile, normalize_collations,
    prepare_script,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Executing,
    Mutating,
    SchemaRefreshing,
    /// The last init/openFile failed; only another init/openFile recovers
    Error,
}

/// One page of a table plus the filtered row total.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePage {
    /// When `primary_key` is set, column 0 holds the row identity
    pub results: ResultSet,
    pub max_size: u64,
    pub primary_key: Option<String>,
}

/// What running a user script amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    /// A structural statement ran; the catalog was rebuilt
    SchemaChanged,
    /// The result sets of the last script that returned rows
    Rows(Vec<ResultSet>),
    /// Nothing returned rows; the current page read again
    Page(TablePage),
}

/// Result of running one script unit.
#[derive(Default)]
struct UnitOutcome {
    sets: Vec<ResultSet>,
    structural: bool,
    wrote: bool,
}

fn live(engine: &Option<BoxedEngine>) -> Result<&dyn SchemaIntrospection> {
    engine.as_deref().ok_or(SessionError::NotInitialized)
}

pub struct Session {
    config: SessionConfig,
    engine: Option<BoxedEngine>,
    catalog: SchemaCatalog,
    table_cache: ResultCache<ResultSet>,
    query_cache: ResultCache<Vec<ResultSet>>,
    state: SessionState,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let config = config.normalized();
        Self {
            table_cache: ResultCache::new(config.table_cache_capacity, config.table_cache_ttl()),
            query_cache: ResultCache::new(config.query_cache_capacity, config.query_cache_ttl()),
            catalog: SchemaCatalog::new(),
            engine: None,
            state: SessionState::Uninitialized,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn catalog(&self) -> &CatalogSnapshot {
        self.catalog.snapshot()
    }

    /// Number of catalog rebuilds so far.
    pub fn schema_generation(&self) -> u64 {
        self.catalog.generation()
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    pub fn table_cache_stats(&self) -> CacheStats {
        self.table_cache.stats()
    }

    pub fn query_cache_stats(&self) -> CacheStats {
        self.query_cache.stats()
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "Session state changed");
            self.state = next;
        }
    }

    /// Start over with a fresh in-memory database, seeded with the demo
    /// dataset unless the config turns that off.
    pub async fn init(&mut self) -> Result<&CatalogSnapshot> {
        self.set_state(SessionState::Initializing);

        let seeded = async {
            self.replace(EngineSource::Empty).await?;
            if self.config.load_demo_on_init {
                let script = demo_script()?;
                live(&self.engine)?.execute(&script).await?;
            }
            Ok::<_, SessionError>(())
        }
        .await;

        if let Err(e) = seeded {
            self.release().await;
            return Err(self.fail_initialization(e));
        }
        self.finish_initialization().await
    }

    /// Replace the database with the image in `bytes`.
    ///
    /// A database without tables or views is rejected with `EmptyDatabase`
    /// and the session is left without an engine.
    pub async fn open_file(&mut self, bytes: Vec<u8>) -> Result<&CatalogSnapshot> {
        self.set_state(SessionState::Initializing);
        tracing::info!(size = bytes.len(), "Opening database file");

        if let Err(e) = self.replace(EngineSource::Bytes(bytes)).await {
            return Err(self.fail_initialization(e));
        }

        self.finish_initialization().await?;

        if self.catalog.snapshot().is_empty() {
            tracing::warn!("Opened database has no tables or views");
            self.release().await;
            self.set_state(SessionState::Error);
            return Err(SessionError::EmptyDatabase);
        }
        Ok(self.catalog.snapshot())
    }

    async fn finish_initialization(&mut self) -> Result<&CatalogSnapshot> {
        let refreshed = match live(&self.engine) {
            Ok(engine) => self.catalog.refresh(engine).await.map(|_| ()),
            Err(e) => return Err(self.fail_initialization(e)),
        };
        if let Err(e) = refreshed {
            return Err(self.fail_initialization(SessionError::Engine(e)));
        }

        self.set_state(SessionState::Ready);
        Ok(self.catalog.snapshot())
    }

    fn fail_initialization(&mut self, error: SessionError) -> SessionError {
        let error = match error {
            SessionError::Initialization(_) => error,
            other => SessionError::Initialization(other.to_string()),
        };
        tracing::error!(error = %error, "Session initialization failed");
        self.set_state(SessionState::Error);
        error
    }

    /// Release the current engine, if any, then open a new one.
    async fn replace(&mut self, source: EngineSource) -> Result<()> {
        self.release().await;

        let engine = EngineFactory::open(source)
            .await
            .map_err(|e| SessionError::Initialization(format!("{:#}", e)))?;
        self.engine = Some(engine);
        Ok(())
    }

    /// Close the engine and drop everything derived from it.
    pub async fn release(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.close().await {
                tracing::warn!(error = %e, "Failed to close engine cleanly");
            }
            tracing::info!("Released engine");
        }
        self.table_cache.clear();
        self.query_cache.clear();
        self.catalog.reset();
    }

    /// Read one page of a table.
    ///
    /// Rows come from the page cache when possible. The total is always a
    /// fresh `COUNT(*)` under the same filters.
    pub async fn table_page(&mut self, request: &PageRequest) -> Result<TablePage> {
        let engine = live(&self.engine)?;

        let table = match request.current_table.as_deref() {
            Some(table) => table,
            None => self
                .catalog
                .first_table()
                .ok_or(SessionError::EmptyDatabase)?,
        };
        let descriptor = self
            .catalog
            .table(table)
            .ok_or_else(|| SessionError::UnknownTable(table.to_string()))?;

        let window = PageWindow::clamped(request.limit, request.offset, self.config.max_page_size);
        let built = QueryBuilder::build(&request.filters, &request.sorters);
        let key = CacheKey::page(table, window, &request.filters, &request.sorters);

        let results = match self.table_cache.get(&key) {
            Some(results) => {
                tracing::debug!(table, cache_key = %key, "Page served from cache");
                results
            }
            None => {
                let sql = QueryBuilder::select_page(
                    table,
                    descriptor.primary_key.as_deref(),
                    &built,
                    window,
                );
                let results = engine.query(&sql, &built.params).await?;
                self.table_cache.set(key, results.clone());
                results
            }
        };

        let count = engine
            .query(&QueryBuilder::count(table, &built), &built.params)
            .await?;
        let max_size = count
            .get(0, 0)
            .and_then(Value::as_i64)
            .map(|n| n.max(0) as u64)
            .unwrap_or_default();

        Ok(TablePage {
            results,
            max_size,
            primary_key: descriptor.primary_key.clone(),
        })
    }

    /// Run a user script.
    pub async fn exec(&mut self, script: &str, page: &PageRequest) -> Result<ExecOutcome> {
        self.exec_units(std::slice::from_ref(&script), page).await
    }

    /// Run several user scripts in order, as one request.
    pub async fn exec_batch(&mut self, queries: &[String], page: &PageRequest) -> Result<ExecOutcome> {
        let units: Vec<&str> = queries.iter().map(String::as_str).collect();
        self.exec_units(&units, page).await
    }

    async fn exec_units(&mut self, units: &[&str], page: &PageRequest) -> Result<ExecOutcome> {
        live(&self.engine)?;
        self.set_state(SessionState::Executing);

        let mut structural = false;
        let mut wrote = false;
        let mut last_rows: Option<Vec<ResultSet>> = None;

        for unit in units {
            let mut outcome = UnitOutcome::default();
            let ran = self.run_unit(unit, &mut outcome).await;
            structural |= outcome.structural;
            wrote |= outcome.wrote;

            if let Err(e) = ran {
                // Statements before the failing one have already run.
                if let Err(refresh) = self.settle_writes(structural, wrote).await {
                    tracing::warn!(error = %refresh, "Schema rebuild after failed script failed");
                }
                self.set_state(SessionState::Ready);
                return Err(SessionError::CustomQuery(format!("{:#}", e)));
            }

            if !outcome.sets.is_empty() {
                last_rows = Some(outcome.sets);
            }
        }

        if structural {
            self.set_state(SessionState::SchemaRefreshing);
        }
        let settled = self.settle_writes(structural, wrote).await;
        self.set_state(SessionState::Ready);
        settled.map_err(|e| SessionError::CustomQuery(format!("{:#}", e)))?;

        if structural {
            return Ok(ExecOutcome::SchemaChanged);
        }
        match last_rows {
            Some(sets) => Ok(ExecOutcome::Rows(sets)),
            None => Ok(ExecOutcome::Page(self.table_page(page).await?)),
        }
    }

    /// Drop whatever a script may have made stale, rebuilding the catalog
    /// after structural statements.
    async fn settle_writes(&mut self, structural: bool, wrote: bool) -> anyhow::Result<()> {
        if wrote {
            self.table_cache.clear();
            self.query_cache.clear();
        }
        if structural {
            self.catalog.refresh(live(&self.engine)?).await?;
        }
        Ok(())
    }

    /// Run every statement of one script, recording into `outcome` as it
    /// goes so a failure still reports what already ran.
    async fn run_unit(&mut self, script: &str, outcome: &mut UnitOutcome) -> anyhow::Result<()> {
        let engine = live(&self.engine)?;

        for statement in prepare_script(script) {
            let sql = normalize_collations(&statement);

            if is_read_only(&sql) {
                let sets = if is_volatile(&sql) {
                    engine.execute(&sql).await?
                } else {
                    let key = CacheKey::statement(&sql);
                    match self.query_cache.get(&key) {
                        Some(sets) => sets,
                        None => {
                            let sets = engine.execute(&sql).await?;
                            self.query_cache.set(key, sets.clone());
                            sets
                        }
                    }
                };
                outcome.sets.extend(sets);
                continue;
            }

            if classify_statement(&sql) == StatementKind::Structural {
                outcome.structural = true;
            }
            outcome.wrote = true;
            self.query_cache.clear();

            tracing::debug!(sql = %sql, "Running statement");
            outcome.sets.extend(engine.execute(&sql).await?);
        }

        Ok(())
    }

    pub async fn insert(&mut self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        live(&self.engine)?;
        self.set_state(SessionState::Mutating);
        let engine = live(&self.engine)?;

        let result = MutationEngine::new(engine, self.catalog.snapshot(), &mut self.table_cache)
            .insert(table, columns, values)
            .await;
        self.after_mutation(result)
    }

    pub async fn update(
        &mut self,
        table: &str,
        columns: &[String],
        values: &[Value],
        primary_value: &Value,
    ) -> Result<()> {
        live(&self.engine)?;
        self.set_state(SessionState::Mutating);
        let engine = live(&self.engine)?;

        let result = MutationEngine::new(engine, self.catalog.snapshot(), &mut self.table_cache)
            .update(table, columns, values, primary_value)
            .await;
        self.after_mutation(result)
    }

    pub async fn delete(&mut self, table: &str, primary_value: &Value) -> Result<()> {
        live(&self.engine)?;
        self.set_state(SessionState::Mutating);
        let engine = live(&self.engine)?;

        let result = MutationEngine::new(engine, self.catalog.snapshot(), &mut self.table_cache)
            .delete(table, primary_value)
            .await;
        self.after_mutation(result)
    }

    fn after_mutation(&mut self, result: Result<u64>) -> Result<()> {
        self.set_state(SessionState::Ready);
        let changed = result?;
        if changed > 0 {
            // Cascades and triggers may have touched other tables.
            self.table_cache.clear();
            self.query_cache.clear();
        }
        Ok(())
    }

    /// Render rows as CSV.
    pub async fn export(&mut self, spec: &ExportSpec) -> Result<String> {
        live(&self.engine)?;
        tracing::debug!(kind = spec.kind(), "Exporting CSV");

        let set = match spec {
            ExportSpec::Table { table } => {
                let built = QueryBuilder::build(&Filters::new(), &Sorters::new());
                let sql = QueryBuilder::select_all(table, &built, None);
                live(&self.engine)?.query(&sql, &[]).await?
            }
            ExportSpec::Current {
                table,
                window,
                filters,
                sorters,
            } => {
                let built = QueryBuilder::build(filters, sorters);
                let sql = QueryBuilder::select_all(table, &built, *window);
                live(&self.engine)?.query(&sql, &built.params).await?
            }
            ExportSpec::Custom { query } => self.export_query(query).await?,
        };

        to_csv(&set)
    }

    /// First result set of a user query, run like `exec` runs scripts.
    async fn export_query(&mut self, query: &str) -> Result<ResultSet> {
        let mut outcome = UnitOutcome::default();
        let ran = self.run_unit(query, &mut outcome).await;
        let settled = self.settle_writes(outcome.structural, outcome.wrote).await;

        ran.and(settled)
            .map_err(|e| SessionError::CustomQuery(format!("{:#}", e)))?;
        Ok(outcome.sets.into_iter().next().unwrap_or_default())
    }

    /// Serialize the whole database.
    pub async fn download(&self) -> Result<Vec<u8>> {
        let bytes = live(&self.engine)?.export_bytes().await?;
        tracing::info!(size = bytes.len(), "Serialized database");
        Ok(bytes)
    }
}
