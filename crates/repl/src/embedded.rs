//! Synchronous, single-process database handle used by the REPL.
//!
//! Unlike [`database::Database`] (the async, multi-client wrapper used by
//! the server), the REPL talks to the catalog, buffer pool, and WAL directly
//! on the calling thread: a terminal session is inherently single-threaded,
//! so the `Arc<RwLock<_>>`/`spawn_blocking` machinery `database::Database`
//! needs for concurrent clients would only add overhead here.
//!
//! Recovery and index-rebuild logic are shared with the server by calling
//! straight into [`database::recovery`] rather than duplicating it.

use anyhow::{Context, Result};
use buffer::BufferPoolManager;
use catalog::{Catalog, Column, IndexKind};
use common::ReplacerPolicy;
use database::QueryResult;
use executor::{execute_dml, execute_query, ExecutionContext};
use parser::{parse_sql, Statement};
use planner::{PhysicalPlan, Planner, PlannerFlags, PlanningContext};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use storage::DiskManager;
use wal::{Wal, WalRecord};

/// Holds the catalog, buffer pool, and WAL for one REPL session.
pub struct DatabaseState {
    pub catalog: Catalog,
    catalog_path: PathBuf,
    wal_path: PathBuf,
    data_dir: PathBuf,
    buffer_pages: usize,
    pool: Arc<BufferPoolManager>,
    wal: Wal,
    /// `SET enable_nestloop|enable_sortmerge` state for this REPL session.
    planner_flags: PlannerFlags,
}

impl DatabaseState {
    /// Creates the data directory if needed, loads the catalog, opens the
    /// buffer pool and WAL, and replays any records an unclean shutdown left
    /// behind before truncating the log.
    pub fn new(
        data_dir: &Path,
        catalog_file: &str,
        wal_file: &str,
        buffer_pages: usize,
    ) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let catalog_path = data_dir.join(catalog_file);
        let wal_path = data_dir.join(wal_file);

        let mut catalog = Catalog::load(&catalog_path).map_err(anyhow::Error::from)?;
        let disk = DiskManager::new(data_dir).map_err(anyhow::Error::from)?;
        let pool = Arc::new(BufferPoolManager::new(disk, buffer_pages, ReplacerPolicy::Clock));
        let mut wal = Wal::open(&wal_path).map_err(anyhow::Error::from)?;

        database::recovery::recover(&mut catalog, &pool, data_dir, &wal_path)
            .map_err(anyhow::Error::from)?;
        // Recovery has brought every table and index up to date with the
        // log; start the next session with an empty WAL so a second crash
        // never redoes already-durable writes twice.
        wal.truncate().map_err(anyhow::Error::from)?;

        Ok(Self {
            catalog,
            catalog_path,
            wal_path,
            data_dir: data_dir.to_path_buf(),
            buffer_pages,
            pool,
            wal,
            planner_flags: PlannerFlags::default(),
        })
    }

    /// Persists the in-memory catalog to its on-disk file.
    pub fn persist_catalog(&self) -> Result<()> {
        self.catalog
            .save(&self.catalog_path)
            .map_err(anyhow::Error::from)
    }

    /// Removes a dropped table's heap file, if present.
    pub fn remove_heap_file(&self, table_name: &str) -> Result<()> {
        let path = self.data_dir.join(format!("{table_name}.heap"));
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove heap file {}", path.display()))?;
        }
        Ok(())
    }

    /// Appends and fsyncs a single WAL record.
    pub fn log_wal(&mut self, record: WalRecord) -> Result<()> {
        self.wal.append(&record).map_err(anyhow::Error::from)?;
        self.wal.sync().map_err(anyhow::Error::from)
    }

    /// Runs `f` against a freshly built, non-transactional [`ExecutionContext`]
    /// borrowing this session's catalog, buffer pool, and WAL. The REPL
    /// executes every statement outside of an explicit transaction, so no
    /// `txn::Transaction` is attached.
    pub fn with_execution_context<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ExecutionContext) -> Result<T, common::DbError>,
    {
        let mut ctx = ExecutionContext::new(
            &self.catalog,
            self.pool.clone(),
            &mut self.wal,
            self.data_dir.clone(),
        );
        f(&mut ctx).map_err(anyhow::Error::from)
    }

    /// Rebuilds a single index's B+tree file from the current heap contents.
    pub fn rebuild_index(&self, table_name: &str, index_name: &str) -> Result<()> {
        let table = self.catalog.table(table_name).map_err(anyhow::Error::from)?;
        let index = table.index(index_name).map_err(anyhow::Error::from)?;
        database::recovery::rebuild_index(table, index, &self.pool, &self.data_dir)
            .map_err(anyhow::Error::from)
    }

    /// Removes every table/index/catalog/WAL file and reinitializes a fresh,
    /// empty database in the same data directory.
    pub fn reset(&mut self) -> Result<()> {
        let entries = fs::read_dir(&self.data_dir).with_context(|| {
            format!("failed to read data directory {}", self.data_dir.display())
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(ext) = path.extension() {
                if ext == "heap" || ext == "tbl" || ext == "idx" {
                    fs::remove_file(&path)
                        .with_context(|| format!("failed to remove file {}", path.display()))?;
                }
            }
        }

        if self.catalog_path.exists() {
            fs::remove_file(&self.catalog_path).with_context(|| {
                format!("failed to remove catalog {}", self.catalog_path.display())
            })?;
        }

        if self.wal_path.exists() {
            fs::remove_file(&self.wal_path)
                .with_context(|| format!("failed to remove WAL {}", self.wal_path.display()))?;
        }

        self.catalog = Catalog::load(&self.catalog_path).map_err(anyhow::Error::from)?;

        let disk = DiskManager::new(&self.data_dir).map_err(anyhow::Error::from)?;
        self.pool = Arc::new(BufferPoolManager::new(
            disk,
            self.buffer_pages,
            ReplacerPolicy::Clock,
        ));
        self.wal = Wal::open(&self.wal_path).map_err(anyhow::Error::from)?;

        Ok(())
    }

    /// The data directory backing this session.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Parses and runs a single SQL statement, returning a structured
    /// [`QueryResult`] rather than printing — used by the TUI, which renders
    /// its own result table instead of writing to stdout. Every statement
    /// here auto-commits; the REPL has no `BEGIN`/`COMMIT` session state.
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        let statements = parse_sql(sql).map_err(anyhow::Error::from)?;
        if statements.is_empty() {
            return Ok(QueryResult::Empty);
        }
        if statements.len() > 1 {
            anyhow::bail!("multiple statements not supported yet");
        }
        self.execute_statement(statements.into_iter().next().unwrap())
    }

    pub(crate) fn execute_statement(&mut self, stmt: Statement) -> Result<QueryResult> {
        match stmt {
            Statement::CreateTable {
                name,
                columns,
                primary_key,
            } => {
                let catalog_columns: Vec<Column> = columns
                    .iter()
                    .map(|col| {
                        let ty = map_sql_type(&col.ty)?;
                        Ok(Column::new(col.name.clone(), ty))
                    })
                    .collect::<Result<Vec<_>>>()?;

                if let Some(pk_names) = &primary_key {
                    for pk_name in pk_names {
                        columns
                            .iter()
                            .position(|col| col.name.eq_ignore_ascii_case(pk_name))
                            .ok_or_else(|| {
                                anyhow::anyhow!(
                                    "PRIMARY KEY column '{}' not found in table columns",
                                    pk_name
                                )
                            })?;
                    }
                }

                let table_id = self
                    .catalog
                    .create_table(&name, catalog_columns)
                    .map_err(anyhow::Error::from)?;
                self.persist_catalog()?;
                self.log_wal(WalRecord::CreateTable {
                    name,
                    table: table_id,
                })?;
                Ok(QueryResult::Empty)
            }
            Statement::DropTable { name } => {
                let table_id = self.catalog.table(&name).map_err(anyhow::Error::from)?.id;
                self.catalog.drop_table(&name).map_err(anyhow::Error::from)?;
                self.persist_catalog()?;
                self.remove_heap_file(&name)?;
                self.log_wal(WalRecord::DropTable { table: table_id })?;
                Ok(QueryResult::Empty)
            }
            Statement::CreateIndex {
                name,
                table,
                column,
            } => {
                self.catalog
                    .create_index(&table, &name, &[column.as_str()], IndexKind::BTree)
                    .map_err(anyhow::Error::from)?;
                self.persist_catalog()?;
                self.rebuild_index(&table, &name)?;
                Ok(QueryResult::Empty)
            }
            Statement::DropIndex { name } => {
                let table_name = self
                    .catalog
                    .tables()
                    .find(|table| table.index(&name).is_ok())
                    .map(|table| table.name.clone())
                    .ok_or_else(|| anyhow::anyhow!("index '{}' not found", name))?;

                self.catalog
                    .drop_index(&table_name, &name)
                    .map_err(anyhow::Error::from)?;
                self.persist_catalog()?;
                Ok(QueryResult::Empty)
            }
            Statement::Explain { query, analyze } => {
                let mut planning_ctx = PlanningContext::with_flags(&self.catalog, self.planner_flags);
                let plan =
                    Planner::plan(*query, &mut planning_ctx).map_err(anyhow::Error::from)?;

                if analyze {
                    let plan_description = planner::explain_physical(&plan);
                    let mut row_count = 0;
                    let stats_text = self.with_execution_context(|ctx| {
                        let mut executor = executor::build_executor(plan)?;
                        executor.open(ctx)?;
                        while executor.next(ctx)?.is_some() {
                            row_count += 1;
                        }
                        executor.close(ctx)?;
                        Ok(executor::format_explain_analyze(executor.as_ref(), "Query"))
                    })?;

                    let output = format!(
                        "EXPLAIN ANALYZE:\n{}\n\nExecution Statistics:\n{}\nTotal rows: {}",
                        plan_description, stats_text, row_count
                    );
                    Ok(QueryResult::Rows {
                        schema: vec!["Explain".to_string()],
                        rows: vec![common::Row::new(vec![types::Value::Text(output)])],
                    })
                } else {
                    let description = planner::explain_physical(&plan);
                    Ok(QueryResult::Rows {
                        schema: vec!["Explain".to_string()],
                        rows: vec![common::Row::new(vec![types::Value::Text(description)])],
                    })
                }
            }
            Statement::ShowTables => {
                let rows = self
                    .catalog
                    .tables()
                    .map(|t| common::Row::new(vec![types::Value::Text(t.name.clone())]))
                    .collect();
                Ok(QueryResult::Rows {
                    schema: vec!["table_name".to_string()],
                    rows,
                })
            }
            Statement::Describe { table } => {
                let table_meta = self.catalog.table(&table).map_err(anyhow::Error::from)?;
                let rows = table_meta
                    .schema
                    .columns
                    .iter()
                    .map(|c| {
                        common::Row::new(vec![
                            types::Value::Text(c.name.clone()),
                            types::Value::Text(format!("{:?}", c.ty)),
                        ])
                    })
                    .collect();
                Ok(QueryResult::Rows {
                    schema: vec!["column_name".to_string(), "type".to_string()],
                    rows,
                })
            }
            Statement::SetOption { name, value } => {
                match name.as_str() {
                    "enable_nestloop" => self.planner_flags.enable_nestloop = value,
                    "enable_sortmerge" => self.planner_flags.enable_sortmerge = value,
                    _ => anyhow::bail!("unknown planner option '{}'", name),
                }
                Ok(QueryResult::Empty)
            }
            Statement::CreateCheckpoint => {
                self.wal.sync().map_err(anyhow::Error::from)?;
                self.wal.truncate().map_err(anyhow::Error::from)?;
                Ok(QueryResult::Empty)
            }
            Statement::Begin | Statement::Commit | Statement::Abort => {
                anyhow::bail!("the REPL does not support explicit transactions")
            }
            other => {
                let mut planning_ctx = PlanningContext::with_flags(&self.catalog, self.planner_flags);
                let plan = Planner::plan(other, &mut planning_ctx).map_err(anyhow::Error::from)?;

                match plan {
                    PhysicalPlan::Insert { .. }
                    | PhysicalPlan::Update { .. }
                    | PhysicalPlan::Delete { .. } => {
                        let count = self.with_execution_context(|ctx| execute_dml(plan, ctx))?;
                        Ok(QueryResult::Count { affected: count })
                    }
                    ref query_plan => {
                        let schema = infer_schema(query_plan);
                        let rows = self.with_execution_context(|ctx| execute_query(plan, ctx))?;
                        Ok(QueryResult::Rows { schema, rows })
                    }
                }
            }
        }
    }
}

fn map_sql_type(raw: &str) -> Result<types::SqlType> {
    match raw.trim().to_uppercase().as_str() {
        "INT" | "INTEGER" => Ok(types::SqlType::Int),
        "TEXT" | "STRING" | "VARCHAR" => Ok(types::SqlType::Text),
        "BOOL" | "BOOLEAN" => Ok(types::SqlType::Bool),
        other => Err(anyhow::anyhow!("unsupported SQL type '{}'", other)),
    }
}

fn infer_schema(plan: &PhysicalPlan) -> Vec<String> {
    match plan {
        PhysicalPlan::SeqScan { schema, .. } => schema.clone(),
        PhysicalPlan::IndexScan { schema, .. } => schema.clone(),
        PhysicalPlan::Filter { input, .. } => infer_schema(input),
        PhysicalPlan::Project { columns, .. } => {
            columns.iter().map(|(name, _)| name.clone()).collect()
        }
        PhysicalPlan::Sort { input, .. } => infer_schema(input),
        PhysicalPlan::Limit { input, .. } => infer_schema(input),
        PhysicalPlan::NestedLoopJoin { schema, .. } | PhysicalPlan::MergeJoin { schema, .. } => {
            schema.clone()
        }
        PhysicalPlan::Aggregate { output_schema, .. } => output_schema.clone(),
        PhysicalPlan::Insert { .. } | PhysicalPlan::Update { .. } | PhysicalPlan::Delete { .. } => {
            vec![]
        }
    }
}
