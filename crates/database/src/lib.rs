pub mod recovery;

use anyhow::{Context, Result};
use buffer::BufferPoolManager;
use catalog::{Catalog, Column, IndexKind};
use common::{ReplacerPolicy, TableId};
use executor::{build_executor, execute_dml, execute_query, ExecutionContext};
use lock::{LockMode, LockTarget};
use parser::{parse_sql, Statement};
use planner::{PhysicalPlan, Planner, PlannerFlags, PlanningContext};
use std::{
    fs,
    ops::DerefMut,
    path::{Path, PathBuf},
    sync::Arc,
};
use storage::DiskManager;
use tokio::sync::{Mutex, RwLock};
use types::Value;
use wal::{Wal, WalRecord};

mod session;
pub use session::Session;

/// Result type for database operations that may include query results.
#[derive(Debug)]
pub enum QueryResult {
    /// Query returned rows
    Rows {
        schema: Vec<String>,
        rows: Vec<common::Row>,
    },
    /// DML operation affected N rows
    Count { affected: u64 },
    /// DDL or other operation with no result
    Empty,
}

/// Async database wrapper for multi-threaded server use.
///
/// This is the main entry point for executing SQL statements.
/// Resources are wrapped in Arc/RwLock/Mutex for safe concurrent access.
/// All I/O operations are performed in spawn_blocking to avoid blocking the async runtime.
pub struct Database {
    data_dir: Arc<PathBuf>,
    catalog_path: Arc<PathBuf>,
    wal_path: Arc<PathBuf>,
    buffer_pages: usize,
    catalog: Arc<RwLock<Catalog>>,
    pool: Arc<RwLock<Arc<BufferPoolManager>>>,
    wal: Arc<Mutex<Wal>>,
    txn_mgr: Arc<txn::TransactionManager>,
}

impl Database {
    /// Create a new async database instance.
    ///
    /// Creates the data directory if it doesn't exist, loads the catalog,
    /// initializes the buffer pool over a fresh disk manager, opens the WAL,
    /// and replays any records left behind by an unclean shutdown.
    /// All I/O operations are performed in spawn_blocking.
    pub async fn new(
        data_dir: &Path,
        catalog_file: &str,
        wal_file: &str,
        buffer_pages: usize,
    ) -> Result<Self> {
        let data_dir_owned = data_dir.to_path_buf();
        let catalog_file_owned = catalog_file.to_string();
        let wal_file_owned = wal_file.to_string();

        let (catalog, pool, wal, catalog_path, wal_path) =
            tokio::task::spawn_blocking(move || {
                fs::create_dir_all(&data_dir_owned).with_context(|| {
                    format!(
                        "failed to create data directory {}",
                        data_dir_owned.display()
                    )
                })?;

                let catalog_path = data_dir_owned.join(&catalog_file_owned);
                let wal_path = data_dir_owned.join(&wal_file_owned);
                let mut catalog = Catalog::load(&catalog_path).map_err(anyhow::Error::from)?;
                let disk = DiskManager::new(&data_dir_owned).map_err(anyhow::Error::from)?;
                let pool = BufferPoolManager::new(disk, buffer_pages, ReplacerPolicy::Clock);
                let mut wal = Wal::open(&wal_path).map_err(anyhow::Error::from)?;

                crate::recovery::recover(&mut catalog, &pool, &data_dir_owned, &wal_path)
                    .map_err(anyhow::Error::from)?;
                // Recovery has brought every table and index up to date with
                // the log; start the next session with an empty WAL so a
                // second crash never redoes already-durable writes twice.
                wal.truncate().map_err(anyhow::Error::from)?;

                Ok::<_, anyhow::Error>((catalog, pool, wal, catalog_path, wal_path))
            })
            .await??;

        // MVCC is off by default (see common::Config::mvcc_enabled); strict
        // 2PL through the lock manager below is fully serializable on its
        // own, so the snapshot-read path is left for a follow-up and is
        // recorded as an open question in DESIGN.md.
        let locks = Arc::new(lock::LockManager::new());
        let txn_mgr = Arc::new(txn::TransactionManager::new(locks, false));

        Ok(Self {
            data_dir: Arc::new(data_dir.to_path_buf()),
            catalog_path: Arc::new(catalog_path),
            wal_path: Arc::new(wal_path),
            buffer_pages,
            catalog: Arc::new(RwLock::new(catalog)),
            pool: Arc::new(RwLock::new(pool)),
            wal: Arc::new(Mutex::new(wal)),
            txn_mgr,
        })
    }

    /// Open a new session for a single client connection. Sessions hold the
    /// connection's explicit-transaction state (`BEGIN`/`COMMIT`/`ABORT`);
    /// statements issued outside an explicit transaction auto-commit.
    pub fn session(self: &Arc<Self>) -> Session {
        Session::new(self.clone())
    }

    /// Execute a SQL statement and return results.
    ///
    /// This is the main entry point for SQL execution.
    /// Handles DDL (CREATE/DROP TABLE/INDEX) and delegates DML/queries to executor.
    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let statements = parse_sql(sql).map_err(anyhow::Error::from)?;

        if statements.is_empty() {
            return Ok(QueryResult::Empty);
        }

        if statements.len() > 1 {
            anyhow::bail!("multiple statements not supported yet");
        }

        let stmt = statements.into_iter().next().unwrap();
        self.execute_statement(stmt).await
    }

    /// Access to the transaction/lock manager backing this database, for
    /// [`Session`] to begin/commit/abort explicit transactions against.
    pub(crate) fn txn_mgr(&self) -> Arc<txn::TransactionManager> {
        self.txn_mgr.clone()
    }

    /// Execute a single parsed statement outside of an explicit transaction.
    ///
    /// Query/DML statements auto-commit: a transaction is begun, the
    /// statement runs under it, and it is committed (or aborted, on error)
    /// before this returns. `BEGIN`/`COMMIT`/`ABORT` need state that outlives
    /// a single call and are rejected here; use [`Session`] for those.
    pub(crate) async fn execute_statement(&self, stmt: Statement) -> Result<QueryResult> {
        self.execute_statement_with_flags(stmt, PlannerFlags::default())
            .await
    }

    /// Like [`Self::execute_statement`], but runs query/DML statements with
    /// the given planner flags instead of the default. Used by [`Session`]
    /// to carry its `SET enable_nestloop|enable_sortmerge` state across the
    /// no-open-transaction path.
    pub(crate) async fn execute_statement_with_flags(
        &self,
        stmt: Statement,
        flags: PlannerFlags,
    ) -> Result<QueryResult> {
        match stmt {
            Statement::CreateTable {
                name,
                columns,
                primary_key,
            } => self.execute_create_table(name, columns, primary_key).await,

            Statement::DropTable { name } => self.execute_drop_table(name).await,

            Statement::CreateIndex {
                name,
                table,
                column,
            } => self.execute_create_index(name, table, column).await,

            Statement::DropIndex { name } => self.execute_drop_index(name).await,

            Statement::Explain { query, analyze } => self.execute_explain(*query, analyze).await,

            Statement::ShowTables => self.execute_show_tables().await,

            Statement::Describe { table } => self.execute_describe(table).await,

            // No session to carry the flag outside of `Session::execute`; a bare
            // `Database::execute` call has nothing to persist it against.
            Statement::SetOption { .. } => Ok(QueryResult::Empty),

            Statement::CreateCheckpoint => self.execute_checkpoint().await,

            Statement::Begin | Statement::Commit | Statement::Abort => {
                anyhow::bail!(
                    "transaction control statements require a session; call Database::session()"
                )
            }

            other => self.execute_autocommit(other, flags).await,
        }
    }

    /// Run `stmt` under a freshly begun transaction, committing on success
    /// and rolling back the write set on failure.
    ///
    /// The transaction's `Begin` record is logged before the statement runs
    /// so every DML record it writes has a boundary to be redone or undone
    /// against; its `Commit` record is logged — and fsynced — before the
    /// in-memory commit, per the durable-commit ordering [`txn::TransactionManager::commit`]
    /// documents.
    async fn execute_autocommit(&self, stmt: Statement, flags: PlannerFlags) -> Result<QueryResult> {
        let txn = self.txn_mgr.begin();
        self.log_wal_record(WalRecord::Begin { txn: txn.id })
            .await?;

        let result = self.execute_query_or_dml(stmt, txn.clone(), flags).await;
        match &result {
            Ok(_) => {
                self.log_wal_record(WalRecord::Commit { txn: txn.id })
                    .await?;
                self.txn_mgr.commit(&txn);
            }
            Err(_) => {
                if let Err(rollback_err) = self.rollback(txn.clone()).await {
                    tracing::warn!(error = %rollback_err, "autocommit rollback failed");
                }
            }
        }
        result
    }

    /// Appends `record` to the WAL and fsyncs before returning, so the
    /// caller can rely on it being durable once this resolves.
    pub(crate) async fn log_wal_record(&self, record: WalRecord) -> Result<()> {
        let wal = self.wal.clone();
        tokio::task::spawn_blocking(move || {
            let mut wal_lock = wal.blocking_lock();
            wal_lock
                .append(&record)
                .and_then(|_| wal_lock.sync())
                .map_err(anyhow::Error::from)
        })
        .await?
    }

    /// Replays `txn`'s write set in reverse, releases its locks, and logs the
    /// terminal `Abort` record once every compensating write has been
    /// appended to the log. A crash between compensating writes and this
    /// `Abort` record still recovers correctly: `Abort`'s only job is to tell
    /// [`recovery::analyze`] that this transaction is not a loser, and a
    /// transaction whose undo already fully landed needs no further recovery
    /// work regardless of whether that record made it to disk.
    pub(crate) async fn rollback(&self, txn: Arc<txn::Transaction>) -> Result<()> {
        let catalog = self.catalog.clone();
        let pool = self.pool.clone();
        let wal = self.wal.clone();
        let data_dir = self.data_dir.clone();
        let txn_mgr = self.txn_mgr.clone();

        tokio::task::spawn_blocking(move || {
            let catalog_lock = catalog.blocking_read();
            let mut wal_lock = wal.blocking_lock();
            let mut ctx = ExecutionContext::new(
                &catalog_lock,
                pool.blocking_read().clone(),
                wal_lock.deref_mut(),
                data_dir.as_ref().clone(),
            )
            .with_txn(txn.clone());
            txn_mgr.abort(&txn, &mut ctx).map_err(anyhow::Error::from)?;
            wal_lock
                .append(&WalRecord::Abort { txn: txn.id })
                .and_then(|_| wal_lock.sync())
                .map_err(anyhow::Error::from)
        })
        .await?
    }

    /// `SHOW TABLES`: one row per registered table.
    async fn execute_show_tables(&self) -> Result<QueryResult> {
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || {
            let catalog_lock = catalog.blocking_read();
            let rows = catalog_lock
                .tables()
                .map(|t| common::Row::new(vec![Value::Text(t.name.clone())]))
                .collect();
            Ok(QueryResult::Rows {
                schema: vec!["table_name".to_string()],
                rows,
            })
        })
        .await?
    }

    /// `DESCRIBE table`: one row per column, its declared type.
    async fn execute_describe(&self, table: String) -> Result<QueryResult> {
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || {
            let catalog_lock = catalog.blocking_read();
            let table_meta = catalog_lock.table(&table).map_err(anyhow::Error::from)?;
            let rows = table_meta
                .schema
                .columns
                .iter()
                .map(|c| {
                    common::Row::new(vec![
                        Value::Text(c.name.clone()),
                        Value::Text(format!("{:?}", c.ty)),
                    ])
                })
                .collect();
            Ok(QueryResult::Rows {
                schema: vec!["column_name".to_string(), "type".to_string()],
                rows,
            })
        })
        .await?
    }

    /// `CREATE STATIC_CHECKPOINT`: flush every dirty buffer-pool page to disk
    /// and truncate the WAL, since every record it holds is now durable in
    /// the heap/index files it would otherwise redo at startup.
    async fn execute_checkpoint(&self) -> Result<QueryResult> {
        let pool = self.pool.clone();
        let wal = self.wal.clone();

        tokio::task::spawn_blocking(move || {
            pool.blocking_read()
                .force_flush_all_pages()
                .map_err(anyhow::Error::from)?;
            let mut wal_lock = wal.blocking_lock();
            wal_lock.sync().map_err(anyhow::Error::from)?;
            wal_lock.truncate().map_err(anyhow::Error::from)?;
            Ok(QueryResult::Empty)
        })
        .await?
    }

    /// Execute CREATE TABLE statement.
    async fn execute_create_table(
        &self,
        name: String,
        columns: Vec<parser::ColumnDef>,
        primary_key: Option<Vec<String>>,
    ) -> Result<QueryResult> {
        // CPU-bound work: map columns and validate primary key
        let catalog_columns: Vec<Column> = columns
            .iter()
            .map(|col| {
                let ty = map_sql_type(&col.ty)?;
                Ok(Column::new(col.name.clone(), ty))
            })
            .collect::<Result<Vec<_>>>()?;

        // The catalog has no first-class primary-key concept (see DESIGN.md);
        // we still validate the clause so a typo surfaces at DDL time instead
        // of silently vanishing.
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

        // Clone Arc references for spawn_blocking
        let catalog = self.catalog.clone();
        let catalog_path = self.catalog_path.clone();
        let wal = self.wal.clone();

        tokio::task::spawn_blocking(move || {
            // Acquire write lock on catalog (exclusive access)
            let mut catalog_lock = catalog.blocking_write();

            let table_id = catalog_lock
                .create_table(&name, catalog_columns)
                .map_err(anyhow::Error::from)?;

            // Persist catalog to disk (blocking I/O)
            catalog_lock
                .save(&catalog_path)
                .map_err(anyhow::Error::from)?;

            drop(catalog_lock); // Release catalog lock

            // Log WAL (exclusive access, blocking I/O)
            let mut wal_lock = wal.blocking_lock();
            wal_lock
                .append(&WalRecord::CreateTable {
                    name: name.clone(),
                    table: table_id,
                })
                .and_then(|_| wal_lock.sync())
                .map_err(anyhow::Error::from)?;

            Ok(QueryResult::Empty)
        })
        .await?
    }

    /// Execute DROP TABLE statement.
    async fn execute_drop_table(&self, name: String) -> Result<QueryResult> {
        let catalog = self.catalog.clone();
        let catalog_path = self.catalog_path.clone();
        let data_dir = self.data_dir.clone();
        let wal = self.wal.clone();

        tokio::task::spawn_blocking(move || {
            // Acquire write lock on catalog
            let mut catalog_lock = catalog.blocking_write();

            let table_meta = catalog_lock.table(&name).map_err(anyhow::Error::from)?;
            let table_id = table_meta.id;
            let index_ids: Vec<_> = table_meta.indexes().iter().map(|i| i.id).collect();

            catalog_lock
                .drop_table(&name)
                .map_err(anyhow::Error::from)?;

            // Persist catalog
            catalog_lock
                .save(&catalog_path)
                .map_err(anyhow::Error::from)?;

            drop(catalog_lock);

            // Remove heap file (blocking I/O)
            let path = data_dir.join(format!("{name}.heap"));
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to remove heap file {}", path.display()))?;
            }

            // Remove this table's index files
            for index_id in index_ids {
                let index_path = data_dir.join(format!("index_{}.idx", index_id.0));
                if index_path.exists() {
                    fs::remove_file(&index_path).with_context(|| {
                        format!("failed to remove index file {}", index_path.display())
                    })?;
                }
            }

            // Log WAL
            let mut wal_lock = wal.blocking_lock();
            wal_lock
                .append(&WalRecord::DropTable { table: table_id })
                .and_then(|_| wal_lock.sync())
                .map_err(anyhow::Error::from)?;

            Ok(QueryResult::Empty)
        })
        .await?
    }

    /// Execute CREATE INDEX statement.
    ///
    /// Registers the index in the catalog, then builds its B+tree file on
    /// disk by scanning the table's existing heap rows so the new index is
    /// immediately usable by `IndexScanExec`, which refuses to open a
    /// missing index file.
    async fn execute_create_index(
        &self,
        name: String,
        table: String,
        column: String,
    ) -> Result<QueryResult> {
        let catalog = self.catalog.clone();
        let catalog_path = self.catalog_path.clone();
        let data_dir = self.data_dir.clone();
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let mut catalog_lock = catalog.blocking_write();

            catalog_lock
                .create_index(&table, &name, &[column.as_str()], IndexKind::BTree)
                .map_err(anyhow::Error::from)?;

            catalog_lock
                .save(&catalog_path)
                .map_err(anyhow::Error::from)?;

            let table_meta = catalog_lock.table(&table).map_err(anyhow::Error::from)?;
            let index_meta = table_meta.index(&name).map_err(anyhow::Error::from)?;
            let pool = pool.blocking_read().clone();
            crate::recovery::rebuild_index(table_meta, index_meta, &pool, &data_dir)
                .map_err(anyhow::Error::from)?;

            Ok(QueryResult::Empty)
        })
        .await?
    }

    /// Execute DROP INDEX statement.
    async fn execute_drop_index(&self, name: String) -> Result<QueryResult> {
        let catalog = self.catalog.clone();
        let catalog_path = self.catalog_path.clone();
        let data_dir = self.data_dir.clone();

        tokio::task::spawn_blocking(move || {
            let mut catalog_lock = catalog.blocking_write();

            let table_name = catalog_lock
                .tables()
                .find(|table| table.index(&name).is_ok())
                .map(|table| table.name.clone())
                .ok_or_else(|| anyhow::anyhow!("index '{}' not found", name))?;

            let index_id = catalog_lock
                .table(&table_name)
                .and_then(|t| t.index(&name))
                .map_err(anyhow::Error::from)?
                .id;

            catalog_lock
                .drop_index(&table_name, &name)
                .map_err(anyhow::Error::from)?;

            catalog_lock
                .save(&catalog_path)
                .map_err(anyhow::Error::from)?;

            drop(catalog_lock);

            let index_path = data_dir.join(format!("index_{}.idx", index_id.0));
            if index_path.exists() {
                fs::remove_file(&index_path).with_context(|| {
                    format!("failed to remove index file {}", index_path.display())
                })?;
            }

            Ok(QueryResult::Empty)
        })
        .await?
    }

    /// Execute EXPLAIN or EXPLAIN ANALYZE statement.
    async fn execute_explain(&self, query: Statement, analyze: bool) -> Result<QueryResult> {
        let catalog = self.catalog.clone();
        let pool = self.pool.clone();
        let wal = self.wal.clone();
        let data_dir = self.data_dir.clone();

        tokio::task::spawn_blocking(move || {
            let catalog_lock = catalog.blocking_read();
            let mut planning_ctx = PlanningContext::new(&catalog_lock);
            let plan = Planner::plan(query, &mut planning_ctx).map_err(anyhow::Error::from)?;

            if analyze {
                // EXPLAIN ANALYZE: Execute the query and collect statistics
                let plan_description = planner::explain_physical(&plan);

                let mut wal_lock = wal.blocking_lock();
                let mut ctx = ExecutionContext::new(
                    &catalog_lock,
                    pool.blocking_read().clone(),
                    wal_lock.deref_mut(),
                    data_dir.as_ref().clone(),
                );

                let mut executor = build_executor(plan).map_err(anyhow::Error::from)?;
                executor.open(&mut ctx).map_err(anyhow::Error::from)?;

                let mut row_count = 0;
                while executor
                    .next(&mut ctx)
                    .map_err(anyhow::Error::from)?
                    .is_some()
                {
                    row_count += 1;
                }
                executor.close(&mut ctx).map_err(anyhow::Error::from)?;

                // Format the output
                let mut output = String::new();
                output.push_str("EXPLAIN ANALYZE:\n");
                output.push_str(&plan_description);
                output.push_str("\n\nExecution Statistics:\n");
                output.push_str(&executor::format_explain_analyze(
                    executor.as_ref(),
                    "Query",
                ));
                output.push_str(&format!("\nTotal rows: {}", row_count));

                Ok(QueryResult::Rows {
                    schema: vec!["Explain".to_string()],
                    rows: vec![common::Row::new(vec![Value::Text(output)])],
                })
            } else {
                // EXPLAIN: Just show the plan
                let description = planner::explain_physical(&plan);
                Ok(QueryResult::Rows {
                    schema: vec!["Explain".to_string()],
                    rows: vec![common::Row::new(vec![Value::Text(description)])],
                })
            }
        })
        .await?
    }

    /// Execute a query or DML statement (SELECT, INSERT, UPDATE, DELETE)
    /// under `txn`: acquires the table-level locks the plan touches via 2PL,
    /// runs the plan, and records its write set on `txn` for rollback.
    /// Locks are released by the caller's eventual commit/abort, not here.
    ///
    /// `flags` carries this connection's `SET enable_nestloop|enable_sortmerge`
    /// state; callers with no session (the bare autocommit path) pass the
    /// default.
    pub(crate) async fn execute_query_or_dml(
        &self,
        stmt: Statement,
        txn: Arc<txn::Transaction>,
        flags: PlannerFlags,
    ) -> Result<QueryResult> {
        let catalog = self.catalog.clone();
        let pool = self.pool.clone();
        let wal = self.wal.clone();
        let data_dir = self.data_dir.clone();
        let txn_mgr = self.txn_mgr.clone();

        tokio::task::spawn_blocking(move || {
            // Acquire read lock on catalog (shared access for queries/DML)
            let catalog_lock = catalog.blocking_read();
            let mut planning_ctx = PlanningContext::with_flags(&catalog_lock, flags);
            let plan = Planner::plan(stmt, &mut planning_ctx).map_err(anyhow::Error::from)?;

            for (table_id, mode) in plan_lock_targets(&plan) {
                txn_mgr
                    .locks()
                    .acquire(txn.id, LockTarget::Table(table_id), mode)
                    .map_err(anyhow::Error::from)?;
            }

            // Acquire exclusive lock on the WAL; the buffer pool latches pages internally
            let mut wal_lock = wal.blocking_lock();
            let mut ctx = ExecutionContext::new(
                &catalog_lock,
                pool.blocking_read().clone(),
                wal_lock.deref_mut(),
                data_dir.as_ref().clone(),
            )
            .with_txn(txn);

            match plan {
                PhysicalPlan::Insert { .. }
                | PhysicalPlan::Update { .. }
                | PhysicalPlan::Delete { .. } => {
                    let count = execute_dml(plan, &mut ctx).map_err(anyhow::Error::from)?;
                    Ok(QueryResult::Count { affected: count })
                }
                ref query_plan => {
                    let schema = infer_schema(query_plan);
                    let rows = execute_query(plan, &mut ctx).map_err(anyhow::Error::from)?;
                    Ok(QueryResult::Rows { schema, rows })
                }
            }
        })
        .await?
    }

    /// Reset the database by removing all data files and reinitializing.
    pub async fn reset(&self) -> Result<()> {
        let data_dir = self.data_dir.clone();
        let catalog_path = self.catalog_path.clone();
        let wal_path = self.wal_path.clone();
        let catalog = self.catalog.clone();
        let pool = self.pool.clone();
        let wal = self.wal.clone();
        let buffer_pages = self.buffer_pages;

        tokio::task::spawn_blocking(move || {
            // Remove all table files (.tbl), heap files (.heap), and index files (.idx)
            let entries = fs::read_dir(&*data_dir)
                .with_context(|| format!("failed to read data directory {}", data_dir.display()))?;

            for entry in entries.flatten() {
                let path = entry.path();
                if let Some(ext) = path.extension() {
                    if ext == "heap" || ext == "tbl" || ext == "idx" {
                        fs::remove_file(&path)
                            .with_context(|| format!("failed to remove file {}", path.display()))?;
                    }
                }
            }

            // Remove catalog file if it exists
            if catalog_path.exists() {
                fs::remove_file(&*catalog_path).with_context(|| {
                    format!("failed to remove catalog {}", catalog_path.display())
                })?;
            }

            // Remove WAL file (need to close and reopen)
            {
                let mut wal_lock = wal.blocking_lock();
                // Close the WAL by dropping the old one
                *wal_lock = Wal::open(&**wal_path).map_err(anyhow::Error::from)?;
            }
            if wal_path.exists() {
                fs::remove_file(&**wal_path)
                    .with_context(|| format!("failed to remove WAL {}", wal_path.display()))?;
            }

            // Reinitialize catalog
            {
                let mut catalog_lock = catalog.blocking_write();
                *catalog_lock = Catalog::load(&catalog_path).map_err(anyhow::Error::from)?;
            }

            // Reinitialize the buffer pool over a fresh disk manager.
            {
                let disk = DiskManager::new(&*data_dir).map_err(anyhow::Error::from)?;
                let mut pool_lock = pool.blocking_write();
                *pool_lock = BufferPoolManager::new(disk, buffer_pages, ReplacerPolicy::Clock);
            }

            // Reinitialize WAL
            {
                let mut wal_lock = wal.blocking_lock();
                *wal_lock = Wal::open(&**wal_path).map_err(anyhow::Error::from)?;
            }

            Ok(())
        })
        .await?
    }

    /// Get a clone of the catalog Arc for async access.
    ///
    /// Use this to read catalog metadata in async contexts.
    /// For synchronous access within spawn_blocking, use catalog.blocking_read().
    pub fn catalog(&self) -> Arc<RwLock<Catalog>> {
        self.catalog.clone()
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Map parser SQL type string to internal SqlType.
fn map_sql_type(raw: &str) -> Result<types::SqlType> {
    match raw.trim().to_uppercase().as_str() {
        "INT" | "INTEGER" => Ok(types::SqlType::Int),
        "TEXT" | "STRING" | "VARCHAR" => Ok(types::SqlType::Text),
        "BOOL" | "BOOLEAN" => Ok(types::SqlType::Bool),
        other => Err(anyhow::anyhow!("unsupported SQL type '{}'", other)),
    }
}

/// Infer the output schema from a physical plan.
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

/// Gathers the table-level locks a plan's DML/scan nodes require, in the
/// order they should be acquired. Locking is table-granular; the lock
/// manager's wound-wait deadlock avoidance makes acquisition order safe
/// without a fixed global ordering.
fn plan_lock_targets(plan: &PhysicalPlan) -> Vec<(TableId, LockMode)> {
    let mut targets = Vec::new();
    collect_lock_targets(plan, &mut targets);
    targets
}

fn collect_lock_targets(plan: &PhysicalPlan, targets: &mut Vec<(TableId, LockMode)>) {
    match plan {
        PhysicalPlan::SeqScan { table_id, .. } | PhysicalPlan::IndexScan { table_id, .. } => {
            targets.push((*table_id, LockMode::Shared));
        }
        PhysicalPlan::Insert { table_id, .. } => {
            targets.push((*table_id, LockMode::Exclusive));
        }
        PhysicalPlan::Update { table_id, .. } | PhysicalPlan::Delete { table_id, .. } => {
            targets.push((*table_id, LockMode::Exclusive));
        }
        PhysicalPlan::Filter { input, .. }
        | PhysicalPlan::Project { input, .. }
        | PhysicalPlan::Sort { input, .. }
        | PhysicalPlan::Limit { input, .. }
        | PhysicalPlan::Aggregate { input, .. } => collect_lock_targets(input, targets),
        PhysicalPlan::NestedLoopJoin { left, right, .. }
        | PhysicalPlan::MergeJoin { left, right, .. } => {
            collect_lock_targets(left, targets);
            collect_lock_targets(right, targets);
        }
    }
}
