//! Query executor: executes physical plans using a Volcano-style iterator model.
//!
//! The executor bridges the planner's physical operators with the storage layer,
//! buffer pool, and WAL to perform actual query execution. It implements a pull-based
//! iterator model where each operator pulls rows from its children.
//!
//! # Architecture
//!
//! ```text
//! Physical Plan
//!     ↓
//! Build Executor Tree
//!     ↓
//! open() → Initialize resources
//!     ↓
//! next() → Pull rows iteratively
//!     ↓
//! close() → Clean up resources
//! ```
//!
//! # Example
//!
//! ```no_run
//! use executor::{execute_query, ExecutionContext};
//! use planner::PhysicalPlan;
//! use catalog::Catalog;
//! use buffer::BufferPoolManager;
//! use common::ReplacerPolicy;
//! use wal::Wal;
//! use common::TableId;
//! use std::path::PathBuf;
//!
//! let catalog = Catalog::new();
//! let disk = storage::DiskManager::new("/tmp/db").unwrap();
//! let pool = BufferPoolManager::new(disk, 100, ReplacerPolicy::Clock);
//! let mut wal = Wal::open("/tmp/db/wal.log").unwrap();
//! let mut ctx = ExecutionContext::new(&catalog, pool, &mut wal, PathBuf::from("/tmp/db"));
//!
//! let plan = PhysicalPlan::SeqScan {
//!     table_id: TableId(1),
//!     schema: vec!["id".into(), "name".into()],
//! };
//! let results = execute_query(plan, &mut ctx).unwrap();
//! ```


mod aggregate;
mod builder;
mod dml;
mod filter;
mod join;
mod limit;
mod project;
mod scan;
mod sort;

pub use builder::build_executor;
pub use join::SemiJoinExec;

use buffer::{heap::HeapFile, BufferPoolManager};
use catalog::Catalog;
use common::{DbError, DbResult, Row, TableId};
use planner::PhysicalPlan;
use std::path::PathBuf;
use std::sync::Arc;
use types::{SqlType, Value};
use wal::{Wal, WalRecord};

/// Volcano-style iterator interface for query execution.
///
/// Each operator implements this trait to provide a pull-based execution model.
/// Operators initialize resources in `open()`, produce rows via `next()`, and
/// clean up in `close()`.
pub trait Executor {
    /// Initialize the operator (open files, allocate buffers, etc.).
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Fetch the next row, or None if exhausted.
    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>>;

    /// Release resources (close files, flush buffers, etc.).
    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Return the schema (column names) of rows produced by this operator.
    fn schema(&self) -> &[String];

    /// Execution statistics for EXPLAIN ANALYZE, if this operator tracks them.
    fn stats(&self) -> Option<&common::ExecutionStats> {
        None
    }
}

/// Shared execution context passed to all operators.
///
/// Contains references to the catalog, buffer pool (pager), and WAL for
/// coordinating data access and durability.
pub struct ExecutionContext<'a> {
    pub catalog: &'a Catalog,
    pub pool: Arc<BufferPoolManager>,
    pub wal: &'a mut Wal,
    pub data_dir: PathBuf,
    /// The transaction this statement runs under, if the caller is tracking
    /// one. DML operators append to its write set via [`Self::record_write`]
    /// so [`txn::TransactionManager::abort`] can undo them; `None` means the
    /// statement runs without rollback bookkeeping (e.g. recovery replay).
    pub txn: Option<Arc<txn::Transaction>>,
}

impl<'a> ExecutionContext<'a> {
    /// Create a new execution context.
    pub fn new(
        catalog: &'a Catalog,
        pool: Arc<BufferPoolManager>,
        wal: &'a mut Wal,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            pool,
            wal,
            data_dir,
            txn: None,
        }
    }

    /// Attach the transaction that DML executed through this context should
    /// record its write set against.
    pub fn with_txn(mut self, txn: Arc<txn::Transaction>) -> Self {
        self.txn = Some(txn);
        self
    }

    /// Appends `record` to the active transaction's write set, if any.
    /// Called by DML operators immediately after a successful mutation.
    pub fn record_write(&self, record: txn::WriteRecord) {
        if let Some(txn) = &self.txn {
            txn.record_write(record);
        }
    }

    /// The id of the transaction this statement runs under, or
    /// [`common::TxnId::INVALID`] when running without one (e.g. recovery
    /// replay, where WAL records are read rather than written).
    pub fn current_txn_id(&self) -> common::TxnId {
        self.txn
            .as_ref()
            .map(|t| t.id)
            .unwrap_or(common::TxnId::INVALID)
    }

    /// Returns the packed-tuple column types for a table, in ordinal order.
    pub fn table_schema(&self, table_id: TableId) -> DbResult<Vec<SqlType>> {
        let table_meta = self.catalog.table_by_id(table_id)?;
        Ok(table_meta
            .schema
            .columns
            .iter()
            .map(|c| c.ty.clone())
            .collect())
    }

    /// Opens (creating on first access) the heap file backing `table_id`.
    pub fn heap_table(&mut self, table_id: TableId) -> DbResult<HeapFile> {
        let table_meta = self.catalog.table_by_id(table_id)?;
        let file_name = format!("{}.heap", table_meta.name);
        let schema = self.table_schema(table_id)?;

        if self.data_dir.join(&file_name).exists() {
            HeapFile::open(&self.pool, &file_name)
        } else {
            let record_size = common::codec::record_size(&schema);
            HeapFile::create(&self.pool, &file_name, record_size)
        }
    }

    /// Log a DML operation to the WAL.
    pub fn log_dml(&mut self, record: WalRecord) -> DbResult<()> {
        self.wal.append(&record)?;
        self.wal.sync()
    }

    fn index_path(&self, index_id: catalog::IndexId) -> PathBuf {
        self.data_dir.join(format!("index_{}.idx", index_id.0))
    }

    /// B+tree indexes registered on `table_id`. Other index kinds (hash,
    /// bitmap, trie) have no on-disk implementation yet and are skipped.
    fn btree_indexes(&self, table_id: TableId) -> DbResult<Vec<catalog::IndexMeta>> {
        Ok(self
            .catalog
            .table_by_id(table_id)?
            .indexes()
            .iter()
            .filter(|idx| idx.kind == catalog::IndexKind::BTree)
            .cloned()
            .collect())
    }

    fn index_key(index: &catalog::IndexMeta, row: &[types::Value]) -> Vec<types::Value> {
        index
            .columns
            .iter()
            .map(|&col| row[col as usize].clone())
            .collect()
    }

    /// Inserts `rid`'s key into every B+tree index defined on `table_id`.
    /// Called after the row has been written to the heap.
    pub fn insert_into_indexes(
        &mut self,
        table_id: TableId,
        row: &[types::Value],
        rid: common::RecordId,
    ) -> DbResult<()> {
        for index in self.btree_indexes(table_id)? {
            let path = self.index_path(index.id);
            let mut tree = btree::BTreeIndex::open(&path, index.id)?;
            tree.insert(Self::index_key(&index, row), rid)?;
            tree.flush()?;
        }
        Ok(())
    }

    /// Removes `rid`'s key from every B+tree index defined on `table_id`.
    /// Called before the row is removed from the heap.
    pub fn delete_from_indexes(
        &mut self,
        table_id: TableId,
        row: &[types::Value],
        rid: common::RecordId,
    ) -> DbResult<()> {
        for index in self.btree_indexes(table_id)? {
            let path = self.index_path(index.id);
            let mut tree = btree::BTreeIndex::open(&path, index.id)?;
            tree.delete(&Self::index_key(&index, row), rid)?;
            tree.flush()?;
        }
        Ok(())
    }

    /// Moves `rid` from `old_row`'s index entries to `new_row`'s. Indexed
    /// columns that are unchanged still pay a delete+insert; cheap relative
    /// to the WAL fsync this always accompanies.
    pub fn update_indexes(
        &mut self,
        table_id: TableId,
        old_row: &[types::Value],
        new_row: &[types::Value],
        rid: common::RecordId,
    ) -> DbResult<()> {
        for index in self.btree_indexes(table_id)? {
            let path = self.index_path(index.id);
            let mut tree = btree::BTreeIndex::open(&path, index.id)?;
            tree.delete(&Self::index_key(&index, old_row), rid)?;
            tree.insert(Self::index_key(&index, new_row), rid)?;
            tree.flush()?;
        }
        Ok(())
    }
}

/// Lets [`txn::TransactionManager::abort`] drive rollback without knowing
/// about the heap/index layer directly: it just replays the aborting
/// transaction's write set through this impl in reverse order.
///
/// Each undo also appends its own compensating [`WalRecord`] under the
/// aborting transaction's id, tagged with the *same* `txn`, before the
/// terminal `Abort` record is written. A clean abort followed by a crash is
/// then recovered correctly by blind, log-order redo alone: the original
/// pre-abort record replays first, the compensating record right after it,
/// landing the heap back in the rolled-back state with no separate undo pass
/// needed for transactions that finished aborting before the crash.
impl<'a> txn::RollbackApply for ExecutionContext<'a> {
    fn undo_insert(&mut self, table: TableId, rid: common::RecordId) -> DbResult<()> {
        let schema = self.table_schema(table)?;
        let buf = {
            let heap = self.heap_table(table)?;
            heap.get(&self.pool, rid)?
        };
        let values = common::codec::decode_row(&schema, &buf)?;
        self.delete_from_indexes(table, &values, rid)?;
        {
            let mut heap = self.heap_table(table)?;
            heap.abort_insert(&self.pool, rid)?;
        }
        self.log_dml(WalRecord::Delete {
            txn: self.current_txn_id(),
            table,
            rid,
            before_row: values,
        })
    }

    fn undo_delete(&mut self, table: TableId, rid: common::RecordId, before_image: &[Value]) -> DbResult<()> {
        let schema = self.table_schema(table)?;
        let buf = common::codec::encode_row(&schema, before_image)?;
        {
            let mut heap = self.heap_table(table)?;
            heap.abort_delete(&self.pool, rid, &buf)?;
        }
        self.insert_into_indexes(table, before_image, rid)?;
        self.log_dml(WalRecord::Insert {
            txn: self.current_txn_id(),
            table,
            row: before_image.to_vec(),
            rid,
        })
    }

    fn undo_update(&mut self, table: TableId, rid: common::RecordId, before_image: &[Value]) -> DbResult<()> {
        let schema = self.table_schema(table)?;
        let current_buf = {
            let heap = self.heap_table(table)?;
            heap.get(&self.pool, rid)?
        };
        let current_values = common::codec::decode_row(&schema, &current_buf)?;
        let before_buf = common::codec::encode_row(&schema, before_image)?;
        {
            let mut heap = self.heap_table(table)?;
            heap.abort_update(&self.pool, rid, &before_buf)?;
        }
        self.update_indexes(table, &current_values, before_image, rid)?;
        self.log_dml(WalRecord::Update {
            txn: self.current_txn_id(),
            table,
            rid,
            before_row: current_values,
            new_row: before_image.to_vec(),
        })
    }
}

/// Execute a query plan and return all result rows.
///
/// This is the main entry point for executing SELECT queries that return data.
///
/// # Errors
///
/// Returns `DbError::Executor` if execution fails at any stage.
pub fn execute_query(plan: PhysicalPlan, ctx: &mut ExecutionContext) -> DbResult<Vec<Row>> {
    let mut executor = builder::build_executor(plan)?;

    executor.open(ctx)?;

    let mut results = Vec::new();
    while let Some(row) = executor.next(ctx)? {
        results.push(row);
    }

    executor.close(ctx)?;

    Ok(results)
}

/// Execute a DML statement (INSERT/UPDATE/DELETE) and return affected row count.
///
/// DML statements return a single row containing the number of affected rows.
///
/// # Errors
///
/// Returns `DbError::Executor` if execution fails or no result is produced.
pub fn execute_dml(plan: PhysicalPlan, ctx: &mut ExecutionContext) -> DbResult<u64> {
    let mut executor = builder::build_executor(plan)?;

    executor.open(ctx)?;

    let result = executor
        .next(ctx)?
        .ok_or_else(|| DbError::Executor("DML operation returned no result".into()))?;

    executor.close(ctx)?;

    // DML operators return single row with affected count
    match result.values.first() {
        Some(types::Value::Int(count)) => Ok(*count as u64),
        Some(other) => Err(DbError::Executor(format!(
            "DML result count must be integer, got {:?}",
            other
        ))),
        None => Err(DbError::Executor("DML result has no columns".into())),
    }
}

/// Render an operator's `ExecutionStats` for `EXPLAIN ANALYZE` output.
///
/// `label` names the top-level operator the stats belong to (the executor
/// tree is flat at this point, having already been fully drained by the
/// caller). Falls back to a short "no statistics" line for operators that
/// don't implement [`Executor::stats`].
pub fn format_explain_analyze(executor: &dyn Executor, label: &str) -> String {
    match executor.stats() {
        Some(stats) => format!(
            "{label}: rows={} open={} next={} close={} total={}",
            stats.rows_produced,
            common::ExecutionStats::format_duration(stats.open_time),
            common::ExecutionStats::format_duration(stats.total_next_time),
            common::ExecutionStats::format_duration(stats.close_time),
            common::ExecutionStats::format_duration(stats.total_time()),
        ),
        None => format!("{label}: no statistics available"),
    }
}
