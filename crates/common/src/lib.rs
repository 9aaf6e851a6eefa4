
pub mod codec;
pub mod pretty;

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io, path::PathBuf, time::Duration};
use thiserror::Error;
use types::Value;

/// Identifier for a column within a table schema.
pub type ColumnId = u16;

/// Logical identifier for a page in the storage layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

/// Logical identifier for a table registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Fully-qualified identifier for a record within a page (RID).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

/// Monotonically increasing write-ahead-log sequence number.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const INVALID: Lsn = Lsn(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Transaction identifier, assigned monotonically by the transaction manager.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TxnId(pub u32);

impl TxnId {
    pub const INVALID: TxnId = TxnId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// A monotonic logical timestamp, used for MVCC `start_ts`/`commit_ts`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Sentinel meaning "not yet committed".
    pub const INVALID: Timestamp = Timestamp(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Positional row representation backed by `types::Value`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
    #[serde(skip)]
    #[serde(default)]
    rid: Option<RecordId>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, rid: None }
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self::new(values)
    }

    pub fn with_rid(mut self, rid: RecordId) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn set_rid(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Named projection of a row keyed by column name.
pub type RowMap = HashMap<String, Value>;

/// Rectangular result set carrying column labels and rows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Canonical error type shared across database subsystems, covering the full
/// error taxonomy: schema, type, constraint, transactional, IO, and internal.
#[derive(Error, Debug)]
pub enum DbError {
    // --- Schema ---
    #[error("table-not-found: {0}")]
    TableNotFound(String),
    #[error("column-not-found: {0}")]
    ColumnNotFound(String),
    #[error("ambiguous-column: {0}")]
    AmbiguousColumn(String),
    #[error("table-exists: {0}")]
    TableExists(String),
    #[error("index-exists: {0}")]
    IndexExists(String),
    #[error("index-missing: {0}")]
    IndexMissing(String),
    #[error("invalid-value-count: {0}")]
    InvalidValueCount(String),

    // --- Type ---
    #[error("incompatible-type: {0}")]
    IncompatibleType(String),
    #[error("string-overflow: {0}")]
    StringOverflow(String),
    #[error("invalid-datetime-format: {0}")]
    InvalidDatetimeFormat(String),
    #[error("invalid-aggregate: {0}")]
    InvalidAggregate(String),

    // --- Constraint ---
    #[error("duplicate-key: {0}")]
    DuplicateKey(String),

    // --- Transactional ---
    #[error("upgrade-conflict: {0}")]
    UpgradeConflict(String),
    #[error("deadlock-abort: {0}")]
    DeadlockAbort(String),

    // --- IO ---
    #[error("page-not-found: {0}")]
    PageNotFound(String),
    #[error("record-not-found: {0}")]
    RecordNotFound(String),
    #[error("entry-exists: {0}")]
    EntryExists(String),
    #[error("disk-io: {0}")]
    DiskIo(String),
    #[error("file-missing: {0}")]
    FileMissing(String),

    // --- Wider buckets kept for components that wrap a subsystem error ---
    #[error("parse: {0}")]
    Parser(String),
    #[error("plan: {0}")]
    Planner(String),
    #[error("exec: {0}")]
    Executor(String),
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("wal: {0}")]
    Wal(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DbError {
    /// Whether this error kind drives the owning transaction to ABORTED per
    /// the error-propagation policy (transactional and fatal IO/internal
    /// errors; schema/type errors abort only the current statement).
    pub fn is_transaction_fatal(&self) -> bool {
        matches!(
            self,
            DbError::UpgradeConflict(_)
                | DbError::DeadlockAbort(_)
                | DbError::Internal(_)
                | DbError::DiskIo(_)
                | DbError::Io(_)
        )
    }
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Buffer pool page replacement policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacerPolicy {
    Clock,
    Lru,
}

impl Default for ReplacerPolicy {
    fn default() -> Self {
        ReplacerPolicy::Clock
    }
}

/// Runtime configuration for the database components.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(8192)
///     .buffer_pool_pages(512)
///     .wal_enabled(true)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where table data, catalog metadata, and WAL files live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed-size page allocation in bytes.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Number of pages the buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
    /// Controls whether the write-ahead log is enabled.
    #[builder(default = true)]
    pub wal_enabled: bool,
    /// Buffer pool eviction policy.
    #[builder(default)]
    pub replacer_policy: ReplacerPolicy,
    /// Whether MVCC (hidden txn-id column + version chains) is enabled.
    /// When false, the engine runs strict 2PL with in-place updates.
    #[builder(default = false)]
    pub mvcc_enabled: bool,
    /// Size in bytes of each of the log manager's two staging buffers.
    #[builder(default = 1 << 20)]
    pub log_buffer_size: usize,
    /// Background log-flusher wakeup interval.
    #[builder(default = Duration::from_millis(10))]
    pub log_flush_interval: Duration,
    /// Interval between automatic checkpoints.
    #[builder(default = Duration::from_secs(60))]
    pub checkpoint_interval: Duration,
    /// Interval between MVCC watermark garbage-collection sweeps.
    #[builder(default = Duration::from_millis(500))]
    pub gc_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 4096,
            buffer_pool_pages: 256,
            wal_enabled: true,
            replacer_policy: ReplacerPolicy::Clock,
            mvcc_enabled: false,
            log_buffer_size: 1 << 20,
            log_flush_interval: Duration::from_millis(10),
            checkpoint_interval: Duration::from_secs(60),
            gc_interval: Duration::from_millis(500),
        }
    }
}

/// Execution statistics collected during query execution for EXPLAIN ANALYZE.
#[derive(Clone, Debug, Default)]
pub struct ExecutionStats {
    /// Time spent in open() method
    pub open_time: Duration,
    /// Cumulative time spent across all next() calls
    pub total_next_time: Duration,
    /// Time spent in close() method
    pub close_time: Duration,
    /// Number of rows returned by this operator
    pub rows_produced: u64,
    /// Number of rows filtered out (FilterExec only)
    pub rows_filtered: u64,
    /// Number of pages scanned (SeqScan only)
    pub pages_scanned: u64,
}

impl ExecutionStats {
    /// Returns total execution time (open + next + close)
    pub fn total_time(&self) -> Duration {
        self.open_time + self.total_next_time + self.close_time
    }

    /// Formats duration in human-readable form (e.g., "123.45ms", "1.234s")
    pub fn format_duration(d: Duration) -> String {
        let micros = d.as_micros();
        if micros < 1000 {
            format!("{micros}µs")
        } else if micros < 1_000_000 {
            format!("{:.2}ms", micros as f64 / 1000.0)
        } else {
            format!("{:.3}s", micros as f64 / 1_000_000.0)
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        Config, DbError, DbResult, ExecutionStats, Lsn, RecordBatch, ReplacerPolicy, Row, RowMap,
        Timestamp, TxnId,
    };
    pub use types::{SqlType, Value};
}
