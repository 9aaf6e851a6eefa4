//! Transaction Manager: txn lifecycle, write-set rollback, and an optional
//! MVCC layer (version chains, visibility, watermark-driven GC).
//!
//! Recovery (replaying the log on startup) is not implemented by this crate;
//! it is driven by `wal::Wal::replay` and applied through the same
//! `RollbackApply` surface this crate defines for abort-time undo, since both
//! need to turn a past write back into heap/index mutations.


pub mod mvcc;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use common::{DbError, DbResult, RecordId, TableId, Timestamp, TxnId};
use lock::LockManager;
use types::Value;

pub use mvcc::{pack_header, unpack_header, MvccReclaimer, UndoEntry, UndoLog};

/// Lifecycle state of a transaction, per §4.8.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnStatus {
    Growing,
    Committed,
    Aborted,
}

/// One entry of a transaction's write set, kept so `abort` can undo it.
///
/// Processed in reverse at abort time: INSERT -> delete row + index entries,
/// DELETE -> reinsert row + index entries, UPDATE -> overwrite with the
/// pre-image.
#[derive(Clone, Debug)]
pub enum WriteRecord {
    Insert {
        table: TableId,
        rid: RecordId,
    },
    Delete {
        table: TableId,
        rid: RecordId,
        before_image: Vec<Value>,
    },
    Update {
        table: TableId,
        rid: RecordId,
        before_image: Vec<Value>,
    },
}

/// Implemented by the executor layer so the transaction manager can drive
/// abort-time undo (and WAL-replay undo) without depending on heap/index
/// storage directly.
pub trait RollbackApply {
    fn undo_insert(&mut self, table: TableId, rid: RecordId) -> DbResult<()>;
    fn undo_delete(&mut self, table: TableId, rid: RecordId, before_image: &[Value]) -> DbResult<()>;
    fn undo_update(&mut self, table: TableId, rid: RecordId, before_image: &[Value]) -> DbResult<()>;
}

/// A single transaction's state.
pub struct Transaction {
    pub id: TxnId,
    pub start_ts: Timestamp,
    commit_ts: AtomicU64,
    status: Mutex<TxnStatus>,
    write_set: Mutex<Vec<WriteRecord>>,
}

impl Transaction {
    fn new(id: TxnId, start_ts: Timestamp) -> Self {
        Self {
            id,
            start_ts,
            commit_ts: AtomicU64::new(Timestamp::INVALID.0),
            status: Mutex::new(TxnStatus::Growing),
            write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn status(&self) -> TxnStatus {
        *self.status.lock().unwrap()
    }

    pub fn commit_ts(&self) -> Timestamp {
        Timestamp(self.commit_ts.load(Ordering::SeqCst))
    }

    /// Whether this transaction is still live (not committed or aborted) from
    /// the point of view of the visibility test.
    pub fn is_live(&self) -> bool {
        matches!(self.status(), TxnStatus::Growing)
    }

    /// Record a write for rollback. Intended to be called by the executor
    /// immediately after a successful heap/index mutation.
    pub fn record_write(&self, record: WriteRecord) {
        self.write_set.lock().unwrap().push(record);
    }
}

/// Issues transaction ids and timestamps, tracks the live transaction table,
/// and (optionally) runs an MVCC layer over it, per §4.8.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    next_ts: AtomicU64,
    txns: RwLock<HashMap<TxnId, Arc<Transaction>>>,
    locks: Arc<LockManager>,
    pub mvcc_enabled: bool,
    pub undo: UndoLog,
}

impl TransactionManager {
    pub fn new(locks: Arc<LockManager>, mvcc_enabled: bool) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            next_ts: AtomicU64::new(1),
            txns: RwLock::new(HashMap::new()),
            locks,
            mvcc_enabled,
            undo: UndoLog::new(),
        }
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    fn alloc_ts(&self) -> Timestamp {
        Timestamp(self.next_ts.fetch_add(1, Ordering::SeqCst))
    }

    /// Begins a new transaction, assigning it an id and a start timestamp.
    #[tracing::instrument(skip(self))]
    pub fn begin(&self) -> Arc<Transaction> {
        let id = TxnId(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        let start_ts = self.alloc_ts();
        let txn = Arc::new(Transaction::new(id, start_ts));
        self.txns.write().unwrap().insert(id, txn.clone());
        tracing::debug!(txn = id.0, start_ts = start_ts.0, "transaction begun");
        txn
    }

    pub fn get(&self, id: TxnId) -> Option<Arc<Transaction>> {
        self.txns.read().unwrap().get(&id).cloned()
    }

    /// Commits `txn`: assigns a commit timestamp, releases locks, marks
    /// COMMITTED, and drops it from the live table. The caller is
    /// responsible for flushing the WAL commit record before calling this,
    /// per the durable-commit ordering guarantee in §5.
    #[tracing::instrument(skip(self, txn), fields(txn = txn.id.0))]
    pub fn commit(&self, txn: &Arc<Transaction>) {
        let commit_ts = self.alloc_ts();
        txn.commit_ts.store(commit_ts.0, Ordering::SeqCst);
        *txn.status.lock().unwrap() = TxnStatus::Committed;
        self.locks.release_all(txn.id);
        self.txns.write().unwrap().remove(&txn.id);
        tracing::debug!(commit_ts = commit_ts.0, "transaction committed");
    }

    /// Aborts `txn`: replays its write set in reverse through `applier`,
    /// releases locks, marks ABORTED, and drops it from the live table.
    #[tracing::instrument(skip(self, txn, applier), fields(txn = txn.id.0))]
    pub fn abort(&self, txn: &Arc<Transaction>, applier: &mut dyn RollbackApply) -> DbResult<()> {
        let records = {
            let mut write_set = txn.write_set.lock().unwrap();
            std::mem::take(&mut *write_set)
        };
        for record in records.into_iter().rev() {
            match record {
                WriteRecord::Insert { table, rid } => applier.undo_insert(table, rid)?,
                WriteRecord::Delete { table, rid, before_image } => {
                    applier.undo_delete(table, rid, &before_image)?
                }
                WriteRecord::Update { table, rid, before_image } => {
                    applier.undo_update(table, rid, &before_image)?
                }
            }
        }
        *txn.status.lock().unwrap() = TxnStatus::Aborted;
        self.locks.release_all(txn.id);
        self.txns.write().unwrap().remove(&txn.id);
        tracing::debug!("transaction aborted");
        Ok(())
    }

    /// The minimum start_ts among live transactions, or the next timestamp
    /// to be allocated if none are live. Versions committed strictly before
    /// the watermark are no longer visible to any live reader and may be
    /// reclaimed.
    pub fn watermark(&self) -> Timestamp {
        let txns = self.txns.read().unwrap();
        txns.values()
            .map(|t| t.start_ts)
            .min()
            .unwrap_or_else(|| Timestamp(self.next_ts.load(Ordering::SeqCst)))
    }

    /// MVCC visibility test (§4.8): a row written by `writer` with
    /// `writer_commit_ts` is visible to `reader` iff the writer is the
    /// reader itself, or the writer committed at or before the reader's
    /// start_ts.
    pub fn is_visible(&self, reader: &Transaction, writer: TxnId, writer_commit_ts: Timestamp) -> bool {
        if writer == reader.id {
            return true;
        }
        writer_commit_ts.is_valid() && writer_commit_ts.0 <= reader.start_ts.0
    }

    /// Write-conflict check (§4.8): a writer `reader` touching a row most
    /// recently tagged by `writer` aborts with `upgrade-conflict` when the
    /// tagging transaction is still live, or committed after `reader`
    /// started.
    pub fn check_write_conflict(
        &self,
        reader: &Transaction,
        writer: TxnId,
        writer_status: TxnStatus,
        writer_commit_ts: Timestamp,
    ) -> DbResult<()> {
        if writer == reader.id {
            return Ok(());
        }
        let conflicts = match writer_status {
            TxnStatus::Growing => true,
            TxnStatus::Committed => writer_commit_ts.0 > reader.start_ts.0,
            TxnStatus::Aborted => false,
        };
        if conflicts {
            return Err(DbError::UpgradeConflict(format!(
                "row last written by live/newer txn {}",
                writer.0
            )));
        }
        Ok(())
    }
}
