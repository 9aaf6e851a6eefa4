//! MVCC version chains: the hidden per-row header, the undo log they unwind
//! through, and the background reclaimer that walks it past the watermark.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use common::{DbResult, RecordId, TableId, Timestamp, TxnId};
use types::Value;

/// Packs a row's hidden 4-byte header: the low 31 bits are the writer's txn
/// id, the high bit is the delete-tombstone flag.
pub fn pack_header(writer: TxnId, tombstone: bool) -> [u8; 4] {
    let mut bits = writer.0 & 0x7fff_ffff;
    if tombstone {
        bits |= 0x8000_0000;
    }
    bits.to_le_bytes()
}

/// Inverse of [`pack_header`].
pub fn unpack_header(bytes: [u8; 4]) -> (TxnId, bool) {
    let bits = u32::from_le_bytes(bytes);
    (TxnId(bits & 0x7fff_ffff), bits & 0x8000_0000 != 0)
}

/// One entry of a row's undo chain: the image the row held before `writer`
/// overwrote it, and the timestamp at which that overwrite became visible
/// (`INVALID` while `writer` is still live).
#[derive(Clone, Debug)]
pub struct UndoEntry {
    pub before_image: Vec<Value>,
    pub writer: TxnId,
    pub writer_commit_ts: Timestamp,
}

/// Per-`(table, rid)` chains of undo entries, newest first. Readers walk a
/// chain to find the first pre-image visible to their start_ts; the
/// background cleaner truncates entries older than the watermark.
pub struct UndoLog {
    chains: Mutex<HashMap<(TableId, RecordId), VecDeque<UndoEntry>>>,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoLog {
    pub fn new() -> Self {
        Self {
            chains: Mutex::new(HashMap::new()),
        }
    }

    /// Pushes a new (newest) undo entry onto the row's chain.
    pub fn push(&self, table: TableId, rid: RecordId, entry: UndoEntry) {
        self.chains
            .lock()
            .unwrap()
            .entry((table, rid))
            .or_default()
            .push_front(entry);
    }

    /// Marks the most-recently-pushed entry as committed, so future readers
    /// can use its `writer_commit_ts` in the visibility test.
    pub fn mark_committed(&self, table: TableId, rid: RecordId, writer: TxnId, commit_ts: Timestamp) {
        let mut chains = self.chains.lock().unwrap();
        if let Some(chain) = chains.get_mut(&(table, rid)) {
            if let Some(entry) = chain.iter_mut().find(|e| e.writer == writer && !e.writer_commit_ts.is_valid()) {
                entry.writer_commit_ts = commit_ts;
            }
        }
    }

    /// Walks the chain for `(table, rid)` to find the first pre-image
    /// visible to a reader with the given `start_ts`, per the visibility
    /// test in §4.8.
    pub fn visible_before_image(
        &self,
        table: TableId,
        rid: RecordId,
        reader: TxnId,
        reader_start_ts: Timestamp,
    ) -> Option<Vec<Value>> {
        let chains = self.chains.lock().unwrap();
        let chain = chains.get(&(table, rid))?;
        chain
            .iter()
            .find(|e| {
                e.writer == reader
                    || (e.writer_commit_ts.is_valid() && e.writer_commit_ts.0 <= reader_start_ts.0)
            })
            .map(|e| e.before_image.clone())
    }

    /// Drops chain entries committed strictly before `watermark`: no live
    /// reader can still need them.
    pub fn truncate_before(&self, watermark: Timestamp) {
        let mut chains = self.chains.lock().unwrap();
        for chain in chains.values_mut() {
            chain.retain(|e| !e.writer_commit_ts.is_valid() || e.writer_commit_ts.0 >= watermark.0);
        }
        chains.retain(|_, chain| !chain.is_empty());
    }

    pub fn forget(&self, table: TableId, rid: RecordId) {
        self.chains.lock().unwrap().remove(&(table, rid));
    }
}

/// Driven by the background MVCC cleaner: finds tombstoned rows whose writer
/// committed before the watermark and physically reclaims them, mirroring
/// the bounded round-robin page cleaner described for this engine family.
pub trait MvccReclaimer: Send + Sync {
    fn tombstoned_older_than(&self, watermark: Timestamp) -> Vec<(TableId, RecordId)>;
    fn reclaim(&self, table: TableId, rid: RecordId) -> DbResult<()>;
}

/// Spawns a thread that wakes every `interval`, asks `reclaimer` for rows
/// whose tombstone is safely unreachable by any live reader below
/// `watermark_fn()`, and physically reclaims a bounded batch of them so a
/// single wakeup never stalls on an unbounded table scan.
pub fn spawn_gc_thread<W>(
    reclaimer: std::sync::Arc<dyn MvccReclaimer>,
    watermark_fn: W,
    interval: Duration,
    max_per_wakeup: usize,
) -> std::thread::JoinHandle<()>
where
    W: Fn() -> Timestamp + Send + 'static,
{
    std::thread::spawn(move || loop {
        std::thread::sleep(interval);
        let watermark = watermark_fn();
        let candidates = reclaimer.tombstoned_older_than(watermark);
        for (table, rid) in candidates.into_iter().take(max_per_wakeup) {
            if let Err(err) = reclaimer.reclaim(table, rid) {
                tracing::warn!(?err, "mvcc reclaim failed");
            }
        }
    })
}
