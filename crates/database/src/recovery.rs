//! Crash recovery: analysis, redo, and undo over the write-ahead log.
//!
//! The WAL (see the `wal` crate) tags every DML record with the id of the
//! transaction that produced it and carries `Begin`/`Commit`/`Abort`
//! boundary records, plus a before-image on every `Update`/`Delete`. Startup
//! recovery follows the familiar three-pass shape:
//!
//! 1. **Analysis** — scan the log once to find every transaction that has a
//!    `Begin` but no later `Commit` or `Abort`. These are the "losers": work
//!    that was in flight when the process died and must not survive.
//! 2. **Redo** — replay every logged `Insert`/`Update`/`Delete` into the heap
//!    files, unconditionally and in log order, regardless of which
//!    transaction wrote it or whether that transaction committed. This is
//!    safe because a transaction that aborted cleanly before the crash has
//!    already had its compensating actions appended to the log under its own
//!    id (see `executor::RollbackApply`) — replaying the original record and
//!    then its compensating record reconstructs the post-abort state exactly.
//!    Each record names the exact RID it affected, so redoing an
//!    already-durable write is a no-op (`HeapFile::insert_at`/`update` write
//!    the same bytes at the same slot; `delete` on an already-clear slot is
//!    tolerated).
//! 3. **Undo** — for losers only, walk their writes in reverse log order and
//!    restore the logged before-image, using the same compensating
//!    operations the live abort path uses. A loser never had a chance to
//!    write an `Abort` record, so there is no compensating log entry for
//!    Redo to have replayed; Undo is what makes its writes disappear.
//!
//! Afterward, every table's B+tree index files are rebuilt from the
//! recovered heap, since index pages carry no WAL protection of their own
//! and may not have reached disk before the crash.
//!
//! DDL (`CreateTable`/`DropTable`) records are logged only after the catalog
//! has already been saved to disk, so the catalog loaded at startup is
//! authoritative; recovery does not replay schema changes. A record naming a
//! table no longer present in the catalog (dropped after being logged) is
//! skipped.

use buffer::{heap::HeapFile, BufferPoolManager};
use catalog::{IndexMeta, TableMeta};
use common::{codec, DbResult, PageId, RecordId, TableId, TxnId};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use types::{SqlType, Value};
use wal::{Wal, WalRecord};

/// A single transaction's write, as needed by the undo pass: which table and
/// record it touched, and the pre-write image to restore.
enum LoserWrite {
    Insert { table: TableId, rid: RecordId },
    Update { table: TableId, rid: RecordId, before_row: Vec<Value> },
    Delete { table: TableId, rid: RecordId, before_row: Vec<Value> },
}

pub fn recover(
    catalog: &mut catalog::Catalog,
    pool: &Arc<BufferPoolManager>,
    data_dir: &Path,
    wal_path: &Path,
) -> DbResult<()> {
    let records = Wal::replay(wal_path)?;
    if records.is_empty() {
        return Ok(());
    }

    let losers = analyze(&records);

    // Redo: blindly replay every DML record in log order.
    for record in &records {
        match record {
            WalRecord::Insert { table, row, rid, .. } => {
                redo_insert(catalog, pool, data_dir, *table, *rid, row)?;
            }
            WalRecord::Update { table, rid, new_row, .. } => {
                redo_update(catalog, pool, data_dir, *table, *rid, new_row)?;
            }
            WalRecord::Delete { table, rid, .. } => {
                redo_delete(catalog, pool, data_dir, *table, *rid)?;
            }
            WalRecord::Begin { .. }
            | WalRecord::Commit { .. }
            | WalRecord::Abort { .. }
            | WalRecord::CreateTable { .. }
            | WalRecord::DropTable { .. } => {}
        }
    }

    // Undo: for loser transactions only, reverse their writes in
    // last-written-first order using the logged before-images.
    if !losers.is_empty() {
        let mut loser_writes: HashMap<TxnId, Vec<LoserWrite>> = HashMap::new();
        for record in &records {
            let Some(txn) = record.txn() else { continue };
            if !losers.contains(&txn) {
                continue;
            }
            let write = match record {
                WalRecord::Insert { table, rid, .. } => Some(LoserWrite::Insert {
                    table: *table,
                    rid: *rid,
                }),
                WalRecord::Update {
                    table,
                    rid,
                    before_row,
                    ..
                } => Some(LoserWrite::Update {
                    table: *table,
                    rid: *rid,
                    before_row: before_row.clone(),
                }),
                WalRecord::Delete {
                    table,
                    rid,
                    before_row,
                    ..
                } => Some(LoserWrite::Delete {
                    table: *table,
                    rid: *rid,
                    before_row: before_row.clone(),
                }),
                WalRecord::Begin { .. } | WalRecord::Commit { .. } | WalRecord::Abort { .. } => {
                    None
                }
                WalRecord::CreateTable { .. } | WalRecord::DropTable { .. } => None,
            };
            if let Some(write) = write {
                loser_writes.entry(txn).or_default().push(write);
            }
        }

        for (_txn, writes) in loser_writes {
            for write in writes.into_iter().rev() {
                match write {
                    LoserWrite::Insert { table, rid } => {
                        undo_insert(catalog, pool, data_dir, table, rid)?;
                    }
                    LoserWrite::Update { table, rid, before_row } => {
                        undo_update(catalog, pool, data_dir, table, rid, &before_row)?;
                    }
                    LoserWrite::Delete { table, rid, before_row } => {
                        undo_delete(catalog, pool, data_dir, table, rid, &before_row)?;
                    }
                }
            }
        }
    }

    rebuild_all_indexes(catalog, pool, data_dir)
}

/// Finds every transaction with a logged `Begin` but no later `Commit` or
/// `Abort`: work that was still in flight when the process crashed.
fn analyze(records: &[WalRecord]) -> HashSet<TxnId> {
    let mut open = HashSet::new();
    for record in records {
        match record {
            WalRecord::Begin { txn } => {
                open.insert(*txn);
            }
            WalRecord::Commit { txn } | WalRecord::Abort { txn } => {
                open.remove(txn);
            }
            _ => {}
        }
    }
    open
}

fn table_schema(table: &TableMeta) -> Vec<SqlType> {
    table.schema.columns.iter().map(|c| c.ty.clone()).collect()
}

/// Opens (creating if absent) the heap file backing `table_id`, or `None`
/// if the table no longer exists in the catalog.
fn open_heap(
    catalog: &catalog::Catalog,
    pool: &Arc<BufferPoolManager>,
    data_dir: &Path,
    table_id: common::TableId,
) -> DbResult<Option<HeapFile>> {
    let Ok(table) = catalog.table_by_id(table_id) else {
        return Ok(None);
    };
    let file_name = format!("{}.heap", table.name);
    let heap = if data_dir.join(&file_name).exists() {
        HeapFile::open(pool, &file_name)?
    } else {
        let record_size = codec::record_size(&table_schema(table));
        HeapFile::create(pool, &file_name, record_size)?
    };
    Ok(Some(heap))
}

fn redo_insert(
    catalog: &catalog::Catalog,
    pool: &Arc<BufferPoolManager>,
    data_dir: &Path,
    table_id: common::TableId,
    rid: RecordId,
    row: &[Value],
) -> DbResult<()> {
    let Some(mut heap) = open_heap(catalog, pool, data_dir, table_id)? else {
        return Ok(());
    };
    let table = catalog.table_by_id(table_id)?;
    let buf = codec::encode_row(&table_schema(table), row)?;
    heap.insert_at(pool, rid, &buf)
}

fn redo_update(
    catalog: &catalog::Catalog,
    pool: &Arc<BufferPoolManager>,
    data_dir: &Path,
    table_id: common::TableId,
    rid: RecordId,
    new_row: &[Value],
) -> DbResult<()> {
    let Some(mut heap) = open_heap(catalog, pool, data_dir, table_id)? else {
        return Ok(());
    };
    let table = catalog.table_by_id(table_id)?;
    let buf = codec::encode_row(&table_schema(table), new_row)?;
    // The record may not exist yet if this Update races ahead of its
    // Insert counterpart during redo (it never should, since the WAL is
    // append-ordered) — insert_at is the idempotent, slot-exact primitive
    // both operations ultimately need.
    heap.insert_at(pool, rid, &buf)
}

fn redo_delete(
    catalog: &catalog::Catalog,
    pool: &Arc<BufferPoolManager>,
    data_dir: &Path,
    table_id: common::TableId,
    rid: RecordId,
) -> DbResult<()> {
    let Some(mut heap) = open_heap(catalog, pool, data_dir, table_id)? else {
        return Ok(());
    };
    if heap.is_record(pool, rid)? {
        heap.delete(pool, rid)?;
    }
    Ok(())
}

/// Undoes a loser's insert: the record Redo just (re)created is removed.
fn undo_insert(
    catalog: &catalog::Catalog,
    pool: &Arc<BufferPoolManager>,
    data_dir: &Path,
    table_id: common::TableId,
    rid: RecordId,
) -> DbResult<()> {
    let Some(mut heap) = open_heap(catalog, pool, data_dir, table_id)? else {
        return Ok(());
    };
    if heap.is_record(pool, rid)? {
        heap.delete(pool, rid)?;
    }
    Ok(())
}

/// Undoes a loser's update: the slot is restored to its pre-update image.
fn undo_update(
    catalog: &catalog::Catalog,
    pool: &Arc<BufferPoolManager>,
    data_dir: &Path,
    table_id: common::TableId,
    rid: RecordId,
    before_row: &[Value],
) -> DbResult<()> {
    let Some(mut heap) = open_heap(catalog, pool, data_dir, table_id)? else {
        return Ok(());
    };
    let table = catalog.table_by_id(table_id)?;
    let buf = codec::encode_row(&table_schema(table), before_row)?;
    heap.insert_at(pool, rid, &buf)
}

/// Undoes a loser's delete: the slot is recreated with the deleted row's
/// before-image so the record exists again.
fn undo_delete(
    catalog: &catalog::Catalog,
    pool: &Arc<BufferPoolManager>,
    data_dir: &Path,
    table_id: common::TableId,
    rid: RecordId,
    before_row: &[Value],
) -> DbResult<()> {
    let Some(mut heap) = open_heap(catalog, pool, data_dir, table_id)? else {
        return Ok(());
    };
    let table = catalog.table_by_id(table_id)?;
    let buf = codec::encode_row(&table_schema(table), before_row)?;
    heap.insert_at(pool, rid, &buf)
}

fn rebuild_all_indexes(
    catalog: &catalog::Catalog,
    pool: &Arc<BufferPoolManager>,
    data_dir: &Path,
) -> DbResult<()> {
    for table in catalog.tables() {
        for index in table.indexes() {
            rebuild_index(table, index, pool, data_dir)?;
        }
    }
    Ok(())
}

/// (Re)builds a single B+tree index file from scratch by scanning the
/// table's current heap contents. Shared by crash recovery and `CREATE
/// INDEX`, both of which need an index file that reflects the heap exactly.
pub fn rebuild_index(
    table: &TableMeta,
    index: &IndexMeta,
    pool: &Arc<BufferPoolManager>,
    data_dir: &Path,
) -> DbResult<()> {
    let index_path = data_dir.join(format!("index_{}.idx", index.id.0));
    let mut btree = btree::BTreeIndex::create(&index_path, index.id)?;

    let heap_file_name = format!("{}.heap", table.name);
    if !data_dir.join(&heap_file_name).exists() {
        return btree.flush();
    }

    let schema = table_schema(table);
    let heap = HeapFile::open(pool, &heap_file_name)?;
    let key_ordinal = index.columns[0] as usize;

    let mut page_no = heap.first_data_page();
    let last_page = heap.num_pages();
    while page_no < last_page {
        for (buf, slot) in heap.get_page(pool, page_no)? {
            let values = codec::decode_row(&schema, &buf)?;
            let rid = RecordId {
                page_id: PageId(page_no as u64),
                slot,
            };
            btree.insert(vec![values[key_ordinal].clone()], rid)?;
        }
        page_no += 1;
    }

    btree.flush()
}
