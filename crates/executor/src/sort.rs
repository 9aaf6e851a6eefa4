//! Sort operator: external merge sort over ORDER BY keys.
//!
//! Rows are consumed into memory-sized runs; each run is sorted in place
//! and, once more than one run has been produced, spilled to a temp file
//! named after the owning transaction. The spilled runs are then merged
//! through a k-way min-heap. A single run that never crosses the spill
//! threshold is served directly from memory without touching disk.

use crate::{ExecutionContext, Executor};
use common::{ColumnId, DbError, DbResult, ExecutionStats, Row};
use planner::SortDirection;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;
use types::Value;

/// Row count threshold above which a run is spilled to a temp file instead
/// of being kept resident for the whole sort.
const RUN_SIZE: usize = 1000;

/// Resolved ORDER BY clause with column ID and direction.
#[derive(Clone, Debug)]
pub struct SortKey {
    pub column_id: ColumnId,
    pub direction: SortDirection,
}

/// Sort operator - orders rows from its input according to `sort_keys`.
///
/// Blocking: the first call to `next()` drains the input entirely before
/// any row is returned. Ties between rows are broken by preserving the
/// input's relative order (stable sort), both for the in-memory path and
/// across the k-way merge of spilled runs.
pub struct SortExec {
    input: Box<dyn Executor>,
    sort_keys: Vec<SortKey>,
    sorted_rows: Option<Vec<Row>>,
    current_index: usize,
    stats: ExecutionStats,
}

impl SortExec {
    /// Create a new sort operator.
    pub fn new(input: Box<dyn Executor>, sort_keys: Vec<SortKey>) -> Self {
        Self {
            input,
            sort_keys,
            sorted_rows: None,
            current_index: 0,
            stats: ExecutionStats::default(),
        }
    }

    fn spill_run(&self, ctx: &ExecutionContext, run_path: &Path, rows: &[Row]) -> DbResult<()> {
        let file = File::create(run_path).map_err(DbError::Io)?;
        let mut writer = BufWriter::new(file);
        for row in rows {
            let bytes = bincode::serialize(row)
                .map_err(|e| DbError::Executor(format!("sort run encode: {e}")))?;
            writer
                .write_all(&(bytes.len() as u32).to_le_bytes())
                .map_err(DbError::Io)?;
            writer.write_all(&bytes).map_err(DbError::Io)?;
        }
        writer.flush().map_err(DbError::Io)?;
        let _ = ctx;
        Ok(())
    }

    /// Drain the input into sorted runs, spilling to disk once a second run
    /// is needed, then merge. Sets `self.sorted_rows`.
    fn materialize_and_sort(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let txn_id = ctx.current_txn_id();
        let mut run_paths: Vec<PathBuf> = Vec::new();
        let mut buffer: Vec<Row> = Vec::new();
        let mut run_idx: u64 = 0;
        let mut spilled = false;

        while let Some(row) = self.input.next(ctx)? {
            buffer.push(row);
            if buffer.len() >= RUN_SIZE {
                spilled = true;
                buffer.sort_by(|a, b| compare_rows(a, b, &self.sort_keys));
                let path = ctx
                    .data_dir
                    .join(format!("sort_txn{}_run{run_idx}.tmp", txn_id.0));
                self.spill_run(ctx, &path, &buffer)?;
                run_paths.push(path);
                run_idx += 1;
                buffer.clear();
            }
        }

        if !spilled {
            buffer.sort_by(|a, b| compare_rows(a, b, &self.sort_keys));
            self.sorted_rows = Some(buffer);
            self.current_index = 0;
            return Ok(());
        }

        if !buffer.is_empty() {
            buffer.sort_by(|a, b| compare_rows(a, b, &self.sort_keys));
            let path = ctx
                .data_dir
                .join(format!("sort_txn{}_run{run_idx}.tmp", txn_id.0));
            self.spill_run(ctx, &path, &buffer)?;
            run_paths.push(path);
        }

        let merged = merge_runs(&run_paths, &self.sort_keys)?;
        for path in &run_paths {
            let _ = std::fs::remove_file(path);
        }

        self.sorted_rows = Some(merged);
        self.current_index = 0;
        Ok(())
    }
}

impl Executor for SortExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.stats = ExecutionStats::default();
        self.sorted_rows = None;
        self.current_index = 0;
        self.input.open(ctx)?;
        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let start = Instant::now();

        if self.sorted_rows.is_none() {
            self.materialize_and_sort(ctx)?;
        }

        let result = match &self.sorted_rows {
            Some(rows) => {
                if self.current_index < rows.len() {
                    let row = rows[self.current_index].clone();
                    self.current_index += 1;
                    self.stats.rows_produced += 1;
                    Ok(Some(row))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        };

        self.stats.total_next_time += start.elapsed();
        result
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.sorted_rows = None;
        self.input.close(ctx)?;
        self.stats.close_time = start.elapsed();
        Ok(())
    }

    fn schema(&self) -> &[String] {
        self.input.schema()
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}

/// Sequential reader over one spilled run file.
struct RunReader {
    reader: BufReader<File>,
}

impl RunReader {
    fn open(path: &Path) -> DbResult<Self> {
        let file = File::open(path).map_err(DbError::Io)?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }

    /// Reads the next row, or `None` at EOF.
    fn next_row(&mut self) -> DbResult<Option<Row>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(DbError::Io(e)),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).map_err(DbError::Io)?;
        let row: Row = bincode::deserialize(&buf)
            .map_err(|e| DbError::Executor(format!("sort run decode: {e}")))?;
        Ok(Some(row))
    }
}

/// One run's current head row plus its source index, ordered by the sort
/// keys so a `BinaryHeap` (a max-heap) can be driven as a min-heap via a
/// reversed `Ord`.
struct HeapEntry {
    row: Row,
    run: usize,
    sort_keys: Rc<Vec<SortKey>>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap::pop` yields the row that sorts first.
        compare_rows(&self.row, &other.row, &self.sort_keys)
            .reverse()
            .then_with(|| other.run.cmp(&self.run))
    }
}

fn merge_runs(paths: &[PathBuf], sort_keys: &[SortKey]) -> DbResult<Vec<Row>> {
    let sort_keys = Rc::new(sort_keys.to_vec());
    let mut readers: Vec<RunReader> = paths
        .iter()
        .map(|p| RunReader::open(p))
        .collect::<DbResult<_>>()?;

    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
    for (idx, reader) in readers.iter_mut().enumerate() {
        if let Some(row) = reader.next_row()? {
            heap.push(HeapEntry {
                row,
                run: idx,
                sort_keys: Rc::clone(&sort_keys),
            });
        }
    }

    let mut out = Vec::new();
    while let Some(entry) = heap.pop() {
        let HeapEntry { row, run, .. } = entry;
        out.push(row);
        if let Some(next_row) = readers[run].next_row()? {
            heap.push(HeapEntry {
                row: next_row,
                run,
                sort_keys: Rc::clone(&sort_keys),
            });
        }
    }

    Ok(out)
}

/// Compare two rows based on sort keys, with stable (index-preserving)
/// behavior left to the caller's sort algorithm for equal keys.
fn compare_rows(a: &Row, b: &Row, sort_keys: &[SortKey]) -> Ordering {
    for key in sort_keys {
        let col_idx = key.column_id as usize;

        let val_a = a.values.get(col_idx);
        let val_b = b.values.get(col_idx);

        let ordering = match (val_a, val_b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a_val), Some(b_val)) => compare_values(a_val, b_val),
        };

        let directed_ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        if directed_ordering != Ordering::Equal {
            return directed_ordering;
        }
    }

    Ordering::Equal
}

/// Compare two values for sorting, matching the data model's cross-type
/// INT/FLOAT promotion rule (`Value::cmp_numeric`) and falling back to a
/// fixed type-precedence order (`Null < Bool < Int/Float < Text < Datetime`)
/// for any other type mismatch so sorting never panics on heterogeneous
/// input.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,

        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.cmp_numeric(b).unwrap_or(Ordering::Equal)
        }

        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Datetime(x), Value::Datetime(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),

        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Text(_) => 3,
        Value::Datetime(_) => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{assert_exhausted, create_test_catalog, MockExecutor};
    use testsupport::prelude::*;

    fn setup() -> (ExecutionContext<'static>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let catalog = Box::leak(Box::new(create_test_catalog()));
        let disk = storage::DiskManager::new(temp_dir.path()).unwrap();
        let pool = buffer::BufferPoolManager::new(disk, 10, common::ReplacerPolicy::Clock);
        let wal = Box::leak(Box::new(wal::Wal::open(temp_dir.path().join("test.wal")).unwrap()));
        (
            ExecutionContext::new(catalog, pool, wal, temp_dir.path().into()),
            temp_dir,
        )
    }

    #[test]
    fn sorts_ascending_in_memory() {
        let rows = vec![int_row(&[5]), int_row(&[1]), int_row(&[3])];
        let input = Box::new(MockExecutor::new(rows, vec!["a".into()]));
        let mut sort = SortExec::new(
            input,
            vec![SortKey {
                column_id: 0,
                direction: SortDirection::Asc,
            }],
        );

        let (mut ctx, _tmp) = setup();
        sort.open(&mut ctx).unwrap();
        assert_eq!(sort.next(&mut ctx).unwrap(), Some(int_row(&[1])));
        assert_eq!(sort.next(&mut ctx).unwrap(), Some(int_row(&[3])));
        assert_eq!(sort.next(&mut ctx).unwrap(), Some(int_row(&[5])));
        assert_exhausted(&mut sort, &mut ctx);
        sort.close(&mut ctx).unwrap();
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        // Two rows share key 5; insertion order (tagged by column 1) must survive.
        let rows = vec![int_row(&[5, 1]), int_row(&[1, 2]), int_row(&[5, 3])];
        let input = Box::new(MockExecutor::new(rows, vec!["a".into(), "tag".into()]));
        let mut sort = SortExec::new(
            input,
            vec![SortKey {
                column_id: 0,
                direction: SortDirection::Asc,
            }],
        );

        let (mut ctx, _tmp) = setup();
        sort.open(&mut ctx).unwrap();
        assert_eq!(sort.next(&mut ctx).unwrap(), Some(int_row(&[1, 2])));
        assert_eq!(sort.next(&mut ctx).unwrap(), Some(int_row(&[5, 1])));
        assert_eq!(sort.next(&mut ctx).unwrap(), Some(int_row(&[5, 3])));
        sort.close(&mut ctx).unwrap();
    }

    #[test]
    fn spills_and_merges_multiple_runs() {
        // Force at least two spilled runs.
        let n = RUN_SIZE * 2 + 7;
        let rows: Vec<Row> = (0..n as i64)
            .rev()
            .map(|v| int_row(&[v]))
            .collect();
        let input = Box::new(MockExecutor::new(rows, vec!["a".into()]));
        let mut sort = SortExec::new(
            input,
            vec![SortKey {
                column_id: 0,
                direction: SortDirection::Asc,
            }],
        );

        let (mut ctx, _tmp) = setup();
        sort.open(&mut ctx).unwrap();
        for expected in 0..n as i64 {
            assert_eq!(sort.next(&mut ctx).unwrap(), Some(int_row(&[expected])));
        }
        assert_exhausted(&mut sort, &mut ctx);
        sort.close(&mut ctx).unwrap();
    }

    #[test]
    fn descending_order_reverses_comparison() {
        let rows = vec![int_row(&[1]), int_row(&[3]), int_row(&[2])];
        let input = Box::new(MockExecutor::new(rows, vec!["a".into()]));
        let mut sort = SortExec::new(
            input,
            vec![SortKey {
                column_id: 0,
                direction: SortDirection::Desc,
            }],
        );

        let (mut ctx, _tmp) = setup();
        sort.open(&mut ctx).unwrap();
        assert_eq!(sort.next(&mut ctx).unwrap(), Some(int_row(&[3])));
        assert_eq!(sort.next(&mut ctx).unwrap(), Some(int_row(&[2])));
        assert_eq!(sort.next(&mut ctx).unwrap(), Some(int_row(&[1])));
        sort.close(&mut ctx).unwrap();
    }

    #[test]
    fn cross_type_numeric_promotion_orders_int_and_float() {
        let a = Row::new(vec![Value::Float(1.5)]);
        let b = Row::new(vec![Value::Int(2)]);
        let key = SortKey {
            column_id: 0,
            direction: SortDirection::Asc,
        };
        assert_eq!(compare_rows(&a, &b, &[key]), Ordering::Less);
    }
}
