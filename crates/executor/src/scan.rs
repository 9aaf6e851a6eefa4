//! Scan operators: SeqScan and IndexScan.

use crate::filter::eval_resolved_expr;
use crate::{ExecutionContext, Executor};
use btree::BTreeIndex;
use catalog::IndexId;
use common::{DbResult, ExecutionStats, PageId, RecordId, Row, TableId};
use planner::IndexPredicate;
use std::collections::VecDeque;
use std::time::Instant;
use types::Value;

/// Sequential scan operator - iterates all rows in a table.
///
/// Scans pages sequentially from the heap file's first data page onward,
/// fetching one page at a time via the buffer pool and unpacking its live
/// records.
pub struct SeqScanExec {
    table_id: TableId,
    schema: Vec<String>,
    current_page: u32,
    last_page: u32,
    buffered: VecDeque<(Vec<u8>, u16)>,
    stats: ExecutionStats,
}

impl SeqScanExec {
    /// Create a new sequential scan operator.
    pub fn new(table_id: TableId, schema: Vec<String>) -> Self {
        Self {
            table_id,
            schema,
            current_page: 0,
            last_page: 0,
            buffered: VecDeque::new(),
            stats: ExecutionStats::default(),
        }
    }

    /// Try to fetch the next row from storage.
    fn fetch_next_row(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let heap_table = ctx.heap_table(self.table_id)?;
        let table_schema = ctx.table_schema(self.table_id)?;

        loop {
            if let Some((buf, slot)) = self.buffered.pop_front() {
                let values = common::codec::decode_row(&table_schema, &buf)?;
                let rid = RecordId {
                    page_id: PageId(self.current_page as u64 - 1),
                    slot,
                };
                self.stats.rows_produced += 1;
                return Ok(Some(Row::new(values).with_rid(rid)));
            }

            if self.current_page >= self.last_page {
                return Ok(None);
            }

            self.buffered = heap_table
                .get_page(&ctx.pool, self.current_page)?
                .into_iter()
                .collect();
            self.current_page += 1;
            self.stats.pages_scanned += 1;
        }
    }
}

impl Executor for SeqScanExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();

        let heap_table = ctx.heap_table(self.table_id)?;
        self.current_page = heap_table.first_data_page();
        self.last_page = heap_table.num_pages();
        self.buffered.clear();
        self.stats = ExecutionStats::default();

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let start = Instant::now();
        let row = self.fetch_next_row(ctx)?;
        self.stats.total_next_time += start.elapsed();
        Ok(row)
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.buffered.clear();
        self.stats.close_time = start.elapsed();
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}

/// Index scan operator - uses B+Tree index to find rows efficiently.
///
/// Uses a B+Tree index to find matching RecordIds, then fetches the
/// actual rows from the heap table.
pub struct IndexScanExec {
    table_id: TableId,
    index_name: String,
    predicate: IndexPredicate,
    schema: Vec<String>,
    /// RecordIds matching the predicate (populated on open)
    matching_rids: Vec<RecordId>,
    /// Current position in the matching_rids vector
    cursor: usize,
    /// Execution statistics
    stats: ExecutionStats,
}

#[bon::bon]
impl IndexScanExec {
    /// Create a new index scan operator using a builder pattern.
    ///
    /// # Example
    /// ```ignore
    /// let scan = IndexScanExec::builder()
    ///     .table_id(TableId(1))
    ///     .index_name("idx_users_id".into())
    ///     .predicate(IndexPredicate::Eq { col: 0, value: expr })
    ///     .schema(vec!["id".into(), "name".into()])
    ///     .build();
    /// ```
    #[builder]
    pub fn new(
        table_id: TableId,
        index_name: String,
        predicate: IndexPredicate,
        schema: Vec<String>,
    ) -> Self {
        Self {
            table_id,
            index_name,
            predicate,
            schema,
            matching_rids: Vec::new(),
            cursor: 0,
            stats: ExecutionStats::default(),
        }
    }

    /// Find the index ID from the catalog.
    fn find_index_id(&self, ctx: &ExecutionContext) -> DbResult<IndexId> {
        let table_meta = ctx.catalog.table_by_id(self.table_id)?;
        let index_meta = table_meta.index(&self.index_name)?;
        Ok(index_meta.id)
    }

    /// Evaluate the predicate value to get the search key.
    fn eval_predicate_value(&self, pred: &planner::ResolvedExpr) -> DbResult<Value> {
        // For index lookups, we need a literal value
        // Evaluate against an empty row since we only support literals
        let empty_row = Row::new(Vec::new());
        eval_resolved_expr(pred, &empty_row)
    }

    /// Query the B+Tree index for matching RecordIds.
    fn query_index(&self, ctx: &ExecutionContext) -> DbResult<Vec<RecordId>> {
        let index_id = self.find_index_id(ctx)?;
        let index_path = ctx.data_dir.join(format!("index_{}.idx", index_id.0));

        // Check if index file exists
        if !index_path.exists() {
            return Err(common::DbError::Storage(format!(
                "index file not found: {}",
                index_path.display()
            )));
        }

        let mut btree = BTreeIndex::open(&index_path, index_id)?;

        match &self.predicate {
            IndexPredicate::Eq { value, .. } => {
                let key_value = self.eval_predicate_value(value)?;
                btree.search(&[key_value])
            }
            IndexPredicate::Range { low, high, .. } => {
                let low_key = self.eval_predicate_value(low)?;
                let high_key = self.eval_predicate_value(high)?;
                btree.range_scan(Some(&[low_key]), Some(&[high_key]))
            }
        }
    }
}

impl Executor for IndexScanExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();

        // Reset state
        self.cursor = 0;
        self.stats = ExecutionStats::default();

        // Query the index for matching RecordIds
        self.matching_rids = self.query_index(ctx)?;

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let start = Instant::now();

        if self.cursor >= self.matching_rids.len() {
            self.stats.total_next_time += start.elapsed();
            return Ok(None);
        }

        let rid = self.matching_rids[self.cursor];
        self.cursor += 1;

        // Fetch the actual row from the heap table
        let heap_table = ctx.heap_table(self.table_id)?;
        let table_schema = ctx.table_schema(self.table_id)?;
        let buf = heap_table.get(&ctx.pool, rid)?;
        let values = common::codec::decode_row(&table_schema, &buf)?;

        self.stats.rows_produced += 1;
        self.stats.total_next_time += start.elapsed();

        Ok(Some(Row::new(values).with_rid(rid)))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.matching_rids.clear();
        self.stats.close_time = start.elapsed();
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{
        assert_exhausted, assert_next_row, create_context_from_catalog, create_test_catalog,
        setup_test_catalog_and_dir, setup_test_context,
    };
    use catalog::Column;
    use planner::ResolvedExpr;
    use types::{SqlType, Value};

    fn insert_test_rows(
        ctx: &mut ExecutionContext,
        table_id: TableId,
        rows: Vec<Row>,
    ) -> DbResult<()> {
        let mut heap_table = ctx.heap_table(table_id)?;
        let table_schema = ctx.table_schema(table_id)?;

        for row in rows {
            let buf = common::codec::encode_row(&table_schema, &row.values)?;
            heap_table.insert(&ctx.pool, &buf)?;
        }

        Ok(())
    }

    #[test]
    fn seq_scan_empty_table() {
        let (mut ctx, _temp) = setup_test_context();
        let table_id = TableId(1);

        let mut scan = SeqScanExec::new(table_id, vec!["id".into(), "name".into()]);

        scan.open(&mut ctx).unwrap();
        assert_exhausted(&mut scan, &mut ctx);
        scan.close(&mut ctx).unwrap();
    }

    #[test]
    fn seq_scan_single_row() {
        let (mut ctx, _temp) = setup_test_context();
        let table_id = TableId(1);

        // Insert a row
        let rows = vec![Row::new(vec![
            Value::Int(1),
            Value::Text("alice".into()),
            Value::Bool(true),
        ])];
        insert_test_rows(&mut ctx, table_id, rows).unwrap();

        let mut scan =
            SeqScanExec::new(table_id, vec!["id".into(), "name".into(), "active".into()]);

        scan.open(&mut ctx).unwrap();
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
        );
        assert_exhausted(&mut scan, &mut ctx);
        scan.close(&mut ctx).unwrap();
    }

    #[test]
    fn seq_scan_multiple_rows() {
        let (mut ctx, _temp) = setup_test_context();
        let table_id = TableId(1);

        // Insert multiple rows
        let rows = vec![
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
            Row::new(vec![
                Value::Int(2),
                Value::Text("bob".into()),
                Value::Bool(false),
            ]),
            Row::new(vec![
                Value::Int(3),
                Value::Text("carol".into()),
                Value::Bool(true),
            ]),
        ];
        insert_test_rows(&mut ctx, table_id, rows).unwrap();

        let mut scan =
            SeqScanExec::new(table_id, vec!["id".into(), "name".into(), "active".into()]);

        scan.open(&mut ctx).unwrap();
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
        );
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(2),
                Value::Text("bob".into()),
                Value::Bool(false),
            ]),
        );
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(3),
                Value::Text("carol".into()),
                Value::Bool(true),
            ]),
        );
        assert_exhausted(&mut scan, &mut ctx);
        scan.close(&mut ctx).unwrap();
    }

    #[test]
    fn seq_scan_schema_matches() {
        let table_id = TableId(1);

        let scan = SeqScanExec::new(table_id, vec!["id".into(), "name".into()]);

        assert_eq!(scan.schema(), &["id", "name"]);
    }

    #[test]
    fn seq_scan_open_resets_state() {
        let (mut ctx, _temp) = setup_test_context();
        let table_id = TableId(1);

        // Insert rows
        let rows = vec![
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
            Row::new(vec![
                Value::Int(2),
                Value::Text("bob".into()),
                Value::Bool(false),
            ]),
        ];
        insert_test_rows(&mut ctx, table_id, rows).unwrap();

        let mut scan =
            SeqScanExec::new(table_id, vec!["id".into(), "name".into(), "active".into()]);

        // First scan
        scan.open(&mut ctx).unwrap();
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
        );

        // Reset with open
        scan.open(&mut ctx).unwrap();
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
        );
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(2),
                Value::Text("bob".into()),
                Value::Bool(false),
            ]),
        );
        assert_exhausted(&mut scan, &mut ctx);

        scan.close(&mut ctx).unwrap();
    }

    #[test]
    fn seq_scan_close_succeeds() {
        let (mut ctx, _temp) = setup_test_context();
        let table_id = TableId(1);

        let mut scan = SeqScanExec::new(table_id, vec!["id".into()]);

        scan.open(&mut ctx).unwrap();
        assert!(scan.close(&mut ctx).is_ok());
    }

    #[test]
    fn index_scan_requires_existing_index() {
        let (mut ctx, _temp) = setup_test_context();
        let table_id = TableId(1);

        // Insert rows
        let rows = vec![Row::new(vec![
            Value::Int(1),
            Value::Text("alice".into()),
            Value::Bool(true),
        ])];
        insert_test_rows(&mut ctx, table_id, rows).unwrap();

        // Try to use a non-existent index
        let mut scan = IndexScanExec::builder()
            .table_id(table_id)
            .index_name("idx_nonexistent".into())
            .predicate(IndexPredicate::Eq {
                col: 0,
                value: ResolvedExpr::Literal(Value::Int(1)),
            })
            .schema(vec!["id".into(), "name".into(), "active".into()])
            .build();

        // Should fail because index doesn't exist
        let result = scan.open(&mut ctx);
        assert!(result.is_err(), "expected error for non-existent index");
    }

    #[test]
    fn index_scan_schema_matches() {
        let table_id = TableId(1);

        let scan = IndexScanExec::builder()
            .table_id(table_id)
            .index_name("idx_users_id".into())
            .predicate(IndexPredicate::Eq {
                col: 0,
                value: ResolvedExpr::Literal(Value::Int(1)),
            })
            .schema(vec!["id".into(), "name".into()])
            .build();

        assert_eq!(scan.schema(), &["id", "name"]);
    }

    #[test]
    fn index_scan_with_btree_index() {
        let (catalog, temp) = setup_test_catalog_and_dir();
        let table_id = TableId(1);

        // Create an index on the "id" column BEFORE creating context
        catalog
            .create_index("users", "idx_users_id", &["id"], catalog::IndexKind::BTree)
            .unwrap();

        // Build the empty index file first
        let index_id = catalog
            .table("users")
            .unwrap()
            .index("idx_users_id")
            .unwrap()
            .id;
        let index_path = temp.path().join(format!("index_{}.idx", index_id.0));
        let mut btree = btree::BTreeIndex::create(&index_path, index_id).unwrap();

        // Now create the context
        let mut ctx = create_context_from_catalog(catalog, &temp);

        // Insert rows
        let rows = vec![
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
            Row::new(vec![
                Value::Int(2),
                Value::Text("bob".into()),
                Value::Bool(false),
            ]),
            Row::new(vec![
                Value::Int(3),
                Value::Text("carol".into()),
                Value::Bool(true),
            ]),
        ];
        insert_test_rows(&mut ctx, table_id, rows).unwrap();

        // Scan heap and add entries to index
        let heap = ctx.heap_table(table_id).unwrap();
        let table_schema = ctx.table_schema(table_id).unwrap();
        for page_no in heap.first_data_page()..heap.num_pages() {
            for (buf, slot) in heap.get_page(&ctx.pool, page_no).unwrap() {
                let values = common::codec::decode_row(&table_schema, &buf).unwrap();
                let rid = common::RecordId {
                    page_id: common::PageId(page_no as u64),
                    slot,
                };
                let key = vec![values[0].clone()];
                btree.insert(key, rid).unwrap();
            }
        }
        btree.flush().unwrap();

        // Now test the IndexScanExec
        let mut scan = IndexScanExec::builder()
            .table_id(table_id)
            .index_name("idx_users_id".into())
            .predicate(IndexPredicate::Eq {
                col: 0,
                value: ResolvedExpr::Literal(Value::Int(2)),
            })
            .schema(vec!["id".into(), "name".into(), "active".into()])
            .build();

        scan.open(&mut ctx).unwrap();
        // Should return only the row with id=2
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(2),
                Value::Text("bob".into()),
                Value::Bool(false),
            ]),
        );
        assert_exhausted(&mut scan, &mut ctx);
        scan.close(&mut ctx).unwrap();
    }

    #[test]
    fn index_scan_range_with_btree() {
        let (catalog, temp) = setup_test_catalog_and_dir();
        let table_id = TableId(1);

        // Create an index on the "id" column
        catalog
            .create_index("users", "idx_users_id", &["id"], catalog::IndexKind::BTree)
            .unwrap();

        // Build the empty index file
        let index_id = catalog
            .table("users")
            .unwrap()
            .index("idx_users_id")
            .unwrap()
            .id;
        let index_path = temp.path().join(format!("index_{}.idx", index_id.0));
        let mut btree = btree::BTreeIndex::create(&index_path, index_id).unwrap();

        // Now create context
        let mut ctx = create_context_from_catalog(catalog, &temp);

        // Insert rows
        let rows = vec![
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
            Row::new(vec![
                Value::Int(2),
                Value::Text("bob".into()),
                Value::Bool(false),
            ]),
            Row::new(vec![
                Value::Int(3),
                Value::Text("carol".into()),
                Value::Bool(true),
            ]),
            Row::new(vec![
                Value::Int(4),
                Value::Text("dave".into()),
                Value::Bool(false),
            ]),
        ];
        insert_test_rows(&mut ctx, table_id, rows).unwrap();

        // Scan heap and add entries to index
        let heap = ctx.heap_table(table_id).unwrap();
        let table_schema = ctx.table_schema(table_id).unwrap();
        for page_no in heap.first_data_page()..heap.num_pages() {
            for (buf, slot) in heap.get_page(&ctx.pool, page_no).unwrap() {
                let values = common::codec::decode_row(&table_schema, &buf).unwrap();
                let rid = common::RecordId {
                    page_id: common::PageId(page_no as u64),
                    slot,
                };
                let key = vec![values[0].clone()];
                btree.insert(key, rid).unwrap();
            }
        }
        btree.flush().unwrap();

        // Test range scan [2, 3]
        let mut scan = IndexScanExec::builder()
            .table_id(table_id)
            .index_name("idx_users_id".into())
            .predicate(IndexPredicate::Range {
                col: 0,
                low: ResolvedExpr::Literal(Value::Int(2)),
                high: ResolvedExpr::Literal(Value::Int(3)),
            })
            .schema(vec!["id".into(), "name".into(), "active".into()])
            .build();

        scan.open(&mut ctx).unwrap();
        // Should return rows with id in [2, 3]
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(2),
                Value::Text("bob".into()),
                Value::Bool(false),
            ]),
        );
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(3),
                Value::Text("carol".into()),
                Value::Bool(true),
            ]),
        );
        assert_exhausted(&mut scan, &mut ctx);
        scan.close(&mut ctx).unwrap();
    }

    #[test]
    fn seq_scan_unknown_table_returns_error() {
        let (mut ctx, _temp) = setup_test_context();
        let table_id = TableId(999); // Non-existent table

        let mut scan = SeqScanExec::new(table_id, vec!["id".into()]);

        scan.open(&mut ctx).unwrap();
        let result = scan.next(&mut ctx);
        assert!(result.is_err());
    }

    #[test]
    fn seq_scan_empty_schema() {
        let table_id = TableId(1);

        let scan = SeqScanExec::new(table_id, vec![]);
        assert_eq!(scan.schema().len(), 0);
    }

    #[test]
    fn index_scan_empty_table_with_index() {
        let (catalog, temp) = setup_test_catalog_and_dir();
        let table_id = TableId(1);

        // Create an index on the empty table
        catalog
            .create_index("users", "idx_users_id", &["id"], catalog::IndexKind::BTree)
            .unwrap();

        // Build an empty index file
        let index_id = catalog
            .table("users")
            .unwrap()
            .index("idx_users_id")
            .unwrap()
            .id;
        let index_path = temp.path().join(format!("index_{}.idx", index_id.0));
        let mut btree = btree::BTreeIndex::create(&index_path, index_id).unwrap();
        btree.flush().unwrap();

        let mut ctx = create_context_from_catalog(catalog, &temp);

        let mut scan = IndexScanExec::builder()
            .table_id(table_id)
            .index_name("idx_users_id".into())
            .predicate(IndexPredicate::Eq {
                col: 0,
                value: ResolvedExpr::Literal(Value::Int(1)),
            })
            .schema(vec!["id".into()])
            .build();

        scan.open(&mut ctx).unwrap();
        assert_exhausted(&mut scan, &mut ctx);
        scan.close(&mut ctx).unwrap();
    }

    #[test]
    fn index_scan_open_resets_state_with_index() {
        let (catalog, temp) = setup_test_catalog_and_dir();
        let table_id = TableId(1);

        // Create an index on the "id" column first (before inserting rows)
        catalog
            .create_index("users", "idx_users_id", &["id"], catalog::IndexKind::BTree)
            .unwrap();

        // Get index metadata
        let index_id = catalog
            .table("users")
            .unwrap()
            .index("idx_users_id")
            .unwrap()
            .id;
        let index_path = temp.path().join(format!("index_{}.idx", index_id.0));

        // Create context (catalog becomes immutable after this)
        let mut ctx = create_context_from_catalog(catalog, &temp);

        // Insert rows
        let rows = vec![
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
            Row::new(vec![
                Value::Int(2),
                Value::Text("bob".into()),
                Value::Bool(false),
            ]),
        ];
        insert_test_rows(&mut ctx, table_id, rows).unwrap();

        // Build the index file by scanning the heap
        let mut btree = btree::BTreeIndex::create(&index_path, index_id).unwrap();
        let heap = ctx.heap_table(table_id).unwrap();
        let table_schema = ctx.table_schema(table_id).unwrap();
        for page_no in heap.first_data_page()..heap.num_pages() {
            for (buf, slot) in heap.get_page(&ctx.pool, page_no).unwrap() {
                let values = common::codec::decode_row(&table_schema, &buf).unwrap();
                let rid = common::RecordId {
                    page_id: common::PageId(page_no as u64),
                    slot,
                };
                let key = vec![values[0].clone()];
                btree.insert(key, rid).unwrap();
            }
        }
        btree.flush().unwrap();

        let mut scan = IndexScanExec::builder()
            .table_id(table_id)
            .index_name("idx_users_id".into())
            .predicate(IndexPredicate::Eq {
                col: 0,
                value: ResolvedExpr::Literal(Value::Int(1)),
            })
            .schema(vec!["id".into(), "name".into(), "active".into()])
            .build();

        // First scan
        scan.open(&mut ctx).unwrap();
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
        );
        assert_exhausted(&mut scan, &mut ctx);

        // Reset with open should reset cursor
        scan.open(&mut ctx).unwrap();
        assert_next_row(
            &mut scan,
            &mut ctx,
            Row::new(vec![
                Value::Int(1),
                Value::Text("alice".into()),
                Value::Bool(true),
            ]),
        );
        assert_exhausted(&mut scan, &mut ctx);

        scan.close(&mut ctx).unwrap();
    }

    #[test]
    fn seq_scan_single_column_table() {
        let (_ctx, _temp) = setup_test_context();

        // Create table with single column
        let temp_dir = tempfile::tempdir().unwrap();
        let mut catalog = create_test_catalog();
        catalog
            .create_table("numbers", vec![Column::new("value", SqlType::Int)])
            .unwrap();
        let table_id = catalog.table("numbers").unwrap().id;

        // Leak for 'static lifetime
        let catalog = Box::leak(Box::new(catalog));
        let disk = storage::DiskManager::new(temp_dir.path()).unwrap();
        let pool = buffer::BufferPoolManager::new(disk, 10, common::ReplacerPolicy::Clock);
        let wal = Box::leak(Box::new(
            wal::Wal::open(temp_dir.path().join("test.wal")).unwrap(),
        ));

        let mut ctx = ExecutionContext::new(catalog, pool, wal, temp_dir.path().into());

        // Insert rows
        let rows = vec![
            Row::new(vec![Value::Int(10)]),
            Row::new(vec![Value::Int(20)]),
        ];
        insert_test_rows(&mut ctx, table_id, rows).unwrap();

        let mut scan = SeqScanExec::new(table_id, vec!["value".into()]);

        scan.open(&mut ctx).unwrap();
        assert_next_row(&mut scan, &mut ctx, Row::new(vec![Value::Int(10)]));
        assert_next_row(&mut scan, &mut ctx, Row::new(vec![Value::Int(20)]));
        assert_exhausted(&mut scan, &mut ctx);
        scan.close(&mut ctx).unwrap();
    }
}
