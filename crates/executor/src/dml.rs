//! DML operators: Insert, Update, Delete.

use crate::{filter::eval_resolved_expr, ExecutionContext, Executor};
use common::{codec, ColumnId, DbResult, Row, TableId};
use planner::ResolvedExpr;
use types::Value;
use wal::WalRecord;

/// Insert operator - inserts rows into a table with WAL logging.
///
/// Evaluates value expressions and writes to both WAL and storage.
/// Returns a single row containing the number of inserted rows.
pub struct InsertExec {
    table_id: TableId,
    schema: Vec<String>,
    values: Vec<ResolvedExpr>,
    executed: bool,
}

impl InsertExec {
    /// Create a new insert operator.
    pub fn new(table_id: TableId, schema: Vec<String>, values: Vec<ResolvedExpr>) -> Self {
        Self {
            table_id,
            schema,
            values,
            executed: false,
        }
    }
}

impl Executor for InsertExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.executed = false;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.executed {
            return Ok(None);
        }
        self.executed = true;

        // Evaluate value expressions (no row context for INSERT literals)
        let empty_row = Row::new(vec![]);
        let mut row_values = Vec::with_capacity(self.values.len());
        for expr in &self.values {
            row_values.push(eval_resolved_expr(expr, &empty_row)?);
        }

        let schema = ctx.table_schema(self.table_id)?;
        let buf = codec::encode_row(&schema, &row_values)?;

        let rid = {
            let mut heap_table = ctx.heap_table(self.table_id)?;
            heap_table.insert(&ctx.pool, &buf)?
        };

        ctx.log_dml(WalRecord::Insert {
            txn: ctx.current_txn_id(),
            table: self.table_id,
            row: row_values.clone(),
            rid,
        })?;

        ctx.insert_into_indexes(self.table_id, &row_values, rid)?;

        ctx.record_write(txn::WriteRecord::Insert {
            table: self.table_id,
            rid,
        });

        Ok(Some(Row::new(vec![Value::Int(1)])))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

/// Update operator - updates rows matching a predicate with WAL logging.
///
/// Scans for matching rows, applies assignments, and writes to WAL and storage.
/// Returns a single row containing the number of updated rows.
pub struct UpdateExec {
    table_id: TableId,
    schema: Vec<String>,
    input: Box<dyn Executor>,
    assignments: Vec<(ColumnId, ResolvedExpr)>,
    executed: bool,
}

impl UpdateExec {
    /// Create a new update operator.
    pub fn new(
        table_id: TableId,
        schema: Vec<String>,
        input: Box<dyn Executor>,
        assignments: Vec<(ColumnId, ResolvedExpr)>,
    ) -> Self {
        Self {
            table_id,
            schema,
            input,
            assignments,
            executed: false,
        }
    }

    /// Apply assignments to a row to produce the updated values.
    fn apply_assignments(&self, old_row: &Row) -> DbResult<Vec<Value>> {
        let mut new_values = old_row.values.clone();

        for (col_id, expr) in &self.assignments {
            let idx = *col_id as usize;
            if idx >= new_values.len() {
                return Err(common::DbError::Executor(format!(
                    "column index {} out of bounds (row has {} columns)",
                    idx,
                    new_values.len()
                )));
            }
            new_values[idx] = eval_resolved_expr(expr, old_row)?;
        }

        Ok(new_values)
    }
}

impl Executor for UpdateExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.executed = false;
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.executed {
            return Ok(None);
        }

        let mut count = 0i64;
        let schema = ctx.table_schema(self.table_id)?;

        while let Some(old_row) = self.input.next(ctx)? {
            let rid = old_row.rid().ok_or_else(|| {
                common::DbError::Executor("scanned row is missing a record id".into())
            })?;
            let new_values = self.apply_assignments(&old_row)?;
            let buf = codec::encode_row(&schema, &new_values)?;

            {
                let mut heap_table = ctx.heap_table(self.table_id)?;
                heap_table.update(&ctx.pool, rid, &buf)?;
            }

            ctx.log_dml(WalRecord::Update {
                txn: ctx.current_txn_id(),
                table: self.table_id,
                rid,
                before_row: old_row.values.clone(),
                new_row: new_values.clone(),
            })?;

            ctx.update_indexes(self.table_id, &old_row.values, &new_values, rid)?;

            ctx.record_write(txn::WriteRecord::Update {
                table: self.table_id,
                rid,
                before_image: old_row.values.clone(),
            });

            count += 1;
        }

        self.executed = true;
        Ok(Some(Row::new(vec![Value::Int(count)])))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

/// Delete operator - deletes rows matching a predicate with WAL logging.
///
/// Scans for matching rows and removes them from storage.
/// Returns a single row containing the number of deleted rows.
pub struct DeleteExec {
    table_id: TableId,
    schema: Vec<String>,
    input: Box<dyn Executor>,
    executed: bool,
}

impl DeleteExec {
    /// Create a new delete operator.
    pub fn new(table_id: TableId, schema: Vec<String>, input: Box<dyn Executor>) -> Self {
        Self {
            table_id,
            schema,
            input,
            executed: false,
        }
    }
}

impl Executor for DeleteExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.executed = false;
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.executed {
            return Ok(None);
        }

        let mut count = 0i64;

        while let Some(row) = self.input.next(ctx)? {
            let rid = row.rid().ok_or_else(|| {
                common::DbError::Executor("scanned row is missing a record id".into())
            })?;

            {
                let mut heap_table = ctx.heap_table(self.table_id)?;
                heap_table.delete(&ctx.pool, rid)?;
            }

            ctx.log_dml(WalRecord::Delete {
                txn: ctx.current_txn_id(),
                table: self.table_id,
                rid,
                before_row: row.values.clone(),
            })?;

            ctx.delete_from_indexes(self.table_id, &row.values, rid)?;

            ctx.record_write(txn::WriteRecord::Delete {
                table: self.table_id,
                rid,
                before_image: row.values.clone(),
            });

            count += 1;
        }

        self.executed = true;
        Ok(Some(Row::new(vec![Value::Int(count)])))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}
