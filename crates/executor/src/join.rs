//! Join operators: combines rows from multiple tables.

use crate::filter::eval_resolved_expr;
use crate::sort::compare_values;
use crate::{ExecutionContext, Executor};
use common::{ColumnId, DbResult, ExecutionStats, Row};
use planner::ResolvedExpr;
use std::cmp::Ordering;
use std::time::Instant;
use types::Value;

/// Nested loop join operator - simple O(n*m) join algorithm.
///
/// For each row from the left table, iterates all rows from the right table,
/// evaluating the join condition on combined rows.
///
/// # Algorithm
///
/// 1. `open()`: Materialize all right-side rows into memory, fetch first left row.
/// 2. `next()`: For each left row, iterate through all right rows, evaluate condition.
/// 3. When all right rows exhausted for current left, advance to next left row.
/// 4. `close()`: Release materialized rows and close children.
///
/// # Performance
///
/// - Time: O(n * m) where n = left rows, m = right rows
/// - Space: O(m) to materialize right side
///
/// This is the simplest join algorithm, suitable for small tables or when no
/// better access method is available. More sophisticated algorithms (HashJoin,
/// MergeJoin) would be used for larger datasets.
pub struct NestedLoopJoinExec {
    left_input: Box<dyn Executor>,
    right_input: Box<dyn Executor>,
    condition: ResolvedExpr,
    schema: Vec<String>,

    // State
    current_left_row: Option<Row>,
    right_materialized: Vec<Row>,
    right_cursor: usize,
    stats: ExecutionStats,
}

impl NestedLoopJoinExec {
    /// Create a new nested loop join operator.
    ///
    /// # Arguments
    ///
    /// * `left` - Left (outer) input executor
    /// * `right` - Right (inner) input executor, will be materialized
    /// * `condition` - Join condition (ON clause) with resolved column ordinals
    /// * `schema` - Combined output schema (left columns followed by right columns)
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        condition: ResolvedExpr,
        schema: Vec<String>,
    ) -> Self {
        Self {
            left_input: left,
            right_input: right,
            condition,
            schema,
            current_left_row: None,
            right_materialized: Vec::new(),
            right_cursor: 0,
            stats: ExecutionStats::default(),
        }
    }

    /// Combine a left and right row into a single row.
    ///
    /// The combined row has all columns from the left row first,
    /// followed by all columns from the right row.
    fn combine_rows(&self, left: &Row, right: &Row) -> Row {
        let mut combined_values = left.values.clone();
        combined_values.extend(right.values.clone());
        Row::new(combined_values)
    }

    /// Evaluate the join condition against a combined row.
    ///
    /// Returns true if the rows should be joined, false otherwise.
    /// NULL condition results are treated as false (SQL semantics).
    fn eval_condition(&self, row: &Row) -> DbResult<bool> {
        let result = eval_resolved_expr(&self.condition, row)?;
        match result {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(common::DbError::Executor(format!(
                "join condition must evaluate to boolean, got {:?}",
                other
            ))),
        }
    }
}

impl Executor for NestedLoopJoinExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.stats = ExecutionStats::default();

        // Open both children
        self.left_input.open(ctx)?;
        self.right_input.open(ctx)?;

        // Materialize right side for repeated iteration
        self.right_materialized.clear();
        while let Some(row) = self.right_input.next(ctx)? {
            self.right_materialized.push(row);
        }

        // Get first left row
        self.current_left_row = self.left_input.next(ctx)?;
        self.right_cursor = 0;

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let start = Instant::now();

        loop {
            // Check if we have a current left row
            let left_row = match &self.current_left_row {
                Some(r) => r.clone(),
                None => {
                    self.stats.total_next_time += start.elapsed();
                    return Ok(None);
                }
            };

            // Try to find matching right row
            while self.right_cursor < self.right_materialized.len() {
                let right_row = &self.right_materialized[self.right_cursor];
                self.right_cursor += 1;

                // Combine rows and evaluate join condition
                let combined = self.combine_rows(&left_row, right_row);

                if self.eval_condition(&combined)? {
                    self.stats.rows_produced += 1;
                    self.stats.total_next_time += start.elapsed();
                    return Ok(Some(combined));
                }
            }

            // Exhausted right side for current left row, advance left
            self.current_left_row = self.left_input.next(ctx)?;
            self.right_cursor = 0;
        }
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();

        self.right_materialized.clear();
        self.current_left_row = None;
        self.left_input.close(ctx)?;
        self.right_input.close(ctx)?;

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

/// Sort-merge join operator. Assumes both inputs arrive already sorted
/// ascending on their respective join key (the planner inserts a `Sort`
/// node beneath each side when it chooses `MergeJoin`, see
/// [`planner::PhysicalPlan::MergeJoin`]).
///
/// # Algorithm
///
/// Walks both sorted streams with a single forward pass. When the current
/// left key matches a run of one or more right rows sharing that key, the
/// run is buffered once and replayed (Cartesian product) against every left
/// row carrying the same key, so duplicate keys on either side are handled
/// without rereading the right input.
///
/// # Performance
///
/// - Time: O(n + m) comparisons plus O(k) work per matched row pair, where
///   k is the size of the largest equal-key run.
/// - Space: O(k) to buffer one run of equal-key right rows.
pub struct MergeJoinExec {
    left_input: Box<dyn Executor>,
    right_input: Box<dyn Executor>,
    left_key: ColumnId,
    right_key: ColumnId,
    schema: Vec<String>,

    left_row: Option<Row>,
    right_peek: Option<Row>,
    right_exhausted: bool,
    current_group: Vec<Row>,
    group_key: Option<Value>,
    group_cursor: usize,
    stats: ExecutionStats,
}

impl MergeJoinExec {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        left_key: ColumnId,
        right_key: ColumnId,
        schema: Vec<String>,
    ) -> Self {
        Self {
            left_input: left,
            right_input: right,
            left_key,
            right_key,
            schema,
            left_row: None,
            right_peek: None,
            right_exhausted: false,
            current_group: Vec::new(),
            group_key: None,
            group_cursor: 0,
            stats: ExecutionStats::default(),
        }
    }

    fn combine_rows(left: &Row, right: &Row) -> Row {
        let mut values = left.values.clone();
        values.extend(right.values.clone());
        Row::new(values)
    }

    fn key_of(row: &Row, col: ColumnId) -> Value {
        row.values
            .get(col as usize)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Makes sure `self.current_group` holds every right row whose key
    /// equals `left_key_val`, fetching from `right_input` as needed, and
    /// leaves at most one unconsumed right row buffered in `right_peek` for
    /// the next call.
    fn load_group(&mut self, ctx: &mut ExecutionContext, left_key_val: &Value) -> DbResult<()> {
        if let Some(cached) = &self.group_key {
            if compare_values(cached, left_key_val) == Ordering::Equal {
                self.group_cursor = 0;
                return Ok(());
            }
        }

        self.current_group.clear();
        self.group_cursor = 0;

        loop {
            let candidate = match self.right_peek.take() {
                Some(row) => Some(row),
                None if self.right_exhausted => None,
                None => {
                    let next = self.right_input.next(ctx)?;
                    if next.is_none() {
                        self.right_exhausted = true;
                    }
                    next
                }
            };

            let Some(row) = candidate else {
                self.group_key = Some(left_key_val.clone());
                return Ok(());
            };

            let row_key = Self::key_of(&row, self.right_key);
            match compare_values(&row_key, left_key_val) {
                Ordering::Less => continue,
                Ordering::Equal => self.current_group.push(row),
                Ordering::Greater => {
                    self.right_peek = Some(row);
                    self.group_key = Some(left_key_val.clone());
                    return Ok(());
                }
            }
        }
    }
}

impl Executor for MergeJoinExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.stats = ExecutionStats::default();

        self.left_input.open(ctx)?;
        self.right_input.open(ctx)?;

        self.left_row = self.left_input.next(ctx)?;
        self.right_peek = None;
        self.right_exhausted = false;
        self.current_group.clear();
        self.group_key = None;
        self.group_cursor = 0;

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let start = Instant::now();

        loop {
            let Some(left_row) = self.left_row.clone() else {
                self.stats.total_next_time += start.elapsed();
                return Ok(None);
            };

            if self.group_cursor >= self.current_group.len() {
                let left_key_val = Self::key_of(&left_row, self.left_key);
                self.load_group(ctx, &left_key_val)?;

                if self.current_group.is_empty() {
                    self.left_row = self.left_input.next(ctx)?;
                    continue;
                }
            }

            let right_row = self.current_group[self.group_cursor].clone();
            self.group_cursor += 1;
            let combined = Self::combine_rows(&left_row, &right_row);

            if self.group_cursor >= self.current_group.len() {
                // Peek whether the next left row shares this key; if not,
                // force load_group to reload on the next call.
                let next_left = self.left_input.next(ctx)?;
                let same_key = next_left
                    .as_ref()
                    .map(|r| {
                        compare_values(
                            &Self::key_of(r, self.left_key),
                            &Self::key_of(&left_row, self.left_key),
                        ) == Ordering::Equal
                    })
                    .unwrap_or(false);
                if same_key {
                    self.group_cursor = 0;
                } else {
                    self.group_key = None;
                }
                self.left_row = next_left;
            }

            self.stats.rows_produced += 1;
            self.stats.total_next_time += start.elapsed();
            return Ok(Some(combined));
        }
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();

        self.current_group.clear();
        self.right_peek = None;
        self.left_row = None;
        self.left_input.close(ctx)?;
        self.right_input.close(ctx)?;

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

/// Semi-join operator: emits a left row iff at least one right row
/// satisfies the join condition, never duplicating the left row and never
/// including any right-side columns in the output.
///
/// Materializes the right side up front (same tradeoff as
/// [`NestedLoopJoinExec`]) and, for each left row, stops scanning the
/// right side as soon as the first match is found.
pub struct SemiJoinExec {
    left_input: Box<dyn Executor>,
    right_input: Box<dyn Executor>,
    condition: ResolvedExpr,
    schema: Vec<String>,

    right_materialized: Vec<Row>,
    stats: ExecutionStats,
}

impl SemiJoinExec {
    /// Create a new semi-join operator.
    ///
    /// `schema` is the left side's schema; a semi-join never projects
    /// right-side columns.
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        condition: ResolvedExpr,
        schema: Vec<String>,
    ) -> Self {
        Self {
            left_input: left,
            right_input: right,
            condition,
            schema,
            right_materialized: Vec::new(),
            stats: ExecutionStats::default(),
        }
    }

    fn combine_rows(left: &Row, right: &Row) -> Row {
        let mut combined_values = left.values.clone();
        combined_values.extend(right.values.clone());
        Row::new(combined_values)
    }

    fn matches(&self, left_row: &Row) -> DbResult<bool> {
        for right_row in &self.right_materialized {
            let combined = Self::combine_rows(left_row, right_row);
            match eval_resolved_expr(&self.condition, &combined)? {
                Value::Bool(true) => return Ok(true),
                Value::Bool(false) | Value::Null => continue,
                other => {
                    return Err(common::DbError::Executor(format!(
                        "join condition must evaluate to boolean, got {:?}",
                        other
                    )))
                }
            }
        }
        Ok(false)
    }
}

impl Executor for SemiJoinExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.stats = ExecutionStats::default();

        self.left_input.open(ctx)?;
        self.right_input.open(ctx)?;

        self.right_materialized.clear();
        while let Some(row) = self.right_input.next(ctx)? {
            self.right_materialized.push(row);
        }

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let start = Instant::now();

        loop {
            let Some(left_row) = self.left_input.next(ctx)? else {
                self.stats.total_next_time += start.elapsed();
                return Ok(None);
            };

            if self.matches(&left_row)? {
                self.stats.rows_produced += 1;
                self.stats.total_next_time += start.elapsed();
                return Ok(Some(left_row));
            }
        }
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();

        self.right_materialized.clear();
        self.left_input.close(ctx)?;
        self.right_input.close(ctx)?;

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
