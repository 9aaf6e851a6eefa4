//! Aggregate operator: hash GROUP BY with COUNT/SUM/MIN/MAX/AVG accumulators.

use crate::filter::eval_resolved_expr;
use crate::{ExecutionContext, Executor};
use common::{ColumnId, DbError, DbResult, ExecutionStats, Row};
use expr::AggFunc;
use planner::ResolvedExpr;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;
use types::Value;

/// Per-group accumulator state for a single aggregate expression.
///
/// `Sum`/`Avg` accumulate in `f64` and remember whether any input was a
/// `FLOAT` so `Sum` can finalize back to `Int` when every input was integral.
/// `Avg` always finalizes to a 6-decimal string per the aggregate output
/// contract, independent of the input column's type.
#[derive(Clone, Debug)]
enum AccState {
    Count(i64),
    Sum {
        sum: f64,
        saw_float: bool,
        saw_any: bool,
    },
    Min(Option<Value>),
    Max(Option<Value>),
    Avg {
        sum: f64,
        count: u64,
    },
}

impl AccState {
    fn new(func: AggFunc) -> Self {
        match func {
            AggFunc::Count => AccState::Count(0),
            AggFunc::Sum => AccState::Sum {
                sum: 0.0,
                saw_float: false,
                saw_any: false,
            },
            AggFunc::Min => AccState::Min(None),
            AggFunc::Max => AccState::Max(None),
            AggFunc::Avg => AccState::Avg { sum: 0.0, count: 0 },
        }
    }

    /// `val` is `None` for `COUNT(*)` (no source column); `Some(&Value::Null)`
    /// for a NULL source value, which every aggregate but `COUNT(*)` skips.
    fn update(&mut self, val: Option<&Value>) -> DbResult<()> {
        match self {
            AccState::Count(n) => match val {
                None => *n += 1,
                Some(v) if !v.is_null() => *n += 1,
                _ => {}
            },
            AccState::Sum {
                sum,
                saw_float,
                saw_any,
            } => {
                if let Some(v) = val {
                    if v.is_null() {
                        return Ok(());
                    }
                    if matches!(v, Value::Float(_)) {
                        *saw_float = true;
                    }
                    let f = v.as_f64().ok_or_else(|| {
                        DbError::InvalidAggregate("SUM requires a numeric column".into())
                    })?;
                    *sum += f;
                    *saw_any = true;
                }
            }
            AccState::Min(cur) => {
                if let Some(v) = val {
                    if v.is_null() {
                        return Ok(());
                    }
                    let replace = match cur {
                        None => true,
                        Some(c) => matches!(v.cmp_numeric(c), Some(Ordering::Less)),
                    };
                    if replace {
                        *cur = Some(v.clone());
                    }
                }
            }
            AccState::Max(cur) => {
                if let Some(v) = val {
                    if v.is_null() {
                        return Ok(());
                    }
                    let replace = match cur {
                        None => true,
                        Some(c) => matches!(v.cmp_numeric(c), Some(Ordering::Greater)),
                    };
                    if replace {
                        *cur = Some(v.clone());
                    }
                }
            }
            AccState::Avg { sum, count } => {
                if let Some(v) = val {
                    if v.is_null() {
                        return Ok(());
                    }
                    let f = v.as_f64().ok_or_else(|| {
                        DbError::InvalidAggregate("AVG requires a numeric column".into())
                    })?;
                    *sum += f;
                    *count += 1;
                }
            }
        }
        Ok(())
    }

    fn finalize(self) -> Value {
        match self {
            AccState::Count(n) => Value::Int(n),
            AccState::Sum {
                sum,
                saw_float,
                saw_any,
            } => {
                if !saw_any {
                    Value::Int(0)
                } else if saw_float {
                    Value::Float(sum)
                } else {
                    Value::Int(sum as i64)
                }
            }
            // Empty-group sentinel: no matching row ever reached `update`.
            AccState::Min(cur) => cur.unwrap_or(Value::Null),
            AccState::Max(cur) => cur.unwrap_or(Value::Null),
            AccState::Avg { sum, count } => {
                let avg = if count == 0 { 0.0 } else { sum / count as f64 };
                Value::Text(format!("{avg:.6}"))
            }
        }
    }
}

/// Hash-based GROUP BY / aggregation operator.
///
/// Materializes all input rows into per-group accumulators (one hash probe
/// per row), preserving the order in which distinct group keys were first
/// seen, then applies `HAVING` as a post-aggregation filter and streams the
/// surviving group rows.
pub struct AggregateExec {
    input: Box<dyn Executor>,
    group_by: Vec<ColumnId>,
    aggregates: Vec<(AggFunc, Option<ColumnId>)>,
    having: Option<ResolvedExpr>,
    schema: Vec<String>,

    group_order: Vec<Vec<Value>>,
    groups: HashMap<Vec<Value>, Vec<AccState>>,
    output_rows: Option<Vec<Row>>,
    cursor: usize,
    stats: ExecutionStats,
}

impl AggregateExec {
    pub fn new(
        input: Box<dyn Executor>,
        group_by: Vec<ColumnId>,
        aggregates: Vec<(AggFunc, Option<ColumnId>)>,
        having: Option<ResolvedExpr>,
        schema: Vec<String>,
    ) -> Self {
        Self {
            input,
            group_by,
            aggregates,
            having,
            schema,
            group_order: Vec::new(),
            groups: HashMap::new(),
            output_rows: None,
            cursor: 0,
            stats: ExecutionStats::default(),
        }
    }

    fn group_key(&self, row: &Row) -> Vec<Value> {
        self.group_by
            .iter()
            .map(|&col| row.values.get(col as usize).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn materialize(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        while let Some(row) = self.input.next(ctx)? {
            let key = self.group_key(&row);
            let accs = self.groups.entry(key.clone()).or_insert_with(|| {
                self.group_order.push(key.clone());
                self.aggregates
                    .iter()
                    .map(|(func, _)| AccState::new(*func))
                    .collect()
            });
            for (acc, (_, col)) in accs.iter_mut().zip(self.aggregates.iter()) {
                let val = match col {
                    None => None,
                    Some(c) => Some(row.values.get(*c as usize).cloned().unwrap_or(Value::Null)),
                };
                acc.update(val.as_ref())?;
            }
        }

        // Empty input with no GROUP BY still yields a single group of
        // zero-valued accumulators (COUNT=0, SUM=0, AVG="0.000000", MIN/MAX=NULL).
        if self.group_order.is_empty() && self.group_by.is_empty() {
            let key = Vec::new();
            self.group_order.push(key.clone());
            self.groups.insert(
                key,
                self.aggregates
                    .iter()
                    .map(|(func, _)| AccState::new(*func))
                    .collect(),
            );
        }

        let mut rows = Vec::with_capacity(self.group_order.len());
        for key in self.group_order.drain(..) {
            let accs = self.groups.remove(&key).expect("group key was just inserted");
            let mut values = key;
            for acc in accs {
                values.push(acc.finalize());
            }
            rows.push(Row::new(values));
        }

        if let Some(having) = &self.having {
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                match eval_resolved_expr(having, &row)? {
                    Value::Bool(true) => kept.push(row),
                    Value::Bool(false) | Value::Null => {}
                    other => {
                        return Err(DbError::Executor(format!(
                            "HAVING condition must evaluate to boolean, got {other:?}"
                        )))
                    }
                }
            }
            rows = kept;
        }

        self.output_rows = Some(rows);
        self.cursor = 0;
        Ok(())
    }
}

impl Executor for AggregateExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.stats = ExecutionStats::default();
        self.output_rows = None;
        self.group_order.clear();
        self.groups.clear();
        self.cursor = 0;
        self.input.open(ctx)?;
        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let start = Instant::now();
        if self.output_rows.is_none() {
            self.materialize(ctx)?;
        }
        let result = match &self.output_rows {
            Some(rows) if self.cursor < rows.len() => {
                let row = rows[self.cursor].clone();
                self.cursor += 1;
                self.stats.rows_produced += 1;
                Ok(Some(row))
            }
            _ => Ok(None),
        };
        self.stats.total_next_time += start.elapsed();
        result
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.output_rows = None;
        self.groups.clear();
        self.group_order.clear();
        self.input.close(ctx)?;
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
    fn group_by_counts_preserve_insertion_order() {
        // rows (a,b): (1,'a') (1,'b') (2,'c') -> groups [1 -> 2 rows, 2 -> 1 row]
        let rows = vec![
            int_row(&[1, 10]),
            int_row(&[1, 11]),
            int_row(&[2, 12]),
        ];
        let input = Box::new(MockExecutor::new(rows, vec!["a".into(), "b".into()]));
        let mut agg = AggregateExec::new(
            input,
            vec![0],
            vec![(AggFunc::Count, None)],
            None,
            vec!["a".into(), "count".into()],
        );

        let (mut ctx, _tmp) = setup();
        agg.open(&mut ctx).unwrap();
        assert_eq!(agg.next(&mut ctx).unwrap(), Some(int_row(&[1, 2])));
        assert_eq!(agg.next(&mut ctx).unwrap(), Some(int_row(&[2, 1])));
        assert_exhausted(&mut agg, &mut ctx);
        agg.close(&mut ctx).unwrap();
    }

    #[test]
    fn having_filters_groups_post_aggregation() {
        use expr::BinaryOp;

        let rows = vec![
            int_row(&[1, 10]),
            int_row(&[1, 11]),
            int_row(&[2, 12]),
        ];
        let input = Box::new(MockExecutor::new(rows, vec!["a".into(), "b".into()]));
        let having = binary(col(1), BinaryOp::Gt, lit!(int: 1));
        let mut agg = AggregateExec::new(
            input,
            vec![0],
            vec![(AggFunc::Count, None)],
            Some(having),
            vec!["a".into(), "count".into()],
        );

        let (mut ctx, _tmp) = setup();
        agg.open(&mut ctx).unwrap();
        assert_eq!(agg.next(&mut ctx).unwrap(), Some(int_row(&[1, 2])));
        assert_exhausted(&mut agg, &mut ctx);
        agg.close(&mut ctx).unwrap();
    }

    #[test]
    fn empty_input_aggregates_to_sentinel_row() {
        let input = Box::new(MockExecutor::new(vec![], vec!["a".into()]));
        let mut agg = AggregateExec::new(
            input,
            vec![],
            vec![
                (AggFunc::Count, None),
                (AggFunc::Sum, Some(0)),
                (AggFunc::Min, Some(0)),
                (AggFunc::Avg, Some(0)),
            ],
            None,
            vec!["count".into(), "sum".into(), "min".into(), "avg".into()],
        );

        let (mut ctx, _tmp) = setup();
        agg.open(&mut ctx).unwrap();
        let row = agg.next(&mut ctx).unwrap().unwrap();
        assert_eq!(row.values[0], Value::Int(0));
        assert_eq!(row.values[1], Value::Int(0));
        assert_eq!(row.values[2], Value::Null);
        assert_eq!(row.values[3], Value::Text("0.000000".into()));
        assert_exhausted(&mut agg, &mut ctx);
        agg.close(&mut ctx).unwrap();
    }

    #[test]
    fn avg_finalizes_to_six_decimal_string() {
        let rows = vec![int_row(&[1, 10]), int_row(&[1, 3])];
        let input = Box::new(MockExecutor::new(rows, vec!["g".into(), "v".into()]));
        let mut agg = AggregateExec::new(
            input,
            vec![0],
            vec![(AggFunc::Avg, Some(1))],
            None,
            vec!["g".into(), "avg".into()],
        );

        let (mut ctx, _tmp) = setup();
        agg.open(&mut ctx).unwrap();
        let row = agg.next(&mut ctx).unwrap().unwrap();
        assert_eq!(row.values[1], Value::Text("6.500000".into()));
        agg.close(&mut ctx).unwrap();
    }
}
