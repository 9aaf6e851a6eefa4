//! Analyzer (§4.12): validates a parsed `Statement` before it reaches the
//! planner. Resolves `[table.]column` references against the catalog with
//! alias substitution, enforces the GROUP BY / HAVING / ORDER BY / LIMIT
//! shape rules, and performs literal type coercion (INT<->FLOAT promotion,
//! STRING->DATETIME format validation).
//!
//! The planner still does its own column resolution for building resolved
//! physical-plan expressions; this pass exists to reject malformed queries
//! before any planning work is sunk into them, with error messages scoped to
//! the statement shape rather than a particular physical plan.

#[cfg(test)]
mod tests;

use catalog::Catalog;
use common::{DbError, DbResult};
use expr::Expr;
use parser::{FromTable, JoinClause, SelectItem, Statement};
use types::{SqlType, Value};

/// Validates `stmt` against `catalog`. Non-SELECT statements pass through
/// untouched; DDL and DML value-list coercion is handled where the rest of
/// that statement's semantics already live (catalog, executor).
pub fn analyze(stmt: &Statement, catalog: &Catalog) -> DbResult<()> {
    if let Statement::Select {
        columns,
        from,
        joins,
        selection,
        group_by,
        having,
        order_by,
        limit,
        ..
    } = stmt
    {
        let scope = Scope::build(from, joins, catalog)?;

        if let Some(pred) = selection {
            scope.resolve_expr(pred)?;
        }
        for join in joins {
            scope.resolve_expr(&join.condition)?;
        }
        if let Some(pred) = having {
            scope.resolve_expr(pred)?;
        }
        for item in order_by {
            scope.resolve_name(&item.column)?;
        }

        let has_aggregate = columns
            .iter()
            .any(|c| matches!(c, SelectItem::Aggregate { .. }));

        // A HAVING clause is valid either with an explicit GROUP BY or with
        // an aggregate in the SELECT list (the whole table is then treated
        // as a single implicit group) -- matches the planner's own
        // `is_aggregate_query` check in `lower_to_logical`.
        if having.is_some() && group_by.is_empty() && !has_aggregate {
            return Err(DbError::InvalidAggregate(
                "HAVING requires a GROUP BY clause or an aggregate in the SELECT list".into(),
            ));
        }

        if limit.is_some() && order_by.is_empty() {
            return Err(DbError::Planner(
                "LIMIT requires an ORDER BY clause".into(),
            ));
        }

        if has_aggregate || !group_by.is_empty() {
            for item in columns {
                if let SelectItem::Column(name) = item {
                    if !group_by.iter().any(|g| g.eq_ignore_ascii_case(name)) {
                        return Err(DbError::InvalidAggregate(format!(
                            "column '{name}' must appear in GROUP BY or be used in an aggregate function"
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

/// The set of tables (and their aliases) visible while resolving column
/// references in a single SELECT's WHERE/HAVING/ORDER BY/JOIN-ON clauses.
struct Scope<'a> {
    tables: Vec<(&'a str, &'a catalog::TableMeta)>,
}

impl<'a> Scope<'a> {
    fn build(
        from: &'a FromTable,
        joins: &'a [JoinClause],
        catalog: &'a Catalog,
    ) -> DbResult<Self> {
        let mut tables = Vec::new();
        tables.push((from.effective_name(), catalog.table(&from.name)?));
        for join in joins {
            tables.push((
                join.table.effective_name(),
                catalog.table(&join.table.name)?,
            ));
        }
        Ok(Self { tables })
    }

    /// Resolves an unqualified or qualified column reference, rejecting
    /// ambiguous unqualified references against more than one table.
    fn resolve_name(&self, name: &str) -> DbResult<()> {
        let (table, column) = match name.split_once('.') {
            Some((t, c)) => (Some(t), c),
            None => (None, name),
        };
        self.resolve(table, column)
    }

    fn resolve(&self, table: Option<&str>, column: &str) -> DbResult<()> {
        if let Some(table) = table {
            let meta = self
                .tables
                .iter()
                .find(|(alias, _)| alias.eq_ignore_ascii_case(table))
                .ok_or_else(|| DbError::TableNotFound(table.to_string()))?
                .1;
            meta.schema
                .name_to_ordinal
                .get(column)
                .ok_or_else(|| DbError::ColumnNotFound(format!("{table}.{column}")))?;
            return Ok(());
        }

        let matches: Vec<&str> = self
            .tables
            .iter()
            .filter(|(_, meta)| meta.schema.name_to_ordinal.contains_key(column))
            .map(|(alias, _)| *alias)
            .collect();

        match matches.len() {
            0 => Err(DbError::ColumnNotFound(column.to_string())),
            1 => Ok(()),
            _ => Err(DbError::AmbiguousColumn(column.to_string())),
        }
    }

    fn resolve_expr(&self, expr: &Expr) -> DbResult<()> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Column { table, name } => self.resolve(table.as_deref(), name),
            Expr::Unary { expr, .. } => self.resolve_expr(expr),
            Expr::Binary { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)
            }
        }
    }
}

/// Coerces a literal `value` toward a column's declared `target` type,
/// promoting INT<->FLOAT and validating STRING->DATETIME format. Values
/// already matching `target` (or `NULL`) pass through unchanged.
pub fn coerce_numeric(value: &Value, target: &SqlType) -> DbResult<Value> {
    match (value, target) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Int(i), SqlType::Float) => Ok(Value::Float(*i as f64)),
        (Value::Float(f), SqlType::Int) => Ok(Value::Int(*f as i64)),
        (Value::Int(_), SqlType::Int) | (Value::Float(_), SqlType::Float) => Ok(value.clone()),
        (Value::Text(s), SqlType::Datetime) => {
            validate_datetime_format(s)?;
            Ok(Value::Datetime(s.clone()))
        }
        (Value::Datetime(_), SqlType::Datetime) => Ok(value.clone()),
        (Value::Text(_), SqlType::Text) | (Value::Text(_), SqlType::String(_)) => {
            Ok(value.clone())
        }
        (Value::Bool(_), SqlType::Bool) => Ok(value.clone()),
        _ => Err(DbError::IncompatibleType(format!(
            "cannot coerce {value:?} to {target:?}"
        ))),
    }
}

/// Validates that `s` matches the fixed `YYYY-MM-DD HH:MM:SS` DATETIME
/// format (19 bytes, per `types::DATETIME_LEN`).
pub fn validate_datetime_format(s: &str) -> DbResult<()> {
    let bytes = s.as_bytes();
    let valid = bytes.len() == types::DATETIME_LEN
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes[10] == b' '
        && bytes[13] == b':'
        && bytes[16] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7 | 10 | 13 | 16) || b.is_ascii_digit());

    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidDatetimeFormat(s.to_string()))
    }
}
