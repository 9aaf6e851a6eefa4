mod ast;

pub use ast::*;

use common::{DbError, DbResult};
use expr::{AggFunc, BinaryOp, Expr, UnaryOp};
use sqlparser::ast as sqlast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use types::Value;

/// Parse SQL text into the internal AST statements.
///
/// A handful of session/control commands (`BEGIN`, `SHOW TABLES`, `SET
/// enable_nestloop = off`, ...) live outside the standard grammar and are
/// recognized directly on the trimmed input before falling back to the
/// `sqlparser`-backed path used for DDL/DML/queries.
pub fn parse_sql(sql: &str) -> DbResult<Vec<Statement>> {
    if let Some(stmt) = try_parse_control_statement(sql) {
        return Ok(vec![stmt]);
    }

    let dialect = GenericDialect {};
    let stmts = SqlParser::parse_sql(&dialect, sql)
        .map_err(|e| DbError::Parser(format!("SQL parse error: {e}")))?;

    stmts.into_iter().map(map_statement).collect()
}

/// Recognize session/control statements that don't belong to standard SQL
/// grammar: transaction control, planner switches, and catalog introspection.
fn try_parse_control_statement(sql: &str) -> Option<Statement> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let upper = trimmed.to_uppercase();

    match upper.as_str() {
        "BEGIN" | "START TRANSACTION" => return Some(Statement::Begin),
        "COMMIT" => return Some(Statement::Commit),
        "ROLLBACK" | "ABORT" => return Some(Statement::Abort),
        "SHOW TABLES" => return Some(Statement::ShowTables),
        "CREATE STATIC_CHECKPOINT" => return Some(Statement::CreateCheckpoint),
        _ => {}
    }

    if let Some(rest) = strip_prefix_ci(trimmed, "DESC ").or_else(|| strip_prefix_ci(trimmed, "DESCRIBE ")) {
        let table = rest.trim().trim_end_matches(';').trim().to_lowercase();
        if !table.is_empty() {
            return Some(Statement::Describe { table });
        }
    }

    if let Some(rest) = strip_prefix_ci(trimmed, "SET ") {
        return parse_set_option(rest.trim());
    }

    None
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn parse_set_option(rest: &str) -> Option<Statement> {
    let (name, value) = rest.split_once('=')?;
    let name = name.trim().to_lowercase();
    let value = match value.trim().to_lowercase().as_str() {
        "on" | "true" | "1" => true,
        "off" | "false" | "0" => false,
        _ => return None,
    };
    if name == "enable_nestloop" || name == "enable_sortmerge" {
        Some(Statement::SetOption { name, value })
    } else {
        None
    }
}

fn map_statement(stmt: sqlast::Statement) -> DbResult<Statement> {
    use sqlast::Statement as SqlStatement;

    match stmt {
        SqlStatement::CreateTable {
            name,
            columns,
            constraints,
            ..
        } => {
            let table = normalize_object_name(&name)?;
            let primary_key = resolve_primary_key(&columns, &constraints)?;

            let mapped_columns = columns
                .into_iter()
                .map(|col| ColumnDef {
                    name: normalize_ident_owned(col.name),
                    ty: col.data_type.to_string().to_uppercase(),
                })
                .collect();

            Ok(Statement::CreateTable {
                name: table,
                columns: mapped_columns,
                primary_key,
            })
        }
        SqlStatement::Drop {
            object_type, names, ..
        } => match object_type {
            sqlast::ObjectType::Table => Ok(Statement::DropTable {
                name: first_name(names)?,
            }),
            sqlast::ObjectType::Index => Ok(Statement::DropIndex {
                name: first_name(names)?,
            }),
            _ => Err(DbError::Parser(format!(
                "unsupported DROP type: {object_type:?}"
            ))),
        },
        SqlStatement::CreateIndex {
            name,
            table_name,
            columns,
            ..
        } => {
            let index_name = name
                .ok_or_else(|| DbError::Parser("index name required".into()))
                .map(|n| normalize_object_name(&n))??;
            let table = normalize_object_name(&table_name)?;
            let columns = columns
                .iter()
                .map(map_index_column)
                .collect::<DbResult<Vec<_>>>()?;
            if columns.is_empty() {
                return Err(DbError::Parser(
                    "CREATE INDEX requires at least one column".into(),
                ));
            }
            Ok(Statement::CreateIndex {
                name: index_name,
                table,
                columns,
            })
        }
        SqlStatement::Insert {
            table_name, source, ..
        } => {
            let table = normalize_object_name(&table_name)?;
            let source = source.ok_or_else(|| DbError::Parser("INSERT source missing".into()))?;
            let values = extract_values(*source)?;
            Ok(Statement::Insert { table, values })
        }
        SqlStatement::Query(query) => map_select(*query),
        SqlStatement::Update {
            table,
            assignments,
            selection,
            ..
        } => {
            let table = table_name_from_with_joins(&table)?;
            let assignments = assignments
                .into_iter()
                .map(|assign| {
                    let ident = assign
                        .id
                        .last()
                        .ok_or_else(|| DbError::Parser("invalid assignment target".into()))?;
                    Ok((normalize_ident(ident), map_expr(assign.value)?))
                })
                .collect::<DbResult<Vec<_>>>()?;
            let selection = selection.map(map_expr).transpose()?;
            Ok(Statement::Update {
                table,
                assignments,
                selection,
            })
        }
        SqlStatement::Delete {
            from, selection, ..
        } => {
            if from.is_empty() {
                return Err(DbError::Parser("DELETE requires FROM source".into()));
            }
            let table = table_name_from_with_joins(&from[0])?;
            if from.len() > 1 {
                return Err(DbError::Parser("multi-table DELETE not supported".into()));
            }
            let selection = selection.map(map_expr).transpose()?;
            Ok(Statement::Delete { table, selection })
        }
        SqlStatement::Explain {
            statement, analyze, ..
        } => {
            let query = Box::new(map_statement(*statement)?);
            Ok(Statement::Explain { query, analyze })
        }
        SqlStatement::StartTransaction { .. } => Ok(Statement::Begin),
        SqlStatement::Commit { .. } => Ok(Statement::Commit),
        SqlStatement::Rollback { .. } => Ok(Statement::Abort),
        _ => Err(DbError::Parser("unsupported statement".into())),
    }
}

fn map_select(query: sqlast::Query) -> DbResult<Statement> {
    use sqlast::SetExpr;

    let select = match *query.body {
        SetExpr::Select(select) => select,
        SetExpr::Values(_) => {
            return Err(DbError::Parser("standalone VALUES not supported".into()))
        }
        _ => return Err(DbError::Parser("SET operations not supported".into())),
    };

    let sqlast::Select {
        projection,
        from,
        selection,
        group_by,
        having,
        ..
    } = *select;

    if from.is_empty() {
        return Err(DbError::Parser("SELECT requires FROM clause".into()));
    }
    if from.len() > 1 {
        return Err(DbError::Parser(
            "comma-separated FROM lists not supported; use JOIN".into(),
        ));
    }

    let (from_table, joins) = map_table_with_joins(&from[0])?;
    let columns = projection
        .into_iter()
        .map(map_select_item)
        .collect::<DbResult<Vec<_>>>()?;
    let selection = selection.map(map_expr).transpose()?;

    let group_by = match group_by {
        sqlast::GroupByExpr::All => {
            return Err(DbError::Parser("GROUP BY ALL not supported".into()))
        }
        sqlast::GroupByExpr::Expressions(exprs) => exprs
            .into_iter()
            .map(|e| match e {
                sqlast::Expr::Identifier(ident) => Ok(normalize_ident(&ident)),
                sqlast::Expr::CompoundIdentifier(parts) => parts
                    .last()
                    .map(normalize_ident)
                    .ok_or_else(|| DbError::Parser("invalid GROUP BY column".into())),
                other => Err(DbError::Parser(format!(
                    "unsupported GROUP BY expression: {other:?}"
                ))),
            })
            .collect::<DbResult<Vec<_>>>()?,
    };
    let having = having.map(map_expr).transpose()?;

    let order_by = query
        .order_by
        .into_iter()
        .map(map_order_by_expr)
        .collect::<DbResult<Vec<_>>>()?;

    let limit = query
        .limit
        .map(|expr| match expr {
            sqlast::Expr::Value(sqlast::Value::Number(n, _)) => n
                .parse::<u64>()
                .map_err(|_| DbError::Parser(format!("invalid LIMIT value: {}", n))),
            _ => Err(DbError::Parser(
                "LIMIT must be a non-negative integer".into(),
            )),
        })
        .transpose()?;

    let offset = query
        .offset
        .map(|offset_expr| match offset_expr.value {
            sqlast::Expr::Value(sqlast::Value::Number(n, _)) => n
                .parse::<u64>()
                .map_err(|_| DbError::Parser(format!("invalid OFFSET value: {}", n))),
            _ => Err(DbError::Parser(
                "OFFSET must be a non-negative integer".into(),
            )),
        })
        .transpose()?;

    Ok(Statement::Select {
        columns,
        from: from_table,
        joins,
        selection,
        group_by,
        having,
        order_by,
        limit,
        offset,
    })
}

/// Split a `TableWithJoins` into its base table and a list of join clauses.
fn map_table_with_joins(table: &sqlast::TableWithJoins) -> DbResult<(FromTable, Vec<JoinClause>)> {
    let from_table = map_table_factor(&table.relation)?;
    let joins = table
        .joins
        .iter()
        .map(map_join)
        .collect::<DbResult<Vec<_>>>()?;
    Ok((from_table, joins))
}

fn map_table_factor(factor: &sqlast::TableFactor) -> DbResult<FromTable> {
    match factor {
        sqlast::TableFactor::Table { name, alias, .. } => Ok(FromTable {
            name: normalize_object_name(name)?,
            alias: alias.as_ref().map(|a| normalize_ident_owned(a.name.clone())),
        }),
        other => Err(DbError::Parser(format!(
            "unsupported table factor: {other:?}"
        ))),
    }
}

fn map_join(join: &sqlast::Join) -> DbResult<JoinClause> {
    use sqlast::JoinOperator;

    let table = map_table_factor(&join.relation)?;
    let (join_type, constraint) = match &join.join_operator {
        JoinOperator::Inner(c) => (JoinType::Inner, c),
        JoinOperator::LeftOuter(c) => (JoinType::Left, c),
        JoinOperator::RightOuter(c) => (JoinType::Right, c),
        JoinOperator::FullOuter(c) => (JoinType::Full, c),
        other => return Err(DbError::Parser(format!("unsupported join type: {other:?}"))),
    };

    let condition = match constraint {
        sqlast::JoinConstraint::On(expr) => map_expr(expr.clone())?,
        sqlast::JoinConstraint::None => {
            return Err(DbError::Parser("JOIN requires an ON condition".into()))
        }
        other => {
            return Err(DbError::Parser(format!(
                "unsupported join constraint: {other:?}"
            )))
        }
    };

    Ok(JoinClause {
        table,
        join_type,
        condition,
    })
}

fn map_order_by_expr(expr: sqlast::OrderByExpr) -> DbResult<ast::OrderByExpr> {
    let column = match expr.expr {
        sqlast::Expr::Identifier(ident) => normalize_ident(&ident),
        sqlast::Expr::CompoundIdentifier(parts) => {
            if parts.len() == 1 {
                normalize_ident(&parts[0])
            } else {
                return Err(DbError::Parser(
                    "qualified column names not supported in ORDER BY".into(),
                ));
            }
        }
        _ => {
            return Err(DbError::Parser(
                "ORDER BY supports column names only".into(),
            ))
        }
    };

    let direction = match expr.asc {
        Some(false) => ast::SortDirection::Desc,
        _ => ast::SortDirection::Asc,
    };

    Ok(ast::OrderByExpr { column, direction })
}

fn extract_values(query: sqlast::Query) -> DbResult<Vec<Expr>> {
    match *query.body {
        sqlast::SetExpr::Values(values) => {
            let mut rows = values.rows.into_iter();
            let row = rows
                .next()
                .ok_or_else(|| DbError::Parser("INSERT requires at least one row".into()))?;
            if rows.next().is_some() {
                return Err(DbError::Parser("multi-row INSERT not supported".into()));
            }
            row.into_iter().map(map_expr).collect()
        }
        _ => Err(DbError::Parser("INSERT expects VALUES list".into())),
    }
}

fn map_select_item(item: sqlast::SelectItem) -> DbResult<SelectItem> {
    match item {
        sqlast::SelectItem::Wildcard(options) => {
            ensure_plain_wildcard(&options)?;
            Ok(SelectItem::Wildcard)
        }
        sqlast::SelectItem::QualifiedWildcard(_, _) => {
            Err(DbError::Parser("qualified wildcard not supported".into()))
        }
        sqlast::SelectItem::UnnamedExpr(expr) => map_select_expr(expr, None),
        sqlast::SelectItem::ExprWithAlias { expr, alias } => {
            map_select_expr(expr, Some(normalize_ident_owned(alias)))
        }
    }
}

fn map_select_expr(expr: sqlast::Expr, alias: Option<String>) -> DbResult<SelectItem> {
    match expr {
        sqlast::Expr::Identifier(ident) if alias.is_none() => {
            Ok(SelectItem::Column(normalize_ident_owned(ident)))
        }
        sqlast::Expr::CompoundIdentifier(parts) if alias.is_none() => {
            let ident = parts
                .last()
                .ok_or_else(|| DbError::Parser("invalid identifier".into()))?;
            Ok(SelectItem::Column(normalize_ident(ident)))
        }
        sqlast::Expr::Function(func) => map_aggregate(func, alias),
        other => Err(DbError::Parser(format!(
            "unsupported select item: {other:?}"
        ))),
    }
}

fn map_aggregate(func: sqlast::Function, alias: Option<String>) -> DbResult<SelectItem> {
    let fname = func
        .name
        .0
        .first()
        .map(|i| i.value.to_uppercase())
        .ok_or_else(|| DbError::Parser("invalid function name".into()))?;

    let agg_func = match fname.as_str() {
        "COUNT" => AggFunc::Count,
        "SUM" => AggFunc::Sum,
        "MIN" => AggFunc::Min,
        "MAX" => AggFunc::Max,
        "AVG" => AggFunc::Avg,
        other => return Err(DbError::Parser(format!("unsupported function: {other}"))),
    };

    let arg = match func.args.as_slice() {
        [] => None,
        [sqlast::FunctionArg::Unnamed(sqlast::FunctionArgExpr::Wildcard)] => None,
        [sqlast::FunctionArg::Unnamed(sqlast::FunctionArgExpr::Expr(e))] => {
            Some(map_expr(e.clone())?)
        }
        _ => {
            return Err(DbError::Parser(
                "aggregate functions take at most one argument".into(),
            ))
        }
    };

    if agg_func != AggFunc::Count && arg.is_none() {
        return Err(DbError::Parser(format!(
            "{} requires a column argument",
            agg_func.name()
        )));
    }

    Ok(SelectItem::Aggregate {
        func: agg_func,
        arg,
        alias,
    })
}

fn map_expr(expr: sqlast::Expr) -> DbResult<Expr> {
    use sqlast::Expr as SqlExpr;

    match expr {
        SqlExpr::Identifier(ident) => Ok(Expr::Column {
            table: None,
            name: normalize_ident_owned(ident),
        }),
        SqlExpr::CompoundIdentifier(idents) => {
            let name = idents
                .last()
                .map(normalize_ident)
                .ok_or_else(|| DbError::Parser("invalid identifier".into()))?;
            let table = if idents.len() > 1 {
                Some(normalize_ident(&idents[idents.len() - 2]))
            } else {
                None
            };
            Ok(Expr::Column { table, name })
        }
        SqlExpr::Value(value) => Ok(Expr::Literal(map_value(value)?)),
        SqlExpr::BinaryOp { left, op, right } => Ok(Expr::Binary {
            left: Box::new(map_expr(*left)?),
            op: map_binary_op(op)?,
            right: Box::new(map_expr(*right)?),
        }),
        SqlExpr::UnaryOp { op, expr } => Ok(Expr::Unary {
            op: map_unary_op(op)?,
            expr: Box::new(map_expr(*expr)?),
        }),
        SqlExpr::Nested(expr) => map_expr(*expr),
        _ => Err(DbError::Parser("unsupported expr".into())),
    }
}

fn map_value(value: sqlast::Value) -> DbResult<Value> {
    use sqlast::Value as SqlValue;

    match value {
        SqlValue::Number(num, _) => {
            if let Ok(i) = num.parse::<i64>() {
                Ok(Value::Int(i))
            } else {
                num.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| DbError::Parser(format!("invalid numeric literal: {num}")))
            }
        }
        SqlValue::SingleQuotedString(s) => Ok(Value::Text(s)),
        SqlValue::Boolean(b) => Ok(Value::Bool(b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(DbError::Parser(format!("unsupported literal: {other:?}"))),
    }
}

fn map_binary_op(op: sqlast::BinaryOperator) -> DbResult<BinaryOp> {
    use sqlast::BinaryOperator as SqlBinary;

    Ok(match op {
        SqlBinary::Eq => BinaryOp::Eq,
        SqlBinary::NotEq => BinaryOp::Ne,
        SqlBinary::Lt => BinaryOp::Lt,
        SqlBinary::LtEq => BinaryOp::Le,
        SqlBinary::Gt => BinaryOp::Gt,
        SqlBinary::GtEq => BinaryOp::Ge,
        SqlBinary::And => BinaryOp::And,
        SqlBinary::Or => BinaryOp::Or,
        other => return Err(DbError::Parser(format!("unsupported operator: {other:?}"))),
    })
}

fn map_unary_op(op: sqlast::UnaryOperator) -> DbResult<UnaryOp> {
    use sqlast::UnaryOperator as SqlUnary;

    Ok(match op {
        SqlUnary::Not => UnaryOp::Not,
        other => {
            return Err(DbError::Parser(format!(
                "unsupported unary operator: {other:?}"
            )))
        }
    })
}

fn normalize_ident(ident: &sqlast::Ident) -> String {
    ident.value.to_lowercase()
}

fn normalize_ident_owned(ident: sqlast::Ident) -> String {
    ident.value.to_lowercase()
}

fn normalize_object_name(name: &sqlast::ObjectName) -> DbResult<String> {
    name.0
        .first()
        .map(|ident| ident.value.to_lowercase())
        .ok_or_else(|| DbError::Parser("invalid object name".into()))
}

fn first_name(mut names: Vec<sqlast::ObjectName>) -> DbResult<String> {
    if names.is_empty() {
        return Err(DbError::Parser("DROP requires a target".into()));
    }
    normalize_object_name(&names.remove(0))
}

fn table_name_from_with_joins(table: &sqlast::TableWithJoins) -> DbResult<String> {
    if !table.joins.is_empty() {
        return Err(DbError::Parser("joins not supported here".into()));
    }
    match &table.relation {
        sqlast::TableFactor::Table { name, .. } => normalize_object_name(name),
        _ => Err(DbError::Parser("unsupported table factor".into())),
    }
}

fn map_index_column(column: &sqlast::OrderByExpr) -> DbResult<String> {
    match &column.expr {
        sqlast::Expr::Identifier(ident) => Ok(normalize_ident(ident)),
        sqlast::Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(normalize_ident)
            .ok_or_else(|| DbError::Parser("invalid identifier".into())),
        other => Err(DbError::Parser(format!(
            "unsupported index column: {other:?}"
        ))),
    }
}

fn ensure_plain_wildcard(options: &sqlast::WildcardAdditionalOptions) -> DbResult<()> {
    let has_options = options.opt_exclude.is_some()
        || options.opt_except.is_some()
        || options.opt_rename.is_some()
        || options.opt_replace.is_some();
    if has_options {
        Err(DbError::Parser("wildcard options not supported".into()))
    } else {
        Ok(())
    }
}

/// Resolve primary key from inline column constraints and table-level constraints.
/// Returns error if PK defined in both places.
fn resolve_primary_key(
    columns: &[sqlast::ColumnDef],
    constraints: &[sqlast::TableConstraint],
) -> DbResult<Option<Vec<String>>> {
    let inline_pk = extract_inline_primary_key(columns)?;
    let table_pk = extract_primary_key(constraints)?;

    match (table_pk, inline_pk) {
        (Some(_), Some(_)) => Err(DbError::Parser(
            "PRIMARY KEY defined both inline and at table level".into(),
        )),
        (Some(pk), None) | (None, Some(pk)) => Ok(Some(pk)),
        (None, None) => Ok(None),
    }
}

/// Extract PRIMARY KEY constraint from table constraints.
/// Returns Some(Vec<String>) if PRIMARY KEY is found, None otherwise.
fn extract_primary_key(constraints: &[sqlast::TableConstraint]) -> DbResult<Option<Vec<String>>> {
    use sqlast::TableConstraint;

    for constraint in constraints {
        match constraint {
            TableConstraint::Unique {
                columns,
                is_primary,
                ..
            } if *is_primary => {
                let pk_columns: Vec<String> = columns.iter().map(normalize_ident).collect();

                if pk_columns.is_empty() {
                    return Err(DbError::Parser(
                        "PRIMARY KEY must include at least one column".into(),
                    ));
                }

                return Ok(Some(pk_columns));
            }
            _ => continue,
        }
    }
    Ok(None)
}

/// Extract PRIMARY KEY defined inline on column definitions.
fn extract_inline_primary_key(columns: &[sqlast::ColumnDef]) -> DbResult<Option<Vec<String>>> {
    use sqlast::ColumnOption;

    let mut pk_columns = Vec::new();
    for column in columns {
        let has_primary_key = column.options.iter().any(|opt| {
            matches!(
                opt.option,
                ColumnOption::Unique {
                    is_primary: true,
                    ..
                }
            )
        });
        if has_primary_key {
            pk_columns.push(normalize_ident(&column.name));
        }
    }

    match pk_columns.len() {
        0 => Ok(None),
        1 => Ok(Some(pk_columns)),
        _ => Err(DbError::Parser(
            "multiple PRIMARY KEY column constraints; use PRIMARY KEY (col1, col2)".into(),
        )),
    }
}
