use expr::{AggFunc, Expr};

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
        primary_key: Option<Vec<String>>,
    },
    DropTable {
        name: String,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
    },
    DropIndex {
        name: String,
    },
    Insert {
        table: String,
        values: Vec<Expr>,
    },
    Select {
        columns: Vec<SelectItem>,
        from: FromTable,
        joins: Vec<JoinClause>,
        selection: Option<Expr>,
        group_by: Vec<String>,
        having: Option<Expr>,
        order_by: Vec<OrderByExpr>,
        limit: Option<u64>,
        offset: Option<u64>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        selection: Option<Expr>,
    },
    Delete {
        table: String,
        selection: Option<Expr>,
    },
    Explain {
        query: Box<Statement>,
        analyze: bool,
    },
    /// Begin a new transaction.
    Begin,
    /// Commit the current transaction.
    Commit,
    /// Abort/rollback the current transaction.
    Abort,
    /// Toggle a planner switch, e.g. `SET enable_nestloop = off`.
    SetOption {
        name: String,
        value: bool,
    },
    /// `SHOW TABLES`.
    ShowTables,
    /// `DESC table` / `DESCRIBE table`.
    Describe {
        table: String,
    },
    /// `CREATE STATIC_CHECKPOINT`.
    CreateCheckpoint,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Column(String),
    Aggregate {
        func: AggFunc,
        /// `None` for `COUNT(*)`.
        arg: Option<Expr>,
        alias: Option<String>,
    },
}

/// A table reference in a FROM clause, with its optional alias.
#[derive(Clone, Debug, PartialEq)]
pub struct FromTable {
    pub name: String,
    pub alias: Option<String>,
}

impl FromTable {
    /// The name queries should use to refer to this table: the alias if
    /// present, otherwise the table's own name.
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinClause {
    pub table: FromTable,
    pub join_type: JoinType,
    pub condition: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderByExpr {
    pub column: String,
    pub direction: SortDirection,
}
