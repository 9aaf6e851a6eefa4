//! Test setup macros for reducing boilerplate across the SQL database test suite.
//!
//! This module provides declarative macros that simplify common test patterns:
//! - Database context setup with tables and schemas
//! - Page and storage setup for low-level tests
//! - WAL setup for durability tests
//! - Row and value construction

/// Creates a test database context with a table and schema.
///
/// This macro simplifies the common pattern of creating a TestContext with
/// a catalog, pager, and WAL, then adding a table with specified columns.
///
/// # Syntax
///
/// ```text
/// test_db!(context_var, table: "table_name", cols: ["col1" => Type1, "col2" => Type2, ...])
/// test_db!(context_var, table: "table_name", cols: ["col1" => Type1, ...], pk: [0, 1])
/// ```
///
/// # Examples
///
/// ```
/// use testsupport::test_db;
/// use types::SqlType;
///
/// // Simple table setup
/// test_db!(mut ctx, table: "users", cols: ["id" => SqlType::Int, "name" => SqlType::Text]);
/// let mut exec_ctx = ctx.execution_context();
/// // Use exec_ctx for query execution
/// ```
///
/// ```
/// use testsupport::test_db;
/// use types::SqlType;
///
/// // With primary key
/// test_db!(mut ctx, table: "users",
///          cols: ["id" => SqlType::Int, "name" => SqlType::Text],
///          pk: [0]);
/// let mut exec_ctx = ctx.execution_context();
/// // Table has primary key on column 0 (id)
/// ```
#[macro_export]
macro_rules! test_db {
    // Variant with primary key and mut. The catalog has no first-class
    // primary-key concept, so the `pk` clause only documents intent here;
    // callers checking constraint enforcement should create a unique index
    // explicitly.
    (mut $ctx:ident, table: $name:expr, cols: [$($col:expr => $typ:expr),+ $(,)?], pk: [$($pk_col:expr),+ $(,)?]) => {
        let mut _catalog = ::catalog::Catalog::new();
        let _ = [$($pk_col),+];
        _catalog.create_table(
            $name,
            vec![$(::catalog::Column::new($col, $typ)),+],
        ).unwrap();
        let mut $ctx = $crate::context::TestContext::with_catalog(_catalog).unwrap();
    };

    // Variant with primary key
    ($ctx:ident, table: $name:expr, cols: [$($col:expr => $typ:expr),+ $(,)?], pk: [$($pk_col:expr),+ $(,)?]) => {
        let mut _catalog = ::catalog::Catalog::new();
        let _ = [$($pk_col),+];
        _catalog.create_table(
            $name,
            vec![$(::catalog::Column::new($col, $typ)),+],
        ).unwrap();
        let $ctx = $crate::context::TestContext::with_catalog(_catalog).unwrap();
    };

    // Variant without primary key with mut
    (mut $ctx:ident, table: $name:expr, cols: [$($col:expr => $typ:expr),+ $(,)?]) => {
        let mut _catalog = ::catalog::Catalog::new();
        _catalog.create_table(
            $name,
            vec![$(::catalog::Column::new($col, $typ)),+],
        ).unwrap();
        let mut $ctx = $crate::context::TestContext::with_catalog(_catalog).unwrap();
    };

    // Variant without primary key
    ($ctx:ident, table: $name:expr, cols: [$($col:expr => $typ:expr),+ $(,)?]) => {
        let mut _catalog = ::catalog::Catalog::new();
        _catalog.create_table(
            $name,
            vec![$(::catalog::Column::new($col, $typ)),+],
        ).unwrap();
        let $ctx = $crate::context::TestContext::with_catalog(_catalog).unwrap();
    };

    // Variant for multiple tables with mut
    (mut $ctx:ident, tables: [$(($name:expr, [$($col:expr => $typ:expr),+ $(,)?])),+ $(,)?]) => {
        let mut _catalog = ::catalog::Catalog::new();
        $(
            _catalog.create_table(
                $name,
                vec![$(::catalog::Column::new($col, $typ)),+],
            ).unwrap();
        )+
        let mut $ctx = $crate::context::TestContext::with_catalog(_catalog).unwrap();
    };

    // Variant for multiple tables
    ($ctx:ident, tables: [$(($name:expr, [$($col:expr => $typ:expr),+ $(,)?])),+ $(,)?]) => {
        let mut _catalog = ::catalog::Catalog::new();
        $(
            _catalog.create_table(
                $name,
                vec![$(::catalog::Column::new($col, $typ)),+],
            ).unwrap();
        )+
        let $ctx = $crate::context::TestContext::with_catalog(_catalog).unwrap();
    };
}

/// Creates a simple buffer pool setup for low-level storage tests.
///
/// This macro simplifies buffer pool test setup by creating a temporary
/// directory, a `DiskManager`, a `BufferPoolManager` and an open file
/// descriptor in one line.
///
/// # Syntax
///
/// ```text
/// test_pager!(pool_var, fd_var)
/// test_pager!(pool_var, fd_var, capacity: 5)
/// ```
///
/// # Examples
///
/// ```
/// use testsupport::test_pager;
///
/// test_pager!(pool, fd);
///
/// let (frame, page_no) = pool.new_page(fd).unwrap();
/// assert_eq!(page_no, 0);
/// pool.unpin_page(frame, false).unwrap();
/// ```
///
/// ```
/// use testsupport::test_pager;
///
/// test_pager!(pool, fd, capacity: 2);
/// // Pool with capacity of 2 frames for testing eviction
/// ```
#[macro_export]
macro_rules! test_pager {
    ($pool:ident, $fd:ident) => {
        let _dir = ::tempfile::tempdir().unwrap();
        let _disk = ::storage::DiskManager::new(_dir.path()).unwrap();
        let $pool = ::buffer::BufferPoolManager::new(_disk, 10, ::common::ReplacerPolicy::Clock);
        $pool.create_file("test.heap").unwrap();
        let $fd = $pool.open_file("test.heap").unwrap();
    };

    ($pool:ident, $fd:ident, capacity: $cap:expr) => {
        let _dir = ::tempfile::tempdir().unwrap();
        let _disk = ::storage::DiskManager::new(_dir.path()).unwrap();
        let $pool = ::buffer::BufferPoolManager::new(_disk, $cap, ::common::ReplacerPolicy::Clock);
        $pool.create_file("test.heap").unwrap();
        let $fd = $pool.open_file("test.heap").unwrap();
    };
}

/// Creates a WAL setup for durability tests.
///
/// This macro simplifies WAL test setup by creating a temporary directory
/// and opening a WAL file in one line.
///
/// # Syntax
///
/// ```text
/// test_wal!(wal_var)
/// ```
///
/// # Examples
///
/// ```
/// use testsupport::test_wal;
/// use wal::WalRecord;
/// use common::{TableId, PageId, RecordId};
/// use types::Value;
///
/// test_wal!(wal);
///
/// let record = WalRecord::Insert {
///     table: TableId(1),
///     row: vec![Value::Int(1), Value::Text("Alice".into())],
///     rid: RecordId { page_id: PageId(0), slot: 0 },
/// };
///
/// wal.append(&record).unwrap();
/// wal.sync().unwrap();
/// ```
#[macro_export]
macro_rules! test_wal {
    ($wal:ident) => {
        let _dir = ::tempfile::tempdir().unwrap();
        let _wal_path = _dir.path().join("test.wal");
        #[allow(unused_mut)]
        let mut $wal = ::wal::Wal::open(&_wal_path).unwrap();
    };
}

/// Creates a Row with typed values.
///
/// This macro simplifies row construction for tests by providing a concise
/// syntax for creating rows with different value types.
///
/// # Syntax
///
/// ```text
/// row![Value1, Value2, ...]           // Mixed values
/// row![int: 1, 2, 3]                  // All integers
/// row![text: "alice", "bob"]          // All text
/// row![bool: true, false, true]       // All booleans
/// ```
///
/// # Examples
///
/// ```
/// use testsupport::row;
/// use types::Value;
///
/// // Mixed types
/// let r = row![Value::Int(1), Value::Text("Alice".into()), Value::Bool(true)];
/// assert_eq!(r.values.len(), 3);
/// ```
///
/// ```
/// use testsupport::row;
///
/// // All integers
/// let r = row![int: 1, 2, 3];
/// assert_eq!(r.values.len(), 3);
/// ```
///
/// ```
/// use testsupport::row;
///
/// // All text
/// let r = row![text: "alice", "bob", "charlie"];
/// assert_eq!(r.values.len(), 3);
/// ```
///
/// ```
/// use testsupport::row;
///
/// // All booleans
/// let r = row![bool: true, false, true];
/// assert_eq!(r.values.len(), 3);
/// ```
#[macro_export]
macro_rules! row {
    // Mixed values
    [$($val:expr),+ $(,)?] => {
        ::common::Row::new(vec![$($val),+])
    };

    // All integers
    [int: $($val:expr),+ $(,)?] => {
        ::common::Row::new(vec![$(::types::Value::Int($val)),+])
    };

    // All text
    [text: $($val:expr),+ $(,)?] => {
        ::common::Row::new(vec![$(::types::Value::Text($val.to_string())),+])
    };

    // All booleans
    [bool: $($val:expr),+ $(,)?] => {
        ::common::Row::new(vec![$(::types::Value::Bool($val)),+])
    };
}

/// Builds a `ResolvedExpr::Literal` for executor unit tests.
///
/// # Syntax
///
/// ```text
/// lit!(int: 42)       // ResolvedExpr literal wrapping Value::Int(42)
/// lit!(text: "hi")     // ResolvedExpr literal wrapping Value::Text("hi".into())
/// lit!(bool: true)     // ResolvedExpr literal wrapping Value::Bool(true)
/// lit!(Value::Null)    // ResolvedExpr literal wrapping any Value expression
/// ```
///
/// # Examples
///
/// ```
/// use testsupport::lit;
///
/// let _ = lit!(int: 42);
/// let _ = lit!(text: "hi");
/// let _ = lit!(bool: true);
/// let _ = lit!(::types::Value::Null);
/// ```
#[macro_export]
macro_rules! lit {
    (int: $val:expr) => {
        $crate::fixtures::lit(::types::Value::Int($val))
    };
    (text: $val:expr) => {
        $crate::fixtures::lit(::types::Value::Text($val.to_string()))
    };
    (bool: $val:expr) => {
        $crate::fixtures::lit(::types::Value::Bool($val))
    };
    ($val:expr) => {
        $crate::fixtures::lit($val)
    };
}
