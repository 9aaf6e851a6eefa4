//! Test execution context and database state management.
//!
//! Provides helpers for creating isolated test environments with temporary
//! storage, catalog, buffer pool, and WAL. Each test gets its own clean state
//! that is automatically cleaned up on drop.

use buffer::BufferPoolManager;
use catalog::{Catalog, Column};
use common::{DbResult, ReplacerPolicy, Row, TableId};
use executor::ExecutionContext;
use planner::PlannerFlags;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A test execution context with isolated temporary storage.
///
/// This struct manages the lifecycle of all database components needed for testing:
/// - Temporary directory for storage files
/// - Catalog for schema metadata
/// - Buffer pool (`BufferPoolManager`) for page caching
/// - Write-ahead log for durability
///
/// All components are automatically cleaned up when the context is dropped.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let mut ctx = TestContext::new().unwrap();
/// let mut exec_ctx = ctx.execution_context();
///
/// // Use exec_ctx for query execution
/// // All temporary files are cleaned up when ctx is dropped
/// ```
pub struct TestContext {
    _temp_dir: TempDir,
    catalog: &'static mut Catalog,
    pool: Arc<BufferPoolManager>,
    wal: &'static mut wal::Wal,
    data_dir: PathBuf,
    /// `SET enable_nestloop|enable_sortmerge` state for scripts run against
    /// this context.
    pub planner_flags: PlannerFlags,
}

impl TestContext {
    /// Create a new test context with default configuration.
    ///
    /// Creates a temporary directory and initializes all database components
    /// with default settings suitable for testing.
    pub fn new() -> DbResult<Self> {
        let temp_dir = tempfile::tempdir()?;
        Self::with_dir(temp_dir)
    }

    /// Create a test context using an existing temporary directory.
    ///
    /// This is useful when you need control over the temp directory lifecycle
    /// or want to inspect files after the test completes.
    pub fn with_dir(temp_dir: TempDir) -> DbResult<Self> {
        Self::build(temp_dir, Catalog::new())
    }

    /// Create a test context with a pre-populated catalog.
    ///
    /// This is useful when tests need specific tables or indexes to already exist.
    ///
    /// # Example
    ///
    /// ```
    /// use catalog::{Catalog, Column};
    /// use types::SqlType;
    /// use testsupport::prelude::*;
    ///
    /// let mut catalog = Catalog::new();
    /// catalog.create_table("users", vec![
    ///     Column::new("id", SqlType::Int),
    ///     Column::new("name", SqlType::Text),
    /// ]).unwrap();
    ///
    /// let ctx = TestContext::with_catalog(catalog).unwrap();
    /// ```
    pub fn with_catalog(catalog: Catalog) -> DbResult<Self> {
        let temp_dir = tempfile::tempdir()?;
        Self::build(temp_dir, catalog)
    }

    fn build(temp_dir: TempDir, catalog: Catalog) -> DbResult<Self> {
        let catalog = Box::leak(Box::new(catalog));
        let disk = storage::DiskManager::new(temp_dir.path())?;
        let pool = BufferPoolManager::new(disk, 64, ReplacerPolicy::Clock);
        let wal_path = temp_dir.path().join("test.wal");
        let wal = Box::leak(Box::new(wal::Wal::open(&wal_path)?));

        Ok(Self {
            data_dir: temp_dir.path().to_path_buf(),
            _temp_dir: temp_dir,
            catalog: &mut *catalog,
            pool,
            wal,
            planner_flags: PlannerFlags::default(),
        })
    }

    /// Get an execution context for running queries.
    ///
    /// The returned context borrows from this TestContext and can be used
    /// to execute queries via the executor.
    pub fn execution_context(&mut self) -> ExecutionContext<'_> {
        ExecutionContext::new(
            self.catalog,
            self.pool.clone(),
            self.wal,
            self.data_dir.clone(),
        )
    }

    /// Get the path to the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get a reference to the catalog.
    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    /// Get a mutable reference to the catalog.
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        self.catalog
    }
}

/// Helper function to create a basic test catalog with a simple table.
///
/// Creates a catalog with a "users" table containing:
/// - id: INT (column 0)
/// - name: TEXT (column 1)
/// - age: INT (column 2)
///
/// This is useful for basic tests that don't need complex schemas.
pub fn create_simple_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .create_table(
            "users",
            vec![
                Column::new("id".to_string(), types::SqlType::Int),
                Column::new("name".to_string(), types::SqlType::Text),
                Column::new("age".to_string(), types::SqlType::Int),
            ],
        )
        .expect("Failed to create users table");
    catalog
}

/// Helper function to insert test rows into a table.
///
/// This is a convenience function for tests that need to populate tables
/// with data before running queries.
///
/// # Example
///
/// ```no_run
/// use common::{Row, TableId};
/// use types::Value;
/// use testsupport::prelude::*;
///
/// let mut ctx = TestContext::new().unwrap();
/// let mut exec_ctx = ctx.execution_context();
///
/// let rows = vec![
///     Row::new(vec![Value::Int(1), Value::Text("Alice".into()), Value::Int(30)]),
///     Row::new(vec![Value::Int(2), Value::Text("Bob".into()), Value::Int(25)]),
/// ];
///
/// insert_test_rows(&mut exec_ctx, TableId(1), rows).unwrap();
/// ```
pub fn insert_test_rows(
    ctx: &mut ExecutionContext,
    table_id: TableId,
    rows: Vec<Row>,
) -> DbResult<()> {
    let schema = ctx.table_schema(table_id)?;
    let mut heap_table = ctx.heap_table(table_id)?;

    for row in rows {
        let buf = common::codec::encode_row(&schema, &row.values)?;
        heap_table.insert(&ctx.pool, &buf)?;
    }

    Ok(())
}
