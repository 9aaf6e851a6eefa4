mod embedded;
mod tui;

use anyhow::Result;
use clap::Parser;
use embedded::DatabaseState;
use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = "./db_data";
const DEFAULT_CATALOG_FILE: &str = "catalog.json";
const DEFAULT_WAL_FILE: &str = "toydb.wal";

#[derive(Parser, Debug)]
#[command(
    name = "toydb-repl",
    about = "Interactive SQL console for the toy database"
)]
struct Args {
    /// Directory containing catalog, WAL, and table files
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Catalog filename within the data directory
    #[arg(long, default_value = DEFAULT_CATALOG_FILE)]
    catalog_file: String,
    /// WAL filename within the data directory
    #[arg(long, default_value = DEFAULT_WAL_FILE)]
    wal_file: String,
    /// Maximum number of pages held in the file pager cache
    #[arg(long, default_value_t = 256)]
    buffer_pages: usize,
    /// Execute the provided SQL and exit instead of starting the TUI
    #[arg(short = 'e', long = "execute")]
    execute: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let db = DatabaseState::new(
        &args.data_dir,
        &args.catalog_file,
        &args.wal_file,
        args.buffer_pages,
    )?;

    if let Some(sql) = args.execute {
        // Execute mode: run SQL and exit without TUI
        execute_and_exit(db, &sql)?;
    } else {
        // TUI mode: interactive terminal UI
        let app = tui::App::new(db);
        tui::run(app)?;
    }

    Ok(())
}

fn execute_and_exit(mut db: DatabaseState, sql: &str) -> Result<()> {
    use common::pretty::{self, TableStyleKind};
    use database::QueryResult;
    use parser::parse_sql;

    let statements = parse_sql(sql).map_err(anyhow::Error::from)?;

    for stmt in statements {
        match db.execute_statement(stmt)? {
            QueryResult::Empty => {}
            QueryResult::Count { affected } => println!("{} row(s) affected.", affected),
            QueryResult::Rows { schema, rows } => {
                let batch = common::RecordBatch {
                    columns: schema,
                    rows,
                };
                println!(
                    "{}",
                    pretty::render_record_batch(&batch, TableStyleKind::Modern)
                );
            }
        }
    }

    Ok(())
}
