//! Per-connection session state: explicit `BEGIN`/`COMMIT`/`ABORT` handling.
//!
//! [`Database::execute`] auto-commits every statement it is handed; a
//! [`Session`] is what lets a client group several statements into one
//! transaction. It holds at most one open [`txn::Transaction`] at a time and
//! forwards everything else to [`Database::execute_query_or_dml`] /
//! [`Database::execute_statement`] depending on whether a transaction is
//! currently open.

use crate::{Database, QueryResult};
use anyhow::Result;
use parser::{parse_sql, Statement};
use planner::PlannerFlags;
use std::sync::Arc;
use wal::WalRecord;

/// Holds one connection's explicit-transaction state across calls to
/// [`Session::execute`], plus the `SET enable_nestloop|enable_sortmerge`
/// planner hints scoped to this connection.
pub struct Session {
    db: Arc<Database>,
    txn: Option<Arc<txn::Transaction>>,
    flags: PlannerFlags,
}

impl Session {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            txn: None,
            flags: PlannerFlags::default(),
        }
    }

    /// Whether a `BEGIN` has been issued on this session with no matching
    /// `COMMIT`/`ABORT` yet.
    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// Execute one SQL statement against this session.
    ///
    /// `BEGIN` opens a transaction (erroring if one is already open);
    /// `COMMIT`/`ABORT` close it. Any other statement runs under the open
    /// transaction if there is one, or auto-commits on its own otherwise.
    ///
    /// A statement error inside an open transaction does not itself end the
    /// transaction unless [`common::DbError::is_transaction_fatal`] says the
    /// failure (deadlock, lock-upgrade conflict, internal invariant
    /// violation) poisoned the transaction's state — in that case the
    /// transaction is rolled back here so the session doesn't keep issuing
    /// statements against torn-down locks.
    pub async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        let statements = parse_sql(sql).map_err(anyhow::Error::from)?;
        if statements.is_empty() {
            return Ok(QueryResult::Empty);
        }
        if statements.len() > 1 {
            anyhow::bail!("multiple statements not supported yet");
        }
        let stmt = statements.into_iter().next().unwrap();

        match stmt {
            Statement::Begin => {
                if self.txn.is_some() {
                    anyhow::bail!("a transaction is already open on this session");
                }
                let txn = self.db.txn_mgr().begin();
                self.db
                    .log_wal_record(WalRecord::Begin { txn: txn.id })
                    .await?;
                self.txn = Some(txn);
                Ok(QueryResult::Empty)
            }

            Statement::Commit => {
                let Some(txn) = self.txn.take() else {
                    anyhow::bail!("no transaction is open on this session");
                };
                self.db
                    .log_wal_record(WalRecord::Commit { txn: txn.id })
                    .await?;
                self.db.txn_mgr().commit(&txn);
                Ok(QueryResult::Empty)
            }

            Statement::Abort => {
                let Some(txn) = self.txn.take() else {
                    anyhow::bail!("no transaction is open on this session");
                };
                self.db.rollback(txn).await?;
                Ok(QueryResult::Empty)
            }

            Statement::SetOption { name, value } => {
                match name.as_str() {
                    "enable_nestloop" => self.flags.enable_nestloop = value,
                    "enable_sortmerge" => self.flags.enable_sortmerge = value,
                    _ => anyhow::bail!("unknown planner option '{}'", name),
                }
                Ok(QueryResult::Empty)
            }

            other => match &self.txn {
                Some(txn) => {
                    let txn = txn.clone();
                    let result = self
                        .db
                        .execute_query_or_dml(other, txn.clone(), self.flags)
                        .await;
                    if let Err(err) = &result {
                        let fatal = err
                            .downcast_ref::<common::DbError>()
                            .map(|e| e.is_transaction_fatal())
                            .unwrap_or(false);
                        if fatal {
                            self.txn = None;
                            if let Err(rollback_err) = self.db.rollback(txn).await {
                                tracing::warn!(
                                    error = %rollback_err,
                                    "rollback of transaction-fatal error failed"
                                );
                            }
                        }
                    }
                    result
                }
                None => {
                    self.db
                        .execute_statement_with_flags(other, self.flags)
                        .await
                }
            },
        }
    }
}
