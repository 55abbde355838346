//! # Database Facade
//!
//! Ties the engine together for a session: open the data directory,
//! replay the WAL, then accept SQL. One facade instance owns one
//! catalog, one WAL and one transaction manager.
//!
//! ## Transactions
//!
//! `BEGIN`/`COMMIT`/`ROLLBACK` manage the session transaction. Every
//! other DML statement outside an explicit transaction runs in an
//! implicit one — begin, execute, commit — so each standalone statement
//! is durable on its own.
//!
//! ## Startup
//!
//! [`Database::open`] runs recovery before anything else. A recovery
//! failure is fatal: the caller gets the error and no Database.

use crate::schema::Catalog;
use crate::sql::{ExecuteResult, Executor, Optimizer, Parser, Planner, Statement};
use crate::txn::{RecoveryManager, Transaction, TxnManager};
use crate::wal::Wal;
use crate::config::WAL_FILE_NAME;
use eyre::{ensure, Result, WrapErr};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

pub struct Database {
    catalog: Arc<Catalog>,
    wal: Arc<Wal>,
    txn_manager: Arc<TxnManager>,
    planner: Planner,
    optimizer: Optimizer,
    executor: Executor,
    current_txn: Mutex<Option<Arc<Transaction>>>,
}

impl Database {
    /// Opens (or creates) a database rooted at `data_dir` and replays
    /// the WAL before returning.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let catalog = Arc::new(Catalog::open(data_dir)?);
        let wal = Arc::new(Wal::open(&data_dir.join(WAL_FILE_NAME))?);

        let summary = RecoveryManager::new(Arc::clone(&wal), Arc::clone(&catalog))
            .recover()
            .wrap_err("recovery failed; refusing to serve")?;
        if summary.redo_applied > 0 || summary.rolled_back_txns > 0 {
            eprintln!(
                "[recovery] redo applied {} change(s), rolled back {} transaction(s)",
                summary.redo_applied, summary.rolled_back_txns
            );
        }

        let txn_manager = Arc::new(TxnManager::new(Arc::clone(&wal)));
        Ok(Self {
            planner: Planner::new(Arc::clone(&catalog)),
            optimizer: Optimizer::new(),
            executor: Executor::new(Arc::clone(&catalog), Arc::clone(&wal)),
            catalog,
            wal,
            txn_manager,
            current_txn: Mutex::new(None),
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    /// True while an explicit transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.current_txn.lock().is_some()
    }

    /// Parses, plans, optimizes and executes one statement.
    pub fn execute(&self, sql: &str) -> Result<ExecuteResult> {
        let statement = Parser::new(sql)?.parse()?;
        match statement {
            Statement::Begin => self.begin(),
            Statement::Commit => self.commit(),
            Statement::Rollback => self.rollback(),
            Statement::Explain(inner) => {
                let plan = self.planner.plan(&inner)?;
                let plan = self.optimizer.optimize(plan);
                let estimate = crate::sql::optimizer::estimate_rows(&plan, &self.catalog);
                Ok(ExecuteResult::Plan(format!(
                    "{}(estimated rows: {:.0})\n",
                    plan.describe(),
                    estimate
                )))
            }
            other => {
                let plan = self.planner.plan(&other)?;
                let plan = self.optimizer.optimize(plan);
                let needs_txn = matches!(
                    plan,
                    crate::sql::PlanNode::Insert { .. }
                        | crate::sql::PlanNode::Update { .. }
                        | crate::sql::PlanNode::Delete { .. }
                );

                let session_txn = self.current_txn.lock().clone();
                match session_txn {
                    Some(txn) => self.executor.execute(&plan, txn.id()),
                    None if needs_txn => {
                        // Implicit transaction for a bare DML statement.
                        let txn = self.txn_manager.begin();
                        match self.executor.execute(&plan, txn.id()) {
                            Ok(result) => {
                                self.txn_manager.commit(&txn)?;
                                Ok(result)
                            }
                            Err(e) => {
                                // Best effort: mark the implicit txn rolled back.
                                let _ = self.txn_manager.rollback(&txn);
                                Err(e)
                            }
                        }
                    }
                    None => self.executor.execute(&plan, 0),
                }
            }
        }
    }

    fn begin(&self) -> Result<ExecuteResult> {
        let mut current = self.current_txn.lock();
        ensure!(current.is_none(), "a transaction is already open");
        let txn = self.txn_manager.begin();
        let id = txn.id();
        *current = Some(txn);
        Ok(ExecuteResult::Message(format!("BEGIN (transaction {})", id)))
    }

    fn commit(&self) -> Result<ExecuteResult> {
        let mut current = self.current_txn.lock();
        let txn = current.take().ok_or_else(|| eyre::eyre!("no open transaction to commit"))?;
        self.txn_manager.commit(&txn)?;
        Ok(ExecuteResult::Message(format!(
            "COMMIT (transaction {})",
            txn.id()
        )))
    }

    fn rollback(&self) -> Result<ExecuteResult> {
        let mut current = self.current_txn.lock();
        let txn = current
            .take()
            .ok_or_else(|| eyre::eyre!("no open transaction to roll back"))?;
        self.txn_manager.rollback(&txn)?;
        Ok(ExecuteResult::Message(format!(
            "ROLLBACK (transaction {})",
            txn.id()
        )))
    }

    /// Flushes the WAL and syncs every table file.
    pub fn close(&self) -> Result<()> {
        self.wal.close()?;
        self.catalog.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use crate::wal::LogKind;
    use tempfile::tempdir;

    fn rows(result: ExecuteResult) -> Vec<crate::records::Row> {
        match result {
            ExecuteResult::Rows { rows, .. } => rows,
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[test]
    fn create_insert_select_round_trip() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.execute("CREATE TABLE users (id INT, name VARCHAR)").unwrap();
        db.execute("INSERT INTO users (id, name) VALUES (1, 'alice')")
            .unwrap();
        db.execute("INSERT INTO users (id, name) VALUES (2, 'bob')")
            .unwrap();

        let result = rows(db.execute("SELECT * FROM users").unwrap());
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].values()[1], Value::Text("alice".into()));
        assert_eq!(result[1].values()[1], Value::Text("bob".into()));
    }

    #[test]
    fn implicit_transactions_commit_in_the_wal() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.execute("CREATE TABLE t (id INT)").unwrap();
        db.execute("INSERT INTO t (id) VALUES (1)").unwrap();

        let records = db.wal().read().unwrap();
        let kinds: Vec<LogKind> = records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![LogKind::Begin, LogKind::Insert, LogKind::Commit]);
    }

    #[test]
    fn explicit_transaction_spans_statements() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.execute("CREATE TABLE t (id INT)").unwrap();

        db.execute("BEGIN").unwrap();
        assert!(db.in_transaction());
        db.execute("INSERT INTO t (id) VALUES (1)").unwrap();
        db.execute("INSERT INTO t (id) VALUES (2)").unwrap();
        db.execute("COMMIT").unwrap();
        assert!(!db.in_transaction());

        let records = db.wal().read().unwrap();
        let begins = records.iter().filter(|r| r.kind == LogKind::Begin).count();
        assert_eq!(begins, 1);
        assert_eq!(records.last().unwrap().kind, LogKind::Commit);
    }

    #[test]
    fn double_begin_is_rejected() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.execute("BEGIN").unwrap();
        assert!(db.execute("BEGIN").is_err());
        db.execute("ROLLBACK").unwrap();
    }

    #[test]
    fn stray_commit_is_rejected() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        assert!(db.execute("COMMIT").is_err());
        assert!(db.execute("ROLLBACK").is_err());
    }

    #[test]
    fn explain_renders_the_optimized_plan() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.execute("CREATE TABLE t (id INT)").unwrap();
        match db.execute("EXPLAIN SELECT * FROM t WHERE 1 = 1").unwrap() {
            ExecuteResult::Plan(text) => {
                // The always-true filter folds away.
                assert!(text.starts_with("Scan(t)"), "got: {}", text);
                assert!(text.contains("estimated rows"));
            }
            other => panic!("expected a plan, got {:?}", other),
        }
    }

    #[test]
    fn reopen_recovers_without_error_and_starts_with_an_empty_catalog() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            db.execute("CREATE TABLE t (id INT)").unwrap();
            db.execute("INSERT INTO t (id) VALUES (7)").unwrap();
            db.close().unwrap();
        }
        // The catalog is in-memory: recovery tolerates records for tables
        // it does not know, and the table must be re-created to be seen.
        let db = Database::open(dir.path()).unwrap();
        assert!(db.execute("SELECT * FROM t").is_err());
    }
}
