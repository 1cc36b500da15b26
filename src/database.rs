//! # Database Handle
//!
//! The embedding surface: parse, plan, and run statements against an
//! engine, one transaction per statement unless an explicit transaction
//! is open.
//!
//! ## Transactions
//!
//! `BEGIN [READ ONLY|WRITE]` opens a session transaction; every following
//! statement runs inside it until `COMMIT` or `ROLLBACK`. Without one,
//! each statement gets an implicit transaction: writable for DDL/DML
//! (committed on success, rolled back on any error), read-only for
//! `SELECT`.
//!
//! ## Results
//!
//! `query` returns a [`QueryResult`]. With an implicit transaction the
//! result owns it and stays lazy: nothing is scanned until the caller
//! iterates, and the read transaction is released when the result is
//! closed (closing is idempotent, and dropping the result closes it).
//! Inside an explicit session transaction the result is materialized
//! eagerly instead, which keeps the session usable immediately.
//!
//! Returning an error from the iteration callback stops the stream via
//! the in-stream `Stop` sentinel and surfaces the error after the
//! transaction is released, so cancellation never leaks a cursor.

use crate::catalog;
use crate::document::FieldBuffer;
use crate::engine::{Engine, KvTransaction, MemoryEngine};
use crate::error::Error;
use crate::sql::ast::Statement;
use crate::sql::executor::{self, ExecuteResult};
use crate::sql::expr::{Env, Params};
use crate::sql::parser;
use crate::sql::planner;
use crate::sql::stream::{Iterate, Stream};
use parking_lot::Mutex;
use tracing::debug;

/// An embedded InkDB database over a pluggable engine.
pub struct Database {
    engine: Box<dyn Engine>,
    session: Mutex<Option<Box<dyn KvTransaction>>>,
}

impl Database {
    /// Opens a database over the given engine, creating the catalog on a
    /// fresh store.
    pub fn new(engine: Box<dyn Engine>) -> eyre::Result<Database> {
        let mut txn = engine.begin(true).map_err(Error::from)?;
        catalog::init(txn.as_mut())?;
        txn.commit().map_err(Error::from)?;
        Ok(Database { engine, session: Mutex::new(None) })
    }

    /// Opens a database over a fresh in-memory engine.
    pub fn memory() -> eyre::Result<Database> {
        Database::new(Box::new(MemoryEngine::new()))
    }

    /// Executes one DDL, DML, or transaction-control statement.
    pub fn execute(&self, sql: &str) -> eyre::Result<ExecuteResult> {
        self.execute_with(sql, Params::new())
    }

    /// Executes one statement with parameter bindings.
    pub fn execute_with(&self, sql: &str, params: Params) -> eyre::Result<ExecuteResult> {
        debug!(sql, "execute");
        let stmt = parser::parse(sql)?;
        match stmt {
            Statement::Begin { read_only } => {
                let mut session = self.session.lock();
                if session.is_some() {
                    return Err(Error::Internal("a transaction is already in progress".to_string()).into());
                }
                *session = Some(self.engine.begin(!read_only).map_err(Error::from)?);
                Ok(ExecuteResult::Begin)
            }
            Statement::Commit => {
                let txn = self
                    .session
                    .lock()
                    .take()
                    .ok_or_else(|| Error::Internal("no transaction in progress".to_string()))?;
                txn.commit().map_err(Error::from)?;
                Ok(ExecuteResult::Commit)
            }
            Statement::Rollback => {
                let txn = self
                    .session
                    .lock()
                    .take()
                    .ok_or_else(|| Error::Internal("no transaction in progress".to_string()))?;
                txn.rollback();
                Ok(ExecuteResult::Rollback)
            }
            Statement::Select(_) => {
                Err(Error::Internal("SELECT statements must be run through query()".to_string()).into())
            }
            stmt => {
                let mut session = self.session.lock();
                match session.as_mut() {
                    Some(txn) => {
                        Ok(executor::execute_statement(txn.as_mut(), &stmt, &params)?)
                    }
                    None => {
                        drop(session);
                        let mut txn = self.engine.begin(true).map_err(Error::from)?;
                        match executor::execute_statement(txn.as_mut(), &stmt, &params) {
                            Ok(result) => {
                                txn.commit().map_err(Error::from)?;
                                Ok(result)
                            }
                            Err(err) => {
                                txn.rollback();
                                Err(err.into())
                            }
                        }
                    }
                }
            }
        }
    }

    /// Runs a `SELECT` statement.
    pub fn query(&self, sql: &str) -> eyre::Result<QueryResult> {
        self.query_with(sql, Params::new())
    }

    /// Runs a `SELECT` statement with parameter bindings.
    pub fn query_with(&self, sql: &str, params: Params) -> eyre::Result<QueryResult> {
        debug!(sql, "query");
        let stmt = parser::parse(sql)?;
        let Statement::Select(select) = stmt else {
            return Err(Error::Internal("only SELECT statements can be run through query()".to_string()).into());
        };

        let mut session = self.session.lock();
        if let Some(txn) = session.as_mut() {
            // inside an explicit transaction results materialize eagerly
            let plan = planner::plan_select(txn.as_mut(), &select, &params)?;
            let mut rows = Vec::new();
            let mut env = Env::new(txn.as_mut(), &params);
            plan.stream.iterate(&mut env, &mut |env| {
                let doc = env
                    .current
                    .clone()
                    .ok_or_else(|| Error::Internal("result row without a document".to_string()))?;
                rows.push(doc);
                Ok(Iterate::Continue)
            })?;
            return Ok(QueryResult {
                columns: plan.columns,
                state: ResultState::Materialized(rows),
                params: Params::new(),
            });
        }
        drop(session);

        let mut txn = self.engine.begin(false).map_err(Error::from)?;
        let plan = match planner::plan_select(txn.as_mut(), &select, &params) {
            Ok(plan) => plan,
            Err(err) => {
                txn.rollback();
                return Err(err.into());
            }
        };
        Ok(QueryResult {
            columns: plan.columns,
            state: ResultState::Lazy { txn, stream: plan.stream },
            params,
        })
    }
}

enum ResultState {
    Lazy { txn: Box<dyn KvTransaction>, stream: Stream },
    Materialized(Vec<FieldBuffer>),
    Closed,
}

/// The result of one `SELECT`: a column list and a one-shot document
/// iteration.
pub struct QueryResult {
    columns: Vec<String>,
    state: ResultState,
    params: Params,
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult").field("columns", &self.columns).finish_non_exhaustive()
    }
}

impl QueryResult {
    /// Projected column names; a wildcard selector contributes the
    /// pseudo-column `record`.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Drives the result, invoking `f` once per document. The underlying
    /// read transaction is released before this returns, error or not; a
    /// callback error stops the stream early and is then surfaced.
    pub fn iterate(
        &mut self,
        mut f: impl FnMut(&FieldBuffer) -> eyre::Result<()>,
    ) -> eyre::Result<()> {
        match std::mem::replace(&mut self.state, ResultState::Closed) {
            ResultState::Closed => Ok(()),
            ResultState::Materialized(rows) => {
                for row in &rows {
                    f(row)?;
                }
                Ok(())
            }
            ResultState::Lazy { mut txn, stream } => {
                let mut callback_err: Option<eyre::Report> = None;
                let outcome = {
                    let mut env = Env::new(txn.as_mut(), &self.params);
                    stream.iterate(&mut env, &mut |env| {
                        let doc = env.current.as_ref().ok_or_else(|| {
                            Error::Internal("result row without a document".to_string())
                        })?;
                        match f(doc) {
                            Ok(()) => Ok(Iterate::Continue),
                            Err(err) => {
                                callback_err = Some(err);
                                Ok(Iterate::Stop)
                            }
                        }
                    })
                };
                txn.rollback();
                outcome?;
                match callback_err {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
        }
    }

    /// Collects every result document.
    pub fn collect(&mut self) -> eyre::Result<Vec<FieldBuffer>> {
        let mut rows = Vec::new();
        self.iterate(|doc| {
            rows.push(doc.clone());
            Ok(())
        })?;
        Ok(rows)
    }

    /// Releases the underlying transaction without iterating. Idempotent.
    pub fn close(&mut self) {
        if let ResultState::Lazy { txn, .. } =
            std::mem::replace(&mut self.state, ResultState::Closed)
        {
            txn.rollback();
        }
    }
}

impl Drop for QueryResult {
    fn drop(&mut self) {
        self.close();
    }
}
