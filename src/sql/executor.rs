//! # Statement Runner
//!
//! Executes one parsed statement inside the transaction it is handed.
//! Transaction acquisition and commit/rollback policy live in the
//! database layer; this module is the part that is identical whether the
//! transaction is implicit or an explicit session transaction.
//!
//! `INSERT` binding rules:
//!
//! - with a field list, values pair positionally with the names and the
//!   cardinalities must match;
//! - without a field list, schemaful tables take the values in schema
//!   order (counts must match) and schemaless tables reject the
//!   statement;
//! - missing schemaful fields are filled with the declared type's zero
//!   value, and types are checked per field (both inside the table
//!   overlay);
//! - the `RECORDS` form accepts key/value pair lists, document literals,
//!   and document-valued parameters.

use super::ast::{InsertSource, InsertStmt, ParamRef, RecordExpr, Statement};
use super::expr::{eval, Env, Params};
use super::planner;
use super::stream::{Iterate, Stream, StreamOp};
use crate::catalog::{self, FieldConstraint, IndexInfo, Schema, Table, TableInfo};
use crate::document::FieldBuffer;
use crate::engine::KvTransaction;
use crate::error::{Error, Result};
use crate::types::Value;
use tracing::debug;

/// Outcome of a non-query statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteResult {
    Begin,
    Commit,
    Rollback,
    CreateTable { created: bool },
    DropTable { dropped: bool },
    CreateIndex { created: bool },
    DropIndex { dropped: bool },
    Reindex { rebuilt: usize },
    Insert { inserted: usize },
    Update { updated: usize },
    Delete { deleted: usize },
}

/// Runs one DDL or DML statement to completion in the given transaction.
pub fn execute_statement(
    txn: &mut dyn KvTransaction,
    stmt: &Statement,
    params: &Params,
) -> Result<ExecuteResult> {
    match stmt {
        Statement::CreateTable(create) => {
            let schema = create.columns.as_ref().map(|columns| Schema {
                fields: columns
                    .iter()
                    .map(|column| FieldConstraint {
                        name: column.name.clone(),
                        ty: column.ty,
                        primary_key: column.primary_key,
                    })
                    .collect(),
            });
            let info = TableInfo { name: create.name.clone(), schema };
            let created = catalog::create_table(txn, &info, create.if_not_exists)?;
            Ok(ExecuteResult::CreateTable { created })
        }
        Statement::DropTable { name, if_exists } => {
            let dropped = catalog::drop_table(txn, name, *if_exists)?;
            Ok(ExecuteResult::DropTable { dropped })
        }
        Statement::CreateIndex(create) => {
            let info = IndexInfo {
                name: create.name.clone(),
                table: create.table.clone(),
                field: create.field.clone(),
                unique: create.unique,
            };
            let created = catalog::create_index(txn, &info, create.if_not_exists)?;
            Ok(ExecuteResult::CreateIndex { created })
        }
        Statement::DropIndex { name, if_exists } => {
            let dropped = catalog::drop_index(txn, name, *if_exists)?;
            Ok(ExecuteResult::DropIndex { dropped })
        }
        Statement::Reindex { table } => {
            let rebuilt = catalog::reindex(txn, table.as_deref())?;
            Ok(ExecuteResult::Reindex { rebuilt })
        }
        Statement::Insert(insert) => {
            let (table, docs) = bind_insert(txn, insert, params)?;
            let stream = Stream::new(vec![StreamOp::Docs(docs), StreamOp::Insert { table }]);
            let inserted = drive(txn, &stream, params)?;
            debug!(table = %insert.table, inserted, "insert complete");
            Ok(ExecuteResult::Insert { inserted })
        }
        Statement::Update(update) => {
            let stream = planner::plan_update(txn, update, params)?;
            let updated = drive(txn, &stream, params)?;
            debug!(table = %update.table, updated, "update complete");
            Ok(ExecuteResult::Update { updated })
        }
        Statement::Delete(delete) => {
            let stream = planner::plan_delete(txn, delete, params)?;
            let deleted = drive(txn, &stream, params)?;
            debug!(table = %delete.table, deleted, "delete complete");
            Ok(ExecuteResult::Delete { deleted })
        }
        Statement::Begin { .. } | Statement::Commit | Statement::Rollback => Err(Error::Internal(
            "transaction control reached the statement executor".to_string(),
        )),
        Statement::Select(_) => Err(Error::Internal(
            "SELECT reached the non-query executor".to_string(),
        )),
    }
}

/// Drives a stream to completion, counting its output documents.
fn drive(txn: &mut dyn KvTransaction, stream: &Stream, params: &Params) -> Result<usize> {
    let mut count = 0usize;
    let mut env = Env::new(txn, params);
    stream.iterate(&mut env, &mut |_env| {
        count += 1;
        Ok(Iterate::Continue)
    })?;
    Ok(count)
}

/// Resolves an `INSERT` statement's source into the documents to store.
fn bind_insert(
    txn: &mut dyn KvTransaction,
    stmt: &InsertStmt,
    params: &Params,
) -> Result<(Table, Vec<FieldBuffer>)> {
    let table = Table::load(&*txn, &stmt.table)?;
    let mut docs = Vec::new();

    match &stmt.source {
        InsertSource::Values(rows) => match &stmt.field_names {
            Some(names) => {
                for row in rows {
                    if row.len() != names.len() {
                        return Err(Error::Type(format!(
                            "{} values for {} fields",
                            row.len(),
                            names.len()
                        )));
                    }
                    let env = Env::new(&mut *txn, params);
                    let mut fb = FieldBuffer::new();
                    for (name, value_expr) in names.iter().zip(row) {
                        fb.add_field(name.clone(), eval(value_expr, &env)?)?;
                    }
                    docs.push(fb);
                }
            }
            None => {
                let Some(schema) = &table.info.schema else {
                    return Err(Error::Type(
                        "fields must be selected for schemaless tables".to_string(),
                    ));
                };
                for row in rows {
                    if row.len() != schema.fields.len() {
                        return Err(Error::Type(format!(
                            "table {:?} has {} fields, got {} values",
                            stmt.table,
                            schema.fields.len(),
                            row.len()
                        )));
                    }
                    let env = Env::new(&mut *txn, params);
                    let mut fb = FieldBuffer::new();
                    for (constraint, value_expr) in schema.fields.iter().zip(row) {
                        fb.add_field(constraint.name.clone(), eval(value_expr, &env)?)?;
                    }
                    docs.push(fb);
                }
            }
        },
        InsertSource::Records(records) => {
            if stmt.field_names.is_some() {
                return Err(Error::Type(
                    "a field list cannot be combined with RECORDS".to_string(),
                ));
            }
            for record in records {
                match record {
                    RecordExpr::Pairs(pairs) => {
                        let env = Env::new(&mut *txn, params);
                        let mut fb = FieldBuffer::new();
                        for (name, value_expr) in pairs {
                            fb.add_field(name.clone(), eval(value_expr, &env)?)?;
                        }
                        docs.push(fb);
                    }
                    RecordExpr::Param(param) => {
                        let value = match param {
                            ParamRef::Positional(index) => params.get_positional(*index)?,
                            ParamRef::Named(name) => params.get_named(name)?,
                        };
                        let Value::Document(fb) = value else {
                            return Err(Error::BadParameter(format!(
                                "RECORDS parameter must be a document, got {}",
                                value.type_name()
                            )));
                        };
                        docs.push(fb.clone());
                    }
                }
            }
        }
    }

    Ok((table, docs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, MemoryEngine};
    use crate::sql::parser;

    fn exec(txn: &mut dyn KvTransaction, sql: &str) -> Result<ExecuteResult> {
        exec_with(txn, sql, &Params::new())
    }

    fn exec_with(txn: &mut dyn KvTransaction, sql: &str, params: &Params) -> Result<ExecuteResult> {
        execute_statement(txn, &parser::parse(sql)?, params)
    }

    fn write_txn(engine: &MemoryEngine) -> Box<dyn KvTransaction> {
        let mut txn = engine.begin(true).unwrap();
        catalog::init(txn.as_mut()).unwrap();
        txn
    }

    #[test]
    fn insert_with_field_list_counts_rows() {
        let engine = MemoryEngine::new();
        let mut txn = write_txn(&engine);
        exec(txn.as_mut(), "CREATE TABLE t").unwrap();
        let result = exec(txn.as_mut(), "INSERT INTO t (a, b) VALUES (1, 2), (3, 4)").unwrap();
        assert_eq!(result, ExecuteResult::Insert { inserted: 2 });
    }

    #[test]
    fn insert_cardinality_mismatch_fails() {
        let engine = MemoryEngine::new();
        let mut txn = write_txn(&engine);
        exec(txn.as_mut(), "CREATE TABLE t").unwrap();
        let err = exec(txn.as_mut(), "INSERT INTO t (a, b) VALUES (1)").unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn insert_without_field_list_requires_a_schema() {
        let engine = MemoryEngine::new();
        let mut txn = write_txn(&engine);
        exec(txn.as_mut(), "CREATE TABLE t").unwrap();
        let err = exec(txn.as_mut(), "INSERT INTO t VALUES (1)").unwrap_err();
        assert!(matches!(err, Error::Type(_)));

        exec(txn.as_mut(), "CREATE TABLE s (a INT, b TEXT)").unwrap();
        let result = exec(txn.as_mut(), "INSERT INTO s VALUES (1, 'x')").unwrap();
        assert_eq!(result, ExecuteResult::Insert { inserted: 1 });

        let err = exec(txn.as_mut(), "INSERT INTO s VALUES (1)").unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn insert_records_accepts_pairs_and_document_params() {
        let engine = MemoryEngine::new();
        let mut txn = write_txn(&engine);
        exec(txn.as_mut(), "CREATE TABLE t").unwrap();

        let mut doc = FieldBuffer::new();
        doc.add_field("a", Value::Int64(3)).unwrap();
        let params = Params::new().positional(Value::Document(doc));
        let result = exec_with(
            txn.as_mut(),
            "INSERT INTO t RECORDS (a: 1), {a: 2}, ?",
            &params,
        )
        .unwrap();
        assert_eq!(result, ExecuteResult::Insert { inserted: 3 });

        let err = exec_with(
            txn.as_mut(),
            "INSERT INTO t RECORDS ?",
            &Params::new().positional(1i64),
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadParameter(_)));
    }

    #[test]
    fn update_and_delete_report_affected_counts() {
        let engine = MemoryEngine::new();
        let mut txn = write_txn(&engine);
        exec(txn.as_mut(), "CREATE TABLE t").unwrap();
        exec(txn.as_mut(), "INSERT INTO t (a) VALUES (1), (2), (3)").unwrap();

        let result = exec(txn.as_mut(), "UPDATE t SET a = a + 10 WHERE a >= 2").unwrap();
        assert_eq!(result, ExecuteResult::Update { updated: 2 });

        let result = exec(txn.as_mut(), "DELETE FROM t WHERE a = 1").unwrap();
        assert_eq!(result, ExecuteResult::Delete { deleted: 1 });
    }

    #[test]
    fn ddl_results_carry_created_and_dropped_flags() {
        let engine = MemoryEngine::new();
        let mut txn = write_txn(&engine);
        assert_eq!(
            exec(txn.as_mut(), "CREATE TABLE t").unwrap(),
            ExecuteResult::CreateTable { created: true }
        );
        assert_eq!(
            exec(txn.as_mut(), "CREATE TABLE IF NOT EXISTS t").unwrap(),
            ExecuteResult::CreateTable { created: false }
        );
        assert_eq!(
            exec(txn.as_mut(), "CREATE INDEX ix ON t(a)").unwrap(),
            ExecuteResult::CreateIndex { created: true }
        );
        assert_eq!(
            exec(txn.as_mut(), "REINDEX t").unwrap(),
            ExecuteResult::Reindex { rebuilt: 1 }
        );
        assert_eq!(
            exec(txn.as_mut(), "DROP INDEX ix").unwrap(),
            ExecuteResult::DropIndex { dropped: true }
        );
        assert_eq!(
            exec(txn.as_mut(), "DROP TABLE t").unwrap(),
            ExecuteResult::DropTable { dropped: true }
        );
    }

    #[test]
    fn transaction_control_does_not_belong_here() {
        let engine = MemoryEngine::new();
        let mut txn = write_txn(&engine);
        assert!(matches!(
            exec(txn.as_mut(), "BEGIN").unwrap_err(),
            Error::Internal(_)
        ));
    }
}
