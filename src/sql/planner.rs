//! # Planner
//!
//! Compiles a parsed statement into a stream:
//!
//! 1. Source selection: when the `WHERE` expression index-matches and the
//!    index exists, an `IndexScan` over the matched range replaces both
//!    the table scan and the filter (everything the matcher accepts is
//!    fully subsumed by the range); otherwise a `TableScan` plus `Filter`.
//! 2. `GROUP BY` sorts by the group expression and deduplicates adjacent
//!    groups; `ORDER BY` appends its own sort (nulls first ascending,
//!    last descending, which falls directly out of the key encoding).
//! 3. `Skip` runs before `Take`; both bounds evaluate once at plan time
//!    and must be non-negative integers.
//! 4. `SELECT` appends projection, then `Distinct` when requested, so
//!    deduplication sees projected records and the limit counts distinct
//!    rows.
//! 5. DML statements wrap the source/filter chain with their operator.

use super::ast::{DeleteStmt, Expr, Selector, SelectStmt, UpdateStmt};
use super::expr::{eval, match_index, Env, Params};
use super::stream::{Stream, StreamOp};
use crate::catalog::Table;
use crate::engine::KvTransaction;
use crate::error::{Error, Result};
use tracing::debug;

/// A compiled `SELECT`: the stream and its projected column names.
#[derive(Debug)]
pub struct SelectPlan {
    pub stream: Stream,
    pub columns: Vec<String>,
}

fn source_ops(table: Table, where_expr: &Option<Expr>, params: &Params) -> Vec<StreamOp> {
    if let Some(predicate) = where_expr {
        if let Some((index, range)) = match_index(predicate, &table.indexes, params) {
            debug!(index = %index.name, "planned index scan");
            return vec![StreamOp::IndexScan { table, index, range }];
        }
        return vec![
            StreamOp::TableScan { table, reverse: false },
            StreamOp::Filter(predicate.clone()),
        ];
    }
    vec![StreamOp::TableScan { table, reverse: false }]
}

/// Evaluates a plan-time bound (`LIMIT`/`OFFSET`) to a non-negative count.
fn eval_bound(
    txn: &mut dyn KvTransaction,
    expr: &Expr,
    params: &Params,
    clause: &str,
) -> Result<u64> {
    let env = Env::new(txn, params);
    let value = eval(expr, &env)?;
    let int = value.as_int().ok_or_else(|| {
        Error::Type(format!(
            "{} expression must evaluate to an integer, got {}",
            clause,
            value.type_name()
        ))
    })?;
    u64::try_from(int)
        .map_err(|_| Error::Type(format!("{} expression must not be negative", clause)))
}

pub fn plan_select(
    txn: &mut dyn KvTransaction,
    stmt: &SelectStmt,
    params: &Params,
) -> Result<SelectPlan> {
    let table = Table::load(&*txn, &stmt.table)?;
    let mut ops = source_ops(table, &stmt.where_expr, params);

    if let Some(group) = &stmt.group_by {
        ops.push(StreamOp::TempTreeSort { expr: group.clone(), reverse: false });
        ops.push(StreamOp::GroupDedup(group.clone()));
    }

    if let Some(order) = &stmt.order_by {
        ops.push(StreamOp::TempTreeSort { expr: order.expr.clone(), reverse: order.desc });
    }

    ops.push(StreamOp::Project(stmt.selectors.clone()));
    if stmt.distinct {
        ops.push(StreamOp::Distinct);
    }

    if let Some(offset) = &stmt.offset {
        ops.push(StreamOp::Skip(eval_bound(txn, offset, params, "offset")?));
    }
    if let Some(limit) = &stmt.limit {
        ops.push(StreamOp::Take(eval_bound(txn, limit, params, "limit")?));
    }

    let columns = stmt
        .selectors
        .iter()
        .map(|selector| match selector {
            Selector::Wildcard => "record".to_string(),
            Selector::Field(name) => name.clone(),
        })
        .collect();

    Ok(SelectPlan { stream: Stream::new(ops), columns })
}

pub fn plan_update(
    txn: &mut dyn KvTransaction,
    stmt: &UpdateStmt,
    params: &Params,
) -> Result<Stream> {
    let table = Table::load(&*txn, &stmt.table)?;
    let mut ops = source_ops(table.clone(), &stmt.where_expr, params);
    ops.push(StreamOp::Update { table, assignments: stmt.assignments.clone() });
    Ok(Stream::new(ops))
}

pub fn plan_delete(
    txn: &mut dyn KvTransaction,
    stmt: &DeleteStmt,
    params: &Params,
) -> Result<Stream> {
    let table = Table::load(&*txn, &stmt.table)?;
    let mut ops = source_ops(table.clone(), &stmt.where_expr, params);
    ops.push(StreamOp::Delete { table });
    Ok(Stream::new(ops))
}
