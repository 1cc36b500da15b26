//! # Stream Operators
//!
//! A statement compiles into a [`Stream`]: a source operator followed by
//! transforms, pulled by a callback. Every operator implements the same
//! contract: iterate the upstream chain, invoke the callback once per
//! output document, and propagate [`Iterate::Stop`] as non-error early
//! termination. `Stop` is a value, never an error, and never escapes the
//! statement boundary; `Take` uses it to shut the whole chain down after
//! the last wanted row without unwinding.
//!
//! Operators extend the environment rather than replacing it: a source
//! sets the current document and record id, transforms rewrite the
//! current document, and DML operators write through the transaction
//! before handing the document on. The sort operator materializes into a
//! private ordered tree keyed by `encode(sort value) ++ tiebreak`, so
//! equal sort keys keep their insertion order and reverse iteration flips
//! direction without re-encoding; the tree is statement-scoped and never
//! writes through the transaction, which is what lets read-only
//! statements sort.

use super::ast::{Expr, Selector};
use super::expr::{eval, truth, Env};
use crate::catalog::{IndexInfo, IndexRange, Table};
use crate::document::FieldBuffer;
use crate::encoding::{key, record};
use crate::error::{Error, Result};
use crate::types::Value;
use hashbrown::HashSet;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Callback verdict: keep pulling or terminate early without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterate {
    Continue,
    Stop,
}

type RowFn<'c> = dyn FnMut(&mut Env<'_>) -> Result<Iterate> + 'c;

/// One operator of a compiled statement.
#[derive(Debug, Clone)]
pub enum StreamOp {
    /// Source: every record of a table in record-id order.
    TableScan { table: Table, reverse: bool },
    /// Source: records resolved from one index range, in index order.
    IndexScan { table: Table, index: IndexInfo, range: IndexRange },
    /// Source: a fixed list of documents (INSERT input).
    Docs(Vec<FieldBuffer>),
    Filter(Expr),
    Project(Vec<Selector>),
    TempTreeSort { expr: Expr, reverse: bool },
    Distinct,
    /// Emits the first record of each run of equal group keys; the
    /// planner sorts by the same expression upstream.
    GroupDedup(Expr),
    Skip(u64),
    Take(u64),
    Insert { table: Table },
    Update { table: Table, assignments: Vec<(String, Expr)> },
    Delete { table: Table },
}

/// A compiled operator chain; `ops[0]` is the source.
#[derive(Debug, Clone)]
pub struct Stream {
    ops: Vec<StreamOp>,
}

impl Stream {
    pub fn new(ops: Vec<StreamOp>) -> Stream {
        Stream { ops }
    }

    /// Pulls every output document through `callback`.
    pub fn iterate(&self, env: &mut Env<'_>, callback: &mut RowFn<'_>) -> Result<Iterate> {
        iterate_ops(&self.ops, env, callback)
    }
}

fn current_doc<'a>(env: &'a Env<'_>) -> Result<&'a FieldBuffer> {
    env.current
        .as_ref()
        .ok_or_else(|| Error::Internal("operator invoked without a current document".to_string()))
}

fn iterate_ops(ops: &[StreamOp], env: &mut Env<'_>, cb: &mut RowFn<'_>) -> Result<Iterate> {
    let Some((op, upstream)) = ops.split_last() else {
        return cb(env);
    };

    match op {
        StreamOp::TableScan { table, reverse } => {
            let mut cursor =
                env.txn
                    .cursor(&table.bucket(), Bound::Unbounded, Bound::Unbounded, *reverse)?;
            while let Some((record_id, bytes)) = cursor.next() {
                env.current = Some(record::decode(&bytes)?);
                env.current_id = Some(record_id);
                if cb(env)? == Iterate::Stop {
                    return Ok(Iterate::Stop);
                }
            }
            Ok(Iterate::Continue)
        }

        StreamOp::IndexScan { table, index, range } => {
            if range.is_empty() {
                return Ok(Iterate::Continue);
            }
            let (lower, upper) = range.to_bounds();
            let mut cursor = env.txn.cursor(&index.bucket(), lower, upper, false)?;
            while let Some((entry_key, entry_value)) = cursor.next() {
                let record_id = index.entry_record_id(&entry_key, &entry_value)?;
                let Some(doc) = table.get(&*env.txn, &record_id)? else {
                    return Err(Error::Internal(format!(
                        "index {:?} references a missing record",
                        index.name
                    )));
                };
                env.current = Some(doc);
                env.current_id = Some(record_id);
                if cb(env)? == Iterate::Stop {
                    return Ok(Iterate::Stop);
                }
            }
            Ok(Iterate::Continue)
        }

        StreamOp::Docs(docs) => {
            for doc in docs {
                env.current = Some(doc.clone());
                env.current_id = None;
                if cb(env)? == Iterate::Stop {
                    return Ok(Iterate::Stop);
                }
            }
            Ok(Iterate::Continue)
        }

        StreamOp::Filter(predicate) => iterate_ops(upstream, env, &mut |env| {
            match truth(&eval(predicate, env)?) {
                Some(true) => cb(env),
                _ => Ok(Iterate::Continue),
            }
        }),

        StreamOp::Project(selectors) => iterate_ops(upstream, env, &mut |env| {
            let source = current_doc(env)?;
            let mut projected = FieldBuffer::new();
            for selector in selectors {
                match selector {
                    Selector::Wildcard => projected.scan(source)?,
                    Selector::Field(name) => {
                        let value = source.get(name).cloned().unwrap_or(Value::Null);
                        projected.add_field(name.clone(), value)?;
                    }
                }
            }
            env.current = Some(projected);
            cb(env)
        }),

        StreamOp::TempTreeSort { expr, reverse } => {
            let mut tree: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
            let mut tiebreak: u64 = 0;
            iterate_ops(upstream, env, &mut |env| {
                let sort_value = eval(expr, env)?;
                let doc = current_doc(env)?;
                let mut sort_key = key::encode_key(&sort_value);
                sort_key.extend_from_slice(&tiebreak.to_be_bytes());
                tiebreak += 1;
                tree.insert(sort_key, record::encode(doc));
                Ok(Iterate::Continue)
            })?;

            let mut emit = |env: &mut Env<'_>, bytes: &[u8]| -> Result<Iterate> {
                env.current = Some(record::decode(bytes)?);
                env.current_id = None;
                cb(env)
            };
            if *reverse {
                for bytes in tree.values().rev() {
                    if emit(env, bytes)? == Iterate::Stop {
                        return Ok(Iterate::Stop);
                    }
                }
            } else {
                for bytes in tree.values() {
                    if emit(env, bytes)? == Iterate::Stop {
                        return Ok(Iterate::Stop);
                    }
                }
            }
            Ok(Iterate::Continue)
        }

        StreamOp::Distinct => {
            let mut seen: HashSet<Vec<u8>> = HashSet::new();
            iterate_ops(upstream, env, &mut |env| {
                let doc = current_doc(env)?;
                let fingerprint = key::encode_key(&Value::Document(doc.clone()));
                if seen.insert(fingerprint) {
                    cb(env)
                } else {
                    Ok(Iterate::Continue)
                }
            })
        }

        StreamOp::GroupDedup(expr) => {
            let mut last_group: Option<Vec<u8>> = None;
            iterate_ops(upstream, env, &mut |env| {
                let group = key::encode_key(&eval(expr, env)?);
                if last_group.as_deref() == Some(group.as_slice()) {
                    return Ok(Iterate::Continue);
                }
                last_group = Some(group);
                cb(env)
            })
        }

        StreamOp::Skip(count) => {
            let mut skipped: u64 = 0;
            iterate_ops(upstream, env, &mut |env| {
                if skipped < *count {
                    skipped += 1;
                    return Ok(Iterate::Continue);
                }
                cb(env)
            })
        }

        StreamOp::Take(count) => {
            if *count == 0 {
                return Ok(Iterate::Continue);
            }
            let mut taken: u64 = 0;
            iterate_ops(upstream, env, &mut |env| {
                let verdict = cb(env)?;
                taken += 1;
                if taken >= *count {
                    // enough rows: stop the upstream without an error
                    return Ok(Iterate::Stop);
                }
                Ok(verdict)
            })
        }

        StreamOp::Insert { table } => iterate_ops(upstream, env, &mut |env| {
            let doc = env
                .current
                .take()
                .ok_or_else(|| Error::Internal("insert without a source document".to_string()))?;
            let (record_id, stored) = table.insert(&mut *env.txn, doc)?;
            env.current = Some(stored);
            env.current_id = Some(record_id);
            cb(env)
        }),

        StreamOp::Update { table, assignments } => iterate_ops(upstream, env, &mut |env| {
            let record_id = env
                .current_id
                .clone()
                .ok_or_else(|| Error::Internal("update without a record id".to_string()))?;
            // every assignment evaluates against the record as it was read
            let mut new_values = Vec::with_capacity(assignments.len());
            for (field, assignment) in assignments {
                new_values.push((field, eval(assignment, env)?));
            }
            let mut updated = current_doc(env)?.clone();
            for (field, value) in new_values {
                updated.replace(field, value)?;
            }
            let (new_id, stored) = table.replace(&mut *env.txn, &record_id, updated)?;
            env.current = Some(stored);
            env.current_id = Some(new_id);
            cb(env)
        }),

        StreamOp::Delete { table } => iterate_ops(upstream, env, &mut |env| {
            let record_id = env
                .current_id
                .clone()
                .ok_or_else(|| Error::Internal("delete without a record id".to_string()))?;
            let removed = table.delete(&mut *env.txn, &record_id)?;
            env.current = Some(removed);
            env.current_id = Some(record_id);
            cb(env)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, TableInfo};
    use crate::engine::{Engine, KvTransaction, MemoryEngine};
    use crate::sql::expr::Params;
    use crate::sql::parser::Parser;

    fn doc(pairs: &[(&str, Value)]) -> FieldBuffer {
        let mut fb = FieldBuffer::new();
        for (name, value) in pairs {
            fb.add_field(*name, value.clone()).unwrap();
        }
        fb
    }

    fn expr(input: &str) -> Expr {
        Parser::new(input).parse_expr().unwrap()
    }

    fn seeded(engine: &MemoryEngine, docs: &[FieldBuffer]) -> (Box<dyn KvTransaction>, Table) {
        let mut txn = engine.begin(true).unwrap();
        catalog::init(txn.as_mut()).unwrap();
        let info = TableInfo { name: "t".to_string(), schema: None };
        catalog::create_table(txn.as_mut(), &info, false).unwrap();
        let table = Table::load(txn.as_ref(), "t").unwrap();
        for fb in docs {
            table.insert(txn.as_mut(), fb.clone()).unwrap();
        }
        (txn, table)
    }

    fn run(stream: &Stream, txn: &mut dyn KvTransaction) -> Vec<FieldBuffer> {
        let params = Params::new();
        let mut env = Env::new(txn, &params);
        let mut out = Vec::new();
        stream
            .iterate(&mut env, &mut |env| {
                out.push(env.current.clone().unwrap());
                Ok(Iterate::Continue)
            })
            .unwrap();
        out
    }

    #[test]
    fn table_scan_yields_records_in_id_order() {
        let engine = MemoryEngine::new();
        let docs: Vec<_> = (1..=3).map(|i| doc(&[("a", Value::Int64(i))])).collect();
        let (mut txn, table) = seeded(&engine, &docs);

        let stream = Stream::new(vec![StreamOp::TableScan { table: table.clone(), reverse: false }]);
        assert_eq!(run(&stream, txn.as_mut()), docs);

        let stream = Stream::new(vec![StreamOp::TableScan { table, reverse: true }]);
        let reversed: Vec<_> = docs.into_iter().rev().collect();
        assert_eq!(run(&stream, txn.as_mut()), reversed);
    }

    #[test]
    fn filter_drops_false_and_unknown() {
        let engine = MemoryEngine::new();
        let docs = vec![
            doc(&[("a", Value::Int64(1))]),
            doc(&[("b", Value::Int64(9))]),
            doc(&[("a", Value::Int64(5))]),
        ];
        let (mut txn, table) = seeded(&engine, &docs);
        let stream = Stream::new(vec![
            StreamOp::TableScan { table, reverse: false },
            StreamOp::Filter(expr("a >= 2")),
        ]);
        assert_eq!(run(&stream, txn.as_mut()), vec![doc(&[("a", Value::Int64(5))])]);
    }

    #[test]
    fn project_wildcard_is_verbatim_and_unknown_fields_are_null() {
        let engine = MemoryEngine::new();
        let docs = vec![doc(&[("b", Value::Int64(2)), ("a", Value::Int64(1))])];
        let (mut txn, table) = seeded(&engine, &docs);

        let stream = Stream::new(vec![
            StreamOp::TableScan { table: table.clone(), reverse: false },
            StreamOp::Project(vec![Selector::Wildcard]),
        ]);
        assert_eq!(run(&stream, txn.as_mut()), docs);

        let stream = Stream::new(vec![
            StreamOp::TableScan { table, reverse: false },
            StreamOp::Project(vec![
                Selector::Field("z".to_string()),
                Selector::Field("a".to_string()),
            ]),
        ]);
        assert_eq!(
            run(&stream, txn.as_mut()),
            vec![doc(&[("z", Value::Null), ("a", Value::Int64(1))])]
        );
    }

    #[test]
    fn sort_orders_nulls_first_and_reverse_inverts() {
        let engine = MemoryEngine::new();
        let docs = vec![
            doc(&[("a", Value::Int64(0))]),
            doc(&[]),
            doc(&[("a", Value::Bool(true))]),
        ];
        let (mut txn, table) = seeded(&engine, &docs);

        let stream = Stream::new(vec![
            StreamOp::TableScan { table: table.clone(), reverse: false },
            StreamOp::TempTreeSort { expr: expr("a"), reverse: false },
        ]);
        assert_eq!(
            run(&stream, txn.as_mut()),
            vec![
                doc(&[]),
                doc(&[("a", Value::Int64(0))]),
                doc(&[("a", Value::Bool(true))]),
            ]
        );

        let stream = Stream::new(vec![
            StreamOp::TableScan { table, reverse: false },
            StreamOp::TempTreeSort { expr: expr("a"), reverse: true },
        ]);
        assert_eq!(
            run(&stream, txn.as_mut()),
            vec![
                doc(&[("a", Value::Bool(true))]),
                doc(&[("a", Value::Int64(0))]),
                doc(&[]),
            ]
        );
    }

    #[test]
    fn sort_preserves_insertion_order_of_equal_keys() {
        let engine = MemoryEngine::new();
        let docs = vec![
            doc(&[("a", Value::Int64(1)), ("tag", Value::Text("first".into()))]),
            doc(&[("a", Value::Int64(1)), ("tag", Value::Text("second".into()))]),
        ];
        let (mut txn, table) = seeded(&engine, &docs);
        let stream = Stream::new(vec![
            StreamOp::TableScan { table, reverse: false },
            StreamOp::TempTreeSort { expr: expr("a"), reverse: false },
        ]);
        let out = run(&stream, txn.as_mut());
        assert_eq!(out[0].get("tag"), Some(&Value::Text("first".into())));
        assert_eq!(out[1].get("tag"), Some(&Value::Text("second".into())));
    }

    #[test]
    fn skip_and_take_slice_the_stream() {
        let engine = MemoryEngine::new();
        let docs: Vec<_> = (1..=5).map(|i| doc(&[("a", Value::Int64(i))])).collect();
        let (mut txn, table) = seeded(&engine, &docs);

        let stream = Stream::new(vec![
            StreamOp::TableScan { table, reverse: false },
            StreamOp::Skip(1),
            StreamOp::Take(2),
        ]);
        assert_eq!(
            run(&stream, txn.as_mut()),
            vec![doc(&[("a", Value::Int64(2))]), doc(&[("a", Value::Int64(3))])]
        );
    }

    #[test]
    fn take_zero_emits_nothing() {
        let engine = MemoryEngine::new();
        let docs = vec![doc(&[("a", Value::Int64(1))])];
        let (mut txn, table) = seeded(&engine, &docs);
        let stream = Stream::new(vec![
            StreamOp::TableScan { table, reverse: false },
            StreamOp::Take(0),
        ]);
        assert!(run(&stream, txn.as_mut()).is_empty());
    }

    #[test]
    fn distinct_deduplicates_projected_records() {
        let engine = MemoryEngine::new();
        let docs = vec![
            doc(&[("a", Value::Int64(1)), ("b", Value::Int64(1))]),
            doc(&[("a", Value::Int64(1)), ("b", Value::Int64(2))]),
            doc(&[("a", Value::Int64(2))]),
        ];
        let (mut txn, table) = seeded(&engine, &docs);
        let stream = Stream::new(vec![
            StreamOp::TableScan { table, reverse: false },
            StreamOp::Project(vec![Selector::Field("a".to_string())]),
            StreamOp::Distinct,
        ]);
        assert_eq!(
            run(&stream, txn.as_mut()),
            vec![doc(&[("a", Value::Int64(1))]), doc(&[("a", Value::Int64(2))])]
        );
    }

    #[test]
    fn index_scan_resolves_records_in_index_order() {
        let engine = MemoryEngine::new();
        let docs = vec![
            doc(&[("a", Value::Int64(3))]),
            doc(&[("a", Value::Int64(1))]),
            doc(&[("a", Value::Int64(2))]),
        ];
        let (mut txn, mut table) = seeded(&engine, &docs);
        let idx = IndexInfo {
            name: "ix_a".to_string(),
            table: "t".to_string(),
            field: "a".to_string(),
            unique: false,
        };
        catalog::create_index(txn.as_mut(), &idx, false).unwrap();
        table.indexes.push(idx.clone());

        let stream = Stream::new(vec![StreamOp::IndexScan {
            table,
            index: idx,
            range: IndexRange {
                low: Some(Value::Int64(2)),
                high: None,
                low_inclusive: true,
                high_inclusive: true,
            },
        }]);
        assert_eq!(
            run(&stream, txn.as_mut()),
            vec![doc(&[("a", Value::Int64(2))]), doc(&[("a", Value::Int64(3))])]
        );
    }

    #[test]
    fn update_applies_assignments_against_the_original_record() {
        let engine = MemoryEngine::new();
        let docs = vec![doc(&[("a", Value::Int64(1)), ("b", Value::Int64(10))])];
        let (mut txn, table) = seeded(&engine, &docs);
        let stream = Stream::new(vec![
            StreamOp::TableScan { table: table.clone(), reverse: false },
            StreamOp::Update {
                table: table.clone(),
                assignments: vec![
                    ("a".to_string(), expr("a + 1")),
                    ("b".to_string(), expr("a * 100")),
                ],
            },
        ]);
        let out = run(&stream, txn.as_mut());
        // b sees the original a, not the freshly assigned one
        assert_eq!(
            out,
            vec![doc(&[("a", Value::Int64(2)), ("b", Value::Int64(100))])]
        );
    }

    #[test]
    fn delete_emits_the_removed_records() {
        let engine = MemoryEngine::new();
        let docs = vec![doc(&[("a", Value::Int64(1))]), doc(&[("a", Value::Int64(2))])];
        let (mut txn, table) = seeded(&engine, &docs);
        let stream = Stream::new(vec![
            StreamOp::TableScan { table: table.clone(), reverse: false },
            StreamOp::Filter(expr("a = 1")),
            StreamOp::Delete { table: table.clone() },
        ]);
        let out = run(&stream, txn.as_mut());
        assert_eq!(out, vec![doc(&[("a", Value::Int64(1))])]);

        let remaining = Stream::new(vec![StreamOp::TableScan { table, reverse: false }]);
        assert_eq!(run(&remaining, txn.as_mut()), vec![doc(&[("a", Value::Int64(2))])]);
    }
}
