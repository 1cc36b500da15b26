//! # Expression Evaluation
//!
//! Evaluation runs against the streaming [`Env`]: the current document,
//! the statement's parameter bindings, and the transaction handle. The
//! rules are the dialect's, not Rust's:
//!
//! - a missing field reference yields `Null`, never an error;
//! - `AND`/`OR` are Kleene three-valued; `WHERE` later filters out both
//!   `Null` and `false`;
//! - comparisons follow the total order within a kind, coerce across
//!   numeric representations, yield `Null` when an operand is `Null`, and
//!   yield `false` for incompatible kinds;
//! - arithmetic coerces numerically; division or modulo by zero yields
//!   `Null`; non-numeric operands are type errors;
//! - a missing positional parameter is `BadParameter`.
//!
//! [`match_index`] is the index-match capability: it recognizes `WHERE`
//! expressions that are conjunctions of comparisons against constants on
//! one indexed field and turns them into an [`IndexRange`]. Anything it
//! accepts is fully subsumed by the range, so the planner can drop the
//! filter.

use super::ast::{BinaryOp, Expr};
use crate::catalog::{IndexInfo, IndexRange};
use crate::document::FieldBuffer;
use crate::engine::KvTransaction;
use crate::error::{Error, Result};
use crate::types::Value;
use hashbrown::HashMap;
use std::cmp::Ordering;

/// Positional and named parameter bindings for one statement.
#[derive(Debug, Clone, Default)]
pub struct Params {
    positional: Vec<Value>,
    named: HashMap<String, Value>,
}

impl Params {
    pub fn new() -> Params {
        Params::default()
    }

    /// Appends the next positional (`?`) binding.
    pub fn positional(mut self, value: impl Into<Value>) -> Params {
        self.positional.push(value.into());
        self
    }

    /// Binds a named (`$name`) parameter.
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Params {
        self.named.insert(name.into(), value.into());
        self
    }

    pub(crate) fn get_positional(&self, index: usize) -> Result<&Value> {
        self.positional
            .get(index)
            .ok_or_else(|| Error::BadParameter(format!("no value bound for parameter {}", index + 1)))
    }

    pub(crate) fn get_named(&self, name: &str) -> Result<&Value> {
        self.named
            .get(name)
            .ok_or_else(|| Error::BadParameter(format!("no value bound for parameter ${}", name)))
    }
}

/// The per-statement environment a stream extends frame by frame.
pub struct Env<'a> {
    pub txn: &'a mut dyn KvTransaction,
    pub params: &'a Params,
    pub current: Option<FieldBuffer>,
    pub current_id: Option<Vec<u8>>,
}

impl<'a> Env<'a> {
    pub fn new(txn: &'a mut dyn KvTransaction, params: &'a Params) -> Env<'a> {
        Env { txn, params, current: None, current_id: None }
    }
}

/// Three-valued truth of a value: `None` is unknown.
pub fn truth(value: &Value) -> Option<bool> {
    if value.is_null() {
        None
    } else {
        Some(value.is_truthy())
    }
}

/// Evaluates an expression in an environment.
pub fn eval(expr: &Expr, env: &Env<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Field(name) => Ok(env
            .current
            .as_ref()
            .and_then(|doc| doc.get(name))
            .cloned()
            .unwrap_or(Value::Null)),
        Expr::PositionalParam(index) => env.params.get_positional(*index).cloned(),
        Expr::NamedParam(name) => env.params.get_named(name).cloned(),
        Expr::Neg(inner) => negate(eval(inner, env)?),
        Expr::Cast { expr, target } => eval(expr, env)?.cast(*target),
        Expr::DocumentLiteral(pairs) => {
            let mut doc = FieldBuffer::new();
            for (name, value_expr) in pairs {
                doc.add_field(name.clone(), eval(value_expr, env)?)?;
            }
            Ok(Value::Document(doc))
        }
        Expr::ArrayLiteral(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, env)?);
            }
            Ok(Value::Array(values))
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, env),
        Expr::List(_) | Expr::Pattern(_) => Err(Error::Internal(
            "operand expression evaluated outside its operator".to_string(),
        )),
    }
}

fn negate(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Float64(f) => Ok(Value::Float64(-f)),
        ref v if v.is_integer() => {
            let i = v
                .as_int()
                .and_then(i64::checked_neg)
                .ok_or_else(|| Error::Type("integer negation overflow".to_string()))?;
            Ok(Value::Int64(i))
        }
        v => Err(Error::Type(format!("cannot negate {}", v.type_name()))),
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, env: &Env<'_>) -> Result<Value> {
    match op {
        BinaryOp::And => {
            let lhs = truth(&eval(left, env)?);
            if lhs == Some(false) {
                return Ok(Value::Bool(false));
            }
            let rhs = truth(&eval(right, env)?);
            Ok(match (lhs, rhs) {
                (_, Some(false)) => Value::Bool(false),
                (Some(true), Some(true)) => Value::Bool(true),
                _ => Value::Null,
            })
        }
        BinaryOp::Or => {
            let lhs = truth(&eval(left, env)?);
            if lhs == Some(true) {
                return Ok(Value::Bool(true));
            }
            let rhs = truth(&eval(right, env)?);
            Ok(match (lhs, rhs) {
                (_, Some(true)) => Value::Bool(true),
                (Some(false), Some(false)) => Value::Bool(false),
                _ => Value::Null,
            })
        }
        BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            let lhs = eval(left, env)?;
            let rhs = eval(right, env)?;
            Ok(compare(op, &lhs, &rhs))
        }
        BinaryOp::Is | BinaryOp::IsNot => {
            let lhs = eval(left, env)?;
            let rhs = eval(right, env)?;
            let same = null_safe_eq(&lhs, &rhs);
            Ok(Value::Bool(if op == BinaryOp::Is { same } else { !same }))
        }
        BinaryOp::In | BinaryOp::NotIn => {
            let lhs = eval(left, env)?;
            if lhs.is_null() {
                return Ok(Value::Null);
            }
            let Expr::List(items) = right else {
                return Err(Error::Internal("IN without a list operand".to_string()));
            };
            let mut found = false;
            for item in items {
                let candidate = eval(item, env)?;
                if values_equal(&lhs, &candidate) {
                    found = true;
                    break;
                }
            }
            if op == BinaryOp::NotIn {
                found = !found;
            }
            Ok(Value::Bool(found))
        }
        BinaryOp::Like | BinaryOp::RegexEq | BinaryOp::RegexNeq => {
            let Expr::Pattern(pattern) = right else {
                return Err(Error::Internal("pattern operator without a pattern".to_string()));
            };
            match eval(left, env)? {
                Value::Null => Ok(Value::Null),
                Value::Text(text) => {
                    let matched = pattern.matches(&text);
                    Ok(Value::Bool(if op == BinaryOp::RegexNeq { !matched } else { matched }))
                }
                _ => Ok(Value::Bool(false)),
            }
        }
        BinaryOp::Concat => {
            let lhs = eval(left, env)?;
            let rhs = eval(right, env)?;
            match (lhs, rhs) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Text(a), Value::Text(b)) => Ok(Value::Text(a + &b)),
                (a, b) => Err(Error::Type(format!(
                    "cannot concatenate {} and {}",
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
        BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::BitAnd => {
            let lhs = eval(left, env)?;
            let rhs = eval(right, env)?;
            if lhs.is_null() || rhs.is_null() {
                return Ok(Value::Null);
            }
            let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) else {
                return Err(Error::Type(format!(
                    "bitwise operator requires integers, got {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                )));
            };
            Ok(Value::Int64(match op {
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                _ => a & b,
            }))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let lhs = eval(left, env)?;
            let rhs = eval(right, env)?;
            arithmetic(op, lhs, rhs)
        }
    }
}

/// SQL comparison: `Null` operands are unknown, incompatible kinds are
/// plain false, numbers compare numerically across representations.
fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    if lhs.is_null() || rhs.is_null() {
        return Value::Null;
    }
    if lhs.kind() != rhs.kind() {
        return Value::Bool(false);
    }
    let ord = lhs.cmp_total(rhs);
    let result = match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::Neq => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Lte => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Gte => ord != Ordering::Less,
        _ => unreachable!("compare called with non-comparison operator"),
    };
    Value::Bool(result)
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    !lhs.is_null()
        && !rhs.is_null()
        && lhs.kind() == rhs.kind()
        && lhs.cmp_total(rhs) == Ordering::Equal
}

fn null_safe_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.is_null(), rhs.is_null()) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) => lhs.kind() == rhs.kind() && lhs.cmp_total(rhs) == Ordering::Equal,
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }

    if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Ok(Value::Null);
                }
                a.checked_div(b)
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Ok(Value::Null);
                }
                a.checked_rem(b)
            }
            _ => unreachable!("arithmetic called with non-arithmetic operator"),
        };
        return result
            .map(Value::Int64)
            .ok_or_else(|| Error::Type("integer arithmetic overflow".to_string()));
    }

    let (Some(a), Some(b)) = (lhs.as_float(), rhs.as_float()) else {
        return Err(Error::Type(format!(
            "arithmetic requires numbers, got {} and {}",
            lhs.type_name(),
            rhs.type_name()
        )));
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Ok(Value::Null);
            }
            a / b
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Ok(Value::Null);
            }
            a % b
        }
        _ => unreachable!("arithmetic called with non-arithmetic operator"),
    };
    Ok(Value::Float64(result))
}

/// A constant operand at plan time: a literal or a bound parameter.
fn constant_operand(expr: &Expr, params: &Params) -> Option<Value> {
    match expr {
        Expr::Literal(value) => Some(value.clone()),
        Expr::PositionalParam(index) => params.get_positional(*index).ok().cloned(),
        Expr::NamedParam(name) => params.get_named(name).ok().cloned(),
        _ => None,
    }
}

fn flatten_conjunction<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary { op: BinaryOp::And, left, right } => {
            flatten_conjunction(left, out);
            flatten_conjunction(right, out);
        }
        other => out.push(other),
    }
}

struct Comparison<'e> {
    field: &'e str,
    op: BinaryOp,
    value: Value,
}

fn as_field_comparison<'e>(expr: &'e Expr, params: &Params) -> Option<Comparison<'e>> {
    let Expr::Binary { op, left, right } = expr else {
        return None;
    };
    let flipped = |op: BinaryOp| match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Lte => BinaryOp::Gte,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Gte => BinaryOp::Lte,
        other => other,
    };
    match op {
        BinaryOp::Eq | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {}
        _ => return None,
    }
    match (left.as_ref(), right.as_ref()) {
        (Expr::Field(field), operand) => Some(Comparison {
            field: field.as_str(),
            op: *op,
            value: constant_operand(operand, params)?,
        }),
        (operand, Expr::Field(field)) => Some(Comparison {
            field: field.as_str(),
            op: flipped(*op),
            value: constant_operand(operand, params)?,
        }),
        _ => None,
    }
}

/// The empty range: no key satisfies it.
fn empty_range() -> IndexRange {
    IndexRange {
        low: Some(Value::Null),
        high: Some(Value::Null),
        low_inclusive: false,
        high_inclusive: false,
    }
}

/// Matches a `WHERE` expression against the available indexes. `Some`
/// means the returned range is exactly equivalent to the predicate over
/// the indexed field, so the caller may skip re-filtering.
pub fn match_index(
    expr: &Expr,
    indexes: &[IndexInfo],
    params: &Params,
) -> Option<(IndexInfo, IndexRange)> {
    let mut conjuncts = Vec::new();
    flatten_conjunction(expr, &mut conjuncts);

    let mut field: Option<&str> = None;
    let mut comparisons = Vec::with_capacity(conjuncts.len());
    for conjunct in conjuncts {
        let comparison = as_field_comparison(conjunct, params)?;
        match field {
            None => field = Some(comparison.field),
            Some(name) if name == comparison.field => {}
            Some(_) => return None,
        }
        comparisons.push(comparison);
    }

    let field = field?;
    let index = indexes.iter().find(|idx| idx.field == field)?.clone();

    let mut range = IndexRange::unbounded();
    for comparison in comparisons {
        if comparison.value.is_null() {
            // a comparison with NULL never holds
            return Some((index, empty_range()));
        }
        apply_bound(&mut range, comparison.op, comparison.value);
    }
    Some((index, range))
}

fn apply_bound(range: &mut IndexRange, op: BinaryOp, value: Value) {
    let tighten_low = |range: &mut IndexRange, value: Value, inclusive: bool| {
        let tighter = match &range.low {
            None => true,
            Some(current) => match current.cmp_total(&value) {
                Ordering::Less => true,
                Ordering::Equal => range.low_inclusive && !inclusive,
                Ordering::Greater => false,
            },
        };
        if tighter {
            range.low = Some(value);
            range.low_inclusive = inclusive;
        }
    };
    let tighten_high = |range: &mut IndexRange, value: Value, inclusive: bool| {
        let tighter = match &range.high {
            None => true,
            Some(current) => match current.cmp_total(&value) {
                Ordering::Greater => true,
                Ordering::Equal => range.high_inclusive && !inclusive,
                Ordering::Less => false,
            },
        };
        if tighter {
            range.high = Some(value);
            range.high_inclusive = inclusive;
        }
    };

    match op {
        BinaryOp::Eq => {
            tighten_low(range, value.clone(), true);
            tighten_high(range, value, true);
        }
        BinaryOp::Gt => tighten_low(range, value, false),
        BinaryOp::Gte => tighten_low(range, value, true),
        BinaryOp::Lt => tighten_high(range, value, false),
        BinaryOp::Lte => tighten_high(range, value, true),
        _ => unreachable!("apply_bound called with non-range operator"),
    }
}
