//! # Abstract Syntax Tree
//!
//! Statements and expressions as the parser emits them. A few notes on
//! shape:
//!
//! - `BETWEEN` never reaches the AST: the parser desugars it into the
//!   equivalent `AND` of two comparisons so index matching sees plain
//!   conjunctions.
//! - Pattern operands (`LIKE`, `=~`, `!~`) compile at parse time into
//!   [`CompiledPattern`], so a malformed pattern fails with a position
//!   before any data is touched and per-row evaluation is allocation-free.
//! - Positional parameters are numbered by the parser in order of
//!   appearance.

use crate::types::{DataType, Value};
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Begin { read_only: bool },
    Commit,
    Rollback,
    CreateTable(CreateTableStmt),
    DropTable { name: String, if_exists: bool },
    CreateIndex(CreateIndexStmt),
    DropIndex { name: String, if_exists: bool },
    Reindex { table: Option<String> },
    Insert(InsertStmt),
    Select(SelectStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: DataType,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub name: String,
    pub if_not_exists: bool,
    /// `None` declares a schemaless table.
    pub columns: Option<Vec<ColumnDef>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStmt {
    pub name: String,
    pub table: String,
    pub field: String,
    pub unique: bool,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: String,
    pub field_names: Option<Vec<String>>,
    pub source: InsertSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// `VALUES (e, ...), (e, ...)`
    Values(Vec<Vec<Expr>>),
    /// `RECORDS (k: e, ...), {k: e}, ?`
    Records(Vec<RecordExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordExpr {
    Pairs(Vec<(String, Expr)>),
    Param(ParamRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub selectors: Vec<Selector>,
    pub distinct: bool,
    pub table: String,
    pub where_expr: Option<Expr>,
    pub group_by: Option<Expr>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Wildcard,
    Field(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub where_expr: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table: String,
    pub where_expr: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamRef {
    /// Zero-based position among `?` occurrences.
    Positional(usize),
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Neq,
    Is,
    IsNot,
    In,
    NotIn,
    Like,
    RegexEq,
    RegexNeq,
    Lt,
    Lte,
    Gt,
    Gte,
    BitOr,
    BitXor,
    BitAnd,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Field(String),
    PositionalParam(usize),
    NamedParam(String),
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Neg(Box<Expr>),
    /// Right-hand side of `IN`.
    List(Vec<Expr>),
    /// Right-hand side of `LIKE` / `=~` / `!~`.
    Pattern(CompiledPattern),
    DocumentLiteral(Vec<(String, Expr)>),
    ArrayLiteral(Vec<Expr>),
    Cast { expr: Box<Expr>, target: DataType },
}

/// A pattern operand compiled once at parse time.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    pub is_like: bool,
    regex: Regex,
}

impl CompiledPattern {
    /// Compiles a `LIKE` pattern: `%` matches any run, `_` any single
    /// character, everything else literally. Case-sensitive.
    pub fn like(pattern: &str) -> Result<CompiledPattern, regex::Error> {
        let mut translated = String::with_capacity(pattern.len() + 8);
        translated.push('^');
        for c in pattern.chars() {
            match c {
                '%' => translated.push_str(".*"),
                '_' => translated.push('.'),
                other => translated.push_str(&regex::escape(&other.to_string())),
            }
        }
        translated.push('$');
        Ok(CompiledPattern {
            source: pattern.to_string(),
            is_like: true,
            regex: Regex::new(&translated)?,
        })
    }

    /// Compiles a raw regular expression, case-sensitive.
    pub fn regex(pattern: &str) -> Result<CompiledPattern, regex::Error> {
        Ok(CompiledPattern {
            source: pattern.to_string(),
            is_like: false,
            regex: Regex::new(pattern)?,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.is_like == other.is_like
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.source)
    }
}
