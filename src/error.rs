//! # Error Types
//!
//! Every failure in InkDB is one of a closed set of kinds so that callers
//! can dispatch on the variant instead of parsing message strings. The
//! public `Database` surface returns `eyre::Result`; since [`Error`]
//! implements `std::error::Error`, it flows into an `eyre::Report` through
//! `?` and stays downcastable to its kind.
//!
//! The engine contract has its own small error set ([`EngineError`]) which
//! wraps into [`Error::Engine`], except for the read-only discriminant
//! which maps onto [`Error::ReadOnly`] so that "write in a read-only
//! transaction" is a single kind regardless of which layer caught it.

use crate::sql::token::Pos;
use std::fmt;

/// Errors produced by the key-value engine contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("key or bucket not found")]
    NotFound,
    #[error("conflicting engine operation")]
    Conflict,
    #[error("transaction is read-only")]
    ReadOnly,
    #[error("engine i/o failure: {0}")]
    Io(String),
}

/// A parse failure: what was found, what was expected, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub found: String,
    pub expected: Vec<String>,
    pub pos: Pos,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "found {}, expected {} at line {}, char {}",
            self.found,
            self.expected.join(", "),
            self.pos.line,
            self.pos.char
        )
    }
}

impl std::error::Error for ParseError {}

/// The closed set of InkDB error kinds.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("type error: {0}")]
    Type(String),
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },
    #[error("bad encoding: {0}")]
    BadEncoding(String),
    #[error("bad parameter: {0}")]
    BadParameter(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("engine: {0}")]
    Engine(EngineError),
    #[error("statement cancelled")]
    Cancelled,
    #[error("cannot write in a read-only transaction")]
    ReadOnly,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ReadOnly => Error::ReadOnly,
            other => Error::Engine(other),
        }
    }
}

impl Error {
    /// Shorthand for a missing named object of a given kind.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound { kind, name: name.into() }
    }

    /// Shorthand for a duplicate named object of a given kind.
    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        Error::AlreadyExists { kind, name: name.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
