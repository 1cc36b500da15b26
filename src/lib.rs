//! # InkDB - Embedded Document Database
//!
//! InkDB is an embedded, document-oriented database with a SQL-like
//! dialect. Tables hold heterogeneous records keyed by a declared primary
//! key or an engine-assigned record id; schemaful tables add per-field
//! type enforcement on top of the same storage.
//!
//! ## Quick Start
//!
//! ```
//! use inkdb::Database;
//!
//! # fn main() -> eyre::Result<()> {
//! let db = Database::memory()?;
//!
//! db.execute("CREATE TABLE users (id INT PRIMARY KEY, name TEXT)")?;
//! db.execute("INSERT INTO users (id, name) VALUES (1, 'Alice')")?;
//!
//! let rows = db.query("SELECT name FROM users WHERE id = 1")?.collect()?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │       Public API (Database)         │
//! ├─────────────────────────────────────┤
//! │  SQL Layer (Lexer/Parser/Planner)   │
//! ├─────────────────────────────────────┤
//! │  Stream Operators │ Expression Eval │
//! ├───────────────────┼─────────────────┤
//! │  Catalog │ Table & Index Overlays   │
//! ├─────────────────────────────────────┤
//! │   Value System │ Key/Record Codecs  │
//! ├─────────────────────────────────────┤
//! │   Engine Contract (ordered KV)      │
//! └─────────────────────────────────────┘
//! ```
//!
//! A statement flows text → tokens → AST → stream of operators →
//! documents, pulled lazily by the result consumer inside exactly one
//! transaction. The engine at the bottom is pluggable: anything with
//! ordered byte keys, named buckets, and snapshot/exclusive transactions
//! satisfies [`engine::Engine`]; [`engine::MemoryEngine`] is the native
//! in-memory implementation.
//!
//! ## Module Overview
//!
//! - [`types`]: the dynamically typed value lattice and declared types
//! - [`encoding`]: order-preserving key codec and record codec
//! - [`document`]: field buffers (ordered, uniquely named fields)
//! - [`engine`]: the KV engine contract and the in-memory engine
//! - [`catalog`]: table/index metadata and storage overlays
//! - [`sql`]: lexer, parser, expressions, stream operators, planner
//! - [`config`]: bucket naming and limits

pub mod catalog;
pub mod config;
pub mod database;
pub mod document;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod sql;
pub mod types;

pub use database::{Database, QueryResult};
pub use document::{Field, FieldBuffer};
pub use engine::{Engine, KvCursor, KvTransaction, MemoryEngine};
pub use error::{EngineError, Error, ParseError, Result};
pub use sql::executor::ExecuteResult;
pub use sql::expr::Params;
pub use types::{DataType, Value};
