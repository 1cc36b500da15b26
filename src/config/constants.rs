//! # InkDB Configuration Constants
//!
//! Bucket naming and limit constants shared across the catalog, storage
//! overlays, and the SQL front-end.
//!
//! ## Bucket Namespace
//!
//! The engine keyspace is partitioned into named buckets:
//!
//! ```text
//! __inkdb_catalog      catalog records: tables, indexes, sequences
//! t:<table>            record id -> encoded record
//! i:<table>:<index>    encoded field value [++ record id] -> [record id]
//! ```
//!
//! The catalog bucket name starts with `__` so it can never collide with a
//! `t:`/`i:` bucket, and table names cannot contain `:`-prefixed collisions
//! because the prefixes are fixed at bucket-name construction time.

/// Reserved bucket holding table, index, and sequence metadata.
pub const CATALOG_BUCKET: &str = "__inkdb_catalog";

/// Prefix for table record buckets.
pub const TABLE_PREFIX: &str = "t:";

/// Prefix for index buckets.
pub const INDEX_PREFIX: &str = "i:";

/// Catalog key kind byte for table entries.
pub const CATALOG_KIND_TABLE: u8 = b'T';

/// Catalog key kind byte for index entries.
pub const CATALOG_KIND_INDEX: u8 = b'I';

/// Catalog key kind byte for record-id sequence counters.
pub const CATALOG_KIND_SEQUENCE: u8 = b'S';

/// Maximum expression nesting depth accepted by the parser.
/// Deeply nested input is rejected before it can exhaust the stack.
pub const MAX_EXPR_DEPTH: usize = 128;

const _: () = assert!(MAX_EXPR_DEPTH >= 16, "parser depth limit too small for ordinary queries");

/// Bucket name for a table's records.
pub fn table_bucket(table: &str) -> String {
    format!("{}{}", TABLE_PREFIX, table)
}

/// Bucket name for one index of a table.
pub fn index_bucket(table: &str, index: &str) -> String {
    format!("{}{}:{}", INDEX_PREFIX, table, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_names_are_namespaced() {
        assert_eq!(table_bucket("users"), "t:users");
        assert_eq!(index_bucket("users", "ux_email"), "i:users:ux_email");
        assert!(CATALOG_BUCKET.starts_with("__"));
    }

    #[test]
    fn catalog_kind_bytes_are_distinct() {
        assert_ne!(CATALOG_KIND_TABLE, CATALOG_KIND_INDEX);
        assert_ne!(CATALOG_KIND_TABLE, CATALOG_KIND_SEQUENCE);
        assert_ne!(CATALOG_KIND_INDEX, CATALOG_KIND_SEQUENCE);
    }
}
