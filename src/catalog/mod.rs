//! # Catalog
//!
//! Table and index metadata, persisted as records in the reserved
//! `__inkdb_catalog` bucket and keyed by `(kind byte, name)`:
//!
//! ```text
//! 'T' <table>   table entry: name + optional schema
//! 'I' <index>   index entry: name, table, field, unique flag
//! 'S' <table>   sequence counter for engine-assigned record ids
//! ```
//!
//! Catalog entries are encoded with the crate's own record codec, so the
//! catalog exercises the same machinery it describes. All catalog
//! mutations run inside write transactions and create or drop the
//! underlying storage buckets in the same transaction as the metadata
//! write, which makes DDL atomic with the data it governs. Sequence
//! counters live in the catalog for the same reason: an id allocation
//! commits or rolls back together with the insert that consumed it.

mod index;
mod table;

pub use index::{IndexInfo, IndexRange};
pub use table::Table;

use crate::config::{
    table_bucket, CATALOG_BUCKET, CATALOG_KIND_INDEX, CATALOG_KIND_SEQUENCE, CATALOG_KIND_TABLE,
};
use crate::document::FieldBuffer;
use crate::encoding::key::prefix_successor;
use crate::encoding::record;
use crate::engine::KvTransaction;
use crate::error::{EngineError, Error, Result};
use crate::types::{DataType, Value};
use std::ops::Bound;
use tracing::debug;

/// One declared field of a schemaful table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConstraint {
    pub name: String,
    pub ty: DataType,
    pub primary_key: bool,
}

/// The declared, ordered field list of a schemaful table.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub fields: Vec<FieldConstraint>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldConstraint> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_key(&self) -> Option<&FieldConstraint> {
        self.fields.iter().find(|f| f.primary_key)
    }
}

/// Catalog entry for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    pub schema: Option<Schema>,
}

impl TableInfo {
    pub fn bucket(&self) -> String {
        table_bucket(&self.name)
    }

    pub fn primary_key(&self) -> Option<&FieldConstraint> {
        self.schema.as_ref().and_then(|s| s.primary_key())
    }
}

fn catalog_key(kind: u8, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + name.len());
    key.push(kind);
    key.extend_from_slice(name.as_bytes());
    key
}

fn get_text(record: &FieldBuffer, field: &str) -> Result<String> {
    match record.get(field) {
        Some(Value::Text(s)) => Ok(s.clone()),
        _ => Err(Error::BadEncoding(format!("catalog entry missing field {:?}", field))),
    }
}

fn get_bool(record: &FieldBuffer, field: &str) -> Result<bool> {
    match record.get(field) {
        Some(Value::Bool(b)) => Ok(*b),
        _ => Err(Error::BadEncoding(format!("catalog entry missing field {:?}", field))),
    }
}

fn table_to_record(info: &TableInfo) -> Result<FieldBuffer> {
    let mut record = FieldBuffer::new();
    record.add_field("name", Value::Text(info.name.clone()))?;
    match &info.schema {
        None => record.add_field("fields", Value::Null)?,
        Some(schema) => {
            let mut fields = Vec::with_capacity(schema.fields.len());
            for constraint in &schema.fields {
                let mut doc = FieldBuffer::new();
                doc.add_field("name", Value::Text(constraint.name.clone()))?;
                doc.add_field("type", Value::Text(constraint.ty.name().to_string()))?;
                doc.add_field("pk", Value::Bool(constraint.primary_key))?;
                fields.push(Value::Document(doc));
            }
            record.add_field("fields", Value::Array(fields))?;
        }
    }
    Ok(record)
}

fn table_from_record(record: &FieldBuffer) -> Result<TableInfo> {
    let name = get_text(record, "name")?;
    let schema = match record.get("fields") {
        Some(Value::Null) | None => None,
        Some(Value::Array(items)) => {
            let mut fields = Vec::with_capacity(items.len());
            for item in items {
                let Value::Document(doc) = item else {
                    return Err(Error::BadEncoding("malformed table schema entry".to_string()));
                };
                let ty_name = get_text(doc, "type")?;
                let ty = DataType::from_name(&ty_name).ok_or_else(|| {
                    Error::BadEncoding(format!("unknown declared type {:?}", ty_name))
                })?;
                fields.push(FieldConstraint {
                    name: get_text(doc, "name")?,
                    ty,
                    primary_key: get_bool(doc, "pk")?,
                });
            }
            Some(Schema { fields })
        }
        Some(_) => return Err(Error::BadEncoding("malformed table schema entry".to_string())),
    };
    Ok(TableInfo { name, schema })
}

fn index_to_record(info: &IndexInfo) -> Result<FieldBuffer> {
    let mut record = FieldBuffer::new();
    record.add_field("name", Value::Text(info.name.clone()))?;
    record.add_field("table", Value::Text(info.table.clone()))?;
    record.add_field("field", Value::Text(info.field.clone()))?;
    record.add_field("unique", Value::Bool(info.unique))?;
    Ok(record)
}

fn index_from_record(record: &FieldBuffer) -> Result<IndexInfo> {
    Ok(IndexInfo {
        name: get_text(record, "name")?,
        table: get_text(record, "table")?,
        field: get_text(record, "field")?,
        unique: get_bool(record, "unique")?,
    })
}

/// Creates the catalog bucket on a fresh engine. Idempotent.
pub fn init(txn: &mut dyn KvTransaction) -> Result<()> {
    if !txn.bucket_exists(CATALOG_BUCKET) {
        txn.create_bucket(CATALOG_BUCKET)?;
    }
    Ok(())
}

pub fn table_exists(txn: &dyn KvTransaction, name: &str) -> Result<bool> {
    Ok(txn
        .get(CATALOG_BUCKET, &catalog_key(CATALOG_KIND_TABLE, name))?
        .is_some())
}

pub fn get_table(txn: &dyn KvTransaction, name: &str) -> Result<TableInfo> {
    let bytes = txn
        .get(CATALOG_BUCKET, &catalog_key(CATALOG_KIND_TABLE, name))?
        .ok_or_else(|| Error::not_found("table", name))?;
    table_from_record(&record::decode(&bytes)?)
}

/// Creates a table: catalog entry plus storage bucket, atomically.
/// Returns false when the table already exists and `if_not_exists` is set.
pub fn create_table(
    txn: &mut dyn KvTransaction,
    info: &TableInfo,
    if_not_exists: bool,
) -> Result<bool> {
    if table_exists(txn, &info.name)? {
        if if_not_exists {
            return Ok(false);
        }
        return Err(Error::already_exists("table", &info.name));
    }
    let mut value = Vec::new();
    record::encode_record(&table_to_record(info)?, &mut value);
    txn.put(
        CATALOG_BUCKET,
        &catalog_key(CATALOG_KIND_TABLE, &info.name),
        &value,
    )?;
    txn.create_bucket(&info.bucket())?;
    debug!(table = %info.name, schemaful = info.schema.is_some(), "created table");
    Ok(true)
}

/// Drops a table, its indexes, and all their buckets. Returns false when
/// the table is absent and `if_exists` is set.
pub fn drop_table(txn: &mut dyn KvTransaction, name: &str, if_exists: bool) -> Result<bool> {
    if !table_exists(txn, name)? {
        if if_exists {
            return Ok(false);
        }
        return Err(Error::not_found("table", name));
    }
    for index in indexes_of(txn, name)? {
        txn.delete(CATALOG_BUCKET, &catalog_key(CATALOG_KIND_INDEX, &index.name))?;
        txn.drop_bucket(&index.bucket())?;
    }
    match txn.delete(CATALOG_BUCKET, &catalog_key(CATALOG_KIND_SEQUENCE, name)) {
        Ok(()) | Err(EngineError::NotFound) => {}
        Err(err) => return Err(err.into()),
    }
    txn.delete(CATALOG_BUCKET, &catalog_key(CATALOG_KIND_TABLE, name))?;
    txn.drop_bucket(&table_bucket(name))?;
    debug!(table = %name, "dropped table");
    Ok(true)
}

pub fn get_index(txn: &dyn KvTransaction, name: &str) -> Result<IndexInfo> {
    let bytes = txn
        .get(CATALOG_BUCKET, &catalog_key(CATALOG_KIND_INDEX, name))?
        .ok_or_else(|| Error::not_found("index", name))?;
    index_from_record(&record::decode(&bytes)?)
}

/// Every index declared on one table.
pub fn indexes_of(txn: &dyn KvTransaction, table: &str) -> Result<Vec<IndexInfo>> {
    Ok(all_indexes(txn)?
        .into_iter()
        .filter(|idx| idx.table == table)
        .collect())
}

pub fn all_indexes(txn: &dyn KvTransaction) -> Result<Vec<IndexInfo>> {
    let lower = Bound::Included(vec![CATALOG_KIND_INDEX]);
    let upper = match prefix_successor(&[CATALOG_KIND_INDEX]) {
        Some(key) => Bound::Excluded(key),
        None => Bound::Unbounded,
    };
    let mut cursor = txn.cursor(CATALOG_BUCKET, lower, upper, false)?;
    let mut indexes = Vec::new();
    while let Some((_, value)) = cursor.next() {
        indexes.push(index_from_record(&record::decode(&value)?)?);
    }
    Ok(indexes)
}

/// Creates an index and backfills it from the table's current records.
/// A backfill failure (a unique violation, typically) unwinds the index
/// so the DDL never half-applies, even inside an explicit transaction.
pub fn create_index(
    txn: &mut dyn KvTransaction,
    info: &IndexInfo,
    if_not_exists: bool,
) -> Result<bool> {
    let table = get_table(txn, &info.table)?;
    let key = catalog_key(CATALOG_KIND_INDEX, &info.name);
    if txn.get(CATALOG_BUCKET, &key)?.is_some() {
        if if_not_exists {
            return Ok(false);
        }
        return Err(Error::already_exists("index", &info.name));
    }

    let mut value = Vec::new();
    record::encode_record(&index_to_record(info)?, &mut value);
    txn.put(CATALOG_BUCKET, &key, &value)?;
    txn.create_bucket(&info.bucket())?;

    if let Err(err) = backfill(txn, &table, info) {
        let _ = txn.drop_bucket(&info.bucket());
        let _ = txn.delete(CATALOG_BUCKET, &key);
        return Err(err);
    }
    debug!(index = %info.name, table = %info.table, unique = info.unique, "created index");
    Ok(true)
}

fn backfill(txn: &mut dyn KvTransaction, table: &TableInfo, index: &IndexInfo) -> Result<()> {
    let mut cursor = txn.cursor(&table.bucket(), Bound::Unbounded, Bound::Unbounded, false)?;
    while let Some((record_id, bytes)) = cursor.next() {
        let record = record::decode(&bytes)?;
        if let Some(value) = record.get(&index.field) {
            index.add_entry(txn, value, &record_id)?;
        }
    }
    Ok(())
}

/// Drops an index and its bucket. Returns false when absent and
/// `if_exists` is set.
pub fn drop_index(txn: &mut dyn KvTransaction, name: &str, if_exists: bool) -> Result<bool> {
    let key = catalog_key(CATALOG_KIND_INDEX, name);
    let Some(bytes) = txn.get(CATALOG_BUCKET, &key)? else {
        if if_exists {
            return Ok(false);
        }
        return Err(Error::not_found("index", name));
    };
    let info = index_from_record(&record::decode(&bytes)?)?;
    txn.delete(CATALOG_BUCKET, &key)?;
    txn.drop_bucket(&info.bucket())?;
    debug!(index = %name, "dropped index");
    Ok(true)
}

/// Clears and rebuilds every index of one table, or of all tables.
/// Returns the number of indexes rebuilt.
pub fn reindex(txn: &mut dyn KvTransaction, table: Option<&str>) -> Result<usize> {
    let indexes = match table {
        Some(name) => {
            // fail on unknown table rather than silently rebuilding nothing
            get_table(txn, name)?;
            indexes_of(txn, name)?
        }
        None => all_indexes(txn)?,
    };
    for index in &indexes {
        let table = get_table(txn, &index.table)?;
        txn.drop_bucket(&index.bucket())?;
        txn.create_bucket(&index.bucket())?;
        backfill(txn, &table, index)?;
    }
    debug!(count = indexes.len(), "reindexed");
    Ok(indexes.len())
}

/// Allocates the next engine-assigned record id for a table. The counter
/// commits atomically with the insert that consumed it.
pub fn next_record_id(txn: &mut dyn KvTransaction, table: &str) -> Result<u64> {
    let key = catalog_key(CATALOG_KIND_SEQUENCE, table);
    let current = match txn.get(CATALOG_BUCKET, &key)? {
        Some(bytes) => u64::from_be_bytes(
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| Error::BadEncoding("malformed sequence counter".to_string()))?,
        ),
        None => 0,
    };
    let next = current + 1;
    txn.put(CATALOG_BUCKET, &key, &next.to_be_bytes())?;
    Ok(next)
}
