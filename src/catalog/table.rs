//! # Table Overlay
//!
//! `Table` binds a table's catalog entry and its indexes to the storage
//! buckets and enforces the record rules on every write path:
//!
//! - **Record ids**: the encoded primary-key value for schemaful tables
//!   with a primary key, else a monotonically increasing engine-assigned
//!   64-bit id encoded big-endian.
//! - **Schema enforcement**: schemaful writes are rebuilt in schema order,
//!   type-checked per field, zero-filled for missing fields, and rejected
//!   for fields outside the schema.
//! - **Null fields**: schemaless records never store null-valued fields;
//!   assigning null is how a field is removed. Schemaful records keep
//!   their declared shape and store nulls explicitly.
//! - **Index maintenance**: every write removes the old entries and adds
//!   the new ones in the same transaction, keeping exactly one entry per
//!   indexed `(value, record id)` pair.

use super::{IndexInfo, TableInfo};
use crate::encoding::{key, record};
use crate::engine::KvTransaction;
use crate::error::{Error, Result};
use crate::types::Value;
use crate::{catalog, document::FieldBuffer};
use smallvec::SmallVec;

/// One table plus its indexes, loaded for the duration of a statement.
#[derive(Debug, Clone)]
pub struct Table {
    pub info: TableInfo,
    pub indexes: Vec<IndexInfo>,
}

impl Table {
    pub fn load(txn: &dyn KvTransaction, name: &str) -> Result<Table> {
        let info = catalog::get_table(txn, name)?;
        let indexes = catalog::indexes_of(txn, name)?;
        Ok(Table { info, indexes })
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn bucket(&self) -> String {
        self.info.bucket()
    }

    /// Rebuilds a record according to the table's rules. Schemaful tables
    /// get schema order, type checks, and zero-fill; schemaless tables get
    /// null fields stripped.
    fn normalize(&self, fb: FieldBuffer) -> Result<FieldBuffer> {
        match &self.info.schema {
            None => {
                let mut out = FieldBuffer::new();
                for field in fb.iter() {
                    if !field.value.is_null() {
                        out.add(field.clone())?;
                    }
                }
                Ok(out)
            }
            Some(schema) => {
                for field in fb.iter() {
                    if schema.field(&field.name).is_none() {
                        return Err(Error::Type(format!(
                            "unknown field {:?} for table {:?}",
                            field.name, self.info.name
                        )));
                    }
                }
                let mut out = FieldBuffer::new();
                for constraint in &schema.fields {
                    let value = match fb.get(&constraint.name) {
                        Some(value) => constraint.ty.check(value.clone())?,
                        None => constraint.ty.zero_value(),
                    };
                    if constraint.primary_key && value.is_null() {
                        return Err(Error::ConstraintViolation(format!(
                            "primary key {:?} cannot be null",
                            constraint.name
                        )));
                    }
                    out.add_field(constraint.name.clone(), value)?;
                }
                Ok(out)
            }
        }
    }

    fn record_id(&self, txn: &mut dyn KvTransaction, fb: &FieldBuffer) -> Result<Vec<u8>> {
        match self.info.primary_key() {
            Some(pk) => {
                let value = fb
                    .get(&pk.name)
                    .ok_or_else(|| Error::Internal("normalized record lost its key".to_string()))?;
                Ok(key::encode_key(value))
            }
            None => {
                let id = catalog::next_record_id(txn, &self.info.name)?;
                Ok(id.to_be_bytes().to_vec())
            }
        }
    }

    fn add_index_entries(
        &self,
        txn: &mut dyn KvTransaction,
        fb: &FieldBuffer,
        record_id: &[u8],
    ) -> Result<()> {
        for index in &self.indexes {
            if let Some(value) = fb.get(&index.field) {
                index.add_entry(txn, value, record_id)?;
            }
        }
        Ok(())
    }

    fn remove_index_entries(
        &self,
        txn: &mut dyn KvTransaction,
        fb: &FieldBuffer,
        record_id: &[u8],
    ) -> Result<()> {
        // collect first: entry removal needs the values, not the record
        let present: SmallVec<[(usize, Value); 4]> = self
            .indexes
            .iter()
            .enumerate()
            .filter_map(|(i, index)| fb.get(&index.field).map(|v| (i, v.clone())))
            .collect();
        for (i, value) in present {
            self.indexes[i].remove_entry(txn, &value, record_id)?;
        }
        Ok(())
    }

    /// Inserts a record, returning its record id and stored form.
    pub fn insert(
        &self,
        txn: &mut dyn KvTransaction,
        fb: FieldBuffer,
    ) -> Result<(Vec<u8>, FieldBuffer)> {
        let fb = self.normalize(fb)?;
        let record_id = self.record_id(txn, &fb)?;

        if self.info.primary_key().is_some()
            && txn.get(&self.bucket(), &record_id)?.is_some()
        {
            return Err(Error::ConstraintViolation(format!(
                "duplicate primary key in table {:?}",
                self.info.name
            )));
        }

        txn.put(&self.bucket(), &record_id, &record::encode(&fb))?;
        self.add_index_entries(txn, &fb, &record_id)?;
        Ok((record_id, fb))
    }

    /// Replaces the record stored under `record_id`. A primary-key change
    /// re-keys the record after checking the new key is free.
    pub fn replace(
        &self,
        txn: &mut dyn KvTransaction,
        record_id: &[u8],
        fb: FieldBuffer,
    ) -> Result<(Vec<u8>, FieldBuffer)> {
        let old = self
            .get(txn, record_id)?
            .ok_or_else(|| Error::not_found("record", format!("{:02x?}", record_id)))?;
        let new = self.normalize(fb)?;

        let new_id = match self.info.primary_key() {
            Some(pk) => {
                let value = new
                    .get(&pk.name)
                    .ok_or_else(|| Error::Internal("normalized record lost its key".to_string()))?;
                key::encode_key(value)
            }
            None => record_id.to_vec(),
        };

        self.remove_index_entries(txn, &old, record_id)?;

        if new_id != record_id {
            if txn.get(&self.bucket(), &new_id)?.is_some() {
                return Err(Error::ConstraintViolation(format!(
                    "duplicate primary key in table {:?}",
                    self.info.name
                )));
            }
            txn.delete(&self.bucket(), record_id)?;
        }
        txn.put(&self.bucket(), &new_id, &record::encode(&new))?;
        self.add_index_entries(txn, &new, &new_id)?;
        Ok((new_id, new))
    }

    /// Deletes the record stored under `record_id`, returning it.
    pub fn delete(&self, txn: &mut dyn KvTransaction, record_id: &[u8]) -> Result<FieldBuffer> {
        let old = self
            .get(txn, record_id)?
            .ok_or_else(|| Error::not_found("record", format!("{:02x?}", record_id)))?;
        self.remove_index_entries(txn, &old, record_id)?;
        txn.delete(&self.bucket(), record_id)?;
        Ok(old)
    }

    pub fn get(&self, txn: &dyn KvTransaction, record_id: &[u8]) -> Result<Option<FieldBuffer>> {
        match txn.get(&self.bucket(), record_id)? {
            Some(bytes) => Ok(Some(record::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}
