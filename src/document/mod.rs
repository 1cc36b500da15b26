//! # Records and Field Buffers
//!
//! A record is an ordered sequence of uniquely named fields. `FieldBuffer`
//! is the in-memory, mutable form: the result of decoding a stored record,
//! the target of a projection, and the unit the stream operators pass from
//! stage to stage.
//!
//! Insertion order is preserved and significant (projection and record
//! round-trips keep it); only the total-order comparison of documents
//! sorts field names, and that happens in the value layer.

use crate::error::{Error, Result};
use crate::types::Value;

/// One `(name, value)` pair of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Value) -> Field {
        Field { name: name.into(), value }
    }
}

/// An ordered, mutable sequence of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldBuffer {
    fields: Vec<Field>,
}

impl FieldBuffer {
    pub fn new() -> FieldBuffer {
        FieldBuffer::default()
    }

    /// Appends a field; re-insertion under an existing name is rejected.
    pub fn add(&mut self, field: Field) -> Result<()> {
        if self.get(&field.name).is_some() {
            return Err(Error::already_exists("field", field.name));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Appends a `(name, value)` pair; rejects duplicate names.
    pub fn add_field(&mut self, name: impl Into<String>, value: Value) -> Result<()> {
        self.add(Field::new(name, value))
    }

    /// Replaces the value of an existing field, erroring when absent.
    pub fn replace(&mut self, name: &str, value: Value) -> Result<()> {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                field.value = value;
                Ok(())
            }
            None => Err(Error::not_found("field", name)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Copies every field of another record into this buffer, rejecting
    /// duplicates against fields already present.
    pub fn scan(&mut self, record: &FieldBuffer) -> Result<()> {
        for field in record.iter() {
            self.add(field.clone())?;
        }
        Ok(())
    }

    /// Removes a field by name, returning whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| f.name != name);
        self.fields.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<Field> for FieldBuffer {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        let mut fb = FieldBuffer::new();
        for field in iter {
            // last one wins would hide bugs; keep first and drop the rest
            let _ = fb.add(field);
        }
        fb
    }
}
