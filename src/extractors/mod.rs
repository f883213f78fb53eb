//! Row extraction
//!
//! A [`Schema`] lists the fields to pull out of each row. [`RowLocator`]
//! finds the rows, [`RecordExtractor`] turns one row into a record and
//! [`HeaderTable`] reads a plain table whose header row names the columns.

mod header_table;
mod record_extractor;
mod row_locator;

pub use header_table::*;
pub use record_extractor::*;
pub use row_locator::*;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::locator::Locator;

/// Single field specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Column name in the output
    pub name: String,
    /// How to find candidate elements inside the row
    pub locator: Locator,
    /// Which match to use; negative counts from the end
    #[serde(default)]
    pub index: isize,
    /// Read this attribute instead of the rendered text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Treat an empty value as a shape mismatch
    #[serde(default)]
    pub reject_empty: bool,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, locator: Locator) -> Self {
        Self {
            name: name.into(),
            locator,
            index: 0,
            attribute: None,
            reject_empty: false,
        }
    }

    pub fn at(mut self, index: isize) -> Self {
        self.index = index;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = Some(name.into());
        self
    }

    pub fn reject_empty(mut self) -> Self {
        self.reject_empty = true;
        self
    }
}

/// Ordered field rules; output columns follow this order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldRule>,
}

impl Schema {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Non-empty, unique names and compilable locators
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fields.is_empty() {
            return Err(ConfigError::EmptySchema);
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(ConfigError::EmptyFieldName);
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(ConfigError::DuplicateField(field.name.clone()));
            }
            field
                .locator
                .validate()
                .map_err(|reason| ConfigError::InvalidLocator {
                    field: field.name.clone(),
                    reason,
                })?;
        }
        Ok(())
    }
}

/// Position of `index` among `len` matches; negative indexes count from the end
pub fn resolve_index(index: isize, len: usize) -> Option<usize> {
    if index >= 0 {
        let i = index as usize;
        (i < len).then_some(i)
    } else {
        let back = index.unsigned_abs();
        (back <= len).then(|| len - back)
    }
}
