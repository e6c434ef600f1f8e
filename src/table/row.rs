//! Tagged rows and row keys.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::value::Value;
use crate::catalog::{ColumnKind, Schema, Tag};

/// Ordered `tag -> value` map.
pub type TaggedValues = BTreeMap<Tag, Value>;

/// A row as stored: key columns and non-key columns, both addressed by tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggedRow {
    pub key: TaggedValues,
    pub value: TaggedValues,
}

impl TaggedRow {
    pub fn new(key: TaggedValues, value: TaggedValues) -> Self {
        Self { key, value }
    }

    /// Rewrite tags through `mapping`; unmapped tags pass through.
    ///
    /// Fails if two tags of the key (or of the value) land on the same tag.
    pub fn remap(&self, mapping: &BTreeMap<Tag, Tag>) -> Result<TaggedRow, RowError> {
        Ok(TaggedRow {
            key: remap_values(&self.key, mapping)?,
            value: remap_values(&self.value, mapping)?,
        })
    }

    /// Check the row against a schema.
    ///
    /// The key must hold exactly the key columns; value tags must be non-key
    /// columns; kinds must match and not-null columns must be present.
    /// Null values are not stored, so a null in `value` is rejected as well.
    pub fn check(&self, schema: &Schema) -> Result<(), RowError> {
        for col in schema.pk_columns() {
            match self.key.get(&col.tag) {
                None | Some(Value::Null) => return Err(RowError::MissingKeyColumn(col.tag)),
                Some(v) if !col.kind.matches(v) => {
                    return Err(RowError::KindMismatch {
                        tag: col.tag,
                        expected: col.kind,
                        found: v.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        for tag in self.key.keys() {
            if !schema.is_pk_tag(*tag) {
                return Err(RowError::UnknownTag(*tag));
            }
        }

        for (tag, v) in &self.value {
            let col = schema
                .by_tag(*tag)
                .filter(|c| !c.primary_key)
                .ok_or(RowError::UnknownTag(*tag))?;
            if v.is_null() {
                return Err(RowError::StoredNull(*tag));
            }
            if !col.kind.matches(v) {
                return Err(RowError::KindMismatch {
                    tag: *tag,
                    expected: col.kind,
                    found: v.clone(),
                });
            }
        }
        for col in schema.non_pk_columns() {
            if col.not_null && !self.value.contains_key(&col.tag) {
                return Err(RowError::MissingNotNull(col.tag));
            }
        }

        Ok(())
    }

    /// Row with only the value columns that still exist in `schema`.
    pub fn pruned_to(&self, schema: &Schema) -> TaggedRow {
        TaggedRow {
            key: self.key.clone(),
            value: self
                .value
                .iter()
                .filter(|(tag, _)| schema.is_non_pk_tag(**tag))
                .map(|(tag, v)| (*tag, v.clone()))
                .collect(),
        }
    }

    /// Whether every key tag is a key column of `schema`.
    pub fn key_fits(&self, schema: &Schema) -> bool {
        self.key.keys().all(|tag| schema.is_pk_tag(*tag))
    }
}

fn remap_values(values: &TaggedValues, mapping: &BTreeMap<Tag, Tag>) -> Result<TaggedValues, RowError> {
    let mut out = TaggedValues::new();
    for (tag, v) in values {
        let new_tag = mapping.get(tag).copied().unwrap_or(*tag);
        if out.insert(new_tag, v.clone()).is_some() {
            return Err(RowError::TagCollision(new_tag));
        }
    }
    Ok(out)
}

/// Order-preserving encoding of a row's primary key, hex encoded.
///
/// Used as the row's entry name in its table's row tree, so the tree's
/// natural order is ascending key order. The encoding only depends on the key
/// values, never on tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(String);

impl RowKey {
    /// Encode the key values in the order given by `pk_tags`.
    pub fn encode(key: &TaggedValues, pk_tags: &[Tag]) -> Result<RowKey, RowError> {
        if pk_tags.is_empty() {
            return Err(RowError::EmptyKey);
        }
        let mut bytes = Vec::new();
        for tag in pk_tags {
            let value = key.get(tag).ok_or(RowError::MissingKeyColumn(*tag))?;
            value.encode_key(&mut bytes);
        }
        Ok(RowKey(to_hex(&bytes)))
    }

    /// Key of a row under a schema.
    pub fn for_row(row: &TaggedRow, schema: &Schema) -> Result<RowKey, RowError> {
        Self::encode(&row.key, &schema.pk_tags())
    }

    /// Accept an entry name read back from a row tree.
    pub fn from_hex(hex: &str) -> Result<RowKey, RowError> {
        let valid = !hex.is_empty()
            && hex.len() % 2 == 0
            && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(RowError::InvalidKey(hex.to_string()));
        }
        Ok(RowKey(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

/// Row-level errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("key column with tag {0} is missing")]
    MissingKeyColumn(Tag),

    #[error("column with tag {0} is not null but has no value")]
    MissingNotNull(Tag),

    #[error("tag {0} is not a column of this table")]
    UnknownTag(Tag),

    #[error("null stored under tag {0}; omit the column instead")]
    StoredNull(Tag),

    #[error("tag {tag} expects {expected}, got {found}")]
    KindMismatch {
        tag: Tag,
        expected: ColumnKind,
        found: Value,
    },

    #[error("two columns of one row map onto tag {0}")]
    TagCollision(Tag),

    #[error("row key has no columns")]
    EmptyKey,

    #[error("invalid row key: {0}")]
    InvalidKey(String),
}
