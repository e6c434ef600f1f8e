//! Table schema definitions and validation.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::tags::Tag;
use super::types::{Column, ColumnKind};

/// The current shape of a table.
///
/// Column order is significant: primary key columns, in schema order, make
/// up the row key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Create a schema, validating it.
    pub fn new(columns: Vec<Column>) -> Result<Self, SchemaError> {
        let schema = Self { columns };
        schema.validate()?;
        Ok(schema)
    }

    /// Validate the schema itself.
    ///
    /// Tags and names must be unique and at least one column must be part
    /// of the primary key.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut names = HashSet::new();
        let mut tags = HashSet::new();
        for col in &self.columns {
            if !names.insert(col.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(col.name.clone()));
            }
            if !tags.insert(col.tag) {
                return Err(SchemaError::DuplicateTag(col.tag));
            }
        }

        if !self.columns.iter().any(|c| c.primary_key) {
            return Err(SchemaError::MissingPrimaryKey);
        }

        Ok(())
    }

    /// All columns in schema order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Primary key columns in key order.
    pub fn pk_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// Non-key columns in schema order.
    pub fn non_pk_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    /// Tags of the primary key columns, in key order.
    pub fn pk_tags(&self) -> Vec<Tag> {
        self.pk_columns().map(|c| c.tag).collect()
    }

    /// Tags of the non-key columns.
    pub fn non_pk_tags(&self) -> Vec<Tag> {
        self.non_pk_columns().map(|c| c.tag).collect()
    }

    /// All tags in the schema.
    pub fn all_tags(&self) -> BTreeSet<Tag> {
        self.columns.iter().map(|c| c.tag).collect()
    }

    /// Column kinds in schema order.
    pub fn kinds(&self) -> Vec<ColumnKind> {
        self.columns.iter().map(|c| c.kind).collect()
    }

    /// Look up a column by tag.
    pub fn by_tag(&self, tag: Tag) -> Option<&Column> {
        self.columns.iter().find(|c| c.tag == tag)
    }

    /// Look up a column by name.
    pub fn by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the tag belongs to a primary key column.
    pub fn is_pk_tag(&self, tag: Tag) -> bool {
        self.by_tag(tag).map(|c| c.primary_key).unwrap_or(false)
    }

    /// Whether the tag belongs to a non-key column.
    pub fn is_non_pk_tag(&self, tag: Tag) -> bool {
        self.by_tag(tag).map(|c| !c.primary_key).unwrap_or(false)
    }

    /// Whether two schemas have the same primary key (same tags, same order).
    pub fn same_primary_key(&self, other: &Schema) -> bool {
        self.pk_tags() == other.pk_tags()
    }

    /// Same schema with tags replaced through `mapping`.
    ///
    /// Unmapped tags are kept. Fails if the result reuses a tag.
    pub fn with_mapped_tags(&self, mapping: &BTreeMap<Tag, Tag>) -> Result<Schema, SchemaError> {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let tag = mapping.get(&c.tag).copied().unwrap_or(c.tag);
                c.clone().with_tag(tag)
            })
            .collect();
        Schema::new(columns)
    }

    /// Schema with one more column.
    pub fn add_column(&self, column: Column) -> Result<Schema, SchemaError> {
        if self.by_name(&column.name).is_some() {
            return Err(SchemaError::DuplicateColumn(column.name));
        }
        if column.primary_key {
            return Err(SchemaError::PrimaryKeyChanged);
        }
        let mut columns = self.columns.clone();
        columns.push(column);
        Schema::new(columns)
    }

    /// Schema without the named column.
    pub fn drop_column(&self, name: &str) -> Result<Schema, SchemaError> {
        let col = self
            .by_name(name)
            .ok_or_else(|| SchemaError::ColumnNotFound(name.to_string()))?;

        if col.primary_key {
            return Err(SchemaError::CannotRemovePrimaryKey(name.to_string()));
        }

        let columns = self.columns.iter().filter(|c| c.name != name).cloned().collect();
        Schema::new(columns)
    }

    /// Schema with a column renamed. The tag is unchanged.
    pub fn rename_column(&self, from: &str, to: &str) -> Result<Schema, SchemaError> {
        if self.by_name(from).is_none() {
            return Err(SchemaError::ColumnNotFound(from.to_string()));
        }
        if self.by_name(to).is_some() {
            return Err(SchemaError::DuplicateColumn(to.to_string()));
        }

        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut c = c.clone();
                if c.name == from {
                    c.name = to.to_string();
                }
                c
            })
            .collect();
        Schema::new(columns)
    }
}

/// Schema-related errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("duplicate tag: {0}")]
    DuplicateTag(Tag),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("schema has no primary key column")]
    MissingPrimaryKey,

    #[error("cannot remove primary key column: {0}")]
    CannotRemovePrimaryKey(String),

    #[error("primary key columns cannot be changed")]
    PrimaryKeyChanged,

    #[error("tag {tag} is recorded as {recorded} but used as {found}")]
    KindConflict {
        tag: Tag,
        recorded: ColumnKind,
        found: ColumnKind,
    },
}

/// Builder for creating schemas.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    columns: Vec<Column>,
}

impl SchemaBuilder {
    /// Start building a new schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a primary key column.
    pub fn key(self, tag: Tag, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.column(Column::key(tag, name, kind))
    }

    /// Add a nullable column.
    pub fn nullable(self, tag: Tag, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.column(Column::new(tag, name, kind))
    }

    /// Add a non-nullable column.
    pub fn required(self, tag: Tag, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.column(Column::new(tag, name, kind).not_null())
    }

    /// Build the schema.
    pub fn build(self) -> Result<Schema, SchemaError> {
        Schema::new(self.columns)
    }
}
