//! Column kinds and column definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::tags::Tag;
use crate::table::Value;

/// Value kinds a column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// true / false
    Bool,
    /// signed 64-bit integer
    Int,
    /// unsigned 64-bit integer
    Uint,
    /// 64-bit float, finite values only
    Float,
    /// UTF-8 text
    Text,
}

impl ColumnKind {
    /// Check if a value can be stored in a column of this kind.
    ///
    /// `Null` matches every kind; nullability is the column's concern.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnKind::Bool, Value::Bool(_)) => true,
            (ColumnKind::Int, Value::Int(_)) => true,
            (ColumnKind::Uint, Value::Uint(_)) => true,
            (ColumnKind::Float, Value::Float(f)) => f.is_finite(),
            (ColumnKind::Text, Value::Text(_)) => true,
            _ => false,
        }
    }

    /// Stable one-byte code, shared with the row key encoding.
    pub fn code(&self) -> u8 {
        match self {
            ColumnKind::Bool => 0x01,
            ColumnKind::Int => 0x02,
            ColumnKind::Uint => 0x03,
            ColumnKind::Float => 0x04,
            ColumnKind::Text => 0x05,
        }
    }

    /// Lower-case name, as used in stored schemas and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::Bool => "bool",
            ColumnKind::Int => "int",
            ColumnKind::Uint => "uint",
            ColumnKind::Float => "float",
            ColumnKind::Text => "text",
        }
    }

    /// Parse a kind from its name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Some(ColumnKind::Bool),
            "int" | "integer" | "bigint" => Some(ColumnKind::Int),
            "uint" | "unsigned" => Some(ColumnKind::Uint),
            "float" | "double" | "real" => Some(ColumnKind::Float),
            "text" | "string" | "varchar" => Some(ColumnKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One schema field.
///
/// The tag is the column's identity. Name and kind may change across history;
/// the tag only changes through an explicit tag rebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Durable column identity.
    pub tag: Tag,
    /// Column name.
    pub name: String,
    /// Value kind.
    pub kind: ColumnKind,
    /// Part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Values may not be null.
    #[serde(default)]
    pub not_null: bool,
}

impl Column {
    /// Create a nullable non-key column.
    pub fn new(tag: Tag, name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            tag,
            name: name.into(),
            kind,
            primary_key: false,
            not_null: false,
        }
    }

    /// Create a primary key column (implies not null).
    pub fn key(tag: Tag, name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            tag,
            name: name.into(),
            kind,
            primary_key: true,
            not_null: true,
        }
    }

    /// Mark the column as not null.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Same column under a different tag.
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = tag;
        self
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (tag {})", self.name, self.kind, self.tag)?;
        if self.primary_key {
            write!(f, " PRIMARY KEY")?;
        } else if self.not_null {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches() {
        assert!(ColumnKind::Text.matches(&Value::Text("hello".into())));
        assert!(!ColumnKind::Text.matches(&Value::Int(123)));

        assert!(ColumnKind::Int.matches(&Value::Int(-17)));
        assert!(!ColumnKind::Int.matches(&Value::Uint(17)));

        assert!(ColumnKind::Float.matches(&Value::Float(3.5)));
        assert!(!ColumnKind::Float.matches(&Value::Float(f64::NAN)));

        assert!(ColumnKind::Bool.matches(&Value::Null));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(ColumnKind::parse("INT"), Some(ColumnKind::Int));
        assert_eq!(ColumnKind::parse("varchar"), Some(ColumnKind::Text));
        assert_eq!(ColumnKind::parse("blob"), None);
        for kind in [
            ColumnKind::Bool,
            ColumnKind::Int,
            ColumnKind::Uint,
            ColumnKind::Float,
            ColumnKind::Text,
        ] {
            assert_eq!(ColumnKind::parse(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_key_column_is_not_null() {
        let col = Column::key(1, "id", ColumnKind::Int);
        assert!(col.primary_key);
        assert!(col.not_null);
        assert_eq!(col.to_string(), "id int (tag 1) PRIMARY KEY");
    }
}
