//! Registry of system tables and their fixed column tags.
//!
//! System tables are recognised by a name prefix. Their columns do not get
//! generated tags; each well-known column has a fixed tag in the reserved
//! range. The registry is a plain value handed to whoever needs it.

use std::collections::BTreeMap;

use super::tags::{Tag, RESERVED_TAG_MIN};

/// default system table prefix
pub const SYSTEM_TABLE_PREFIX: &str = "histdb_";

/// documentation table
pub const DOCS_TABLE: &str = "histdb_docs";
/// saved queries
pub const QUERY_CATALOG_TABLE: &str = "histdb_query_catalog";
/// stored view and trigger definitions
pub const SCHEMAS_TABLE: &str = "histdb_schemas";

pub const DOC_NAME_TAG: Tag = RESERVED_TAG_MIN;
pub const DOC_TEXT_TAG: Tag = RESERVED_TAG_MIN + 1;

pub const QUERY_CATALOG_ID_TAG: Tag = RESERVED_TAG_MIN + 100;
pub const QUERY_CATALOG_ORDER_TAG: Tag = RESERVED_TAG_MIN + 101;
pub const QUERY_CATALOG_NAME_TAG: Tag = RESERVED_TAG_MIN + 102;
pub const QUERY_CATALOG_QUERY_TAG: Tag = RESERVED_TAG_MIN + 103;
pub const QUERY_CATALOG_DESCRIPTION_TAG: Tag = RESERVED_TAG_MIN + 104;

pub const SCHEMAS_TYPE_TAG: Tag = RESERVED_TAG_MIN + 200;
pub const SCHEMAS_NAME_TAG: Tag = RESERVED_TAG_MIN + 201;
pub const SCHEMAS_FRAGMENT_TAG: Tag = RESERVED_TAG_MIN + 202;

/// System table prefix plus `{table -> {column -> fixed tag}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemTables {
    prefix: String,
    fixed_tags: BTreeMap<String, BTreeMap<String, Tag>>,
}

impl SystemTables {
    /// Registry with a prefix and no known tables.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fixed_tags: BTreeMap::new(),
        }
    }

    /// Register a table and its fixed column tags.
    pub fn with_table<'a>(
        mut self,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = (&'a str, Tag)>,
    ) -> Self {
        let columns = columns
            .into_iter()
            .map(|(name, tag)| (name.to_string(), tag))
            .collect();
        self.fixed_tags.insert(table.into(), columns);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether the name falls under the system prefix.
    pub fn is_system_table(&self, table: &str) -> bool {
        table.starts_with(&self.prefix)
    }

    /// Fixed tags of a registered table.
    pub fn fixed_tags(&self, table: &str) -> Option<&BTreeMap<String, Tag>> {
        self.fixed_tags.get(table)
    }

    /// Fixed tag for one column of a registered table.
    pub fn fixed_tag(&self, table: &str, column: &str) -> Option<Tag> {
        self.fixed_tags.get(table)?.get(column).copied()
    }

    /// Registered table names.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.fixed_tags.keys().map(String::as_str)
    }
}

impl Default for SystemTables {
    fn default() -> Self {
        Self::new(SYSTEM_TABLE_PREFIX)
            .with_table(DOCS_TABLE, [("doc_name", DOC_NAME_TAG), ("doc_text", DOC_TEXT_TAG)])
            .with_table(
                QUERY_CATALOG_TABLE,
                [
                    ("id", QUERY_CATALOG_ID_TAG),
                    ("display_order", QUERY_CATALOG_ORDER_TAG),
                    ("name", QUERY_CATALOG_NAME_TAG),
                    ("query", QUERY_CATALOG_QUERY_TAG),
                    ("description", QUERY_CATALOG_DESCRIPTION_TAG),
                ],
            )
            .with_table(
                SCHEMAS_TABLE,
                [
                    ("type", SCHEMAS_TYPE_TAG),
                    ("name", SCHEMAS_NAME_TAG),
                    ("fragment", SCHEMAS_FRAGMENT_TAG),
                ],
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let system = SystemTables::default();
        assert!(system.is_system_table(DOCS_TABLE));
        assert!(system.is_system_table("histdb_anything"));
        assert!(!system.is_system_table("docs"));

        assert_eq!(system.fixed_tag(DOCS_TABLE, "doc_text"), Some(DOC_TEXT_TAG));
        assert_eq!(system.fixed_tag(SCHEMAS_TABLE, "fragment"), Some(SCHEMAS_FRAGMENT_TAG));
        assert_eq!(system.fixed_tag(DOCS_TABLE, "unknown"), None);
        assert_eq!(system.tables().count(), 3);
    }

    #[test]
    fn test_fixed_tags_are_reserved_and_unique() {
        let system = SystemTables::default();
        for table in system.tables() {
            let tags: Vec<Tag> = system.fixed_tags(table).unwrap().values().copied().collect();
            assert!(tags.iter().all(|t| *t >= RESERVED_TAG_MIN));
            let unique: std::collections::BTreeSet<_> = tags.iter().collect();
            assert_eq!(unique.len(), tags.len());
        }
    }

    #[test]
    fn test_custom_registry() {
        let system = SystemTables::new("sys_").with_table("sys_meta", [("k", 7)]);
        assert!(system.is_system_table("sys_meta"));
        assert!(!system.is_system_table(DOCS_TABLE));
        assert_eq!(system.fixed_tag("sys_meta", "k"), Some(7));
    }
}
