//! A versioned table: schema, super schema and row data.
//!
//! On disk a table is a tree:
//!
//! ```text
//! <table>/
//! ├── schema.json
//! ├── super_schema.json
//! └── rows/
//!     ├── 0280000000000000010001   (one blob per row, named by key)
//!     └── ...
//! ```

use git2::Repository;

use super::rows::RowData;
use crate::catalog::{Schema, SchemaError, SuperSchema};
use crate::storage::{blob, StorageError, StorageResult, TreeHandle, TreeId, TreeMutator};

const SCHEMA_FILE: &str = "schema.json";
const SUPER_SCHEMA_FILE: &str = "super_schema.json";
const ROWS_DIR: &str = "rows";

/// One version of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    schema: Schema,
    super_schema: SuperSchema,
    rows: RowData,
}

impl Table {
    /// A new empty table; its super schema is the schema itself.
    pub fn create(repo: &Repository, schema: Schema) -> StorageResult<Self> {
        let super_schema = SuperSchema::from_schema(&schema);
        Ok(Self {
            schema,
            super_schema,
            rows: RowData::empty(repo)?,
        })
    }

    /// Assemble a table from its parts.
    pub fn from_parts(schema: Schema, super_schema: SuperSchema, rows: RowData) -> Self {
        Self {
            schema,
            super_schema,
            rows,
        }
    }

    /// Read a table tree.
    ///
    /// `path` only labels errors.
    pub fn load(repo: &Repository, tree_id: TreeId, path: &str) -> StorageResult<Self> {
        let tree = TreeHandle::find(repo, tree_id)?;

        let missing = |entry: &str| StorageError::CorruptedData {
            path: format!("{}/{}", path, entry).into(),
            reason: "missing entry".to_string(),
        };

        let schema_blob = tree.blob_id(SCHEMA_FILE)?.ok_or_else(|| missing(SCHEMA_FILE))?;
        let schema: Schema = blob::read_json(repo, schema_blob, &format!("{}/{}", path, SCHEMA_FILE))?;
        schema.validate()?;

        let ss_blob = tree
            .blob_id(SUPER_SCHEMA_FILE)?
            .ok_or_else(|| missing(SUPER_SCHEMA_FILE))?;
        let super_schema: SuperSchema =
            blob::read_json(repo, ss_blob, &format!("{}/{}", path, SUPER_SCHEMA_FILE))?;

        let rows = tree.subtree_id(ROWS_DIR)?.ok_or_else(|| missing(ROWS_DIR))?;

        Ok(Self {
            schema,
            super_schema,
            rows: RowData::new(rows),
        })
    }

    /// Write the table tree and return its id.
    pub fn write(&self, repo: &Repository) -> StorageResult<TreeId> {
        let mut mutator = TreeMutator::empty(repo)?;
        mutator.insert_blob(SCHEMA_FILE, blob::write_json(repo, &self.schema)?)?;
        mutator.insert_blob(SUPER_SCHEMA_FILE, blob::write_json(repo, &self.super_schema)?)?;
        mutator.insert_tree(ROWS_DIR, self.rows.tree_id())?;
        mutator.write()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn super_schema(&self) -> &SuperSchema {
        &self.super_schema
    }

    pub fn rows(&self) -> RowData {
        self.rows
    }

    /// Same table with different rows.
    pub fn with_rows(&self, rows: RowData) -> Self {
        Self {
            schema: self.schema.clone(),
            super_schema: self.super_schema.clone(),
            rows,
        }
    }

    /// Evolve the schema.
    ///
    /// The super schema grows to include the new schema; values of dropped
    /// columns are pruned from every row. Primary key changes are rejected.
    pub fn with_schema(&self, repo: &Repository, schema: Schema) -> StorageResult<Self> {
        if !self.schema.same_primary_key(&schema) {
            return Err(SchemaError::PrimaryKeyChanged.into());
        }
        let super_schema = self.super_schema.with_schema(&schema)?;
        let rows = self.rows.prune_to(repo, &schema)?;
        Ok(Self {
            schema,
            super_schema,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, ColumnKind, SchemaBuilder};
    use crate::table::{TaggedRow, TaggedValues, Value};
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn schema() -> Schema {
        SchemaBuilder::new()
            .key(1, "id", ColumnKind::Int)
            .nullable(2, "name", ColumnKind::Text)
            .build()
            .unwrap()
    }

    #[test]
    fn test_write_and_load() {
        let (_dir, repo) = setup_repo();

        let table = Table::create(&repo, schema()).unwrap();
        let mut editor = table.rows().edit(&repo).unwrap();
        editor
            .put(
                table.schema(),
                &TaggedRow::new(
                    TaggedValues::from([(1, Value::Int(1))]),
                    TaggedValues::from([(2, Value::from("x"))]),
                ),
            )
            .unwrap();
        let table = table.with_rows(editor.write().unwrap());

        let id = table.write(&repo).unwrap();
        let loaded = Table::load(&repo, id, "t").unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.rows().len(&repo).unwrap(), 1);

        // identical content, identical tree
        assert_eq!(loaded.write(&repo).unwrap(), id);
    }

    #[test]
    fn test_missing_entry_is_corruption() {
        let (_dir, repo) = setup_repo();
        let empty = crate::storage::empty_tree(&repo).unwrap();

        let result = Table::load(&repo, empty, "t");
        assert!(matches!(result, Err(StorageError::CorruptedData { .. })));
    }

    #[test]
    fn test_with_schema_grows_super_schema() {
        let (_dir, repo) = setup_repo();
        let table = Table::create(&repo, schema()).unwrap();

        let added = table
            .with_schema(&repo, schema().add_column(Column::new(3, "age", ColumnKind::Uint)).unwrap())
            .unwrap();
        let dropped = added
            .with_schema(&repo, added.schema().drop_column("name").unwrap())
            .unwrap();

        assert!(dropped.schema().by_tag(2).is_none());
        assert!(dropped.super_schema().contains_tag(2));
        assert!(dropped.super_schema().contains_tag(3));
    }

    #[test]
    fn test_with_schema_rejects_key_change() {
        let (_dir, repo) = setup_repo();
        let table = Table::create(&repo, schema()).unwrap();

        let rekeyed = SchemaBuilder::new()
            .key(9, "id", ColumnKind::Int)
            .nullable(2, "name", ColumnKind::Text)
            .build()
            .unwrap();
        let result = table.with_schema(&repo, rekeyed);
        assert!(matches!(result, Err(StorageError::Schema(SchemaError::PrimaryKeyChanged))));
    }
}
