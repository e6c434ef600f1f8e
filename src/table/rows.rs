//! Row data: a content-addressed ordered map from row key to row.
//!
//! Row data is a git tree holding one JSON blob per row, named by the row's
//! [`RowKey`]. Two row sets with the same content have the same tree id, and
//! unchanged rows share blobs across versions.

use std::collections::BTreeMap;

use git2::Repository;

use super::row::{RowKey, TaggedRow};
use crate::catalog::Schema;
use crate::storage::{blob, BlobId, StorageResult, TreeHandle, TreeId, TreeMutator};

/// Immutable row set of one table version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowData(TreeId);

impl RowData {
    pub fn new(tree_id: TreeId) -> Self {
        Self(tree_id)
    }

    /// The empty row set.
    pub fn empty(repo: &Repository) -> StorageResult<Self> {
        Ok(Self(crate::storage::empty_tree(repo)?))
    }

    pub fn tree_id(&self) -> TreeId {
        self.0
    }

    /// Number of rows.
    pub fn len(&self, repo: &Repository) -> StorageResult<usize> {
        Ok(TreeHandle::find(repo, self.0)?.len())
    }

    pub fn is_empty(&self, repo: &Repository) -> StorageResult<bool> {
        Ok(self.len(repo)? == 0)
    }

    /// Read one row.
    pub fn get(&self, repo: &Repository, key: &RowKey) -> StorageResult<Option<TaggedRow>> {
        let tree = TreeHandle::find(repo, self.0)?;
        match tree.blob_id(key.as_str())? {
            Some(blob_id) => Ok(Some(read_row(repo, key, blob_id)?)),
            None => Ok(None),
        }
    }

    /// Row keys with their blob ids, in ascending key order.
    pub fn entries(&self, repo: &Repository) -> StorageResult<Vec<(RowKey, BlobId)>> {
        let tree = TreeHandle::find(repo, self.0)?;
        tree.blob_entries()
            .into_iter()
            .map(|(name, blob_id)| -> StorageResult<(RowKey, BlobId)> {
                Ok((RowKey::from_hex(&name)?, blob_id))
            })
            .collect()
    }

    /// Read every row into memory.
    ///
    /// Warning: This reads all rows into memory.  Use with caution on large tables.
    pub fn load(&self, repo: &Repository) -> StorageResult<BTreeMap<RowKey, TaggedRow>> {
        let mut rows = BTreeMap::new();
        for (key, blob_id) in self.entries(repo)? {
            let row = read_row(repo, &key, blob_id)?;
            rows.insert(key, row);
        }
        Ok(rows)
    }

    /// Start an edit session seeded with these rows.
    pub fn edit<'repo>(&self, repo: &'repo Repository) -> StorageResult<RowEditor<'repo>> {
        RowEditor::new(repo, *self)
    }

    /// Rows reduced to `schema`.
    ///
    /// Rows whose key tags are not exactly the schema's key are removed
    /// entirely; value columns the schema no longer has are dropped.
    pub fn prune_to(&self, repo: &Repository, schema: &Schema) -> StorageResult<RowData> {
        let pk_tags = schema.pk_tags();
        let mut editor = self.edit(repo)?;

        for (key, blob_id) in self.entries(repo)? {
            let row = read_row(repo, &key, blob_id)?;
            let same_key = row.key.len() == pk_tags.len() && row.key_fits(schema);
            if !same_key {
                editor.remove(&key)?;
                continue;
            }
            let pruned = row.pruned_to(schema);
            if pruned != row {
                editor.upsert(&key, &pruned)?;
            }
        }

        editor.write()
    }
}

/// read and parse one row blob
pub(crate) fn read_row(repo: &Repository, key: &RowKey, blob_id: BlobId) -> StorageResult<TaggedRow> {
    blob::read_json(repo, blob_id, &format!("rows/{}", key))
}

/// Edit session over a row set.
///
/// Edits accumulate in a tree builder; `write` produces the new row set and
/// leaves the original untouched.
pub struct RowEditor<'repo> {
    repo: &'repo Repository,
    mutator: TreeMutator<'repo>,
}

impl<'repo> RowEditor<'repo> {
    /// Edit session starting from `rows`.
    pub fn new(repo: &'repo Repository, rows: RowData) -> StorageResult<Self> {
        Ok(Self {
            repo,
            mutator: TreeMutator::from_id(repo, rows.tree_id())?,
        })
    }

    /// Insert or replace the row stored under `key`.
    pub fn upsert(&mut self, key: &RowKey, row: &TaggedRow) -> StorageResult<()> {
        let blob_id = blob::write_json(self.repo, row)?;
        self.mutator.insert_blob(key.as_str(), blob_id)
    }

    /// Validate a row against `schema` and store it under its encoded key.
    pub fn put(&mut self, schema: &Schema, row: &TaggedRow) -> StorageResult<RowKey> {
        row.check(schema)?;
        let key = RowKey::for_row(row, schema)?;
        self.upsert(&key, row)?;
        Ok(key)
    }

    /// Remove a row, returning whether it was present.
    pub fn remove(&mut self, key: &RowKey) -> StorageResult<bool> {
        self.mutator.remove(key.as_str())
    }

    /// Number of rows currently in the session.
    pub fn len(&self) -> usize {
        self.mutator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutator.is_empty()
    }

    /// Materialize the edited row set.
    pub fn write(self) -> StorageResult<RowData> {
        Ok(RowData(self.mutator.write()?))
    }
}
