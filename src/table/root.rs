//! Root values: whole-database snapshots.
//!
//! A root is a git tree with one subtree per table, named by table name.
//! Every commit points at exactly one root.

use std::collections::{BTreeMap, BTreeSet};

use git2::Repository;

use super::versioned::Table;
use crate::catalog::{SuperSchema, Tag};
use crate::storage::{
    commit, empty_tree, CommitId, StorageError, StorageResult, TableName, TreeHandle, TreeId,
    TreeMutator,
};

/// Immutable snapshot of every table at one point in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootValue(TreeId);

impl RootValue {
    pub fn new(tree_id: TreeId) -> Self {
        Self(tree_id)
    }

    /// Root with no tables.
    pub fn empty(repo: &Repository) -> StorageResult<Self> {
        Ok(Self(empty_tree(repo)?))
    }

    /// Root a commit points at.
    pub fn at_commit(repo: &Repository, commit_id: CommitId) -> StorageResult<Self> {
        Ok(Self(commit::get_commit(repo, commit_id)?.tree_id))
    }

    pub fn tree_id(&self) -> TreeId {
        self.0
    }

    /// Table names in ascending order.
    pub fn table_names(&self, repo: &Repository) -> StorageResult<Vec<TableName>> {
        let tree = TreeHandle::find(repo, self.0)?;
        tree.subtree_names()
            .into_iter()
            .map(|name| {
                TableName::new(name.as_str()).map_err(|e| StorageError::CorruptedData {
                    path: name.into(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    pub fn has_table(&self, repo: &Repository, name: &TableName) -> StorageResult<bool> {
        Ok(self.table_id(repo, name)?.is_some())
    }

    /// Tree id of a table, if present.
    pub fn table_id(&self, repo: &Repository, name: &TableName) -> StorageResult<Option<TreeId>> {
        TreeHandle::find(repo, self.0)?.subtree_id(name.as_str())
    }

    /// Load a table, if present.
    pub fn get_table(&self, repo: &Repository, name: &TableName) -> StorageResult<Option<Table>> {
        match self.table_id(repo, name)? {
            Some(id) => Ok(Some(Table::load(repo, id, name.as_str())?)),
            None => Ok(None),
        }
    }

    /// Load a table that must exist.
    pub fn require_table(&self, repo: &Repository, name: &TableName) -> StorageResult<Table> {
        self.get_table(repo, name)?
            .ok_or_else(|| StorageError::TableNotFound(name.clone()))
    }

    /// Sorted union of the table names of two roots.
    pub fn union_table_names(&self, repo: &Repository, other: &RootValue) -> StorageResult<Vec<TableName>> {
        let mut names: BTreeSet<TableName> = self.table_names(repo)?.into_iter().collect();
        names.extend(other.table_names(repo)?);
        Ok(names.into_iter().collect())
    }

    /// Super schema of every table.
    pub fn super_schemas(&self, repo: &Repository) -> StorageResult<BTreeMap<TableName, SuperSchema>> {
        let mut out = BTreeMap::new();
        for name in self.table_names(repo)? {
            let table = self.require_table(repo, &name)?;
            out.insert(name, table.super_schema().clone());
        }
        Ok(out)
    }

    /// Every tag recorded by any table's super schema.
    pub fn all_super_schema_tags(&self, repo: &Repository) -> StorageResult<BTreeSet<Tag>> {
        let mut tags = BTreeSet::new();
        for ss in self.super_schemas(repo)?.values() {
            tags.extend(ss.all_tags());
        }
        Ok(tags)
    }

    /// Start building a new root from this one.
    pub fn edit<'repo>(&self, repo: &'repo Repository) -> StorageResult<RootMutator<'repo>> {
        Ok(RootMutator {
            repo,
            mutator: TreeMutator::from_id(repo, self.0)?,
        })
    }
}

/// Builds a new root from an existing one.
pub struct RootMutator<'repo> {
    repo: &'repo Repository,
    mutator: TreeMutator<'repo>,
}

impl<'repo> RootMutator<'repo> {
    /// Write a table and put it under `name`, replacing any existing table.
    pub fn put_table(&mut self, name: &TableName, table: &Table) -> StorageResult<TreeId> {
        let id = table.write(self.repo)?;
        self.put_table_tree(name, id)?;
        Ok(id)
    }

    /// Put an already written table tree under `name`.
    pub fn put_table_tree(&mut self, name: &TableName, id: TreeId) -> StorageResult<()> {
        self.mutator.insert_tree(name.as_str(), id)
    }

    /// Remove a table, returning whether it was present.
    pub fn remove_table(&mut self, name: &TableName) -> StorageResult<bool> {
        self.mutator.remove(name.as_str())
    }

    pub fn has_table(&self, name: &TableName) -> StorageResult<bool> {
        self.mutator.contains(name.as_str())
    }

    /// Copy table `from` of `source` to `to` in this root.
    ///
    /// An existing `to` is only replaced when `force` is set.
    pub fn copy_table(
        &mut self,
        source: &RootValue,
        from: &TableName,
        to: &TableName,
        force: bool,
    ) -> StorageResult<()> {
        let id = source
            .table_id(self.repo, from)?
            .ok_or_else(|| StorageError::TableNotFound(from.clone()))?;

        if !force && self.has_table(to)? {
            return Err(StorageError::TableAlreadyExists(to.clone()));
        }

        self.put_table_tree(to, id)
    }

    /// Write the new root.
    pub fn write(self) -> StorageResult<RootValue> {
        Ok(RootValue(self.mutator.write()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnKind, SchemaBuilder};
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn name(s: &str) -> TableName {
        TableName::new(s).unwrap()
    }

    fn table(repo: &Repository, tag: Tag) -> Table {
        let schema = SchemaBuilder::new()
            .key(tag, "id", ColumnKind::Int)
            .build()
            .unwrap();
        Table::create(repo, schema).unwrap()
    }

    #[test]
    fn test_put_get_remove() {
        let (_dir, repo) = setup_repo();
        let root = RootValue::empty(&repo).unwrap();

        let mut edit = root.edit(&repo).unwrap();
        edit.put_table(&name("b"), &table(&repo, 1)).unwrap();
        edit.put_table(&name("a"), &table(&repo, 2)).unwrap();
        let root = edit.write().unwrap();

        assert_eq!(root.table_names(&repo).unwrap(), vec![name("a"), name("b")]);
        assert!(root.has_table(&repo, &name("a")).unwrap());
        let t = root.get_table(&repo, &name("a")).unwrap().unwrap();
        assert_eq!(t.schema().pk_tags(), vec![2]);

        let mut edit = root.edit(&repo).unwrap();
        assert!(edit.remove_table(&name("a")).unwrap());
        let root = edit.write().unwrap();
        assert!(root.get_table(&repo, &name("a")).unwrap().is_none());
        assert!(matches!(
            root.require_table(&repo, &name("a")),
            Err(StorageError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_union_and_tags() {
        let (_dir, repo) = setup_repo();
        let empty = RootValue::empty(&repo).unwrap();

        let mut edit = empty.edit(&repo).unwrap();
        edit.put_table(&name("a"), &table(&repo, 1)).unwrap();
        let left = edit.write().unwrap();

        let mut edit = empty.edit(&repo).unwrap();
        edit.put_table(&name("b"), &table(&repo, 5)).unwrap();
        edit.put_table(&name("a"), &table(&repo, 1)).unwrap();
        let right = edit.write().unwrap();

        assert_eq!(left.union_table_names(&repo, &right).unwrap(), vec![name("a"), name("b")]);
        assert_eq!(right.all_super_schema_tags(&repo).unwrap(), BTreeSet::from([1, 5]));
    }

    #[test]
    fn test_copy_table() {
        let (_dir, repo) = setup_repo();
        let mut edit = RootValue::empty(&repo).unwrap().edit(&repo).unwrap();
        edit.put_table(&name("src"), &table(&repo, 1)).unwrap();
        edit.put_table(&name("dst"), &table(&repo, 2)).unwrap();
        let root = edit.write().unwrap();

        let mut edit = root.edit(&repo).unwrap();
        let result = edit.copy_table(&root, &name("src"), &name("dst"), false);
        assert!(matches!(result, Err(StorageError::TableAlreadyExists(_))));

        edit.copy_table(&root, &name("src"), &name("dst"), true).unwrap();
        edit.copy_table(&root, &name("src"), &name("fresh"), false).unwrap();
        let copied = edit.write().unwrap();

        assert_eq!(
            copied.table_id(&repo, &name("dst")).unwrap(),
            root.table_id(&repo, &name("src")).unwrap()
        );
        assert!(copied.has_table(&repo, &name("fresh")).unwrap());

        let mut edit = root.edit(&repo).unwrap();
        let result = edit.copy_table(&root, &name("missing"), &name("x"), false);
        assert!(matches!(result, Err(StorageError::TableNotFound(_))));
    }
}
