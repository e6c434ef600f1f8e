//!  tree operations: the structural half of the content store.
//!
//! in git, a tree is a directory. In histdb:
//! - a root snapshot is a tree with one subtree per table
//! - a table is a tree holding its schema blobs and a `rows` subtree
//! - a `rows` tree holds one blob per row, named by the row's encoded key
//!
//! this module provides safe abstractions over git's tree manipulation,
//! which is notoriously fiddly to get right. It knows nothing about tables;
//! the layout lives in the `table` module.

use git2::{FileMode, ObjectType, Repository, Tree, TreeBuilder as Git2TreeBuilder};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, TreeId};

/// A read only handle to a git tree
///
/// think of it as a snapshot - it won't change even if new commits are made.
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    /// create a TreeHandle from a git2::Tree
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// look up a tree by id
    pub fn find(repo: &'repo Repository, id: TreeId) -> StorageResult<Self> {
        Ok(Self::new(repo.find_tree(id.raw())?))
    }

    /// get the tree ID
    pub fn id(&self) -> TreeId {
        TreeId::new(self.tree.id())
    }

    /// get the underlying git2::Tree (for internal use)
    pub(crate) fn inner(&self) -> &Tree<'repo> {
        &self.tree
    }

    /// number of entries in this tree
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// whether this tree has no entries
    pub fn is_empty(&self) -> bool {
        self.tree.len() == 0
    }

    /// names of all subtree entries, in tree order
    pub fn subtree_names(&self) -> Vec<String> {
        self.tree
            .iter()
            .filter(|entry| entry.kind() == Some(ObjectType::Tree))
            .filter_map(|entry| entry.name().map(str::to_string))
            .collect()
    }

    /// get the id of a subtree entry, failing if the entry is not a tree
    pub fn subtree_id(&self, name: &str) -> StorageResult<Option<TreeId>> {
        match self.tree.get_name(name) {
            Some(entry) => {
                if entry.kind() != Some(ObjectType::Tree) {
                    return Err(StorageError::UnexpectedEntryType {
                        path: name.into(),
                        expected: "tree (directory)".to_string(),
                        found: format!("{:?}", entry.kind()),
                    });
                }
                Ok(Some(TreeId::new(entry.id())))
            }
            None => Ok(None),
        }
    }

    /// get the id of a blob entry, failing if the entry is not a blob
    pub fn blob_id(&self, name: &str) -> StorageResult<Option<BlobId>> {
        match self.tree.get_name(name) {
            Some(entry) => {
                if entry.kind() != Some(ObjectType::Blob) {
                    return Err(StorageError::UnexpectedEntryType {
                        path: name.into(),
                        expected: "blob (file)".to_string(),
                        found: format!("{:?}", entry.kind()),
                    });
                }
                Ok(Some(BlobId::new(entry.id())))
            }
            None => Ok(None),
        }
    }

    /// all blob entries as (name, id) pairs, in tree order
    pub fn blob_entries(&self) -> Vec<(String, BlobId)> {
        self.tree
            .iter()
            .filter(|entry| entry.kind() == Some(ObjectType::Blob))
            .filter_map(|entry| Some((entry.name()?.to_string(), BlobId::new(entry.id()))))
            .collect()
    }
}

/// a mutable tree builder for making changes
///
/// this adds up changes and produces a new tree when its final.
/// the original tree is not modified.
///
/// # Usage Pattern
///
/// ```ignore
/// let mut builder = TreeMutator::from_tree(repo, &tree)?;
/// builder.insert_blob("0531", blob_id)?;
/// builder.remove("0532")?;
/// let new_tree_id = builder.write()?;
/// ```
pub struct TreeMutator<'repo> {
    builder: Git2TreeBuilder<'repo>,
}

impl<'repo> TreeMutator<'repo> {
    /// create a new TreeMutator from an existing tree
    pub fn from_tree(repo: &'repo Repository, tree: &TreeHandle<'_>) -> StorageResult<Self> {
        let builder = repo.treebuilder(Some(tree.inner()))?;
        Ok(Self { builder })
    }

    /// create a new TreeMutator from a tree id
    pub fn from_id(repo: &'repo Repository, id: TreeId) -> StorageResult<Self> {
        let tree = repo.find_tree(id.raw())?;
        let builder = repo.treebuilder(Some(&tree))?;
        Ok(Self { builder })
    }

    /// create a new TreeMutator for an empty tree
    pub fn empty(repo: &'repo Repository) -> StorageResult<Self> {
        let builder = repo.treebuilder(None)?;
        Ok(Self { builder })
    }

    /// check whether an entry exists
    pub fn contains(&self, name: &str) -> StorageResult<bool> {
        Ok(self.builder.get(name)?.is_some())
    }

    /// insert or replace a subtree entry
    pub fn insert_tree(&mut self, name: &str, id: TreeId) -> StorageResult<()> {
        self.builder.insert(name, id.raw(), FileMode::Tree.into())?;
        Ok(())
    }

    /// insert or replace a blob entry
    pub fn insert_blob(&mut self, name: &str, id: BlobId) -> StorageResult<()> {
        self.builder.insert(name, id.raw(), FileMode::Blob.into())?;
        Ok(())
    }

    /// remove an entry, returning whether it existed
    pub fn remove(&mut self, name: &str) -> StorageResult<bool> {
        if !self.contains(name)? {
            return Ok(false);
        }
        self.builder.remove(name)?;
        Ok(true)
    }

    /// number of entries currently in the builder
    pub fn len(&self) -> usize {
        self.builder.len()
    }

    /// whether the builder has no entries
    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    /// write the tree and return its ID
    pub fn write(self) -> StorageResult<TreeId> {
        let id = self.builder.write()?;
        Ok(TreeId::new(id))
    }
}

/// write an empty tree
pub fn empty_tree(repo: &Repository) -> StorageResult<TreeId> {
    TreeMutator::empty(repo)?.write()
}
