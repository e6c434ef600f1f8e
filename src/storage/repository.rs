//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer.  It wraps `git2::Repository`
//!   with thread-safe access and provides the high-level operations the rest of
//!  the system uses: resolving branches, reading roots, walking history and
//!  committing new roots.
//!
//! All other storage modules use this for Git access.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::Repository;
use parking_lot::RwLock;
use tracing::debug;

use crate::storage::commit::{self, CommitBuilder, CommitInfo};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::types::{BranchName, CommitId, GitSignature};
use crate::table::RootValue;

/// The main Git repository wrapper.
///
/// This provides thread-safe access to all Git operations.
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: RwLock<Repository>,
    path: PathBuf,
    signature: RwLock<GitSignature>,
}

impl GitRepository {
    fn from_repo(repo: Repository, path: &Path) -> Self {
        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: RwLock::new(repo),
                path: path.to_path_buf(),
                signature: RwLock::new(GitSignature::histdb()),
            }),
        }
    }

    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;
        Ok(Self::from_repo(repo, path))
    }

    /// Initialize a new repository.
    ///
    /// The new repository has one commit with an empty root on `main`.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::init(path)?;
        let storage = Self::from_repo(repo, path);

        storage.with_repo_mut(|repo| {
            let commit_id = commit::create_initial_commit(repo, &storage.signature())?;
            RefManager::init_main_branch(repo, commit_id)?;
            debug!(path = %path.display(), commit = %commit_id.short(), "initialized repository");
            Ok(())
        })?;

        Ok(storage)
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Signature used for new commits.
    pub fn signature(&self) -> GitSignature {
        self.inner.signature.read().clone()
    }

    /// Set the signature for commits.
    pub fn set_signature(&self, signature: GitSignature) {
        *self.inner.signature.write() = signature;
    }

    /// Execute a function with read access to the repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.read();
        f(&repo)
    }

    /// Execute a function with write access to the repository.
    ///
    /// Writers are serialized, so a read-check-write sequence inside `f`
    /// cannot interleave with another writer of this handle.
    pub fn with_repo_mut<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.write();
        f(&repo)
    }

    // ==================== Commits and Roots ====================

    /// Get the current HEAD commit (tip of main branch).
    pub fn head(&self) -> StorageResult<CommitId> {
        self.with_repo(RefManager::head_commit)
    }

    /// Get the commit ID for a branch.
    pub fn resolve_branch(&self, branch: &BranchName) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve_branch(repo, branch))
    }

    /// Get information about a commit.
    pub fn get_commit(&self, id: CommitId) -> StorageResult<CommitInfo> {
        self.with_repo(|repo| commit::get_commit(repo, id))
    }

    /// Get the root a commit points at.
    pub fn root_at(&self, commit_id: CommitId) -> StorageResult<RootValue> {
        self.with_repo(|repo| RootValue::at_commit(repo, commit_id))
    }

    /// Head commit of a branch together with its root.
    pub fn branch_root(&self, branch: &BranchName) -> StorageResult<(CommitId, RootValue)> {
        self.with_repo(|repo| {
            let head = RefManager::resolve_branch(repo, branch)?;
            Ok((head, RootValue::at_commit(repo, head)?))
        })
    }

    /// Commit a root on top of a branch.
    ///
    /// Compare-and-swap: fails with `ConcurrentModification` if the branch
    /// no longer points at `expected`.
    pub fn commit_root(
        &self,
        branch: &BranchName,
        expected: CommitId,
        root: RootValue,
        message: &str,
    ) -> StorageResult<CommitId> {
        self.with_repo_mut(|repo| {
            let current = RefManager::resolve_branch(repo, branch)?;
            if current != expected {
                return Err(StorageError::ConcurrentModification {
                    branch: branch.to_string(),
                });
            }

            let commit_id = CommitBuilder::new(repo)
                .tree(root.tree_id())
                .parent(expected)
                .message(message)
                .signature(self.signature())
                .commit()?;

            RefManager::update_branch_if_unchanged(repo, branch, expected, commit_id)?;
            debug!(%branch, commit = %commit_id.short(), "committed root");
            Ok(commit_id)
        })
    }

    /// Get commit history.
    pub fn history(&self, from: CommitId, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        self.with_repo(|repo| {
            let iter = commit::history(repo, from)?;
            match limit {
                Some(n) => iter.take(n).collect(),
                None => iter.collect(),
            }
        })
    }

    // ==================== Branch Operations ====================

    /// Create a new branch at the given commit.
    pub fn create_branch(&self, branch: &BranchName, at: CommitId) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::create_branch(repo, branch, at))
    }

    /// Delete a branch.
    pub fn delete_branch(&self, branch: &BranchName) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::delete_branch(repo, branch))
    }

    /// Update a branch to point to a new commit.
    pub fn update_branch(&self, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::update_branch(repo, branch, target))
    }

    /// Check if a branch exists.
    pub fn branch_exists(&self, branch: &BranchName) -> StorageResult<bool> {
        self.with_repo(|repo| Ok(RefManager::branch_exists(repo, branch)))
    }

    /// List all branches.
    pub fn list_branches(&self) -> StorageResult<Vec<BranchName>> {
        self.with_repo(|repo| RefManager::list_branches(repo, None))
    }

    /// List backup refs left by history rewrites.
    pub fn list_backup_refs(&self) -> StorageResult<Vec<(String, CommitId)>> {
        self.with_repo(|repo| RefManager::list_backup_refs(repo, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnKind, SchemaBuilder};
    use crate::storage::TableName;
    use crate::table::Table;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepository) {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn root_with_table(repo: &GitRepository, base: RootValue, name: &str) -> RootValue {
        repo.with_repo(|r| {
            let schema = SchemaBuilder::new().key(1, "id", ColumnKind::Int).build()?;
            let mut edit = base.edit(r)?;
            edit.put_table(&TableName::new(name)?, &Table::create(r, schema)?)?;
            edit.write()
        })
        .unwrap()
    }

    #[test]
    fn test_init_and_open() {
        let dir = TempDir::new().unwrap();

        let repo = GitRepository::init(dir.path()).unwrap();
        let head1 = repo.head().unwrap();

        drop(repo);
        let repo = GitRepository::open(dir.path()).unwrap();
        let head2 = repo.head().unwrap();

        assert_eq!(head1, head2);
        assert_eq!(repo.list_branches().unwrap(), vec![BranchName::main()]);
    }

    #[test]
    fn test_open_missing_repository() {
        let dir = TempDir::new().unwrap();
        let result = GitRepository::open(dir.path().join("nope"));
        assert!(matches!(result, Err(StorageError::NotInitialized(_))));
    }

    #[test]
    fn test_open_or_init() {
        let dir = TempDir::new().unwrap();

        let repo1 = GitRepository::open_or_init(dir.path()).unwrap();
        let head1 = repo1.head().unwrap();

        drop(repo1);
        let repo2 = GitRepository::open_or_init(dir.path()).unwrap();
        let head2 = repo2.head().unwrap();

        assert_eq!(head1, head2);
    }

    #[test]
    fn test_initial_root_is_empty() {
        let (_dir, repo) = setup();
        let (_, root) = repo.branch_root(&BranchName::main()).unwrap();
        let tables = repo.with_repo(|r| root.table_names(r)).unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn test_commit_root() {
        let (_dir, repo) = setup();
        let main = BranchName::main();
        let (head, root) = repo.branch_root(&main).unwrap();

        let new_root = root_with_table(&repo, root, "users");
        let commit = repo.commit_root(&main, head, new_root, "add users").unwrap();

        assert_eq!(repo.resolve_branch(&main).unwrap(), commit);
        assert_eq!(repo.root_at(commit).unwrap(), new_root);

        let info = repo.get_commit(commit).unwrap();
        assert_eq!(info.parent_ids, vec![head]);
        assert_eq!(info.summary(), "add users");
    }

    #[test]
    fn test_commit_root_detects_concurrent_modification() {
        let (_dir, repo) = setup();
        let main = BranchName::main();
        let (head, root) = repo.branch_root(&main).unwrap();

        let first = root_with_table(&repo, root, "a");
        repo.commit_root(&main, head, first, "a").unwrap();

        let second = root_with_table(&repo, root, "b");
        let result = repo.commit_root(&main, head, second, "b");
        assert!(matches!(result, Err(StorageError::ConcurrentModification { .. })));
    }

    #[test]
    fn test_branch_operations() {
        let (_dir, repo) = setup();
        let head = repo.head().unwrap();

        let branch = BranchName::new("feature").unwrap();

        repo.create_branch(&branch, head).unwrap();
        assert!(repo.branch_exists(&branch).unwrap());

        let resolved = repo.resolve_branch(&branch).unwrap();
        assert_eq!(resolved, head);

        let branches = repo.list_branches().unwrap();
        assert!(branches.iter().any(|b| b.as_str() == "feature"));

        repo.delete_branch(&branch).unwrap();
        assert!(!repo.branch_exists(&branch).unwrap());
    }

    #[test]
    fn test_history() {
        let (_dir, repo) = setup();
        let main = BranchName::main();
        let (head, root) = repo.branch_root(&main).unwrap();

        let new_root = root_with_table(&repo, root, "test");
        let head = repo.commit_root(&main, head, new_root, "create test").unwrap();

        let history = repo.history(head, Some(10)).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, head);
        assert!(history[1].is_root());
    }
}
