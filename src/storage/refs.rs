//!  Branch and reference management.
//!
//!  Git refs are pointers to commits.  This module handles:
//! - main branch management
//! - branch lifecycle (create, update, delete)
//! - backup refs written before a history rewrite moves a branch
//!
//! Backup refs live outside `refs/heads` under `refs/histdb/backup/{run}/{branch}`
//! so they never show up as branches but keep the old history reachable.

use git2::{BranchType, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, CommitId};

/// namespace for backup refs
pub const BACKUP_REF_PREFIX: &str = "refs/histdb/backup/";

/// Manages Git references (branches).
pub struct RefManager;

impl RefManager {
    /// Resolve a branch name to its current commit ID.
    pub fn resolve_branch(repo: &Repository, branch: &BranchName) -> StorageResult<CommitId> {
        let reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        Ok(CommitId::new(commit.id()))
    }

    /// Get the current HEAD commit (usually main branch).
    pub fn head_commit(repo: &Repository) -> StorageResult<CommitId> {
        let head = repo.head().map_err(|e| {
            if e.code() == git2::ErrorCode::UnbornBranch {
                StorageError::EmptyRepository
            } else {
                StorageError::Git(e)
            }
        })?;

        let commit = head.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }

    /// Check if a branch exists.
    pub fn branch_exists(repo: &Repository, branch: &BranchName) -> bool {
        repo.find_reference(&branch.as_ref_path()).is_ok()
    }

    /// Create a new branch pointing to the given commit.
    pub fn create_branch(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        if Self::branch_exists(repo, branch) {
            return Err(StorageError::BranchAlreadyExists(branch.to_string()));
        }

        let commit = repo
            .find_commit(target.raw())
            .map_err(|_| StorageError::CommitNotFound(target.to_string()))?;
        repo.branch(branch.as_str(), &commit, false)?;

        Ok(())
    }

    /// Update a branch to point to a new commit.
    ///
    /// This is a force update - use `update_branch_if_unchanged` for safe updates.
    pub fn update_branch(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        let mut reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        reference.set_target(target.raw(), &format!("update branch to {}", target.short()))?;

        Ok(())
    }

    /// Update a branch only if it still points to the expected commit.
    ///
    /// This provides compare-and-swap semantics for safe concurrent updates.
    pub fn update_branch_if_unchanged(
        repo: &Repository,
        branch: &BranchName,
        expected: CommitId,
        new_target: CommitId,
    ) -> StorageResult<()> {
        let current = Self::resolve_branch(repo, branch)?;

        if current != expected {
            return Err(StorageError::ConcurrentModification {
                branch: branch.to_string(),
            });
        }

        Self::update_branch(repo, branch, new_target)
    }

    /// Delete a branch.
    pub fn delete_branch(repo: &Repository, branch: &BranchName) -> StorageResult<()> {
        let mut git_branch = repo
            .find_branch(branch.as_str(), BranchType::Local)
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        git_branch.delete()?;

        Ok(())
    }

    /// List all branches with an optional prefix filter.
    ///
    /// branches come back sorted by name.
    pub fn list_branches(repo: &Repository, prefix: Option<&str>) -> StorageResult<Vec<BranchName>> {
        let branches = repo.branches(Some(BranchType::Local))?;

        let mut result = Vec::new();
        for branch_result in branches {
            let (branch, _) = branch_result?;
            if let Some(name) = branch.name()? {
                let matches = match prefix {
                    Some(p) => name.starts_with(p),
                    None => true,
                };
                if matches {
                    if let Ok(branch_name) = BranchName::new(name) {
                        result.push(branch_name);
                    }
                }
            }
        }

        result.sort();
        Ok(result)
    }

    /// Record the current target of a branch under the backup namespace.
    ///
    /// `run_id` groups all backups taken by one rewrite.
    pub fn create_backup_ref(
        repo: &Repository,
        run_id: &str,
        branch: &BranchName,
        target: CommitId,
    ) -> StorageResult<String> {
        let name = format!("{}{}/{}", BACKUP_REF_PREFIX, run_id, branch.as_str());
        repo.reference(
            &name,
            target.raw(),
            false,
            &format!("backup of {} at {}", branch, target.short()),
        )?;
        Ok(name)
    }

    /// List backup refs, optionally restricted to one rewrite run.
    pub fn list_backup_refs(repo: &Repository, run_id: Option<&str>) -> StorageResult<Vec<(String, CommitId)>> {
        let glob = match run_id {
            Some(run) => format!("{}{}/*", BACKUP_REF_PREFIX, run),
            None => format!("{}*", BACKUP_REF_PREFIX),
        };

        let mut result = Vec::new();
        for reference in repo.references_glob(&glob)? {
            let reference = reference?;
            if let (Some(name), Some(oid)) = (reference.name(), reference.target()) {
                result.push((name.to_string(), CommitId::new(oid)));
            }
        }

        result.sort();
        Ok(result)
    }

    /// Initialize the main branch if it doesn't exist.
    ///
    /// Also ensures HEAD points to main.
    pub fn init_main_branch(repo: &Repository, initial_commit: CommitId) -> StorageResult<()> {
        let main = BranchName::main();

        if !Self::branch_exists(repo, &main) {
            Self::create_branch(repo, &main, initial_commit)?;
        }

        repo.set_head(&main.as_ref_path())?;

        Ok(())
    }
}
