//! Errors of the object store, refs and commits.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::SchemaError;
use crate::storage::types::{InvalidNameError, TableName};
use crate::table::RowError;

/// Error of any storage operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// git2 failure (object lookup, tree build, ref update)
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// no table of that name in the root
    #[error("table not found: {0}")]
    TableNotFound(TableName),

    /// target table exists and overwriting was not asked for
    #[error("table already exists: {0}")]
    TableAlreadyExists(TableName),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// schema or row JSON did not round trip
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// a stored schema or a schema change is invalid
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// a row does not fit the schema it is written under
    #[error("row error: {0}")]
    Row(#[from] RowError),

    /// branch or ref missing
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// an object exists but its content is not what the layout expects
    #[error("corrupted data at {path}: {reason}")]
    CorruptedData { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// no git repository at the path
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// HEAD is unborn
    #[error("repository is empty: no commits found")]
    EmptyRepository,

    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// a blob where a tree was expected, or the other way around
    #[error("unexpected entry type at {path}: expected {expected}, found {found}")]
    UnexpectedEntryType {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// compare-and-swap on a branch lost the race
    #[error("branch {branch} moved since it was read")]
    ConcurrentModification { branch: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// A table, ref or commit is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::TableNotFound(_)
                | StorageError::RefNotFound(_)
                | StorageError::CommitNotFound(_)
        )
    }

    /// The write collided with existing state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::TableAlreadyExists(_)
                | StorageError::BranchAlreadyExists(_)
                | StorageError::ConcurrentModification { .. }
        )
    }

    /// Re-reading the branch and retrying may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
