//! Rebase error types

use thiserror::Error;

use crate::catalog::{SchemaError, Tag};
use crate::storage::{StorageError, TableName};
use crate::table::{RowError, RowKey};

/// errors raised while rewriting history
#[derive(Debug, Error)]
pub enum RebaseError {
    /// object store or ref failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// a schema could not be rebuilt under the new tags
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// the rebased parent lacks a table the original parent has
    #[error("error rebasing, table {0} not found in rebased parent root")]
    TableMissingInRebasedParent(TableName),

    /// the rebased parent's table lacks a column the original parent's table has
    #[error("error rebasing, column {column} of table {table} not found in rebased parent root")]
    ColumnMissingInRebasedParent { table: TableName, column: String },

    /// two old tags of one table map to the same new tag
    #[error("duplicate tag {tag} in table {table}")]
    DuplicateTag { tag: Tag, table: TableName },

    /// a system table column without a fixed tag
    #[error("no fixed tag for column {column} of system table {table}")]
    UnknownSystemColumn { table: TableName, column: String },

    /// the differ returned more diffs than were asked for
    #[error("requested {requested} diff(s), differ returned {returned}")]
    DiffOverflow { requested: usize, returned: usize },

    /// a branch head could not be resolved or was lost during migration
    #[error("found {branches} branch(es) but resolved {heads} head commit(s)")]
    BranchCountMismatch { branches: usize, heads: usize },

    /// a diffed row could not be moved to the new tags
    #[error("cannot remap row {key} of table {table}: {source}")]
    RowRemap {
        table: TableName,
        key: RowKey,
        #[source]
        source: RowError,
    },

    /// invalid tag mapping document
    #[error("invalid tag mapping: {0}")]
    InvalidMapping(String),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl RebaseError {
    /// the rebased lineage does not match the original structurally
    pub fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            RebaseError::TableMissingInRebasedParent(_)
                | RebaseError::ColumnMissingInRebasedParent { .. }
                | RebaseError::BranchCountMismatch { .. }
                | RebaseError::DiffOverflow { .. }
        )
    }

    /// the mapping itself is unusable; raised before any row is rewritten
    pub fn is_mapping_conflict(&self) -> bool {
        matches!(
            self,
            RebaseError::DuplicateTag { .. }
                | RebaseError::UnknownSystemColumn { .. }
                | RebaseError::InvalidMapping(_)
        )
    }
}

/// result type alias for rebase operations
pub type RebaseResult<T> = Result<T, RebaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_tag_message_names_tag_and_table() {
        let err = RebaseError::DuplicateTag {
            tag: 99,
            table: TableName::new("T").unwrap(),
        };
        assert_eq!(err.to_string(), "duplicate tag 99 in table T");
        assert!(err.is_mapping_conflict());
        assert!(!err.is_inconsistency());
    }

    #[test]
    fn test_inconsistency_classification() {
        let err = RebaseError::TableMissingInRebasedParent(TableName::new("users").unwrap());
        assert!(err.is_inconsistency());
        assert!(err.to_string().contains("users"));

        let err = RebaseError::DiffOverflow {
            requested: 1,
            returned: 2,
        };
        assert!(err.is_inconsistency());
    }
}
