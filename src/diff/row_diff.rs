//! A single row-level change.

use std::collections::BTreeMap;

use crate::catalog::Tag;
use crate::table::{RowError, RowKey, TaggedRow};

/// One key-scoped change between two versions of a table's rows.
#[derive(Debug, Clone, PartialEq)]
pub enum RowDiff {
    /// Row only exists in the newer version.
    Added { key: RowKey, new: TaggedRow },
    /// Row only exists in the older version.
    Removed { key: RowKey, old: TaggedRow },
    /// Row exists in both with different content.
    Modified {
        key: RowKey,
        old: TaggedRow,
        new: TaggedRow,
    },
}

impl RowDiff {
    pub fn key(&self) -> &RowKey {
        match self {
            RowDiff::Added { key, .. } | RowDiff::Removed { key, .. } | RowDiff::Modified { key, .. } => key,
        }
    }

    /// Row after the change, `None` for removals.
    pub fn new_row(&self) -> Option<&TaggedRow> {
        match self {
            RowDiff::Added { new, .. } | RowDiff::Modified { new, .. } => Some(new),
            RowDiff::Removed { .. } => None,
        }
    }

    /// Row before the change, `None` for additions.
    pub fn old_row(&self) -> Option<&TaggedRow> {
        match self {
            RowDiff::Removed { old, .. } | RowDiff::Modified { old, .. } => Some(old),
            RowDiff::Added { .. } => None,
        }
    }

    /// Same change with every row's tags rewritten through `mapping`.
    ///
    /// The key is kept: row keys do not depend on tags.
    pub fn remap(&self, mapping: &BTreeMap<Tag, Tag>) -> Result<RowDiff, RowError> {
        Ok(match self {
            RowDiff::Added { key, new } => RowDiff::Added {
                key: key.clone(),
                new: new.remap(mapping)?,
            },
            RowDiff::Removed { key, old } => RowDiff::Removed {
                key: key.clone(),
                old: old.remap(mapping)?,
            },
            RowDiff::Modified { key, old, new } => RowDiff::Modified {
                key: key.clone(),
                old: old.remap(mapping)?,
                new: new.remap(mapping)?,
            },
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RowDiff::Added { .. } => "added",
            RowDiff::Removed { .. } => "removed",
            RowDiff::Modified { .. } => "modified",
        }
    }
}
