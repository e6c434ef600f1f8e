//! Row-level diffs between two versions of a table.

mod async_differ;
mod row_diff;

pub use async_differ::{AsyncDiffer, DEFAULT_DIFF_BUFFER};
pub use row_diff::RowDiff;
