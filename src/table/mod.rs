//! Data model: values, tagged rows, row data, tables and roots.
//!
//! Everything here is immutable once written. Changing a table means writing
//! new row, table and root objects that share every unchanged piece with the
//! previous version.

mod root;
mod row;
mod rows;
mod value;
mod versioned;

pub use root::{RootMutator, RootValue};
pub use row::{RowError, RowKey, TaggedRow, TaggedValues};
pub use rows::{RowData, RowEditor};
pub(crate) use rows::read_row;
pub use value::Value;
pub use versioned::Table;
