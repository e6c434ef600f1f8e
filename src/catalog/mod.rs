//! Catalog: schemas, super schemas, column tags and the system table registry.
//!
//! Every column carries a tag, a 64-bit identity that survives renames.
//! Schemas describe a table as it is now; super schemas remember every
//! column a table has ever had.

mod schema;
mod super_schema;
mod system;
mod tags;
mod types;

pub use schema::{Schema, SchemaBuilder, SchemaError};
pub use super_schema::{SuperColumn, SuperSchema};
pub use system::{
    SystemTables, DOCS_TABLE, DOC_NAME_TAG, DOC_TEXT_TAG, QUERY_CATALOG_TABLE, SCHEMAS_TABLE,
    SYSTEM_TABLE_PREFIX,
};
pub use tags::{auto_generate_tag, Tag, RESERVED_TAG_MIN};
pub use types::{Column, ColumnKind};
