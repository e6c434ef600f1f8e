//! High-level Database API.
//!
//! This module provides a user-facing API over a histdb repository: table
//! and row changes committed one at a time, table copies, and the history
//! rewrites.

mod api;

pub use api::{ColumnDef, Database, DatabaseConfig, DatabaseError, DatabaseResult, NamedRow};
