//! histdb - a git-backed relational store with tag-preserving history rewrites.
//!
//! Every change is a commit, every table is a tree holding its schema and one
//! blob per row. Columns are identified by numeric tags instead of names, and
//! the [`rebase`] module rewrites history when tags have to change: it maps
//! old tags to new ones in every commit that used them and rebuilds the
//! commit graph on top of the result.
//!
//! # Example
//!
//! ```no_run
//! use histdb::catalog::ColumnKind;
//! use histdb::db::{ColumnDef, Database};
//!
//! let db = Database::open("./my_database").unwrap();
//! db.create_table(
//!     "users",
//!     &[ColumnDef::key("id", ColumnKind::Int), ColumnDef::new("name", ColumnKind::Text)],
//! )
//! .unwrap();
//!
//! if db.needs_migration().unwrap() {
//!     db.migrate().unwrap();
//! }
//! ```

pub mod catalog;
pub mod db;
pub mod diff;
pub mod rebase;
pub mod storage;
pub mod table;

#[cfg(test)]
mod testutil;
