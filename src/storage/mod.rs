//! Content store, refs and commits.
//!
//! The git object database is the content store. Schemas and rows are JSON
//! blobs, tables and roots are trees, and a commit points at one root. Equal
//! content always hashes to the same object, so an unchanged table keeps its
//! tree id across commits and rewrites.
//!
//! ```text
//!   table / diff / rebase
//!            │
//!            ▼
//!     GitRepository ── RefManager ── refs/heads/*, refs/histdb/backup/*
//!            │
//!     CommitBuilder, TreeMutator, blob
//!            │
//!            ▼
//!      git object database
//! ```
//!
//! ```ignore
//! use histdb::storage::{BranchName, GitRepository};
//!
//! let repo = GitRepository::open_or_init("./my_database")?;
//! let (head, root) = repo.branch_root(&BranchName::main())?;
//! let head = repo.commit_root(&BranchName::main(), head, new_root, "add users")?;
//! ```

pub mod blob;
pub mod commit;
mod error;
mod refs;
mod repository;
mod tree;
mod types;

pub use commit::{CommitBuilder, CommitInfo, CommitMessage, HistoryIterator};
pub use error::{StorageError, StorageResult};
pub use refs::{RefManager, BACKUP_REF_PREFIX};
pub use repository::GitRepository;
pub use tree::{empty_tree, TreeHandle, TreeMutator};
pub use types::{BlobId, BranchName, CommitId, GitSignature, InvalidNameError, TableName, TreeId};
