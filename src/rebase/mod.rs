//! History rewriting with tag remapping.
//!
//! # Architecture
//!
//! ```text
//!   migrate / tag rebase          (use cases: pick commits, retarget refs)
//!            │
//!            ▼
//!        engine::rebase           (walk the DAG, rebuild each commit once)
//!            │
//!            ▼
//!     replay::replay_commit       (rebuild one root under a TagMapping)
//!        │            │
//!        ▼            ▼
//!  TagMappingBuilder  diff::AsyncDiffer
//! ```
//!
//! A rewrite only writes new objects. Branches move after the whole history
//! has been rebuilt, so a failed rewrite leaves every ref where it was.

mod config;
mod engine;
mod error;
mod mapping;
mod migrate;
mod replay;

pub use config::RebaseConfig;
pub use engine::{rebase, ParentRoots};
pub use error::{RebaseError, RebaseResult};
pub use mapping::{TagMapping, TagMappingBuilder};
pub use migrate::{
    migrate_unique_tags, needs_unique_tag_migration, root_needs_unique_tags_migration,
    tag_exists_in_history, tag_rebase_for_branch, tag_rebase_for_commits, BranchRewrite,
};
pub use replay::{prune_rows, replay_commit, replay_row_diffs};
