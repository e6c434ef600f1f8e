//! History rewrites offered to users.
//!
//! - unique tag migration: rebuild every branch so that no two tables share
//!   a tag anywhere in history
//! - tag rebase: move specific tags of specific tables to new values, on
//!   the commits that actually carry them

use std::collections::HashMap;

use git2::Repository;
use tracing::{info, warn};
use ulid::Ulid;

use super::config::RebaseConfig;
use super::engine::{rebase, ParentRoots};
use super::error::{RebaseError, RebaseResult};
use super::mapping::{TagMapping, TagMappingBuilder};
use super::replay::replay_commit;
use crate::catalog::Tag;
use crate::storage::commit::CommitInfo;
use crate::storage::{BranchName, CommitId, RefManager, StorageResult, TableName};
use crate::table::RootValue;

/// A branch moved to a rewritten head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRewrite {
    pub branch: BranchName,
    pub old_head: CommitId,
    pub new_head: CommitId,
    /// ref left at the old head, if backups are enabled and the head moved
    pub backup_ref: Option<String>,
}

/// Whether some tag is shared by two tables of `root`.
pub fn root_needs_unique_tags_migration(repo: &Repository, root: RootValue) -> StorageResult<bool> {
    let mut owners: HashMap<Tag, TableName> = HashMap::new();
    for (name, super_schema) in root.super_schemas(repo)? {
        for tag in super_schema.all_tags() {
            if let Some(owner) = owners.insert(tag, name.clone()) {
                if owner != name {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

/// Whether the head of any branch needs the unique tag migration.
pub fn needs_unique_tag_migration(repo: &Repository) -> StorageResult<bool> {
    for branch in RefManager::list_branches(repo, None)? {
        let head = RefManager::resolve_branch(repo, &branch)?;
        if root_needs_unique_tags_migration(repo, RootValue::at_commit(repo, head)?)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Rebuild the history of every branch with unique tags.
///
/// Every commit except the first of history is replayed; each column gets a
/// freshly generated tag the first time it appears and keeps it afterwards.
/// Branches are retargeted only after every branch has been rebuilt.
pub fn migrate_unique_tags(repo: &Repository, config: &RebaseConfig) -> RebaseResult<Vec<BranchRewrite>> {
    let branches = RefManager::list_branches(repo, None)?;
    let heads = branches
        .iter()
        .map(|branch| RefManager::resolve_branch(repo, branch))
        .collect::<StorageResult<Vec<_>>>()?;

    let run_id = Ulid::new().to_string();
    info!(run = %run_id, branches = branches.len(), "migrating history to unique tags");

    let builder = TagMappingBuilder::new(&config.system_tables);
    let replay = |repo: &Repository, _: &CommitInfo, root: RootValue, parents: &[ParentRoots]| -> RebaseResult<RootValue> {
        let mapping = builder.build_for_parents(repo, root, parents)?;
        mapping.validate()?;
        let first = first_parent(parents)?;
        replay_commit(repo, config, root, first.original, first.rebased, &mapping)
    };

    let new_heads = rebase(repo, replay, |_, _| Ok(true), &heads)?;
    if new_heads.len() != branches.len() {
        return Err(RebaseError::BranchCountMismatch {
            branches: branches.len(),
            heads: new_heads.len(),
        });
    }

    let rewrites = retarget(repo, config, &run_id, branches, heads, new_heads)?;
    info!(run = %run_id, "unique tag migration finished");
    Ok(rewrites)
}

/// Rebuild the history behind `heads` with `mapping` applied.
///
/// Only commits that have a parent and carry one of the mapped tags in some
/// table's super schema are replayed; everything else is reused as is.
/// Returns the new commit of each head. No ref is touched.
pub fn tag_rebase_for_commits(
    repo: &Repository,
    config: &RebaseConfig,
    mapping: &TagMapping,
    heads: &[CommitId],
) -> RebaseResult<Vec<CommitId>> {
    mapping.validate()?;

    let replay = |repo: &Repository, _: &CommitInfo, root: RootValue, parents: &[ParentRoots]| -> RebaseResult<RootValue> {
        let first = first_parent(parents)?;
        replay_commit(repo, config, root, first.original, first.rebased, mapping)
    };
    let needs_rebase = |repo: &Repository, info: &CommitInfo| -> RebaseResult<bool> {
        Ok(!info.is_root() && tag_exists_in_history(repo, info, mapping)?)
    };

    rebase(repo, replay, needs_rebase, heads)
}

/// Apply `mapping` to the history of one branch and move the branch.
pub fn tag_rebase_for_branch(
    repo: &Repository,
    config: &RebaseConfig,
    branch: &BranchName,
    mapping: &TagMapping,
) -> RebaseResult<BranchRewrite> {
    let head = RefManager::resolve_branch(repo, branch)?;
    let new_heads = tag_rebase_for_commits(repo, config, mapping, &[head])?;

    let run_id = Ulid::new().to_string();
    retarget(repo, config, &run_id, vec![branch.clone()], vec![head], new_heads)?
        .pop()
        .ok_or_else(|| RebaseError::Internal(format!("branch {} was not retargeted", branch)))
}

/// Whether any table of the commit's root has recorded one of the mapped
/// old tags in its super schema.
pub fn tag_exists_in_history(repo: &Repository, commit: &CommitInfo, mapping: &TagMapping) -> StorageResult<bool> {
    let root = RootValue::new(commit.tree_id);
    for name in root.table_names(repo)? {
        let Some(table_mapping) = mapping.table(&name) else {
            continue;
        };
        let table = root.require_table(repo, &name)?;
        if table_mapping
            .keys()
            .any(|old| table.super_schema().contains_tag(*old))
        {
            return Ok(true);
        }
    }
    Ok(false)
}

fn first_parent(parents: &[ParentRoots]) -> RebaseResult<&ParentRoots> {
    parents
        .first()
        .ok_or_else(|| RebaseError::Internal("replayed commit has no parent".to_string()))
}

/// point each branch at its new head, leaving backup refs first
fn retarget(
    repo: &Repository,
    config: &RebaseConfig,
    run_id: &str,
    branches: Vec<BranchName>,
    old_heads: Vec<CommitId>,
    new_heads: Vec<CommitId>,
) -> RebaseResult<Vec<BranchRewrite>> {
    let mut rewrites = Vec::with_capacity(branches.len());

    for ((branch, old_head), new_head) in branches.into_iter().zip(old_heads).zip(new_heads) {
        let backup_ref = if config.backup_refs && old_head != new_head {
            Some(RefManager::create_backup_ref(repo, run_id, &branch, old_head)?)
        } else {
            None
        };

        if old_head != new_head {
            RefManager::update_branch(repo, &branch, new_head)?;
            warn!(%branch, old = %old_head.short(), new = %new_head.short(), "retargeted branch");
        }

        rewrites.push(BranchRewrite {
            branch,
            old_head,
            new_head,
            backup_ref,
        });
    }

    Ok(rewrites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnKind, Schema, SchemaBuilder};
    use crate::storage::{commit, StorageError};
    use crate::table::{TaggedRow, Value};
    use crate::testutil::{commit as make_commit, name, put_tables, row, setup_repo, table_with_rows};

    fn kv_schema(key: Tag, val: Tag) -> Schema {
        SchemaBuilder::new()
            .key(key, "id", ColumnKind::Int)
            .nullable(val, "v", ColumnKind::Text)
            .build()
            .unwrap()
    }

    fn kv(key: Tag, val: Tag, id: i64, v: &str) -> TaggedRow {
        row(&[(key, Value::Int(id))], &[(val, Value::from(v))])
    }

    fn values_of(repo: &Repository, head: CommitId, table: &str) -> Vec<(Value, Value)> {
        let root = RootValue::at_commit(repo, head).unwrap();
        let table = root.require_table(repo, &name(table)).unwrap();
        let schema = table.schema().clone();
        table
            .rows()
            .load(repo)
            .unwrap()
            .into_values()
            .map(|r| {
                let pk = schema.pk_tags()[0];
                let val = schema.non_pk_tags()[0];
                (r.key[&pk].clone(), r.value.get(&val).cloned().unwrap_or(Value::Null))
            })
            .collect()
    }

    /// init -> shared (tables a and b both use tags 1, 2) -> main / feature
    fn shared_tag_history(repo: &Repository) -> (CommitId, CommitId, CommitId) {
        let empty = RootValue::empty(repo).unwrap();
        let init = make_commit(repo, empty, &[], "init");
        RefManager::init_main_branch(repo, init).unwrap();

        let base = put_tables(
            repo,
            empty,
            vec![
                ("a", table_with_rows(repo, kv_schema(1, 2), &[kv(1, 2, 1, "a1")])),
                ("b", table_with_rows(repo, kv_schema(1, 2), &[kv(1, 2, 1, "b1")])),
            ],
        );
        let shared = make_commit(repo, base, &[init], "shared");

        let main_root = put_tables(
            repo,
            base,
            vec![("a", table_with_rows(repo, kv_schema(1, 2), &[kv(1, 2, 1, "a1"), kv(1, 2, 2, "a2")]))],
        );
        let main = make_commit(repo, main_root, &[shared], "main work");

        let feature_root = put_tables(
            repo,
            base,
            vec![("b", table_with_rows(repo, kv_schema(1, 2), &[kv(1, 2, 1, "b1-changed")]))],
        );
        let feature = make_commit(repo, feature_root, &[shared], "feature work");

        RefManager::update_branch(repo, &BranchName::main(), main).unwrap();
        RefManager::create_branch(repo, &BranchName::new("feature").unwrap(), feature).unwrap();
        (shared, main, feature)
    }

    #[test]
    fn test_root_needs_migration() {
        let (_dir, repo) = setup_repo();
        let empty = RootValue::empty(&repo).unwrap();

        let shared = put_tables(
            &repo,
            empty,
            vec![
                ("a", table_with_rows(&repo, kv_schema(1, 2), &[])),
                ("b", table_with_rows(&repo, kv_schema(2, 3), &[])),
            ],
        );
        assert!(root_needs_unique_tags_migration(&repo, shared).unwrap());

        let unique = put_tables(
            &repo,
            empty,
            vec![
                ("a", table_with_rows(&repo, kv_schema(1, 2), &[])),
                ("b", table_with_rows(&repo, kv_schema(3, 4), &[])),
            ],
        );
        assert!(!root_needs_unique_tags_migration(&repo, unique).unwrap());
    }

    #[test]
    fn test_migrate_unique_tags_over_two_branches() {
        let (_dir, repo) = setup_repo();
        let (shared, main, feature) = shared_tag_history(&repo);
        assert!(needs_unique_tag_migration(&repo).unwrap());

        let config = RebaseConfig::default();
        let rewrites = migrate_unique_tags(&repo, &config).unwrap();
        assert_eq!(rewrites.len(), 2);
        assert!(!needs_unique_tag_migration(&repo).unwrap());

        let feature_branch = BranchName::new("feature").unwrap();
        let new_main = RefManager::resolve_branch(&repo, &BranchName::main()).unwrap();
        let new_feature = RefManager::resolve_branch(&repo, &feature_branch).unwrap();
        assert_ne!(new_main, main);
        assert_ne!(new_feature, feature);

        // the shared ancestor was rebuilt once: both heads sit on the same commit
        let main_info = commit::get_commit(&repo, new_main).unwrap();
        let feature_info = commit::get_commit(&repo, new_feature).unwrap();
        assert_eq!(main_info.parent_ids, feature_info.parent_ids);
        assert_ne!(main_info.parent_ids[0], shared);
        assert_eq!(main_info.message, "main work");

        // data survives under the new tags
        assert_eq!(
            values_of(&repo, new_main, "a"),
            vec![(Value::Int(1), Value::from("a1")), (Value::Int(2), Value::from("a2"))]
        );
        assert_eq!(values_of(&repo, new_feature, "b"), vec![(Value::Int(1), Value::from("b1-changed"))]);

        // old heads are kept under backup refs
        let backups = RefManager::list_backup_refs(&repo, None).unwrap();
        let targets: Vec<CommitId> = backups.iter().map(|(_, id)| *id).collect();
        assert!(targets.contains(&main));
        assert!(targets.contains(&feature));
    }

    #[test]
    fn test_migration_is_stable_once_tags_are_unique() {
        let (_dir, repo) = setup_repo();
        shared_tag_history(&repo);

        let config = RebaseConfig::default().backup_refs(false);
        let first = migrate_unique_tags(&repo, &config).unwrap();
        let second = migrate_unique_tags(&repo, &config).unwrap();

        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.new_head, b.new_head);
            assert_eq!(b.old_head, b.new_head);
            assert!(b.backup_ref.is_none());
        }
    }

    #[test]
    fn test_migrate_through_merge_commit() {
        let (_dir, repo) = setup_repo();
        let empty = RootValue::empty(&repo).unwrap();
        let init = make_commit(&repo, empty, &[], "init");
        RefManager::init_main_branch(&repo, init).unwrap();

        let base = put_tables(
            &repo,
            empty,
            vec![
                ("a", table_with_rows(&repo, kv_schema(1, 2), &[kv(1, 2, 1, "a1")])),
                ("b", table_with_rows(&repo, kv_schema(1, 2), &[kv(1, 2, 1, "b1")])),
            ],
        );
        let base_commit = make_commit(&repo, base, &[init], "base");

        let a_left = table_with_rows(&repo, kv_schema(1, 2), &[kv(1, 2, 1, "a1"), kv(1, 2, 2, "a2")]);
        let left_root = put_tables(&repo, base, vec![("a", a_left)]);
        let left = make_commit(&repo, left_root, &[base_commit], "left");

        let right_root = put_tables(
            &repo,
            base,
            vec![
                ("b", table_with_rows(&repo, kv_schema(1, 2), &[kv(1, 2, 1, "b1x")])),
                ("c", table_with_rows(&repo, kv_schema(1, 2), &[kv(1, 2, 1, "c1")])),
            ],
        );
        let right = make_commit(&repo, right_root, &[base_commit], "right");

        let merge_root = put_tables(
            &repo,
            right_root,
            vec![(
                "a",
                table_with_rows(
                    &repo,
                    kv_schema(1, 2),
                    &[kv(1, 2, 1, "a1"), kv(1, 2, 2, "a2"), kv(1, 2, 3, "a3")],
                ),
            )],
        );
        let merge = make_commit(&repo, merge_root, &[left, right], "merge");
        RefManager::update_branch(&repo, &BranchName::main(), merge).unwrap();

        let rewrites = migrate_unique_tags(&repo, &RebaseConfig::default()).unwrap();
        assert_eq!(rewrites.len(), 1);
        assert!(!needs_unique_tag_migration(&repo).unwrap());

        let head = rewrites[0].new_head;
        let info = commit::get_commit(&repo, head).unwrap();
        assert_eq!(info.message, "merge");
        assert_eq!(info.parent_ids.len(), 2);

        let root = RootValue::at_commit(&repo, head).unwrap();
        let tags: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|t| root.require_table(&repo, &name(t)).unwrap().super_schema().all_tags())
            .collect();
        assert!(tags[0].is_disjoint(&tags[1]));
        assert!(tags[0].is_disjoint(&tags[2]));
        assert!(tags[1].is_disjoint(&tags[2]));

        assert_eq!(
            values_of(&repo, head, "a"),
            vec![
                (Value::Int(1), Value::from("a1")),
                (Value::Int(2), Value::from("a2")),
                (Value::Int(3), Value::from("a3")),
            ]
        );
        assert_eq!(values_of(&repo, head, "b"), vec![(Value::Int(1), Value::from("b1x"))]);
        assert_eq!(values_of(&repo, head, "c"), vec![(Value::Int(1), Value::from("c1"))]);

        // c keeps the tags its own parent line gave it
        let right_root = RootValue::at_commit(&repo, info.parent_ids[1]).unwrap();
        let c_right = right_root.require_table(&repo, &name("c")).unwrap();
        assert_eq!(c_right.super_schema().all_tags(), tags[2]);
        assert_eq!(values_of(&repo, info.parent_ids[0], "a").len(), 2);
    }

    #[test]
    fn test_unresolvable_branch_fails_migration() {
        let (_dir, repo) = setup_repo();
        let (_, main, _) = shared_tag_history(&repo);

        let blob = repo.blob(b"not a commit").unwrap();
        repo.reference("refs/heads/broken", blob, true, "test").unwrap();

        let err = migrate_unique_tags(&repo, &RebaseConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            RebaseError::Storage(StorageError::RefNotFound(ref b)) if b == "broken"
        ));
        assert_eq!(RefManager::resolve_branch(&repo, &BranchName::main()).unwrap(), main);
    }

    #[test]
    fn test_tag_rebase_for_branch() {
        let (_dir, repo) = setup_repo();
        let empty = RootValue::empty(&repo).unwrap();
        let init = make_commit(&repo, empty, &[], "init");
        RefManager::init_main_branch(&repo, init).unwrap();

        let r1 = put_tables(&repo, empty, vec![("t", table_with_rows(&repo, kv_schema(10, 20), &[kv(10, 20, 1, "x")]))]);
        let c1 = make_commit(&repo, r1, &[init], "create t");
        let r2 = put_tables(
            &repo,
            r1,
            vec![("t", table_with_rows(&repo, kv_schema(10, 20), &[kv(10, 20, 1, "x"), kv(10, 20, 2, "y")]))],
        );
        let c2 = make_commit(&repo, r2, &[c1], "more rows");
        RefManager::update_branch(&repo, &BranchName::main(), c2).unwrap();

        let mapping = TagMapping::new().with(name("t"), 20, 99);
        let config = RebaseConfig::default();
        let rewrite = tag_rebase_for_branch(&repo, &config, &BranchName::main(), &mapping).unwrap();
        assert_eq!(rewrite.old_head, c2);
        assert!(rewrite.backup_ref.is_some());

        let head_root = RootValue::at_commit(&repo, rewrite.new_head).unwrap();
        let table = head_root.require_table(&repo, &name("t")).unwrap();
        assert_eq!(table.schema().non_pk_tags(), vec![99]);
        assert!(!table.super_schema().contains_tag(20));
        assert_eq!(
            values_of(&repo, rewrite.new_head, "t"),
            vec![(Value::Int(1), Value::from("x")), (Value::Int(2), Value::from("y"))]
        );

        // the earlier commit carrying the tag was rewritten too
        let parent = commit::get_commit(&repo, rewrite.new_head).unwrap().parent_ids[0];
        assert_ne!(parent, c1);
        let parent_root = RootValue::at_commit(&repo, parent).unwrap();
        let parent_table = parent_root.require_table(&repo, &name("t")).unwrap();
        assert_eq!(parent_table.schema().non_pk_tags(), vec![99]);
    }

    #[test]
    fn test_untouched_history_is_reused() {
        let (_dir, repo) = setup_repo();
        let (_, main, feature) = shared_tag_history(&repo);

        // no table called "other" anywhere in history
        let mapping = TagMapping::new().with(name("other"), 1, 500);
        let config = RebaseConfig::default();
        let heads = tag_rebase_for_commits(&repo, &config, &mapping, &[main, feature]).unwrap();
        assert_eq!(heads, vec![main, feature]);
    }

    #[test]
    fn test_invalid_mapping_rejected_before_rewrite() {
        let (_dir, repo) = setup_repo();
        let (_, main, _) = shared_tag_history(&repo);

        let mapping = TagMapping::new().with(name("a"), 1, 99).with(name("a"), 2, 99);
        let config = RebaseConfig::default();
        let err = tag_rebase_for_branch(&repo, &config, &BranchName::main(), &mapping).unwrap_err();

        assert_eq!(err.to_string(), "duplicate tag 99 in table a");
        assert_eq!(RefManager::resolve_branch(&repo, &BranchName::main()).unwrap(), main);
        assert!(RefManager::list_backup_refs(&repo, None).unwrap().is_empty());
    }
}
