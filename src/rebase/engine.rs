//! Commit graph rewrite.
//!
//! Walks the history reachable from a set of heads and rebuilds every commit
//! that needs it on top of its rebuilt parents. The walk uses an explicit
//! stack, so long histories do not grow the call stack, and a memo table, so
//! a commit reachable along several paths is rebuilt once.

use std::collections::HashMap;

use git2::Repository;
use tracing::{debug, debug_span};

use super::error::{RebaseError, RebaseResult};
use crate::storage::commit::{self, CommitBuilder, CommitInfo};
use crate::storage::CommitId;
use crate::table::RootValue;

/// Roots of one parent: as originally committed and as rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRoots {
    pub original: RootValue,
    pub rebased: RootValue,
}

enum Visit {
    Enter(CommitId),
    Exit(CommitId),
}

/// Rewrite the history behind `heads`.
///
/// `needs_rebase` decides per commit whether it is rebuilt; a commit it
/// rejects, and every root commit, is kept as it is together with its
/// ancestry. For every other commit, `replay` receives the commit, its root
/// and one [`ParentRoots`] per parent (in parent order) and returns the new
/// root. The new commit keeps the original message, author and committer.
///
/// Returns the rebuilt commit of each head, in order. Nothing outside the
/// object database is touched, so a failure leaves refs as they were.
pub fn rebase<R, P>(
    repo: &Repository,
    mut replay: R,
    mut needs_rebase: P,
    heads: &[CommitId],
) -> RebaseResult<Vec<CommitId>>
where
    R: FnMut(&Repository, &CommitInfo, RootValue, &[ParentRoots]) -> RebaseResult<RootValue>,
    P: FnMut(&Repository, &CommitInfo) -> RebaseResult<bool>,
{
    let mut rebased: HashMap<CommitId, CommitId> = HashMap::new();
    let mut pending: HashMap<CommitId, CommitInfo> = HashMap::new();

    for head in heads {
        let mut stack = vec![Visit::Enter(*head)];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    if rebased.contains_key(&id) || pending.contains_key(&id) {
                        continue;
                    }

                    let info = commit::get_commit(repo, id)?;
                    if info.is_root() || !needs_rebase(repo, &info)? {
                        rebased.insert(id, id);
                        continue;
                    }

                    stack.push(Visit::Exit(id));
                    for parent in info.parent_ids.iter().rev() {
                        if !rebased.contains_key(parent) {
                            stack.push(Visit::Enter(*parent));
                        }
                    }
                    pending.insert(id, info);
                }
                Visit::Exit(id) => {
                    let info = pending
                        .remove(&id)
                        .ok_or_else(|| RebaseError::Internal(format!("commit {} left without entering", id)))?;
                    let new_id = replay_one(repo, &mut replay, &info, &rebased)?;
                    rebased.insert(id, new_id);
                }
            }
        }
    }

    heads
        .iter()
        .map(|head| {
            rebased
                .get(head)
                .copied()
                .ok_or_else(|| RebaseError::Internal(format!("head {} was not rebased", head)))
        })
        .collect()
}

fn replay_one<R>(
    repo: &Repository,
    replay: &mut R,
    info: &CommitInfo,
    rebased: &HashMap<CommitId, CommitId>,
) -> RebaseResult<CommitId>
where
    R: FnMut(&Repository, &CommitInfo, RootValue, &[ParentRoots]) -> RebaseResult<RootValue>,
{
    let _span = debug_span!("replay", commit = %info.id.short()).entered();

    let mut new_parents = Vec::with_capacity(info.parent_ids.len());
    let mut parents = Vec::with_capacity(info.parent_ids.len());
    for parent in &info.parent_ids {
        let new_parent = rebased.get(parent).copied().ok_or_else(|| {
            RebaseError::Internal(format!("parent {} of {} not rebased yet", parent, info.id))
        })?;
        parents.push(ParentRoots {
            original: RootValue::at_commit(repo, *parent)?,
            rebased: RootValue::at_commit(repo, new_parent)?,
        });
        new_parents.push(new_parent);
    }

    let root = RootValue::new(info.tree_id);
    let new_root = replay(repo, info, root, &parents)?;

    let new_id = CommitBuilder::replaying(repo, info)
        .tree(new_root.tree_id())
        .parents(new_parents)
        .commit()?;

    debug!(old = %info.id.short(), new = %new_id.short(), "replayed commit");
    Ok(new_id)
}
