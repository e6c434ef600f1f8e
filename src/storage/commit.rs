//!  Commit creation and history traversal
//!
//! commits are the nodes of the history DAG. In histdb:
//! - each commit points at one root snapshot (a git tree of tables)
//! - a commit has zero parents (start of history), one, or several (merge)
//! - a rebased commit copies the author, committer and message of its
//!   original, so replaying identical inputs yields the identical commit id
//!
//! this module handles commit creation and history walking.

use chrono::{DateTime, FixedOffset};
use git2::{Repository, Revwalk, Sort};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{git_time_to_chrono, CommitId, GitSignature, TreeId};

/// information about a commit
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author: GitSignature,
    pub author_time: DateTime<FixedOffset>,
    pub committer: GitSignature,
    pub commit_time: DateTime<FixedOffset>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let committer = commit.committer();

        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author: GitSignature::new(
                author.name().unwrap_or("Unknown"),
                author.email().unwrap_or("unknown@unknown"),
            ),
            author_time: git_time_to_chrono(author.when()),
            committer: GitSignature::new(
                committer.name().unwrap_or("Unknown"),
                committer.email().unwrap_or("unknown@unknown"),
            ),
            commit_time: git_time_to_chrono(committer.when()),
        }
    }

    /// check if this commit starts history (has no parents)
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// get the first (or only) parent
    pub fn first_parent(&self) -> Option<CommitId> {
        self.parent_ids.first().copied()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<CommitId>,
    message: String,
    author: GitSignature,
    author_time: Option<DateTime<FixedOffset>>,
    committer: GitSignature,
    commit_time: Option<DateTime<FixedOffset>>,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    /// create a new CommitBuilder
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            author: GitSignature::histdb(),
            author_time: None,
            committer: GitSignature::histdb(),
            commit_time: None,
            update_ref: None,
        }
    }

    /// start a builder that reproduces an existing commit's metadata
    ///
    /// tree and parents still have to be supplied.
    pub fn replaying(repo: &'a Repository, original: &CommitInfo) -> Self {
        Self::new(repo)
            .message(original.message.clone())
            .author(original.author.clone(), original.author_time)
            .committer(original.committer.clone(), original.commit_time)
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// add a parent commit
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    /// set multiple parents (for merge commits)
    pub fn parents(mut self, parents: Vec<CommitId>) -> Self {
        self.parents = parents;
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set author and committer to the same signature, stamped at commit time
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.author = signature.clone();
        self.committer = signature;
        self
    }

    /// set the author with an explicit timestamp
    pub fn author(mut self, author: GitSignature, when: DateTime<FixedOffset>) -> Self {
        self.author = author;
        self.author_time = Some(when);
        self
    }

    /// set the committer with an explicit timestamp
    pub fn committer(mut self, committer: GitSignature, when: DateTime<FixedOffset>) -> Self {
        self.committer = committer;
        self.commit_time = Some(when);
        self
    }

    /// stamp both author and committer with a fixed time
    pub fn timestamp(mut self, when: DateTime<FixedOffset>) -> Self {
        self.author_time = Some(when);
        self.commit_time = Some(when);
        self
    }

    /// update a ref (branch) to point to this commit
    pub fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    /// create the commit and return its ID
    pub fn commit(self) -> StorageResult<CommitId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;

        let tree = self.repo.find_tree(tree_id.raw())?;
        let author = match &self.author_time {
            Some(when) => self.author.to_git2_signature_at(when)?,
            None => self.author.to_git2_signature()?,
        };
        let committer = match &self.commit_time {
            Some(when) => self.committer.to_git2_signature_at(when)?,
            None => self.committer.to_git2_signature()?,
        };

        // collect parent commits
        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| {
                self.repo
                    .find_commit(id.raw())
                    .map_err(|_| StorageError::CommitNotFound(id.to_string()))
            })
            .collect::<Result<_, _>>()?;

        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self.repo.commit(
            self.update_ref.as_deref(),
            &author,
            &committer,
            &self.message,
            &tree,
            &parent_refs,
        )?;

        Ok(CommitId::new(oid))
    }
}

/// get information about a commit
pub fn get_commit(repo: &Repository, id: CommitId) -> StorageResult<CommitInfo> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::CommitNotFound(id.to_string()))?;

    Ok(CommitInfo::from_git2(&commit))
}

/// create the initial commit for a new repository
///
/// the initial commit points at an empty root snapshot. No ref is moved;
/// callers attach it to a branch.
pub fn create_initial_commit(repo: &Repository, signature: &GitSignature) -> StorageResult<CommitId> {
    let tree_id = crate::storage::tree::empty_tree(repo)?;

    CommitBuilder::new(repo)
        .tree(tree_id)
        .message("[histdb] Initialize repository")
        .signature(signature.clone())
        .commit()
}

/// iterate over commit history starting from a commit
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    /// create a new history iterator
    pub fn new(repo: &'repo Repository, start: CommitId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;

        Ok(Self { repo, revwalk })
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => match self.repo.find_commit(oid) {
                Ok(commit) => Some(Ok(CommitInfo::from_git2(&commit))),
                Err(e) => Some(Err(StorageError::Git(e))),
            },
            Err(e) => Some(Err(StorageError::Git(e))),
        }
    }
}

/// get history for a commit
pub fn history(repo: &Repository, start: CommitId) -> StorageResult<HistoryIterator<'_>> {
    HistoryIterator::new(repo, start)
}

/// message formatting for database operations
pub struct CommitMessage;

impl CommitMessage {
    /// format a message for a CREATE TABLE operation
    pub fn create_table(table: &str) -> String {
        format!("[CREATE TABLE] {}", table)
    }

    /// format a message for a schema change
    pub fn alter_table(table: &str, change: &str) -> String {
        format!("[ALTER TABLE] {} {}", table, change)
    }

    /// format a message for a DROP TABLE operation
    pub fn drop_table(table: &str) -> String {
        format!("[DROP TABLE] {}", table)
    }

    /// format a message for a batch of row writes
    pub fn write_rows(table: &str, upserted: usize, deleted: usize) -> String {
        format!("[WRITE] {} +{} -{}", table, upserted, deleted)
    }

    /// format a message for a table copy
    pub fn copy_table(from: &str, to: &str) -> String {
        format!("[COPY TABLE] {} -> {}", from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tree::empty_tree;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn fixed_time() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2021-03-04T05:06:07-05:00").unwrap()
    }

    #[test]
    fn test_initial_commit() {
        let (_dir, repo) = setup_repo();
        let sig = GitSignature::histdb();

        let commit_id = create_initial_commit(&repo, &sig).unwrap();
        let info = get_commit(&repo, commit_id).unwrap();

        assert!(info.message.contains("Initialize"));
        assert!(info.is_root());
    }

    #[test]
    fn test_commit_builder() {
        let (_dir, repo) = setup_repo();
        let sig = GitSignature::histdb();

        let initial = create_initial_commit(&repo, &sig).unwrap();

        let tree_id = empty_tree(&repo).unwrap();
        let second = CommitBuilder::new(&repo)
            .tree(tree_id)
            .parent(initial)
            .message("Second commit")
            .commit()
            .unwrap();

        let info = get_commit(&repo, second).unwrap();
        assert_eq!(info.parent_ids.len(), 1);
        assert_eq!(info.parent_ids[0], initial);
        assert_eq!(info.summary(), "Second commit");
    }

    #[test]
    fn test_identical_content_same_commit() {
        let (_dir, repo) = setup_repo();
        let initial = create_initial_commit(&repo, &GitSignature::histdb()).unwrap();
        let tree_id = empty_tree(&repo).unwrap();

        let make = || {
            CommitBuilder::new(&repo)
                .tree(tree_id)
                .parent(initial)
                .message("same")
                .timestamp(fixed_time())
                .commit()
                .unwrap()
        };

        assert_eq!(make(), make());
    }

    #[test]
    fn test_replaying_preserves_metadata() {
        let (_dir, repo) = setup_repo();
        let initial = create_initial_commit(&repo, &GitSignature::histdb()).unwrap();
        let tree_id = empty_tree(&repo).unwrap();

        let original = CommitBuilder::new(&repo)
            .tree(tree_id)
            .parent(initial)
            .message("original message")
            .author(GitSignature::new("Ada", "ada@example.com"), fixed_time())
            .committer(GitSignature::new("Bob", "bob@example.com"), fixed_time())
            .commit()
            .unwrap();
        let info = get_commit(&repo, original).unwrap();

        let replayed = CommitBuilder::replaying(&repo, &info)
            .tree(tree_id)
            .parents(info.parent_ids.clone())
            .commit()
            .unwrap();

        // same tree, same parents, same metadata: the very same object
        assert_eq!(replayed, original);

        let replayed_info = get_commit(&repo, replayed).unwrap();
        assert_eq!(replayed_info.author.name, "Ada");
        assert_eq!(replayed_info.committer.email, "bob@example.com");
        assert_eq!(replayed_info.author_time, fixed_time());
    }

    #[test]
    fn test_history_iteration() {
        let (_dir, repo) = setup_repo();
        let sig = GitSignature::histdb();

        let c1 = create_initial_commit(&repo, &sig).unwrap();

        let tree_id = empty_tree(&repo).unwrap();
        let c2 = CommitBuilder::new(&repo)
            .tree(tree_id)
            .parent(c1)
            .message("Second")
            .commit()
            .unwrap();

        let c3 = CommitBuilder::new(&repo)
            .tree(tree_id)
            .parent(c2)
            .message("Third")
            .commit()
            .unwrap();

        let commits: Vec<_> = history(&repo, c3).unwrap().collect::<Result<_, _>>().unwrap();

        assert_eq!(commits.len(), 3);
        assert_eq!(commits[0].id, c3);
        assert_eq!(commits[1].id, c2);
        assert_eq!(commits[2].id, c1);
    }

    #[test]
    fn test_missing_parent() {
        let (_dir, repo) = setup_repo();
        let tree_id = empty_tree(&repo).unwrap();
        let bogus = CommitId::from_hex("0123456789012345678901234567890123456789").unwrap();

        let result = CommitBuilder::new(&repo).tree(tree_id).parent(bogus).commit();
        assert!(matches!(result, Err(StorageError::CommitNotFound(_))));
    }

    #[test]
    fn test_commit_messages() {
        assert_eq!(CommitMessage::create_table("users"), "[CREATE TABLE] users");
        assert_eq!(CommitMessage::write_rows("users", 2, 1), "[WRITE] users +2 -1");
        assert_eq!(CommitMessage::copy_table("a", "b"), "[COPY TABLE] a -> b");
    }
}
