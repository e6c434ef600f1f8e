//! Shared fixtures for unit tests.

use chrono::{DateTime, FixedOffset};
use git2::Repository;
use tempfile::TempDir;

use crate::catalog::{Schema, Tag};
use crate::storage::{CommitBuilder, CommitId, GitSignature, TableName};
use crate::table::{RootValue, Table, TaggedRow, TaggedValues, Value};

pub(crate) fn setup_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    (dir, repo)
}

pub(crate) fn name(s: &str) -> TableName {
    TableName::new(s).unwrap()
}

pub(crate) fn row(key: &[(Tag, Value)], value: &[(Tag, Value)]) -> TaggedRow {
    TaggedRow::new(
        key.iter().cloned().collect::<TaggedValues>(),
        value.iter().cloned().collect::<TaggedValues>(),
    )
}

/// table with `schema` holding exactly `rows`
pub(crate) fn table_with_rows(repo: &Repository, schema: Schema, rows: &[TaggedRow]) -> Table {
    let table = Table::create(repo, schema).unwrap();
    let mut editor = table.rows().edit(repo).unwrap();
    for r in rows {
        editor.put(table.schema(), r).unwrap();
    }
    table.with_rows(editor.write().unwrap())
}

/// `base` with the given tables put in
pub(crate) fn put_tables(repo: &Repository, base: RootValue, tables: Vec<(&str, Table)>) -> RootValue {
    let mut edit = base.edit(repo).unwrap();
    for (table_name, table) in tables {
        edit.put_table(&name(table_name), &table).unwrap();
    }
    edit.write().unwrap()
}

/// commit with a fixed author and time, so equal inputs give equal ids
pub(crate) fn commit(repo: &Repository, root: RootValue, parents: &[CommitId], message: &str) -> CommitId {
    let when: DateTime<FixedOffset> = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
    CommitBuilder::new(repo)
        .tree(root.tree_id())
        .parents(parents.to_vec())
        .message(message)
        .signature(GitSignature::new("tester", "tester@example.com"))
        .timestamp(when)
        .commit()
        .unwrap()
}
