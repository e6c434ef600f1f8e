//! Replaying one commit onto a rebased parent under a tag mapping.

use std::collections::BTreeMap;

use git2::Repository;
use tracing::debug;

use super::config::RebaseConfig;
use super::error::{RebaseError, RebaseResult};
use super::mapping::TagMapping;
use crate::catalog::{Schema, Tag};
use crate::diff::{AsyncDiffer, RowDiff};
use crate::storage::TableName;
use crate::table::{RootValue, RowData, Table};

/// Rebuild `root` on top of `rebased_parent_root`.
///
/// Every table of `root` ends up in the result with its schema, super schema
/// and rows moved to the new tags. Rows are not copied wholesale: the changes
/// `root` made relative to `parent_root` are replayed onto the rebased
/// parent's rows.
pub fn replay_commit(
    repo: &Repository,
    config: &RebaseConfig,
    root: RootValue,
    parent_root: RootValue,
    rebased_parent_root: RootValue,
    mapping: &TagMapping,
) -> RebaseResult<RootValue> {
    // a table dropped by this commit must still be there to drop
    for name in parent_root.table_names(repo)? {
        if !root.has_table(repo, &name)? && !rebased_parent_root.has_table(repo, &name)? {
            return Err(RebaseError::TableMissingInRebasedParent(name));
        }
    }

    let mut out = rebased_parent_root.edit(repo)?;

    for name in root.union_table_names(repo, &rebased_parent_root)? {
        let Some(table) = root.get_table(repo, &name)? else {
            out.remove_table(&name)?;
            continue;
        };

        if !mapping.changes_any(&name, table.super_schema().all_tags()) {
            out.put_table(&name, &table)?;
            continue;
        }

        let empty = BTreeMap::new();
        let table_mapping = mapping.table(&name).unwrap_or(&empty);

        let rebased_schema = table.schema().with_mapped_tags(table_mapping)?;
        let rebased_parent_table = rebased_parent_root.get_table(repo, &name)?;
        let rebased_super_schema = match &rebased_parent_table {
            Some(parent) => parent.super_schema().with_schema(&rebased_schema)?,
            None => table.super_schema().rebase_tags(table_mapping)?,
        };

        let parent_rows = match parent_root.get_table(repo, &name)? {
            Some(parent) => parent.rows(),
            None => RowData::empty(repo)?,
        };
        let rebased_parent_rows = match &rebased_parent_table {
            Some(parent) => prune_rows(repo, parent, &rebased_schema)?,
            None => RowData::empty(repo)?,
        };

        let rows = replay_row_diffs(
            repo,
            config,
            &name,
            table.rows(),
            parent_rows,
            rebased_parent_rows,
            table_mapping,
        )?;

        out.put_table(&name, &Table::from_parts(rebased_schema, rebased_super_schema, rows))?;
        debug!(table = %name, "replayed table");
    }

    Ok(out.write()?)
}

/// Rows of `table` reduced to what `schema` can hold.
///
/// Values of columns `schema` does not have are dropped. Rows keyed by a
/// different primary key are removed.
pub fn prune_rows(repo: &Repository, table: &Table, schema: &Schema) -> RebaseResult<RowData> {
    if table.schema() == schema {
        return Ok(table.rows());
    }
    Ok(table.rows().prune_to(repo, schema)?)
}

/// Apply the changes between `parent_rows` and `rows`, moved to the new
/// tags, onto `rebased_parent_rows`.
///
/// Unmapped tags pass through unchanged. A diff that cannot be remapped
/// aborts the replay.
pub fn replay_row_diffs(
    repo: &Repository,
    config: &RebaseConfig,
    table: &TableName,
    rows: RowData,
    parent_rows: RowData,
    rebased_parent_rows: RowData,
    mapping: &BTreeMap<Tag, Tag>,
) -> RebaseResult<RowData> {
    let mut editor = rebased_parent_rows.edit(repo)?;
    let mut differ = AsyncDiffer::start(repo.path(), rows, parent_rows, config.diff_buffer_size)?;
    let mut applied = 0usize;

    loop {
        let diffs = differ.get_diffs(1, config.diff_poll_timeout)?;
        let diff = match diffs.as_slice() {
            [] if differ.is_done() => break,
            [] => continue,
            [diff] => diff,
            // get_diffs never returns more than asked for
            _ => {
                return Err(RebaseError::DiffOverflow {
                    requested: 1,
                    returned: diffs.len(),
                })
            }
        };

        let remapped = diff.remap(mapping).map_err(|source| RebaseError::RowRemap {
            table: table.clone(),
            key: diff.key().clone(),
            source,
        })?;

        match remapped {
            RowDiff::Added { key, new } | RowDiff::Modified { key, new, .. } => editor.upsert(&key, &new)?,
            RowDiff::Removed { key, .. } => {
                editor.remove(&key)?;
            }
        }
        applied += 1;
    }

    differ.close();
    debug!(%table, applied, "applied row diffs");
    Ok(editor.write()?)
}
