//! Tag mappings: which old tag becomes which new tag, per table.

use std::collections::{BTreeMap, BTreeSet};

use git2::Repository;
use serde::{Deserialize, Serialize};

use super::engine::ParentRoots;
use super::error::{RebaseError, RebaseResult};
use crate::catalog::{auto_generate_tag, ColumnKind, Schema, SystemTables, Tag};
use crate::storage::TableName;
use crate::table::RootValue;

/// `{table -> {old tag -> new tag}}`
///
/// Tags without an entry are left as they are. Serialized as a JSON object
/// of objects, e.g. `{"users": {"10": 99}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagMapping {
    tables: BTreeMap<TableName, BTreeMap<Tag, Tag>>,
}

impl TagMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a mapping document. The mapping is not validated.
    pub fn from_json(json: &str) -> RebaseResult<Self> {
        serde_json::from_str(json).map_err(|e| RebaseError::InvalidMapping(e.to_string()))
    }

    /// Record `old -> new` for a table, replacing any previous entry for `old`.
    pub fn insert(&mut self, table: TableName, old: Tag, new: Tag) {
        self.tables.entry(table).or_default().insert(old, new);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, table: TableName, old: Tag, new: Tag) -> Self {
        self.insert(table, old, new);
        self
    }

    /// Mapping of one table, if any.
    pub fn table(&self, table: &TableName) -> Option<&BTreeMap<Tag, Tag>> {
        self.tables.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&TableName, &BTreeMap<Tag, Tag>)> {
        self.tables.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(BTreeMap::is_empty)
    }

    /// Where `tag` of `table` ends up.
    pub fn map_tag(&self, table: &TableName, tag: Tag) -> Tag {
        self.table(table)
            .and_then(|m| m.get(&tag))
            .copied()
            .unwrap_or(tag)
    }

    /// Whether any of `tags` of `table` would be moved to a different tag.
    pub fn changes_any(&self, table: &TableName, tags: impl IntoIterator<Item = Tag>) -> bool {
        match self.table(table) {
            Some(m) => tags
                .into_iter()
                .any(|tag| m.get(&tag).is_some_and(|new| *new != tag)),
            None => false,
        }
    }

    /// Reject mappings that send two old tags of one table to the same new tag.
    pub fn validate(&self) -> RebaseResult<()> {
        for (table, mapping) in &self.tables {
            let mut seen = BTreeSet::new();
            for new in mapping.values() {
                if !seen.insert(*new) {
                    return Err(RebaseError::DuplicateTag {
                        tag: *new,
                        table: table.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Derives the mapping that replays one commit onto a rebased parent.
///
/// Columns that already existed in the parent take the tag their namesake
/// has in the rebased parent. Columns new in the commit get freshly generated
/// tags that avoid every tag known to the rebased lineage; for a table no
/// parent has, that includes the dropped columns its super schema remembers.
/// System tables use their fixed tags.
pub struct TagMappingBuilder<'a> {
    system_tables: &'a SystemTables,
}

impl<'a> TagMappingBuilder<'a> {
    pub fn new(system_tables: &'a SystemTables) -> Self {
        Self { system_tables }
    }

    /// Mapping for a commit with a single parent.
    pub fn build(
        &self,
        repo: &Repository,
        root: RootValue,
        parent_root: RootValue,
        rebased_parent_root: RootValue,
    ) -> RebaseResult<TagMapping> {
        self.build_for_parents(
            repo,
            root,
            &[ParentRoots {
                original: parent_root,
                rebased: rebased_parent_root,
            }],
        )
    }

    /// Mapping for a commit with any number of parents.
    ///
    /// Existing columns are matched against every parent; when two parents
    /// disagree on an old tag the earlier parent wins.
    pub fn build_for_parents(
        &self,
        repo: &Repository,
        root: RootValue,
        parents: &[ParentRoots],
    ) -> RebaseResult<TagMapping> {
        let mut mapping = TagMapping::new();

        for parent in parents {
            self.map_existing_columns(repo, parent, &mut mapping)?;
        }

        let mut known = BTreeSet::new();
        for parent in parents {
            known.extend(parent.rebased.all_super_schema_tags(repo)?);
        }

        for name in root.table_names(repo)? {
            let table = root.require_table(repo, &name)?;

            if self.system_tables.is_system_table(name.as_str()) {
                let fixed = self.system_mapping(&name, table.schema())?;
                mapping.tables.insert(name, fixed);
                continue;
            }

            // no parent has the table, so nothing in the rebased lineage
            // accounts for its super schema (a copied table, for one)
            let is_new = !mapping.tables.contains_key(&name);
            let entry = mapping.tables.entry(name.clone()).or_default();

            let historical: Vec<Tag> = table
                .super_schema()
                .all_tags()
                .into_iter()
                .filter(|tag| table.schema().by_tag(*tag).is_none() && !entry.contains_key(tag))
                .collect();
            if !is_new {
                // these stay as they are and must not be handed out again
                known.extend(historical.iter().copied());
            }

            let mut existing_kinds: Vec<ColumnKind> = Vec::new();
            let mut new_columns = Vec::new();
            for col in table.schema().columns() {
                if entry.contains_key(&col.tag) {
                    existing_kinds.push(col.kind);
                } else {
                    new_columns.push(col);
                }
            }

            for col in new_columns {
                let tag = auto_generate_tag(&known, name.as_str(), &existing_kinds, &col.name, col.kind);
                existing_kinds.push(col.kind);
                known.insert(tag);
                entry.insert(col.tag, tag);
            }

            if is_new {
                for old in historical {
                    let Some(col) = table.super_schema().get(old) else {
                        continue;
                    };
                    let tag = auto_generate_tag(&known, name.as_str(), &existing_kinds, &col.name, col.kind);
                    existing_kinds.push(col.kind);
                    known.insert(tag);
                    entry.insert(old, tag);
                }
            }
        }

        Ok(mapping)
    }

    /// match the parent's columns by name against the rebased parent
    fn map_existing_columns(
        &self,
        repo: &Repository,
        parent: &ParentRoots,
        mapping: &mut TagMapping,
    ) -> RebaseResult<()> {
        for name in parent.original.table_names(repo)? {
            if self.system_tables.is_system_table(name.as_str()) {
                continue;
            }

            let rebased = parent
                .rebased
                .get_table(repo, &name)?
                .ok_or_else(|| RebaseError::TableMissingInRebasedParent(name.clone()))?;
            let original = parent.original.require_table(repo, &name)?;

            let entry = mapping.tables.entry(name.clone()).or_default();
            for col in original.schema().columns() {
                let rebased_col = rebased.schema().by_name(&col.name).ok_or_else(|| {
                    RebaseError::ColumnMissingInRebasedParent {
                        table: name.clone(),
                        column: col.name.clone(),
                    }
                })?;
                entry.entry(col.tag).or_insert(rebased_col.tag);
            }
        }
        Ok(())
    }

    fn system_mapping(&self, table: &TableName, schema: &Schema) -> RebaseResult<BTreeMap<Tag, Tag>> {
        schema
            .columns()
            .iter()
            .map(|col| {
                self.system_tables
                    .fixed_tag(table.as_str(), &col.name)
                    .map(|fixed| (col.tag, fixed))
                    .ok_or_else(|| RebaseError::UnknownSystemColumn {
                        table: table.clone(),
                        column: col.name.clone(),
                    })
            })
            .collect()
    }
}
