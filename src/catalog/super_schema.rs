//! The union of every column a table has ever had.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::schema::{Schema, SchemaError};
use super::tags::Tag;
use super::types::ColumnKind;

/// A column as recorded in a super schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperColumn {
    /// Most recent name of the column.
    pub name: String,
    pub kind: ColumnKind,
    #[serde(default)]
    pub primary_key: bool,
}

/// Tag-keyed union of all columns ever used by a table.
///
/// A super schema only grows over a table's natural history: dropping a
/// column from the schema leaves its tag here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuperSchema {
    columns: BTreeMap<Tag, SuperColumn>,
}

impl SuperSchema {
    /// Super schema holding exactly the columns of `schema`.
    pub fn from_schema(schema: &Schema) -> Self {
        let mut ss = Self::default();
        for col in schema.columns() {
            ss.columns.insert(
                col.tag,
                SuperColumn {
                    name: col.name.clone(),
                    kind: col.kind,
                    primary_key: col.primary_key,
                },
            );
        }
        ss
    }

    /// Record the columns of `schema`.
    ///
    /// Existing tags get their name updated (renames); a tag reused with a
    /// different kind is rejected.
    pub fn add_schema(&mut self, schema: &Schema) -> Result<(), SchemaError> {
        for col in schema.columns() {
            match self.columns.get_mut(&col.tag) {
                Some(existing) => {
                    if existing.kind != col.kind {
                        return Err(SchemaError::KindConflict {
                            tag: col.tag,
                            recorded: existing.kind,
                            found: col.kind,
                        });
                    }
                    existing.name = col.name.clone();
                    existing.primary_key = col.primary_key;
                }
                None => {
                    self.columns.insert(
                        col.tag,
                        SuperColumn {
                            name: col.name.clone(),
                            kind: col.kind,
                            primary_key: col.primary_key,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Copy of this super schema with `schema` recorded.
    pub fn with_schema(&self, schema: &Schema) -> Result<Self, SchemaError> {
        let mut ss = self.clone();
        ss.add_schema(schema)?;
        Ok(ss)
    }

    /// Copy with tags replaced through `mapping`; unmapped tags are kept.
    ///
    /// Fails when two recorded tags end up on the same new tag.
    pub fn rebase_tags(&self, mapping: &BTreeMap<Tag, Tag>) -> Result<Self, SchemaError> {
        let mut columns = BTreeMap::new();
        for (tag, col) in &self.columns {
            let new_tag = mapping.get(tag).copied().unwrap_or(*tag);
            if columns.insert(new_tag, col.clone()).is_some() {
                return Err(SchemaError::DuplicateTag(new_tag));
            }
        }
        Ok(Self { columns })
    }

    /// Every tag ever recorded.
    pub fn all_tags(&self) -> BTreeSet<Tag> {
        self.columns.keys().copied().collect()
    }

    pub fn contains_tag(&self, tag: Tag) -> bool {
        self.columns.contains_key(&tag)
    }

    pub fn get(&self, tag: Tag) -> Option<&SuperColumn> {
        self.columns.get(&tag)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaBuilder;

    fn schema_v1() -> Schema {
        SchemaBuilder::new()
            .key(1, "id", ColumnKind::Int)
            .nullable(2, "b", ColumnKind::Text)
            .build()
            .unwrap()
    }

    #[test]
    fn test_never_shrinks() {
        let v1 = schema_v1();
        let v2 = v1.drop_column("b").unwrap();

        let mut ss = SuperSchema::from_schema(&v1);
        ss.add_schema(&v2).unwrap();

        assert_eq!(ss.all_tags(), BTreeSet::from([1, 2]));
        assert_eq!(ss.get(2).map(|c| c.name.as_str()), Some("b"));
    }

    #[test]
    fn test_rename_updates_name() {
        let v1 = schema_v1();
        let v2 = v1.rename_column("b", "c").unwrap();

        let ss = SuperSchema::from_schema(&v1).with_schema(&v2).unwrap();
        assert_eq!(ss.len(), 2);
        assert_eq!(ss.get(2).map(|c| c.name.as_str()), Some("c"));
    }

    #[test]
    fn test_kind_conflict() {
        let v1 = schema_v1();
        let other = SchemaBuilder::new()
            .key(1, "id", ColumnKind::Int)
            .nullable(2, "b", ColumnKind::Float)
            .build()
            .unwrap();

        let result = SuperSchema::from_schema(&v1).with_schema(&other);
        assert!(matches!(result, Err(SchemaError::KindConflict { tag: 2, .. })));
    }

    #[test]
    fn test_rebase_tags() {
        let ss = SuperSchema::from_schema(&schema_v1());

        let rebased = ss.rebase_tags(&BTreeMap::from([(2, 20)])).unwrap();
        assert_eq!(rebased.all_tags(), BTreeSet::from([1, 20]));
        assert!(!rebased.contains_tag(2));

        let result = ss.rebase_tags(&BTreeMap::from([(2, 1)]));
        assert_eq!(result, Err(SchemaError::DuplicateTag(1)));
    }

    #[test]
    fn test_serialized_as_tag_map() {
        let ss = SuperSchema::from_schema(&schema_v1());
        let json = serde_json::to_value(&ss).unwrap();
        assert_eq!(json["2"]["name"], "b");

        let back: SuperSchema = serde_json::from_value(json).unwrap();
        assert_eq!(back, ss);
    }
}
