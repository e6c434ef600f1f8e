//! Database API - high-level interface for histdb.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use git2::Repository;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::{auto_generate_tag, Column, ColumnKind, Schema, SchemaError, Tag};
use crate::rebase::{self, BranchRewrite, RebaseConfig, RebaseError, TagMapping};
use crate::storage::{
    BranchName, CommitId, CommitInfo, CommitMessage, GitRepository, GitSignature, StorageError, TableName,
};
use crate::table::{RootValue, RowError, RowKey, Table, TaggedRow, TaggedValues, Value};

const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("row error: {0}")]
    Row(#[from] RowError),

    #[error("rebase error: {0}")]
    Rebase(#[from] RebaseError),

    #[error("database not found: {0}")]
    NotFound(PathBuf),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    /// What the user can do about the error, if anything.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            DatabaseError::Storage(e) if e.is_retriable() => Some("another writer moved the branch; run the command again"),
            DatabaseError::Storage(e) if e.is_conflict() => Some("the target already exists; `cp -f` overwrites a table"),
            DatabaseError::Storage(e) if e.is_not_found() => Some("`histdb tables` lists the tables of the branch"),
            DatabaseError::TableNotFound(_) => Some("`histdb tables` lists the tables of the branch"),
            DatabaseError::Rebase(e) if e.is_mapping_conflict() => {
                Some("each old tag of a table needs its own new tag; nothing was rewritten")
            }
            DatabaseError::Rebase(e) if e.is_inconsistency() => Some("history is inconsistent; no branch was moved"),
            _ => None,
        }
    }
}

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database directory.
    pub path: PathBuf,
    /// Create if doesn't exist.
    pub create_if_missing: bool,
    /// Branch that reads and writes go to.
    pub branch: BranchName,
    /// Author and committer of new commits.
    pub signature: Option<GitSignature>,
    /// History rewrite settings.
    pub rebase: RebaseConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".histdb"),
            create_if_missing: true,
            branch: BranchName::main(),
            signature: None,
            rebase: RebaseConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn branch(mut self, branch: BranchName) -> Self {
        self.branch = branch;
        self
    }

    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn rebase(mut self, rebase: RebaseConfig) -> Self {
        self.rebase = rebase;
        self
    }
}

/// Column definition without a tag; the database assigns one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    pub primary_key: bool,
    pub not_null: bool,
}

impl ColumnDef {
    /// Nullable non-key column.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
            not_null: false,
        }
    }

    /// Primary key column.
    pub fn key(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            primary_key: true,
            not_null: true,
            ..Self::new(name, kind)
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    fn with_tag(&self, tag: Tag) -> Column {
        Column {
            tag,
            name: self.name.clone(),
            kind: self.kind,
            primary_key: self.primary_key,
            not_null: self.not_null,
        }
    }
}

/// A row addressed by column name.
pub type NamedRow = BTreeMap<String, Value>;

/// The main database handle.
///
/// Every write is one commit on the configured branch.
pub struct Database {
    config: DatabaseConfig,
    repo: GitRepository,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        Self::open_with_config(DatabaseConfig::new(path.as_ref()))
    }

    /// Open or create a database with custom configuration.
    pub fn open_with_config(config: DatabaseConfig) -> DatabaseResult<Self> {
        let repo = if config.create_if_missing {
            GitRepository::open_or_init(&config.path)?
        } else if config.path.exists() {
            GitRepository::open(&config.path)?
        } else {
            return Err(DatabaseError::NotFound(config.path.clone()));
        };

        if let Some(signature) = &config.signature {
            repo.set_signature(signature.clone());
        }

        if !repo.branch_exists(&config.branch)? {
            return Err(DatabaseError::InvalidConfig(format!(
                "branch {} does not exist",
                config.branch
            )));
        }

        Ok(Self { config, repo })
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Get the configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The underlying repository.
    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    // ==================== Reads ====================

    /// Head commit of the working branch and its root.
    pub fn head_root(&self) -> DatabaseResult<(CommitId, RootValue)> {
        Ok(self.repo.branch_root(&self.config.branch)?)
    }

    /// List all tables.
    pub fn list_tables(&self) -> DatabaseResult<Vec<TableName>> {
        let (_, root) = self.head_root()?;
        Ok(self.repo.with_repo(|repo| root.table_names(repo))?)
    }

    /// Get a table at the branch head.
    pub fn get_table(&self, name: &str) -> DatabaseResult<Option<Table>> {
        let name = TableName::new(name).map_err(StorageError::from)?;
        let (_, root) = self.head_root()?;
        Ok(self.repo.with_repo(|repo| root.get_table(repo, &name))?)
    }

    /// Schema of a table at the branch head.
    pub fn schema(&self, name: &str) -> DatabaseResult<Schema> {
        Ok(self.require_table(name)?.schema().clone())
    }

    /// Every row of a table, keyed by current column names, in key order.
    pub fn read_rows(&self, name: &str) -> DatabaseResult<Vec<NamedRow>> {
        let table = self.require_table(name)?;
        let rows = self.repo.with_repo(|repo| table.rows().load(repo))?;
        Ok(rows
            .into_values()
            .map(|row| named_row(table.schema(), &row))
            .collect())
    }

    /// Number of rows in a table.
    pub fn row_count(&self, name: &str) -> DatabaseResult<usize> {
        let table = self.require_table(name)?;
        Ok(self.repo.with_repo(|repo| table.rows().len(repo))?)
    }

    /// Commit history of the working branch, newest first.
    pub fn history(&self, limit: Option<usize>) -> DatabaseResult<Vec<CommitInfo>> {
        let head = self.repo.resolve_branch(&self.config.branch)?;
        Ok(self.repo.history(head, limit)?)
    }

    // ==================== Schema changes ====================

    /// Create a table; every column gets a generated tag.
    pub fn create_table(&self, name: &str, columns: &[ColumnDef]) -> DatabaseResult<CommitId> {
        let name = TableName::new(name).map_err(StorageError::from)?;
        let message = CommitMessage::create_table(name.as_str());

        self.mutate(&message, |repo, root| {
            if root.has_table(repo, &name)? {
                return Err(StorageError::TableAlreadyExists(name.clone()).into());
            }

            let mut known = root.all_super_schema_tags(repo)?;
            let mut kinds = Vec::new();
            let mut tagged = Vec::with_capacity(columns.len());
            for col in columns {
                let tag = auto_generate_tag(&known, name.as_str(), &kinds, &col.name, col.kind);
                known.insert(tag);
                kinds.push(col.kind);
                tagged.push(col.with_tag(tag));
            }

            let table = Table::create(repo, Schema::new(tagged)?)?;
            put_table(repo, root, &name, &table)
        })
    }

    /// Create a table with caller-chosen tags.
    pub fn create_table_with_schema(&self, name: &str, schema: Schema) -> DatabaseResult<CommitId> {
        let name = TableName::new(name).map_err(StorageError::from)?;
        let message = CommitMessage::create_table(name.as_str());

        self.mutate(&message, |repo, root| {
            if root.has_table(repo, &name)? {
                return Err(StorageError::TableAlreadyExists(name.clone()).into());
            }
            let table = Table::create(repo, schema.clone())?;
            put_table(repo, root, &name, &table)
        })
    }

    /// Drop a table.
    pub fn drop_table(&self, name: &str) -> DatabaseResult<CommitId> {
        let name = TableName::new(name).map_err(StorageError::from)?;
        let message = CommitMessage::drop_table(name.as_str());

        self.mutate(&message, |repo, root| {
            let mut edit = root.edit(repo)?;
            if !edit.remove_table(&name)? {
                return Err(StorageError::TableNotFound(name.clone()).into());
            }
            Ok(edit.write()?)
        })
    }

    /// Add a non-key column with a generated tag; returns the tag.
    pub fn add_column(&self, table: &str, column: ColumnDef) -> DatabaseResult<Tag> {
        let name = TableName::new(table).map_err(StorageError::from)?;
        let message = CommitMessage::alter_table(name.as_str(), &format!("ADD COLUMN {}", column.name));
        let mut added = None;

        self.mutate(&message, |repo, root| {
            let current = root.require_table(repo, &name)?;
            let known = root.all_super_schema_tags(repo)?;
            let tag = auto_generate_tag(
                &known,
                name.as_str(),
                &current.schema().kinds(),
                &column.name,
                column.kind,
            );
            let schema = current.schema().add_column(column.with_tag(tag))?;
            added = Some(tag);
            put_table(repo, root, &name, &current.with_schema(repo, schema)?)
        })?;

        added.ok_or_else(|| DatabaseError::InvalidConfig("column was not added".to_string()))
    }

    /// Drop a non-key column. Its values are pruned; its tag stays in the
    /// table's super schema.
    pub fn drop_column(&self, table: &str, column: &str) -> DatabaseResult<CommitId> {
        let name = TableName::new(table).map_err(StorageError::from)?;
        let message = CommitMessage::alter_table(name.as_str(), &format!("DROP COLUMN {}", column));

        self.mutate(&message, |repo, root| {
            let current = root.require_table(repo, &name)?;
            let schema = current.schema().drop_column(column)?;
            put_table(repo, root, &name, &current.with_schema(repo, schema)?)
        })
    }

    /// Rename a column; its tag is kept.
    pub fn rename_column(&self, table: &str, from: &str, to: &str) -> DatabaseResult<CommitId> {
        let name = TableName::new(table).map_err(StorageError::from)?;
        let message = CommitMessage::alter_table(name.as_str(), &format!("RENAME COLUMN {} TO {}", from, to));

        self.mutate(&message, |repo, root| {
            let current = root.require_table(repo, &name)?;
            let schema = current.schema().rename_column(from, to)?;
            put_table(repo, root, &name, &current.with_schema(repo, schema)?)
        })
    }

    // ==================== Row changes ====================

    /// Insert or replace rows given by column name. Nulls are not stored.
    pub fn upsert_rows(&self, table: &str, rows: &[NamedRow]) -> DatabaseResult<CommitId> {
        let name = TableName::new(table).map_err(StorageError::from)?;
        let message = CommitMessage::write_rows(name.as_str(), rows.len(), 0);

        self.mutate(&message, |repo, root| {
            let current = root.require_table(repo, &name)?;
            let schema = current.schema();
            let mut editor = current.rows().edit(repo)?;
            for row in rows {
                editor.put(schema, &tagged_row(schema, row)?)?;
            }
            put_table(repo, root, &name, &current.with_rows(editor.write()?))
        })
    }

    /// Delete rows by primary key values (in key column order).
    pub fn delete_rows(&self, table: &str, keys: &[Vec<Value>]) -> DatabaseResult<CommitId> {
        let name = TableName::new(table).map_err(StorageError::from)?;
        let message = CommitMessage::write_rows(name.as_str(), 0, keys.len());

        self.mutate(&message, |repo, root| {
            let current = root.require_table(repo, &name)?;
            let pk_tags = current.schema().pk_tags();
            let mut editor = current.rows().edit(repo)?;
            for key in keys {
                if key.len() > pk_tags.len() {
                    return Err(RowError::InvalidKey(format!(
                        "{} values for {} key columns",
                        key.len(),
                        pk_tags.len()
                    ))
                    .into());
                }
                let values: TaggedValues = pk_tags.iter().copied().zip(key.iter().cloned()).collect();
                editor.remove(&RowKey::encode(&values, &pk_tags)?)?;
            }
            put_table(repo, root, &name, &current.with_rows(editor.write()?))
        })
    }

    /// Copy a table, from the branch head or from `commit`.
    ///
    /// An existing destination is only overwritten when `force` is set.
    pub fn copy_table(
        &self,
        from: &str,
        to: &str,
        commit: Option<CommitId>,
        force: bool,
    ) -> DatabaseResult<CommitId> {
        let from = TableName::new(from).map_err(StorageError::from)?;
        let to = TableName::new(to).map_err(StorageError::from)?;
        let message = CommitMessage::copy_table(from.as_str(), to.as_str());

        self.mutate(&message, |repo, root| {
            let source = match commit {
                Some(id) => RootValue::at_commit(repo, id)?,
                None => root,
            };
            let mut edit = root.edit(repo)?;
            edit.copy_table(&source, &from, &to, force)?;
            Ok(edit.write()?)
        })
    }

    // ==================== History rewrites ====================

    /// Whether any branch has tables sharing tags.
    pub fn needs_migration(&self) -> DatabaseResult<bool> {
        Ok(self.repo.with_repo(rebase::needs_unique_tag_migration)?)
    }

    /// Rewrite every branch so that tags are unique across tables.
    pub fn migrate(&self) -> DatabaseResult<Vec<BranchRewrite>> {
        let rewrites = self
            .repo
            .with_repo_mut(|repo| Ok(rebase::migrate_unique_tags(repo, &self.config.rebase)))??;
        info!(branches = rewrites.len(), "migration complete");
        Ok(rewrites)
    }

    /// Rewrite one branch's history with `mapping` applied.
    pub fn rebase_tags(&self, branch: &BranchName, mapping: &TagMapping) -> DatabaseResult<BranchRewrite> {
        let rewrite = self.repo.with_repo_mut(|repo| {
            Ok(rebase::tag_rebase_for_branch(repo, &self.config.rebase, branch, mapping))
        })??;
        Ok(rewrite)
    }

    // ==================== Internals ====================

    fn require_table(&self, name: &str) -> DatabaseResult<Table> {
        self.get_table(name)?
            .ok_or_else(|| DatabaseError::TableNotFound(name.to_string()))
    }

    /// build a new root from the branch head and commit it, rebuilding on
    /// top of the new head when another writer got there first
    fn mutate<F>(&self, message: &str, mut f: F) -> DatabaseResult<CommitId>
    where
        F: FnMut(&Repository, RootValue) -> DatabaseResult<RootValue>,
    {
        let mut attempt = 1;
        loop {
            let (head, root) = self.head_root()?;
            let new_root = self.repo.with_repo(|repo| Ok(f(repo, root)))??;
            match self.repo.commit_root(&self.config.branch, head, new_root, message) {
                Err(e) if e.is_retriable() && attempt < MAX_COMMIT_ATTEMPTS => {
                    debug!(attempt, branch = %self.config.branch, "branch moved, rebuilding change");
                    attempt += 1;
                }
                result => return Ok(result?),
            }
        }
    }
}

fn put_table(repo: &Repository, root: RootValue, name: &TableName, table: &Table) -> DatabaseResult<RootValue> {
    let mut edit = root.edit(repo)?;
    edit.put_table(name, table)?;
    Ok(edit.write()?)
}

fn tagged_row(schema: &Schema, row: &NamedRow) -> DatabaseResult<TaggedRow> {
    let mut tagged = TaggedRow::default();
    for (column, value) in row {
        let col = schema
            .by_name(column)
            .ok_or_else(|| SchemaError::ColumnNotFound(column.clone()))?;
        if col.primary_key {
            tagged.key.insert(col.tag, value.clone());
        } else if !value.is_null() {
            tagged.value.insert(col.tag, value.clone());
        }
    }
    Ok(tagged)
}

fn named_row(schema: &Schema, row: &TaggedRow) -> NamedRow {
    let tags: BTreeSet<Tag> = row.key.keys().chain(row.value.keys()).copied().collect();
    tags.into_iter()
        .filter_map(|tag| {
            let col = schema.by_tag(tag)?;
            let value = row.key.get(&tag).or_else(|| row.value.get(&tag))?;
            Some((col.name.clone(), value.clone()))
        })
        .collect()
}
