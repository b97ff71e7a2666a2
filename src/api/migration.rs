//! Purpose: Versioned schema migrations over resolved stores, with recorded state and rollback.
//! Exports: `Migration`, `MigrationRunner`, `SchemaBuilder`, `SchemaOperation`, `MigrateOptions`.
//! Role: `up`/`down` record schema intents; the runner replays them row by row.
//! Invariants: Records in the runner's store are the only source of the current version.
//! Invariants: Migrations run one at a time in version order; a failure stops the run.
//! Notes: `RenameColumn` copies into the new field and leaves the old one in place.
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind};
use crate::core::row::{Fields, ID_FIELD, RowId};
use crate::core::store::{DataStore, StoreResolver};

type SchemaFn = Box<dyn Fn(&mut SchemaBuilder) -> Result<(), Error>>;

/// Declared column type; carried on the operation, not enforced by stores.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    Date,
    Json,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnOptions {
    pub default: Option<Value>,
    pub column_type: Option<ColumnType>,
}

impl ColumnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = Some(column_type);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SchemaOperation {
    AddColumn {
        table: String,
        column: String,
        options: ColumnOptions,
    },
    RemoveColumn {
        table: String,
        column: String,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
}

impl SchemaOperation {
    pub fn table(&self) -> &str {
        match self {
            SchemaOperation::AddColumn { table, .. }
            | SchemaOperation::RemoveColumn { table, .. }
            | SchemaOperation::RenameColumn { table, .. } => table,
        }
    }
}

/// Records schema intents; nothing touches a store until the runner replays them.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    operations: Vec<SchemaOperation>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_column(
        &mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        options: ColumnOptions,
    ) -> &mut Self {
        self.operations.push(SchemaOperation::AddColumn {
            table: table.into(),
            column: column.into(),
            options,
        });
        self
    }

    pub fn remove_column(&mut self, table: impl Into<String>, column: impl Into<String>) -> &mut Self {
        self.operations.push(SchemaOperation::RemoveColumn {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    pub fn rename_column(
        &mut self,
        table: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> &mut Self {
        self.operations.push(SchemaOperation::RenameColumn {
            table: table.into(),
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn operations(&self) -> &[SchemaOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<SchemaOperation> {
        self.operations
    }
}

pub struct Migration {
    version: u64,
    name: String,
    up: SchemaFn,
    down: SchemaFn,
}

impl Migration {
    pub fn new<U, D>(version: u64, name: impl Into<String>, up: U, down: D) -> Self
    where
        U: Fn(&mut SchemaBuilder) -> Result<(), Error> + 'static,
        D: Fn(&mut SchemaBuilder) -> Result<(), Error> + 'static,
    {
        Self {
            version,
            name: name.into(),
            up: Box::new(up),
            down: Box::new(down),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `up` against a fresh recorder and returns what it asked for.
    pub fn plan_up(&self) -> Result<Vec<SchemaOperation>, Error> {
        record(&self.up)
    }

    pub fn plan_down(&self) -> Result<Vec<SchemaOperation>, Error> {
        record(&self.down)
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn record(schema_fn: &SchemaFn) -> Result<Vec<SchemaOperation>, Error> {
    let mut builder = SchemaBuilder::new();
    schema_fn(&mut builder)?;
    Ok(builder.into_operations())
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MigrateOptions {
    /// Highest version to apply; `None` applies everything pending.
    pub to: Option<u64>,
}

impl MigrateOptions {
    pub fn to(version: u64) -> Self {
        Self { to: Some(version) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: u64,
    pub name: String,
    #[serde(rename = "appliedAt")]
    pub applied_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: u64,
    pub name: String,
    pub applied_at: Option<String>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

pub struct MigrationRunner<S> {
    records: S,
    migrations: Vec<Migration>,
}

impl<S: DataStore> MigrationRunner<S> {
    /// Validates every definition before anything runs.
    pub fn new(records: S, mut migrations: Vec<Migration>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        for migration in &migrations {
            if migration.version == 0 {
                return Err(Error::new(ErrorKind::MigrationVersion)
                    .with_message("migration version must be a positive integer")
                    .with_migration(migration.name.clone()));
            }
            if migration.name.trim().is_empty() {
                return Err(Error::new(ErrorKind::MigrationVersion)
                    .with_message("migration name must not be empty")
                    .with_version(migration.version));
            }
            if !seen.insert(migration.version) {
                return Err(Error::new(ErrorKind::MigrationVersion)
                    .with_message("duplicate migration version")
                    .with_version(migration.version)
                    .with_migration(migration.name.clone()));
            }
        }
        migrations.sort_by_key(|migration| migration.version);
        Ok(Self {
            records,
            migrations,
        })
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn records_store(&self) -> &S {
        &self.records
    }

    pub fn into_records_store(self) -> S {
        self.records
    }

    /// Applied records in ascending version order.
    pub fn applied(&self) -> Result<Vec<MigrationRecord>, Error> {
        Ok(self
            .record_rows()?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    pub fn current_version(&self) -> Result<u64, Error> {
        Ok(self
            .record_rows()?
            .last()
            .map(|(_, record)| record.version)
            .unwrap_or(0))
    }

    pub fn pending(&self) -> Result<Vec<&Migration>, Error> {
        let applied: HashSet<u64> = self
            .record_rows()?
            .into_iter()
            .map(|(_, record)| record.version)
            .collect();
        Ok(self
            .migrations
            .iter()
            .filter(|migration| !applied.contains(&migration.version))
            .collect())
    }

    /// Registered migrations plus records whose definition is gone, by version.
    pub fn status(&self) -> Result<Vec<MigrationStatus>, Error> {
        let records = self.applied()?;
        let mut status: Vec<MigrationStatus> = self
            .migrations
            .iter()
            .map(|migration| MigrationStatus {
                version: migration.version,
                name: migration.name.clone(),
                applied_at: records
                    .iter()
                    .find(|record| record.version == migration.version)
                    .map(|record| record.applied_at.clone()),
            })
            .collect();
        for record in records {
            if !status.iter().any(|entry| entry.version == record.version) {
                status.push(MigrationStatus {
                    version: record.version,
                    name: record.name,
                    applied_at: Some(record.applied_at),
                });
            }
        }
        status.sort_by_key(|entry| entry.version);
        Ok(status)
    }

    /// Applies pending migrations in order and returns the versions applied.
    pub fn migrate(
        &mut self,
        tables: &mut dyn StoreResolver,
        options: MigrateOptions,
    ) -> Result<Vec<u64>, Error> {
        let applied: HashSet<u64> = self
            .record_rows()?
            .into_iter()
            .map(|(_, record)| record.version)
            .collect();
        let mut done = Vec::new();
        for migration in &self.migrations {
            if applied.contains(&migration.version) {
                continue;
            }
            if options.to.is_some_and(|to| migration.version > to) {
                break;
            }
            info!(version = migration.version, name = %migration.name, "applying migration");
            run_schema_fn(migration, &migration.up, tables)?;

            let mut fields = Fields::new();
            fields.insert(ID_FIELD.to_string(), Value::from(migration.version));
            fields.insert("version".to_string(), Value::from(migration.version));
            fields.insert("name".to_string(), Value::String(migration.name.clone()));
            fields.insert("appliedAt".to_string(), Value::String(now_rfc3339()?));
            self.records
                .insert(fields)
                .map_err(|err| execution_error(migration, err))?;
            done.push(migration.version);
        }
        if done.is_empty() {
            debug!("no pending migrations");
        }
        Ok(done)
    }

    /// Reverts the highest applied migration and returns its version.
    pub fn rollback(&mut self, tables: &mut dyn StoreResolver) -> Result<u64, Error> {
        let Some((row_id, record)) = self.record_rows()?.pop() else {
            return Err(Error::new(ErrorKind::NoMigrationsToRollback)
                .with_message("no applied migrations to roll back"));
        };
        let Some(migration) = self
            .migrations
            .iter()
            .find(|migration| migration.version == record.version)
        else {
            return Err(Error::new(ErrorKind::MigrationVersion)
                .with_message("applied migration is not registered")
                .with_version(record.version)
                .with_migration(record.name)
                .with_hint("Register the migration definition before rolling it back."));
        };

        info!(version = migration.version, name = %migration.name, "rolling back migration");
        run_schema_fn(migration, &migration.down, tables)?;
        self.records
            .delete(&row_id)
            .map_err(|err| execution_error(migration, err))?;
        Ok(migration.version)
    }

    /// Rolls back until the current version is 0; returns versions in rollback order.
    pub fn rollback_all(&mut self, tables: &mut dyn StoreResolver) -> Result<Vec<u64>, Error> {
        let mut reverted = Vec::new();
        while self.current_version()? > 0 {
            reverted.push(self.rollback(tables)?);
        }
        Ok(reverted)
    }

    fn record_rows(&self) -> Result<Vec<(RowId, MigrationRecord)>, Error> {
        let mut rows = self
            .records
            .find_all()?
            .into_iter()
            .map(|row| {
                let record: MigrationRecord = row.decode()?;
                Ok((row.id().clone(), record))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        rows.sort_by_key(|(_, record)| record.version);
        Ok(rows)
    }
}

fn run_schema_fn(
    migration: &Migration,
    schema_fn: &SchemaFn,
    tables: &mut dyn StoreResolver,
) -> Result<(), Error> {
    let operations = record(schema_fn).map_err(|err| execution_error(migration, err))?;
    for operation in &operations {
        debug!(version = migration.version, table = operation.table(), ?operation, "replaying schema operation");
        apply_operation(operation, tables).map_err(|err| execution_error(migration, err))?;
    }
    Ok(())
}

fn apply_operation(operation: &SchemaOperation, tables: &mut dyn StoreResolver) -> Result<(), Error> {
    let store = tables.resolve_mut(operation.table())?;
    let rows = store.find_all()?;
    match operation {
        SchemaOperation::AddColumn {
            column, options, ..
        } => {
            let default = options.default.clone().unwrap_or(Value::Null);
            for row in rows.iter().filter(|row| !row.contains(column)) {
                store.update(row.id(), single_field(column, default.clone()))?;
            }
        }
        SchemaOperation::RemoveColumn { column, .. } => {
            for row in rows.iter().filter(|row| row.contains(column)) {
                store.clear_field(row.id(), column)?;
            }
        }
        SchemaOperation::RenameColumn { from, to, .. } => {
            for row in rows.iter().filter(|row| !row.contains(to)) {
                if let Some(value) = row.get(from) {
                    store.update(row.id(), single_field(to, value.clone()))?;
                }
            }
        }
    }
    Ok(())
}

fn single_field(field: &str, value: Value) -> Fields {
    let mut fields = Fields::new();
    fields.insert(field.to_string(), value);
    fields
}

fn execution_error(migration: &Migration, err: Error) -> Error {
    Error::new(ErrorKind::MigrationExecution)
        .with_message("migration failed")
        .with_version(migration.version)
        .with_migration(migration.name.clone())
        .with_source(err)
}

fn now_rfc3339() -> Result<String, Error> {
    OffsetDateTime::now_utc().format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to format migration timestamp")
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::{ColumnOptions, MigrateOptions, Migration, MigrationRunner, SchemaOperation};
    use crate::api::catalog::Catalog;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::memory::{MemoryStore, StoreOptions};
    use crate::core::row::Fields;
    use crate::core::store::{DataStore, IdMode};
    use serde_json::{Value, json};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn users() -> Catalog {
        let mut users = MemoryStore::new("users");
        users.insert(fields(json!({"name": "ann"}))).unwrap();
        users.insert(fields(json!({"name": "bob", "role": "admin"}))).unwrap();
        Catalog::new().with_table("users", users)
    }

    fn add_role() -> Migration {
        Migration::new(
            1,
            "add_role",
            |schema| {
                schema.add_column("users", "role", ColumnOptions::new().with_default("member"));
                Ok(())
            },
            |schema| {
                schema.remove_column("users", "role");
                Ok(())
            },
        )
    }

    fn rename_name() -> Migration {
        Migration::new(
            2,
            "rename_name",
            |schema| {
                schema.rename_column("users", "name", "display_name");
                Ok(())
            },
            |schema| {
                schema.remove_column("users", "display_name");
                Ok(())
            },
        )
    }

    #[test]
    fn construction_rejects_bad_definitions() {
        let noop = |_: &mut super::SchemaBuilder| -> Result<(), Error> { Ok(()) };
        let err = MigrationRunner::new(MemoryStore::new("m"), vec![Migration::new(0, "zero", noop, noop)])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::MigrationVersion);

        let err = MigrationRunner::new(MemoryStore::new("m"), vec![Migration::new(1, " ", noop, noop)])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::MigrationVersion);

        let err = MigrationRunner::new(
            MemoryStore::new("m"),
            vec![Migration::new(3, "a", noop, noop), Migration::new(3, "b", noop, noop)],
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::MigrationVersion);
        assert_eq!(err.version(), Some(3));
    }

    #[test]
    fn add_column_backfills_only_missing_fields() {
        let mut tables = users();
        let mut runner = MigrationRunner::new(MemoryStore::new("migrations"), vec![add_role()]).unwrap();
        assert_eq!(runner.migrate(&mut tables, MigrateOptions::default()).unwrap(), [1]);

        let rows = tables.table("users").unwrap().find_all().unwrap();
        assert_eq!(rows[0].get("role"), Some(&json!("member")));
        assert_eq!(rows[1].get("role"), Some(&json!("admin")));
        assert_eq!(runner.current_version().unwrap(), 1);
        assert!(runner.migrate(&mut tables, MigrateOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn rename_keeps_the_old_field() {
        let mut tables = users();
        let mut runner =
            MigrationRunner::new(MemoryStore::new("migrations"), vec![rename_name(), add_role()]).unwrap();
        assert_eq!(runner.migrate(&mut tables, MigrateOptions::default()).unwrap(), [1, 2]);
        let row = tables.table("users").unwrap().find_all().unwrap().remove(0);
        assert_eq!(row.get("display_name"), Some(&json!("ann")));
        assert_eq!(row.get("name"), Some(&json!("ann")));
    }

    #[test]
    fn rollback_reverts_in_reverse_order() {
        let mut tables = users();
        let records = MemoryStore::with_options("migrations", StoreOptions::new().with_id_mode(IdMode::Client));
        let mut runner = MigrationRunner::new(records, vec![add_role(), rename_name()]).unwrap();
        runner.migrate(&mut tables, MigrateOptions::default()).unwrap();

        assert_eq!(runner.rollback(&mut tables).unwrap(), 2);
        assert_eq!(runner.current_version().unwrap(), 1);
        assert_eq!(runner.rollback_all(&mut tables).unwrap(), [1]);
        assert_eq!(runner.current_version().unwrap(), 0);

        let rows = tables.table("users").unwrap().find_all().unwrap();
        assert!(rows.iter().all(|row| !row.contains("role") && !row.contains("display_name")));
        assert_eq!(runner.rollback(&mut tables).unwrap_err().kind(), ErrorKind::NoMigrationsToRollback);
    }

    #[test]
    fn rollback_requires_a_registered_definition() {
        let mut tables = users();
        let mut runner = MigrationRunner::new(MemoryStore::new("migrations"), vec![add_role()]).unwrap();
        runner.migrate(&mut tables, MigrateOptions::default()).unwrap();

        let mut orphaned = MigrationRunner::new(runner.into_records_store(), Vec::new()).unwrap();
        let status = orphaned.status().unwrap();
        assert_eq!(status.len(), 1);
        assert!(status[0].is_applied());
        let err = orphaned.rollback(&mut tables).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MigrationVersion);
        assert_eq!(err.version(), Some(1));
    }

    #[test]
    fn failures_are_wrapped_and_stop_the_run() {
        let mut tables = users();
        let failing = Migration::new(
            2,
            "explode",
            |_| Err(Error::new(ErrorKind::Internal).with_message("boom")),
            |_| Ok(()),
        );
        let missing_table = Migration::new(
            3,
            "touch_posts",
            |schema| {
                schema.remove_column("posts", "x");
                Ok(())
            },
            |_| Ok(()),
        );
        let mut runner =
            MigrationRunner::new(MemoryStore::new("migrations"), vec![add_role(), failing, missing_table])
                .unwrap();
        let err = runner.migrate(&mut tables, MigrateOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MigrationExecution);
        assert_eq!(err.version(), Some(2));
        assert_eq!(err.migration(), Some("explode"));
        assert!(err.to_string().contains("boom"));
        assert_eq!(runner.current_version().unwrap(), 1);
        assert_eq!(runner.pending().unwrap().len(), 2);
    }

    #[test]
    fn plans_are_recorded_without_touching_stores() {
        let ops = add_role().plan_up().unwrap();
        assert!(matches!(&ops[0], SchemaOperation::AddColumn { column, .. } if column == "role"));
        assert_eq!(ops[0].table(), "users");
    }
}
