//! Purpose: Single error type shared by stores, builders, joins, and migrations.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: Callers branch on `ErrorKind`; context fields are for diagnostics only.
//! Invariants: Every fallible engine call returns this type; no panics for bad input.
//! Invariants: Exit-code mapping is stable once published.
use std::error::Error as StdError;
use std::fmt;

use crate::core::row::RowId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    /// A lookup by id found nothing.
    RowNotFound,
    /// A query was expected to produce at least one row.
    NoResults,
    TableNotFound,
    /// A join or migration needed a store resolver and none was attached.
    MissingStore,
    /// Invalid or duplicate migration version, or a rollback target with no definition.
    MigrationVersion,
    MigrationExecution,
    NoMigrationsToRollback,
    InvalidQuery,
    InvalidRow,
    DuplicateId,
    Unsupported,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    table: Option<String>,
    id: Option<RowId>,
    version: Option<u64>,
    migration: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            table: None,
            id: None,
            version: None,
            migration: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn id(&self) -> Option<&RowId> {
        self.id.as_ref()
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn migration(&self) -> Option<&str> {
        self.migration.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_id(mut self, id: RowId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_migration(mut self, name: impl Into<String>) -> Self {
        self.migration = Some(name.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub(crate) fn row_not_found(id: &RowId) -> Self {
        Self::new(ErrorKind::RowNotFound)
            .with_message("row not found")
            .with_id(id.clone())
    }

    pub(crate) fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidQuery).with_message(message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {table})")?;
        }
        if let Some(id) = &self.id {
            write!(f, " (id: {id})")?;
        }
        if let Some(version) = self.version {
            write!(f, " (version: {version})")?;
        }
        if let Some(migration) = &self.migration {
            write!(f, " (migration: {migration})")?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::InvalidQuery | ErrorKind::InvalidRow | ErrorKind::Unsupported => 2,
        ErrorKind::RowNotFound | ErrorKind::NoResults => 3,
        ErrorKind::TableNotFound | ErrorKind::MissingStore => 4,
        ErrorKind::DuplicateId => 5,
        ErrorKind::MigrationVersion
        | ErrorKind::MigrationExecution
        | ErrorKind::NoMigrationsToRollback => 6,
        ErrorKind::Io => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, to_exit_code};
    use crate::core::row::RowId;
    use std::error::Error as StdError;

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::InvalidQuery, 2),
            (ErrorKind::RowNotFound, 3),
            (ErrorKind::NoResults, 3),
            (ErrorKind::TableNotFound, 4),
            (ErrorKind::DuplicateId, 5),
            (ErrorKind::MigrationExecution, 6),
            (ErrorKind::Io, 8),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn display_includes_context() {
        let inner = Error::new(ErrorKind::TableNotFound).with_table("users");
        let err = Error::new(ErrorKind::MigrationExecution)
            .with_message("migration failed")
            .with_version(3)
            .with_migration("add_email")
            .with_source(inner);
        let text = err.to_string();
        assert!(text.starts_with("MigrationExecution: migration failed"));
        assert!(text.contains("(version: 3)"));
        assert!(text.contains("(migration: add_email)"));
        assert!(text.contains("TableNotFound"));
        assert!(err.source().is_some());
    }

    #[test]
    fn row_not_found_carries_id() {
        let err = Error::row_not_found(&RowId::Int(7));
        assert_eq!(err.kind(), ErrorKind::RowNotFound);
        assert_eq!(err.id(), Some(&RowId::Int(7)));
    }
}
