//! Purpose: Resolve table names to JSON files in the data directory and load them as stores.
//! Exports: `default_data_dir`, `resolve_table_path`, `load_table`.
//! Role: Keep CLI path semantics in one place.
//! Invariants: A table named `t` lives at `<dir>/t.json` as a JSON array of row objects.
//! Invariants: Table names must not contain path separators.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use tabula::api::{Error, ErrorKind, MemoryStore, Row, StoreOptions};

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

pub(crate) fn resolve_table_path(name: &str, dir: &Path) -> Result<PathBuf, Error> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(Error::new(ErrorKind::InvalidQuery)
            .with_message("table name must not be empty or contain path separators")
            .with_table(name));
    }
    if name.ends_with(".json") {
        return Ok(dir.join(name));
    }
    Ok(dir.join(format!("{name}.json")))
}

pub(crate) fn load_table(name: &str, dir: &Path, options: StoreOptions) -> Result<MemoryStore, Error> {
    let path = resolve_table_path(name, dir)?;
    let text = fs::read_to_string(&path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            Error::new(ErrorKind::TableNotFound)
                .with_message("table file not found")
                .with_table(name)
                .with_hint(format!("Expected a JSON array at {}.", path.display()))
        } else {
            Error::new(ErrorKind::Io)
                .with_message("failed to read table file")
                .with_table(name)
                .with_source(err)
        }
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|err| {
        Error::new(ErrorKind::InvalidRow)
            .with_message("table file is not valid JSON")
            .with_table(name)
            .with_source(err)
    })?;
    let Value::Array(items) = value else {
        return Err(Error::new(ErrorKind::InvalidRow)
            .with_message("table file must hold a JSON array of rows")
            .with_table(name));
    };
    let rows = items
        .into_iter()
        .map(Row::from_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| err.with_table(name))?;
    debug!(table = name, rows = rows.len(), path = %path.display(), "loaded table");
    MemoryStore::from_rows(name.trim_end_matches(".json"), rows, options)
        .map_err(|err| err.with_table(name))
}
