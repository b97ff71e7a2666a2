//! Purpose: Row vocabulary shared by every store: `RowId`, `Row`, `Fields`.
//! Exports: `RowId`, `Row`, `Fields`, `ID_FIELD`.
//! Role: Validation boundary between open JSON maps and typed application records.
//! Invariants: A `Row` always carries an `id` field equal to `Row::id()`.
//! Invariants: The id is immutable; field writers never touch it.
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

pub const ID_FIELD: &str = "id";

/// Field map of a row, or insert/update data for one.
pub type Fields = Map<String, Value>;

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum RowId {
    Int(i64),
    Str(String),
}

impl RowId {
    pub fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Number(n) => n.as_i64().map(RowId::Int).ok_or_else(|| {
                Error::new(ErrorKind::InvalidRow)
                    .with_message(format!("id must be an integer or string, got {n}"))
            }),
            Value::String(s) => Ok(RowId::Str(s.clone())),
            other => Err(Error::new(ErrorKind::InvalidRow)
                .with_message(format!("id must be an integer or string, got {other}"))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RowId::Int(n) => Value::from(*n),
            RowId::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(n) => write!(f, "{n}"),
            RowId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        RowId::Int(value)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        RowId::Str(value.to_string())
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        RowId::Str(value)
    }
}

impl Serialize for RowId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowId::Int(n) => serializer.serialize_i64(*n),
            RowId::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RowId::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    id: RowId,
    data: Fields,
}

impl Row {
    pub fn new(id: RowId, mut fields: Fields) -> Self {
        fields.insert(ID_FIELD.to_string(), id.to_value());
        Self { id, data: fields }
    }

    /// Builds a row from a JSON object, validating its `id`.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(data) = value else {
            return Err(Error::new(ErrorKind::InvalidRow).with_message("row must be a JSON object"));
        };
        let id = match data.get(ID_FIELD) {
            Some(raw) => RowId::from_value(raw)?,
            None => {
                return Err(Error::new(ErrorKind::InvalidRow).with_message("row is missing an id"));
            }
        };
        Ok(Self { id, data })
    }

    /// Converts any serializable record whose JSON form is an object with an `id`.
    pub fn from_record<T: Serialize>(record: &T) -> Result<Self, Error> {
        let value = serde_json::to_value(record).map_err(|err| {
            Error::new(ErrorKind::InvalidRow)
                .with_message("record is not serializable as a row")
                .with_source(err)
        })?;
        Self::from_value(value)
    }

    /// Field map of a record that has not been assigned an id yet.
    pub fn fields_of<T: Serialize>(record: &T) -> Result<Fields, Error> {
        match serde_json::to_value(record) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(_) => Err(Error::new(ErrorKind::InvalidRow).with_message("record must serialize to an object")),
            Err(err) => Err(Error::new(ErrorKind::InvalidRow)
                .with_message("record is not serializable as a row")
                .with_source(err)),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|err| {
            Error::new(ErrorKind::InvalidRow)
                .with_message("row does not match the record type")
                .with_id(self.id.clone())
                .with_source(err)
        })
    }

    pub fn id(&self) -> &RowId {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Resolves `a.b.c` through nested objects, e.g. a joined alias.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.data.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    /// All fields, including `id`.
    pub fn fields(&self) -> &Fields {
        &self.data
    }

    pub fn into_fields(self) -> Fields {
        self.data
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }

    pub(crate) fn set(&mut self, field: &str, value: Value) {
        if field == ID_FIELD {
            return;
        }
        self.data.insert(field.to_string(), value);
    }

    pub(crate) fn merge(&mut self, patch: &Fields) {
        for (field, value) in patch {
            self.set(field, value.clone());
        }
    }

    pub(crate) fn remove(&mut self, field: &str) -> Option<Value> {
        if field == ID_FIELD {
            return None;
        }
        self.data.remove(field)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Row::from_value(value).map_err(serde::de::Error::custom)
    }
}
