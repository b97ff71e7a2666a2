//! Purpose: Aggregate specs (`count`, `sum:field`, ...) and their evaluation over rows.
//! Exports: `AggSpec`, `AggFunction`, `group_rows`.
//! Role: Shared by `QueryBuilder` scalar aggregates and grouped `agg`.
//! Invariants: `sum` of nothing is 0; `avg`/`min`/`max` of nothing (or no numbers) is `None`.
//! Invariants: Groups keep first-occurrence order of their key tuple.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{Number, Value};

use crate::core::error::Error;
use crate::core::row::Row;
use crate::core::value::tuple_key;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggFunction {
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunction {
    fn as_str(self) -> &'static str {
        match self {
            AggFunction::Sum => "sum",
            AggFunction::Avg => "avg",
            AggFunction::Min => "min",
            AggFunction::Max => "max",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AggSpec {
    Count,
    Field { function: AggFunction, field: String },
}

impl AggSpec {
    pub fn field(function: AggFunction, field: impl Into<String>) -> Self {
        AggSpec::Field {
            function,
            field: field.into(),
        }
    }

    /// Result key in grouped output and the name `having` refers to.
    pub fn name(&self) -> String {
        self.to_string()
    }

    pub fn evaluate(&self, rows: &[&Row]) -> Value {
        match self {
            AggSpec::Count => Value::from(rows.len()),
            AggSpec::Field { function, field } => {
                let numbers = numbers(rows.iter().copied(), field);
                match function {
                    AggFunction::Sum => number_value(sum(&numbers)),
                    AggFunction::Avg => optional_number(avg(&numbers)),
                    AggFunction::Min => optional_number(min(&numbers)),
                    AggFunction::Max => optional_number(max(&numbers)),
                }
            }
        }
    }
}

impl fmt::Display for AggSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggSpec::Count => f.write_str("count"),
            AggSpec::Field { function, field } => write!(f, "{}:{field}", function.as_str()),
        }
    }
}

impl FromStr for AggSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec == "count" {
            return Ok(AggSpec::Count);
        }
        let Some((function, field)) = spec.split_once(':') else {
            return Err(Error::invalid_query(format!(
                "invalid aggregate `{spec}`; expected `count` or `<fn>:<field>`"
            )));
        };
        let function = match function {
            "sum" => AggFunction::Sum,
            "avg" => AggFunction::Avg,
            "min" => AggFunction::Min,
            "max" => AggFunction::Max,
            other => {
                return Err(Error::invalid_query(format!(
                    "unknown aggregate function `{other}`"
                )));
            }
        };
        if field.is_empty() {
            return Err(Error::invalid_query(format!("aggregate `{spec}` names no field")));
        }
        Ok(AggSpec::field(function, field))
    }
}

pub(crate) fn numbers<'a>(rows: impl IntoIterator<Item = &'a Row>, field: &str) -> Vec<f64> {
    rows.into_iter()
        .filter_map(|row| row.get(field).and_then(Value::as_f64))
        .collect()
}

pub(crate) fn sum(numbers: &[f64]) -> f64 {
    numbers.iter().sum()
}

pub(crate) fn avg(numbers: &[f64]) -> Option<f64> {
    if numbers.is_empty() {
        return None;
    }
    Some(sum(numbers) / numbers.len() as f64)
}

pub(crate) fn min(numbers: &[f64]) -> Option<f64> {
    numbers.iter().copied().reduce(f64::min)
}

pub(crate) fn max(numbers: &[f64]) -> Option<f64> {
    numbers.iter().copied().reduce(f64::max)
}

/// Integral results serialize as integers.
pub(crate) fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Value::from(n as i64);
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn optional_number(n: Option<f64>) -> Value {
    n.map(number_value).unwrap_or(Value::Null)
}

/// Partitions rows by the tuple of `fields`, in first-occurrence order.
pub fn group_rows<'a>(rows: &'a [Row], fields: &[String]) -> Vec<Vec<&'a Row>> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<&Row>> = Vec::new();
    for row in rows {
        let key = tuple_key(fields.iter().map(|field| row.get(field)));
        let pos = *positions.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[pos].push(row);
    }
    groups
}
