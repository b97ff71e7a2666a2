//! Purpose: Query vocabulary: operators, where-conditions, sort keys, and `QueryOptions`.
//! Exports: `Operator`, `WhereCondition`, `Direction`, `OrderBy`, `QueryOptions`, `sort_rows`, `paginate`.
//! Role: Pure predicate/sort logic reused by the executor, builders, joins, and `having`.
//! Invariants: `in` takes an array operand; every other operator takes a non-array operand.
//! Invariants: Sorting is stable and puts null/missing values last in both directions.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::core::error::Error;
use crate::core::row::Row;
use crate::core::value::{compare_scalars, like_match, like_text, sort_order, values_equal};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "like",
            Operator::In => "in",
        }
    }

    /// Applies the operator; a missing left-hand value reads as `null`.
    pub fn test(self, lhs: Option<&Value>, rhs: &Value) -> bool {
        let lhs = lhs.unwrap_or(&Value::Null);
        match self {
            Operator::Eq => values_equal(lhs, rhs),
            Operator::Ne => !values_equal(lhs, rhs),
            Operator::Gt => compare_scalars(lhs, rhs) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                compare_scalars(lhs, rhs),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt => compare_scalars(lhs, rhs) == Some(Ordering::Less),
            Operator::Lte => matches!(
                compare_scalars(lhs, rhs),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Like => match (like_text(lhs), like_text(rhs)) {
                (Some(text), Some(pattern)) => like_match(&text, &pattern),
                _ => false,
            },
            Operator::In => match rhs {
                Value::Array(items) => items.iter().any(|item| values_equal(lhs, item)),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            "like" => Ok(Operator::Like),
            "in" => Ok(Operator::In),
            other => Err(Error::invalid_query(format!("unknown operator `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhereCondition {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl WhereCondition {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let is_scalar = !(self.value.is_array() || self.value.is_object());
        match (self.op, is_scalar) {
            (Operator::In, _) if !self.value.is_array() => Err(Error::invalid_query(format!(
                "`in` on `{}` requires an array value",
                self.field
            ))),
            (op, false) if op != Operator::In => Err(Error::invalid_query(format!(
                "`{op}` on `{}` requires a scalar value",
                self.field
            ))),
            _ => Ok(()),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.op.test(row.get(&self.field), &self.value)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(Error::invalid_query(format!("unknown sort direction `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Everything a store needs to answer `find`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    pub conditions: Vec<WhereCondition>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, condition: WhereCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.conditions.iter().try_for_each(WhereCondition::validate)
    }

    /// Same filters and sort, no pagination.
    pub fn unpaginated(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            order_by: self.order_by.clone(),
            limit: None,
            offset: None,
        }
    }
}

pub fn sort_rows(rows: &mut [Row], order_by: &[OrderBy]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in order_by {
            let ordering = compare_for_sort(
                a.get_path(&key.field),
                b.get_path(&key.field),
                key.direction,
            );
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn compare_for_sort(a: Option<&Value>, b: Option<&Value>, direction: Direction) -> Ordering {
    let a = a.filter(|value| !value.is_null());
    let b = b.filter(|value| !value.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match direction {
            Direction::Asc => sort_order(a, b),
            Direction::Desc => sort_order(b, a),
        },
    }
}

pub fn paginate<T>(rows: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Vec<T> {
    let skip = offset.unwrap_or(0);
    let take = limit.unwrap_or(usize::MAX);
    rows.into_iter().skip(skip).take(take).collect()
}
