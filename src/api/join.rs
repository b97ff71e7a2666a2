//! Purpose: Join a base query to other named stores with one batched `in` query per join.
//! Exports: `JoinQueryBuilder`, `JoinConfig`, `JoinKind`.
//! Role: Attaches the matching foreign row under an alias on each base row.
//! Invariants: Each join issues at most one query against its target store, whatever the row count.
//! Invariants: Filters apply to the base table's own fields only; dotted fields are rejected.
use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::core::condition::{
    Direction, Operator, OrderBy, QueryOptions, WhereCondition, paginate, sort_rows,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::row::{ID_FIELD, Row};
use crate::core::store::{DataStore, StoreResolver};
use crate::core::value::canonical;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum JoinKind {
    /// Keep unmatched rows with a `null` alias.
    #[default]
    Left,
    /// Drop unmatched rows.
    Inner,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JoinConfig {
    pub table: String,
    pub local_field: String,
    pub foreign_field: String,
    pub alias: String,
    pub kind: JoinKind,
}

impl JoinConfig {
    /// Left join on `local_field = <table>.id`, attached under the table name.
    pub fn new(table: impl Into<String>, local_field: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            alias: table.clone(),
            table,
            local_field: local_field.into(),
            foreign_field: ID_FIELD.to_string(),
            kind: JoinKind::Left,
        }
    }

    pub fn foreign_field(mut self, field: impl Into<String>) -> Self {
        self.foreign_field = field.into();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }
}

#[derive(Clone)]
pub struct JoinQueryBuilder<'a> {
    base: &'a dyn DataStore,
    resolver: Option<&'a dyn StoreResolver>,
    options: QueryOptions,
    joins: Vec<JoinConfig>,
}

impl<'a> JoinQueryBuilder<'a> {
    pub fn new(base: &'a dyn DataStore, resolver: &'a dyn StoreResolver) -> Self {
        Self::from_parts(base, Some(resolver), QueryOptions::default())
    }

    pub(crate) fn from_parts(
        base: &'a dyn DataStore,
        resolver: Option<&'a dyn StoreResolver>,
        options: QueryOptions,
    ) -> Self {
        Self {
            base,
            resolver,
            options,
            joins: Vec::new(),
        }
    }

    pub fn resolver(mut self, resolver: &'a dyn StoreResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn joins(&self) -> &[JoinConfig] {
        &self.joins
    }

    pub fn join(self, table: impl Into<String>, local_field: impl Into<String>) -> Self {
        self.join_with(JoinConfig::new(table, local_field))
    }

    pub fn inner_join(self, table: impl Into<String>, local_field: impl Into<String>) -> Self {
        self.join_with(JoinConfig::new(table, local_field).kind(JoinKind::Inner))
    }

    pub fn join_with(mut self, config: JoinConfig) -> Self {
        self.joins.push(config);
        self
    }

    pub fn filter(
        mut self,
        field: impl Into<String>,
        op: Operator,
        value: impl Into<Value>,
    ) -> Result<Self, Error> {
        let condition = WhereCondition::new(field, op, value);
        check_base_field(&condition.field)?;
        self.options.conditions.push(condition);
        Ok(self)
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Result<Self, Error> {
        self.filter(field, Operator::Eq, value)
    }

    /// Sort keys may name joined fields, e.g. `author.name`.
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.options.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.options.offset = Some(offset);
        self
    }

    pub fn page(self, page: usize, per_page: usize) -> Self {
        let page = page.max(1);
        self.offset((page - 1).saturating_mul(per_page)).limit(per_page)
    }

    pub fn exec(&self) -> Result<Vec<Row>, Error> {
        self.run(true)
    }

    pub fn first(&self) -> Result<Option<Row>, Error> {
        let mut narrowed = self.clone();
        narrowed.options.limit = Some(1);
        Ok(narrowed.exec()?.into_iter().next())
    }

    /// Inner joins can drop rows, so with any inner join the full join is run.
    pub fn count(&self) -> Result<usize, Error> {
        for condition in &self.options.conditions {
            check_base_field(&condition.field)?;
        }
        for join in &self.joins {
            check_alias(join)?;
        }
        if self.has_inner_join() {
            return self.run(false).map(|rows| rows.len());
        }
        self.base.count(&self.options)
    }

    fn has_inner_join(&self) -> bool {
        self.joins.iter().any(|join| join.kind == JoinKind::Inner)
    }

    fn run(&self, paginate_result: bool) -> Result<Vec<Row>, Error> {
        for condition in &self.options.conditions {
            check_base_field(&condition.field)?;
        }
        for join in &self.joins {
            check_alias(join)?;
        }
        let resolver = match (self.joins.is_empty(), self.resolver) {
            (true, _) => None,
            (false, Some(resolver)) => Some(resolver),
            (false, None) => {
                return Err(Error::new(ErrorKind::MissingStore)
                    .with_message("join query has no store resolver")
                    .with_hint("Attach one with `with_resolver` or `resolver` before executing."));
            }
        };

        // Sort and page in the base query when joins cannot change either.
        let sorts_on_joined = self
            .options
            .order_by
            .iter()
            .any(|key| key.field.contains('.'));
        let push_down = !self.has_inner_join() && !sorts_on_joined;

        let mut base_options = self.options.clone();
        if !push_down || !paginate_result {
            base_options.limit = None;
            base_options.offset = None;
        }
        if !push_down {
            base_options.order_by.clear();
        }

        let mut rows = self.base.find(&base_options)?;
        if let Some(resolver) = resolver {
            for join in &self.joins {
                rows = apply_join(rows, join, resolver)?;
            }
        }

        if !push_down {
            sort_rows(&mut rows, &self.options.order_by);
            if paginate_result {
                rows = paginate(rows, self.options.offset, self.options.limit);
            }
        }
        Ok(rows)
    }
}

fn check_base_field(field: &str) -> Result<(), Error> {
    if field.contains('.') {
        return Err(Error::invalid_query(format!(
            "cannot filter on `{field}`: join queries filter base-table fields only"
        ))
        .with_hint("Filter the joined table in its own query, or filter the rows returned by exec()."));
    }
    Ok(())
}

fn check_alias(join: &JoinConfig) -> Result<(), Error> {
    if join.alias == ID_FIELD {
        return Err(Error::invalid_query(format!(
            "join on `{}` cannot attach under `{ID_FIELD}`: row ids are immutable",
            join.table
        ))
        .with_hint("Pick another alias with `JoinConfig::alias`."));
    }
    Ok(())
}

fn apply_join(rows: Vec<Row>, join: &JoinConfig, resolver: &dyn StoreResolver) -> Result<Vec<Row>, Error> {
    let target = resolver.resolve(&join.table)?;

    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for row in &rows {
        if let Some(value) = row.get_path(&join.local_field).filter(|value| !value.is_null()) {
            if seen.insert(canonical(value).to_string()) {
                keys.push(value.clone());
            }
        }
    }

    let mut foreign: HashMap<String, Row> = HashMap::new();
    if !keys.is_empty() {
        let options = QueryOptions::new().with_condition(WhereCondition::new(
            join.foreign_field.as_str(),
            Operator::In,
            Value::Array(keys),
        ));
        for row in target.find(&options)? {
            if let Some(value) = row.get(&join.foreign_field) {
                foreign.entry(canonical(value).to_string()).or_insert(row);
            }
        }
    }
    debug!(
        table = %join.table,
        alias = %join.alias,
        distinct_keys = seen.len(),
        matched = foreign.len(),
        "resolved join"
    );

    let mut joined = Vec::with_capacity(rows.len());
    for mut row in rows {
        let matched = row
            .get_path(&join.local_field)
            .filter(|value| !value.is_null())
            .and_then(|value| foreign.get(&canonical(value).to_string()))
            .map(Row::to_value);
        if matched.is_none() && join.kind == JoinKind::Inner {
            continue;
        }
        row.set(&join.alias, matched.unwrap_or(Value::Null));
        joined.push(row);
    }
    Ok(joined)
}
