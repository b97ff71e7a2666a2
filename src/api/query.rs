//! Purpose: Fluent query builder over any `DataStore`, with scalar and grouped aggregation.
//! Exports: `QueryBuilder`.
//! Role: Accumulates conditions/sort/pagination and hands a `QueryOptions` to the store.
//! Invariants: Aggregates read the filters but never the pagination state.
//! Invariants: `Clone` copies every accumulated list; derived builders never share state.
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::aggregate::{self, AggSpec, group_rows};
use crate::api::join::{JoinConfig, JoinKind, JoinQueryBuilder};
use crate::core::condition::{Direction, Operator, OrderBy, QueryOptions, WhereCondition};
use crate::core::error::{Error, ErrorKind};
use crate::core::row::{Fields, Row};
use crate::core::store::{DataStore, StoreResolver};

#[derive(Clone)]
pub struct QueryBuilder<'a> {
    store: &'a dyn DataStore,
    options: QueryOptions,
    group_by: Vec<String>,
    having: Vec<WhereCondition>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(store: &'a dyn DataStore) -> Self {
        Self {
            store,
            options: QueryOptions::default(),
            group_by: Vec::new(),
            having: Vec::new(),
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn filter(mut self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.options
            .conditions
            .push(WhereCondition::new(field, op, value));
        self
    }

    pub fn where_condition(mut self, condition: WhereCondition) -> Self {
        self.options.conditions.push(condition);
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::Eq, value)
    }

    pub fn where_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.filter(field, Operator::In, Value::Array(values))
    }

    pub fn where_like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(field, Operator::Like, Value::String(pattern.into()))
    }

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

    /// 1-based page; pages below 1 are treated as 1.
    pub fn page(self, page: usize, per_page: usize) -> Self {
        let page = page.max(1);
        self.offset((page - 1).saturating_mul(per_page)).limit(per_page)
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Filters grouped results on an aggregate name (e.g. `count`, `sum:total`)
    /// or a group-by field.
    pub fn having(mut self, name: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.having.push(WhereCondition::new(name, op, value));
        self
    }

    pub fn exec(&self) -> Result<Vec<Row>, Error> {
        self.store.find(&self.options)
    }

    pub fn exec_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        self.exec()?.iter().map(|row| row.decode()).collect()
    }

    pub fn first(&self) -> Result<Option<Row>, Error> {
        let mut options = self.options.clone();
        options.limit = Some(1);
        Ok(self.store.find(&options)?.into_iter().next())
    }

    pub fn first_or_fail(&self) -> Result<Row, Error> {
        self.first()?.ok_or_else(|| {
            Error::new(ErrorKind::NoResults).with_message("query returned no rows")
        })
    }

    pub fn exists(&self) -> Result<bool, Error> {
        Ok(self.first()?.is_some())
    }

    pub fn count(&self) -> Result<usize, Error> {
        self.store.count(&self.options)
    }

    pub fn sum(&self, field: &str) -> Result<f64, Error> {
        Ok(aggregate::sum(&self.numbers(field)?))
    }

    pub fn avg(&self, field: &str) -> Result<Option<f64>, Error> {
        Ok(aggregate::avg(&self.numbers(field)?))
    }

    pub fn min(&self, field: &str) -> Result<Option<f64>, Error> {
        Ok(aggregate::min(&self.numbers(field)?))
    }

    pub fn max(&self, field: &str) -> Result<Option<f64>, Error> {
        Ok(aggregate::max(&self.numbers(field)?))
    }

    /// One map per group holding the group-by values and every aggregate
    /// under its spec string. Without `group_by` the whole result is one group.
    pub fn agg<S: AsRef<str>>(&self, specs: &[S]) -> Result<Vec<Fields>, Error> {
        let specs = specs
            .iter()
            .map(|spec| spec.as_ref().parse::<AggSpec>())
            .collect::<Result<Vec<_>, _>>()?;
        self.agg_specs(&specs)
    }

    pub fn agg_specs(&self, specs: &[AggSpec]) -> Result<Vec<Fields>, Error> {
        let names: Vec<String> = specs.iter().map(AggSpec::name).collect();
        for condition in &self.having {
            if !names.contains(&condition.field) && !self.group_by.contains(&condition.field) {
                return Err(Error::invalid_query(format!(
                    "having refers to `{}`, which is neither an aggregate nor a group-by field",
                    condition.field
                )));
            }
            condition.validate()?;
        }

        let rows = self.unpaginated_rows()?;
        let groups = if self.group_by.is_empty() {
            vec![rows.iter().collect()]
        } else {
            group_rows(&rows, &self.group_by)
        };

        let mut results = Vec::with_capacity(groups.len());
        for group in groups {
            let mut fields = Fields::new();
            if let Some(first) = group.first() {
                for field in &self.group_by {
                    let value = first.get(field).cloned().unwrap_or(Value::Null);
                    fields.insert(field.clone(), value);
                }
            }
            for (spec, name) in specs.iter().zip(&names) {
                fields.insert(name.clone(), spec.evaluate(&group));
            }
            let keep = self
                .having
                .iter()
                .all(|condition| condition.op.test(fields.get(&condition.field), &condition.value));
            if keep {
                results.push(fields);
            }
        }
        Ok(results)
    }

    /// Switches to a join query; it fails with `MissingStore` on execution
    /// unless a resolver is attached.
    pub fn join(self, table: impl Into<String>, local_field: impl Into<String>) -> JoinQueryBuilder<'a> {
        self.join_with(JoinConfig::new(table, local_field))
    }

    pub fn inner_join(
        self,
        table: impl Into<String>,
        local_field: impl Into<String>,
    ) -> JoinQueryBuilder<'a> {
        self.join_with(JoinConfig::new(table, local_field).kind(JoinKind::Inner))
    }

    pub fn join_with(self, config: JoinConfig) -> JoinQueryBuilder<'a> {
        JoinQueryBuilder::from_parts(self.store, None, self.options).join_with(config)
    }

    pub fn with_resolver(self, resolver: &'a dyn StoreResolver) -> JoinQueryBuilder<'a> {
        JoinQueryBuilder::from_parts(self.store, Some(resolver), self.options)
    }

    fn unpaginated_rows(&self) -> Result<Vec<Row>, Error> {
        self.store.find(&self.options.unpaginated())
    }

    fn numbers(&self, field: &str) -> Result<Vec<f64>, Error> {
        let rows = self.unpaginated_rows()?;
        Ok(aggregate::numbers(&rows, field))
    }
}
