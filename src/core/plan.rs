//! Purpose: Decide how a `find` is answered: which indexes narrow it and what is left to filter.
//! Exports: `plan_find`, `FindPlan`, `QueryPlan`, `finish_rows`, `scan`.
//! Role: Pure planning layer used by stores; no row storage is touched here.
//! Invariants: A plan never changes the result set or order, only the candidate set size.
//! Invariants: A condition is skipped by the residual filter only if an index answered it exactly.
use std::collections::BTreeSet;

use serde_json::Value;

use crate::core::condition::{Operator, QueryOptions, WhereCondition, paginate, sort_rows};
use crate::core::error::Error;
use crate::core::index::IndexManager;
use crate::core::row::Row;

#[derive(Clone, Debug)]
pub struct FindPlan<K> {
    /// `None` means a full scan.
    pub candidates: Option<BTreeSet<K>>,
    /// Parallel to the query's conditions.
    pub covered: Vec<bool>,
    pub indexes_used: Vec<String>,
}

/// Observable summary of a plan.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct QueryPlan {
    pub indexes_used: Vec<String>,
    pub full_scan: bool,
    pub candidate_count: Option<usize>,
    pub residual_fields: Vec<String>,
}

impl<K> FindPlan<K> {
    pub fn describe(&self, conditions: &[WhereCondition]) -> QueryPlan {
        QueryPlan {
            indexes_used: self.indexes_used.clone(),
            full_scan: self.candidates.is_none(),
            candidate_count: self.candidates.as_ref().map(BTreeSet::len),
            residual_fields: conditions
                .iter()
                .zip(&self.covered)
                .filter(|(_, covered)| !**covered)
                .map(|(condition, _)| condition.field.clone())
                .collect(),
        }
    }
}

pub fn plan_find<K: Ord + Clone>(
    conditions: &[WhereCondition],
    indexes: &IndexManager<K>,
) -> FindPlan<K> {
    let mut plan = FindPlan {
        candidates: None,
        covered: vec![false; conditions.len()],
        indexes_used: Vec::new(),
    };

    let equalities: Vec<usize> = conditions
        .iter()
        .enumerate()
        .filter(|(_, condition)| condition.op == Operator::Eq)
        .map(|(pos, _)| pos)
        .collect();

    for &pos in &equalities {
        let condition = &conditions[pos];
        if let Some(hit) = indexes.lookup(&[condition.field.as_str()], &[condition.value.clone()]) {
            intersect(&mut plan.candidates, hit);
            plan.covered[pos] = true;
            plan.indexes_used.push(condition.field.clone());
        }
    }

    if equalities.len() >= 2 {
        let fields: Vec<&str> = equalities
            .iter()
            .map(|&pos| conditions[pos].field.as_str())
            .collect();
        let values: Vec<Value> = equalities
            .iter()
            .map(|&pos| conditions[pos].value.clone())
            .collect();
        if let Some(hit) = indexes.lookup(fields.as_slice(), values.as_slice()) {
            intersect(&mut plan.candidates, hit);
            for &pos in &equalities {
                plan.covered[pos] = true;
            }
            plan.indexes_used.push(fields.join(","));
        }
    }

    plan
}

fn intersect<K: Ord + Clone>(candidates: &mut Option<BTreeSet<K>>, hit: BTreeSet<K>) {
    *candidates = Some(match candidates.take() {
        None => hit,
        Some(current) => current.intersection(&hit).cloned().collect(),
    });
}

/// Residual filter, sort, then offset/limit over rows in store order.
pub fn finish_rows(rows: Vec<Row>, options: &QueryOptions, covered: &[bool]) -> Vec<Row> {
    let residual: Vec<&WhereCondition> = options
        .conditions
        .iter()
        .enumerate()
        .filter(|(pos, _)| !covered.get(*pos).copied().unwrap_or(false))
        .map(|(_, condition)| condition)
        .collect();

    let mut rows: Vec<Row> = rows
        .into_iter()
        .filter(|row| residual.iter().all(|condition| condition.matches(row)))
        .collect();
    sort_rows(&mut rows, &options.order_by);
    paginate(rows, options.offset, options.limit)
}

/// Full-scan `find` for adapters without indexes.
pub fn scan(rows: Vec<Row>, options: &QueryOptions) -> Result<Vec<Row>, Error> {
    options.validate()?;
    Ok(finish_rows(rows, options, &[]))
}
