//! Purpose: Hold top-level CLI command dispatch for `tabula`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command loads tables fresh from disk and never writes them back.
//! Invariants: Query semantics come from the library builders, not from CLI code.

use super::*;

use tabula::api::{Catalog, QueryBuilder, Row, StoreOptions};
use crate::table_paths::load_table;
use crate::where_expr::{parse_index, parse_join, parse_order, parse_where};

pub(super) fn dispatch_command(command: Command, data_dir: PathBuf) -> Result<RunOutcome, Error> {
    match command {
        Command::Query(args) => {
            let mut options = StoreOptions::new();
            for spec in &args.indexes {
                options = options.with_index(parse_index(spec)?);
            }
            let base = load_table(&args.table, &data_dir, options)?;
            let joins = args
                .joins
                .iter()
                .map(|spec| parse_join(spec))
                .collect::<Result<Vec<_>, _>>()?;

            let mut query = QueryBuilder::new(&base);
            for expr in &args.conditions {
                query = query.where_condition(parse_where(expr)?);
            }
            for spec in &args.order_by {
                let order = parse_order(spec)?;
                query = query.order_by(order.field, order.direction);
            }
            if let (Some(page), Some(per_page)) = (args.page, args.per_page) {
                query = query.page(page, per_page);
            }
            if let Some(offset) = args.offset {
                query = query.offset(offset);
            }
            if let Some(limit) = args.limit {
                query = query.limit(limit);
            }

            if joins.is_empty() {
                if args.count {
                    emit_json(json!({ "count": query.count()? }));
                } else {
                    emit_json(rows_json(query.exec()?));
                }
                return Ok(RunOutcome::ok());
            }

            let mut catalog = Catalog::new();
            for join in &joins {
                if !catalog.contains(&join.table) {
                    let store = load_table(&join.table, &data_dir, StoreOptions::new())?;
                    catalog.add_table(join.table.clone(), store);
                }
            }
            let mut joined = query.with_resolver(&catalog);
            for join in joins {
                joined = joined.join_with(join);
            }
            if args.count {
                emit_json(json!({ "count": joined.count()? }));
            } else {
                emit_json(rows_json(joined.exec()?));
            }
            Ok(RunOutcome::ok())
        }
        Command::Agg(args) => {
            let store = load_table(&args.table, &data_dir, StoreOptions::new())?;
            let mut query = QueryBuilder::new(&store).group_by(&args.group_by);
            for expr in &args.conditions {
                query = query.where_condition(parse_where(expr)?);
            }
            for expr in &args.having {
                let condition = parse_where(expr)?;
                query = query.having(condition.field, condition.op, condition.value);
            }
            let groups = query.agg(&args.aggs)?;
            emit_json(Value::Array(groups.into_iter().map(Value::Object).collect()));
            Ok(RunOutcome::ok())
        }
    }
}

fn rows_json(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Row::into_value).collect())
}
