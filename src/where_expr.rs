//! Purpose: Parse the CLI's compact `--where`, `--having`, `--order-by`, `--join`, and `--index` specs.
//! Exports: `parse_where`, `parse_order`, `parse_join`, `parse_index`.
//! Role: Turns flag strings into engine values; evaluation stays in the library.
//! Invariants: Malformed specs are `InvalidQuery` errors with an example in the hint.
//! Invariants: Comparison values are JSON when they parse as JSON, plain strings otherwise.

use serde_json::Value;

use tabula::api::{
    Direction, Error, IndexDefinition, JoinConfig, JoinKind, Operator, OrderBy, WhereCondition,
};

/// Two-character operators come first so `>=` is not read as `>`.
const OPERATORS: &[(&str, Operator)] = &[
    (">=", Operator::Gte),
    ("<=", Operator::Lte),
    ("!=", Operator::Ne),
    ("=", Operator::Eq),
    (">", Operator::Gt),
    ("<", Operator::Lt),
    ("~", Operator::Like),
    ("@", Operator::In),
];

pub(crate) fn parse_where(expr: &str) -> Result<WhereCondition, Error> {
    let Some(start) = expr.find(['=', '!', '<', '>', '~', '@']) else {
        return Err(spec_error("--where", expr, "age>=21"));
    };
    let field = expr[..start].trim();
    if field.is_empty() {
        return Err(spec_error("--where", expr, "age>=21"));
    }
    let rest = &expr[start..];
    let Some((token, op)) = OPERATORS
        .iter()
        .find(|(token, _)| rest.starts_with(token))
        .copied()
    else {
        return Err(spec_error("--where", expr, "age>=21"));
    };
    let raw = rest[token.len()..].trim();

    let value = match op {
        Operator::Like => Value::String(raw.to_string()),
        Operator::In => match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Array(_)) => value,
            _ => return Err(spec_error("--where", expr, "status@[\"active\",\"trial\"]")),
        },
        _ => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    };
    Ok(WhereCondition::new(field, op, value))
}

pub(crate) fn parse_order(spec: &str) -> Result<OrderBy, Error> {
    let (field, direction) = match spec.rsplit_once(':') {
        Some((field, direction)) => (field, direction.parse::<Direction>()?),
        None => (spec, Direction::Asc),
    };
    let field = field.trim();
    if field.is_empty() {
        return Err(spec_error("--order-by", spec, "created_at:desc"));
    }
    Ok(OrderBy {
        field: field.to_string(),
        direction,
    })
}

/// `table:local_field[:foreign_field[:alias[:inner|left]]]`; empty parts keep defaults.
pub(crate) fn parse_join(spec: &str) -> Result<JoinConfig, Error> {
    let parts: Vec<&str> = spec.split(':').map(str::trim).collect();
    if parts.len() < 2 || parts.len() > 5 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(spec_error("--join", spec, "users:user_id:id:author:inner"));
    }
    let mut config = JoinConfig::new(parts[0], parts[1]);
    if let Some(foreign) = parts.get(2).filter(|part| !part.is_empty()) {
        config = config.foreign_field(*foreign);
    }
    if let Some(alias) = parts.get(3).filter(|part| !part.is_empty()) {
        config = config.alias(*alias);
    }
    match parts.get(4).copied() {
        None | Some("") | Some("left") => {}
        Some("inner") => config = config.kind(JoinKind::Inner),
        Some(_) => return Err(spec_error("--join", spec, "users:user_id:id:author:inner")),
    }
    Ok(config)
}

pub(crate) fn parse_index(spec: &str) -> Result<IndexDefinition, Error> {
    let fields: Vec<&str> = spec.split(',').map(str::trim).collect();
    if fields.iter().any(|field| field.is_empty()) {
        return Err(spec_error("--index", spec, "status,region"));
    }
    Ok(IndexDefinition::new(fields))
}

fn spec_error(flag: &str, spec: &str, example: &str) -> Error {
    Error::new(tabula::api::ErrorKind::InvalidQuery)
        .with_message(format!("invalid {flag} value `{spec}`"))
        .with_hint(format!("Example: {flag} '{example}'"))
}

#[cfg(test)]
mod tests {
    use super::{parse_index, parse_join, parse_order, parse_where};
    use serde_json::json;
    use tabula::api::{Direction, ErrorKind, JoinKind, Operator};

    #[test]
    fn where_values_parse_as_json_when_possible() {
        let cond = parse_where("age>=21").unwrap();
        assert_eq!((cond.field.as_str(), cond.op), ("age", Operator::Gte));
        assert_eq!(cond.value, json!(21));

        let cond = parse_where("name=ann").unwrap();
        assert_eq!(cond.value, json!("ann"));

        let cond = parse_where("code=\"007\"").unwrap();
        assert_eq!(cond.value, json!("007"));

        let cond = parse_where("sum:price!=0").unwrap();
        assert_eq!((cond.field.as_str(), cond.op), ("sum:price", Operator::Ne));
    }

    #[test]
    fn like_and_in_forms() {
        let cond = parse_where("email~%@example.com").unwrap();
        assert_eq!(cond.op, Operator::Like);
        assert_eq!(cond.value, json!("%@example.com"));

        let cond = parse_where("status@[\"a\",\"b\"]").unwrap();
        assert_eq!(cond.op, Operator::In);
        assert_eq!(cond.value, json!(["a", "b"]));

        let err = parse_where("status@a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    }

    #[test]
    fn malformed_where_is_rejected() {
        assert!(parse_where("age").is_err());
        assert!(parse_where(">=3").is_err());
        assert!(parse_where("a!3").is_err());
    }

    #[test]
    fn order_and_index_specs() {
        let order = parse_order("created_at:desc").unwrap();
        assert_eq!(order.field, "created_at");
        assert_eq!(order.direction, Direction::Desc);
        assert_eq!(parse_order("name").unwrap().direction, Direction::Asc);
        assert!(parse_order("name:sideways").is_err());

        assert_eq!(parse_index("a, b").unwrap().fields, ["a", "b"]);
        assert!(parse_index("a,,b").is_err());
    }

    #[test]
    fn join_specs_fill_defaults() {
        let join = parse_join("users:user_id").unwrap();
        assert_eq!(join.foreign_field, "id");
        assert_eq!(join.alias, "users");
        assert_eq!(join.kind, JoinKind::Left);

        let join = parse_join("users:user_id::author:inner").unwrap();
        assert_eq!(join.foreign_field, "id");
        assert_eq!(join.alias, "author");
        assert_eq!(join.kind, JoinKind::Inner);

        assert!(parse_join("users").is_err());
        assert!(parse_join("users:user_id:id:a:outer").is_err());
    }
}
