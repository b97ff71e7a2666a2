//! Purpose: Value semantics for filtering, sorting, and index keys.
//! Exports: `canonical`, `values_equal`, `compare_scalars`, `sort_order`, `like_match`, `tuple_key`.
//! Role: One definition of equality shared by the scan filter and the index encoder.
//! Invariants: `values_equal(a, b)` agrees with `canonical(a) == canonical(b)` for every number.
//! Invariants: Index keys are built from canonical values, so index hits never disagree with scans.
use std::cmp::Ordering;

use serde_json::{Number, Value};

/// Rewrites integral floats as integers, recursively, so `1` and `1.0` compare equal.
pub fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(canonical_number(n)),
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn canonical_number(n: &Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n.clone();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Number::from(f as i64)
        }
        _ => n.clone(),
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => canonical_number(x) == canonical_number(y),
        (Value::Array(_), _) | (Value::Object(_), _) => canonical(a) == canonical(b),
        _ => a == b,
    }
}

/// Ordering for `> >= < <=`: numbers numerically, strings lexicographically.
/// Any other pairing is incomparable and never matches.
pub fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used by ORDER BY on non-null values.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    let (ka, kb) = (kind_rank(a), kind_rank(b));
    if ka != kb {
        return ka.cmp(&kb);
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => canonical(a).to_string().cmp(&canonical(b).to_string()),
    }
}

/// Case-insensitive glob: `%` matches any run, `_` exactly one character.
/// Every other pattern character is literal.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    let mut ti = 0;
    let mut pi = 0;
    let mut star_pi = None;
    let mut star_ti = 0;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '_' || pattern[pi] == text[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < pattern.len() && pattern[pi] == '%' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(sp) = star_pi {
            pi = sp + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    while pi < pattern.len() && pattern[pi] == '%' {
        pi += 1;
    }

    pi == pattern.len()
}

/// Text a scalar is matched against by `like`; `None` for null and containers.
pub fn like_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(canonical_number(n).to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// JSON-encoded tuple of canonical values, used as an index bucket key.
pub fn tuple_key<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    let tuple: Vec<Value> = values
        .into_iter()
        .map(|value| value.map(canonical).unwrap_or(Value::Null))
        .collect();
    Value::Array(tuple).to_string()
}
