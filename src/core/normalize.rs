//! Parameter normalization.
//!
//! Resolves parameter values into the shapes the client accepts: optional
//! timestamps are dereferenced, maps and lists of maps are rebuilt with their
//! members normalized, everything else passes through. The input is never
//! modified.

use super::value::{Params, Value};

pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(key, member)| (key.clone(), normalize(member)))
                .collect(),
        ),
        Value::OptionalTimestamp(Some(dt)) => Value::DateTime(*dt),
        Value::OptionalTimestamp(None) => Value::Null,
        Value::List(items) if items.iter().all(Value::is_map) => {
            Value::List(items.iter().map(normalize).collect())
        }
        other => other.clone(),
    }
}

pub fn normalize_params(params: &Params) -> Params {
    params
        .iter()
        .map(|(key, value)| (key.clone(), normalize(value)))
        .collect()
}
