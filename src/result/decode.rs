use super::flatten::flatten;
use crate::client::RowCursor;
use crate::core::{GraphError, Result, Value};
use crate::transaction::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;

/// Conversion from a flattened value into a field type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

/// A record type with declared field bindings.
///
/// Usually implemented through [`graph_record!`](crate::graph_record).
/// Field names are matched against map keys ignoring case and underscores,
/// so `created_at` binds `createdAt`, `CreatedAt` and `created_at`.
pub trait GraphRecord: Default {
    const FIELDS: &'static [&'static str];

    /// Assign `value` to the field called `field` (one of `FIELDS`).
    fn bind(&mut self, field: &str, value: Value) -> Result<()>;

    /// Build a record from a flattened map.
    ///
    /// Unknown keys are ignored. Missing keys and nulls leave the field at
    /// its default.
    fn from_tree(tree: Value) -> Result<Self> {
        let Value::Map(map) = tree else {
            return Err(GraphError::decode(format!(
                "expected MAP, found {}",
                tree.type_name()
            )));
        };

        let mut record = Self::default();
        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            if let Some(field) = match_field(Self::FIELDS, &key) {
                record.bind(field, value).map_err(|err| err.at_field(field))?;
            }
        }
        Ok(record)
    }
}

fn fold_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn match_field(fields: &'static [&'static str], key: &str) -> Option<&'static str> {
    if let Some(exact) = fields.iter().copied().find(|field| *field == key) {
        return Some(exact);
    }
    let folded = fold_name(key);
    fields.iter().copied().find(|field| fold_name(field) == folded)
}

/// Decode the first column of every remaining row, in row order.
///
/// Exhausts the cursor. Returns nothing on the first row that fails.
pub async fn decode_rows<T: GraphRecord>(
    ctx: &Context,
    cursor: &mut dyn RowCursor,
) -> Result<Vec<T>> {
    let mut records = Vec::new();
    while let Some(row) = cursor.next(ctx).await? {
        let index = records.len();
        let column = row
            .into_first()
            .ok_or_else(|| GraphError::decode(format!("row {} has no columns", index)))?;
        records.push(T::from_tree(flatten(column))?);
    }
    Ok(records)
}

fn mismatch(expected: &str, found: &Value) -> GraphError {
    GraphError::decode(format!("expected {}, found {}", expected, found.type_name()))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch("TEXT", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(mismatch("BOOLEAN", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i),
            Value::Float(f) if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Ok(f as i64)
            }
            other => Err(mismatch("INTEGER", &other)),
        }
    }
}

macro_rules! narrow_integer {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    let wide = i64::from_value(value)?;
                    <$ty>::try_from(wide).map_err(|_| {
                        GraphError::decode(format!(
                            "{} out of range for {}",
                            wide,
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

narrow_integer!(i32, i16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            other => Err(mismatch("FLOAT", &other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            Value::LocalDateTime(dt) => Ok(dt.and_utc()),
            other => Err(mismatch("DATETIME", &other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::LocalDateTime(dt) => Ok(dt),
            Value::DateTime(dt) => Ok(dt.naive_utc()),
            other => Err(mismatch("LOCAL DATETIME", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| T::from_value(item).map_err(|err| err.at_field(&i.to_string())))
                .collect(),
            other => Err(mismatch("LIST", &other)),
        }
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(map) => map
                .into_iter()
                .map(|(key, member)| match T::from_value(member) {
                    Ok(decoded) => Ok((key, decoded)),
                    Err(err) => Err(err.at_field(&key)),
                })
                .collect(),
            other => Err(mismatch("MAP", &other)),
        }
    }
}
