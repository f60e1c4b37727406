use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Named query parameters.
pub type Params = HashMap<String, Value>;

/// A graph node as returned by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, Value>,
}

impl Node {
    pub fn new(id: i64, labels: Vec<String>, properties: HashMap<String, Value>) -> Self {
        Self {
            id,
            labels,
            properties,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Every shape a value can take on its way to or from the database.
///
/// `OptionalTimestamp` only appears on the parameter side; the normalizer
/// resolves it into `DateTime` or `Null` before submission. `Node` and
/// `LocalDateTime` only appear on the result side and are removed by
/// `result::flatten`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    LocalDateTime(NaiveDateTime),
    OptionalTimestamp(Option<DateTime<Utc>>),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Node(Node),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Boolean(_) => "BOOLEAN",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::DateTime(_) => "DATETIME",
            Self::LocalDateTime(_) => "LOCAL DATETIME",
            Self::OptionalTimestamp(_) => "OPTIONAL TIMESTAMP",
            Self::List(_) => "LIST",
            Self::Map(_) => "MAP",
            Self::Node(_) => "NODE",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::LocalDateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Self::OptionalTimestamp(Some(dt)) => write!(f, "{}", dt.to_rfc3339()),
            Self::OptionalTimestamp(None) => write!(f, "null"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Map(map) => write_map(f, map),
            Self::Node(node) => {
                write!(f, "(")?;
                for label in &node.labels {
                    write!(f, ":{}", label)?;
                }
                write!(f, " ")?;
                write_map(f, &node.properties)?;
                write!(f, ")")
            }
        }
    }
}

fn write_map(f: &mut fmt::Formatter<'_>, map: &HashMap<String, Value>) -> fmt::Result {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    write!(f, "{{")?;
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", key, map[key])?;
    }
    write!(f, "}}")
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::LocalDateTime(dt)
    }
}

impl From<Option<DateTime<Utc>>> for Value {
    fn from(dt: Option<DateTime<Utc>>) -> Self {
        Self::OptionalTimestamp(dt)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(map: HashMap<String, T>) -> Self {
        Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as JsonValue;

        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::Text(s),
            JsonValue::Array(items) => Self::List(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// A single result row: column names and their values, in query order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    keys: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(keys: Vec<String>, values: Vec<Value>) -> Self {
        Self { keys, values }
    }

    /// A one-column row, the common `RETURN n` shape.
    pub fn single(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            keys: vec![key.into()],
            values: vec![value.into()],
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.values.get(i))
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    /// Consumes the row, returning its first column.
    pub fn into_first(self) -> Option<Value> {
        self.values.into_iter().next()
    }
}
