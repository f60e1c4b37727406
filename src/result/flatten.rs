use crate::core::Value;

/// Convert a graph-native value into a plain tree of maps, lists and scalars.
///
/// Nodes become the map of their properties, local date-times become UTC
/// date-times, and lists and maps are flattened member by member.
pub fn flatten(value: Value) -> Value {
    match value {
        Value::Node(node) => Value::Map(
            node.properties
                .into_iter()
                .map(|(key, property)| (key, flatten(property)))
                .collect(),
        ),
        Value::Map(map) => Value::Map(
            map.into_iter()
                .map(|(key, member)| (key, flatten(member)))
                .collect(),
        ),
        Value::LocalDateTime(dt) => Value::DateTime(dt.and_utc()),
        Value::List(items) => Value::List(items.into_iter().map(flatten).collect()),
        other => other,
    }
}
