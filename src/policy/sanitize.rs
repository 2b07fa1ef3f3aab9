//! Recursive removal of `null`, empty lists and empty mappings.
//!
//! Graph treats an absent key differently from `[]` or `{}` for several
//! condition fields, so every payload we send goes through here first.

use serde_json::{Map, Value};

/// Post-order prune. `None` means the whole value pruned away.
///
/// Lists keep their list shape even with a single surviving element.
pub fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(key, value)| prune(value).map(|value| (key, value)))
                .collect();
            (!pruned.is_empty()).then_some(Value::Object(pruned))
        }
        Value::Array(items) => {
            let pruned: Vec<Value> = items.into_iter().filter_map(prune).collect();
            (!pruned.is_empty()).then_some(Value::Array(pruned))
        }
        scalar => Some(scalar),
    }
}

/// `prune`, but an entirely empty payload becomes `{}` rather than nothing
pub fn sanitize(value: Value) -> Value {
    prune(value).unwrap_or_else(|| Value::Object(Map::new()))
}
