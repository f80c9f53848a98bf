// ABOUTME: Value model shared by operator arguments, host context entries and results
// ABOUTME: Wraps serde_yaml values and adds the truthiness rules used by short-circuit tasks

use indexmap::IndexMap;

pub use serde_yaml::{Mapping, Number, Value};

/// Keyword arguments in declaration order.
pub type Kwargs = IndexMap<String, Value>;

/// Truthiness as the task callable's runtime sees it: null, false, zero and
/// empty containers are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i != 0
            } else if let Some(u) = n.as_u64() {
                u != 0
            } else {
                n.as_f64().map(|f| f != 0.0).unwrap_or(true)
            }
        }
        Value::String(s) => !s.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => is_truthy(&tagged.value),
    }
}

/// Short single-line rendering used in log messages.
pub fn describe(value: &Value) -> String {
    match serde_json::to_string(value) {
        Ok(text) => text,
        Err(_) => format!("{:?}", value),
    }
}

/// Convert keyword arguments into a YAML mapping with string keys.
pub fn kwargs_to_mapping(kwargs: &Kwargs) -> Mapping {
    kwargs
        .iter()
        .map(|(key, value)| (Value::String(key.clone()), value.clone()))
        .collect()
}
