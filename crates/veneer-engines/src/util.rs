//! Value helpers shared by the engines.

use serde_json::Value;

/// Resolves a dotted path in a JSON value.
///
/// Supports simple keys (`name`), nested objects (`user.profile.name`), and
/// array indices (`items.0` or `items.0.name`).
pub(crate) fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                arr.get(index)?
            }
            _ => return None,
        };
    }

    Some(current)
}

/// Formats a JSON value as output text. Arrays and objects fall back to their
/// JSON representation.
pub(crate) fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
