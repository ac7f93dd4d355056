use serde_json::Value;

/// Citation metadata key stripped from every mapping.
pub const REFERENCE_KEY: &str = "Reference";

/// Remove every `"Reference"` entry from a raw document, at any depth.
///
/// Takes the document by value, so the caller's structure can never observe
/// the change.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| k != REFERENCE_KEY)
                .map(|(k, v)| (k, sanitize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        scalar => scalar,
    }
}

// ── Tests ──
