//! Field values addressed by dotted path, and their normalization to [0, 1].

use serde_json::Value;

/// Convert `"section.field.key"` into a JSON pointer (`"/section/field/key"`).
pub fn path_to_pointer(path: &str) -> String {
    let mut pointer = String::with_capacity(path.len() + 1);
    for segment in path.split('.') {
        pointer.push('/');
        pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
    }
    pointer
}

/// Normalize a knowledge value into [0, 1] for scoring.
///
/// - booleans map to 0 or 1
/// - floats already in [0, 1] pass through, others are clamped
/// - integers in [1, 5] are read as a rating (value / 5)
/// - integers in [0, 100] are read as a percentage (value / 100)
/// - category words: high/yes/good = 1, low/no/poor = 0, medium/moderate/ok = 0.5
///
/// Anything else (null, lists, maps, unrecognized words) has no numeric reading.
pub fn normalize_value(value: &Value) -> Option<f32> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(match i {
                    1..=5 => i as f32 / 5.0,
                    0..=100 => i as f32 / 100.0,
                    i if i > 100 => 1.0,
                    _ => 0.0,
                })
            } else if n.is_u64() {
                Some(1.0)
            } else {
                n.as_f64().map(|f| (f as f32).clamp(0.0, 1.0))
            }
        }
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "high" | "yes" | "good" => Some(1.0),
            "low" | "no" | "poor" => Some(0.0),
            "medium" | "moderate" | "ok" => Some(0.5),
            _ => None,
        },
        _ => None,
    }
}

/// Check whether an actual knowledge value satisfies a required value.
///
/// Unset values (`null`) satisfy a required `false`. A list satisfies any
/// required scalar it contains. Strings compare case-insensitively and
/// numbers within a small tolerance.
pub fn values_match(actual: &Value, required: &Value) -> bool {
    match (actual, required) {
        (Value::Null, Value::Bool(false)) => true,
        (Value::Bool(a), Value::Bool(r)) => a == r,
        (Value::Number(a), Value::Number(r)) => match (a.as_f64(), r.as_f64()) {
            (Some(a), Some(r)) => (a - r).abs() < 1e-6,
            _ => false,
        },
        (Value::String(a), Value::String(r)) => a.eq_ignore_ascii_case(r),
        (Value::Array(items), required) if !required.is_array() => {
            items.iter().any(|item| values_match(item, required))
        }
        (actual, required) => actual == required,
    }
}

/// A serialized snapshot of a knowledge state for repeated lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeView {
    root: Value,
}

impl KnowledgeView {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Look up a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.root.pointer(&path_to_pointer(path))
    }

    /// Look up and normalize a value by dotted path.
    pub fn normalized(&self, path: &str) -> Option<f32> {
        self.get(path).and_then(normalize_value)
    }

    /// Check a required value against the field at `path`. Missing fields never match.
    pub fn satisfies(&self, path: &str, required: &Value) -> bool {
        self.get(path)
            .map(|actual| values_match(actual, required))
            .unwrap_or(false)
    }
}
