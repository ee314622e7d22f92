use offline_sort::{BoxError, KeyFn};
use serde_json::Value;
use std::cmp::Ordering;

/// Scalar JSON value usable as a sort key.
///
/// Orders null < bool < number < string. Integers compare exactly, floats
/// use the IEEE total order, and mixed pairs compare by numeric value.
#[derive(Debug, Clone)]
pub enum JsonKey {
    Null,
    Bool(bool),
    Integer(i128),
    Float(f64),
    String(String),
}

impl JsonKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(JsonKey::Null),
            Value::Bool(b) => Some(JsonKey::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .map(JsonKey::Integer)
                .or_else(|| n.as_f64().map(JsonKey::Float)),
            Value::String(s) => Some(JsonKey::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            JsonKey::Null => 0,
            JsonKey::Bool(_) => 1,
            JsonKey::Integer(_) | JsonKey::Float(_) => 2,
            JsonKey::String(_) => 3,
        }
    }
}

impl PartialEq for JsonKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for JsonKey {}

impl PartialOrd for JsonKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JsonKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (JsonKey::Bool(a), JsonKey::Bool(b)) => a.cmp(b),
            (JsonKey::Integer(a), JsonKey::Integer(b)) => a.cmp(b),
            (JsonKey::Float(a), JsonKey::Float(b)) => a.total_cmp(b),
            (JsonKey::Integer(a), JsonKey::Float(b)) => cmp_integer_float(*a, *b),
            (JsonKey::Float(a), JsonKey::Integer(b)) => cmp_integer_float(*b, *a).reverse(),
            (JsonKey::String(a), JsonKey::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

// The nearest float to `int` decides unless it ties with `float`, in which
// case `float` is integral and in range, so the exact comparison is safe.
fn cmp_integer_float(int: i128, float: f64) -> Ordering {
    match (int as f64).total_cmp(&float) {
        Ordering::Equal => int.cmp(&(float as i128)),
        other => other,
    }
}

/// Composite key built from one JSON pointer per component.
#[derive(Debug, Clone)]
pub struct JsonKeyExtractor {
    pointers: Vec<String>,
}

impl JsonKeyExtractor {
    /// Field names without a leading `/` are treated as top-level fields.
    pub fn new<S: AsRef<str>>(fields: &[S]) -> Self {
        let pointers = fields
            .iter()
            .map(|field| {
                let field = field.as_ref();
                if field.is_empty() || field.starts_with('/') {
                    field.to_string()
                } else {
                    format!("/{}", field)
                }
            })
            .collect();
        Self { pointers }
    }

    pub fn pointers(&self) -> &[String] {
        &self.pointers
    }
}

impl KeyFn<Value> for JsonKeyExtractor {
    type Key = Vec<JsonKey>;

    fn key_of(&self, record: &Value) -> Result<Vec<JsonKey>, BoxError> {
        self.pointers
            .iter()
            .map(|pointer| -> Result<JsonKey, BoxError> {
                let value = record
                    .pointer(pointer)
                    .ok_or_else(|| format!("record has no field at {}", pointer))?;
                let key = JsonKey::from_value(value)
                    .ok_or_else(|| format!("field at {} is not a scalar", pointer))?;
                Ok(key)
            })
            .collect()
    }
}
