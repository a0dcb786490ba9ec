use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// A single scalar parameter value.
///
/// Values are compared exactly: floats are compared by bit pattern (with `-0.0`
/// folded onto `0.0`), which makes `ParamValue` usable inside hash keys for
/// grouping. `Null` is an ordinary value and groups like any other.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Triple([i64; 3]),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ValueError {
    #[error("expected a scalar or a 3-integer triple, found {0}")]
    NotScalar(String),
}

impl ParamValue {
    /// Converts a JSON value into a parameter value. Arrays are only accepted as
    /// 3-integer triples.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValueError> {
        use serde_json::Value;
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(ValueError::NotScalar(n.to_string()))
                }
            }
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Array(items) if items.len() == 3 => {
                let mut triple = [0i64; 3];
                for (slot, item) in triple.iter_mut().zip(items) {
                    *slot = item
                        .as_i64()
                        .ok_or_else(|| ValueError::NotScalar(value.to_string()))?;
                }
                Ok(Self::Triple(triple))
            }
            other => Err(ValueError::NotScalar(other.to_string())),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::Triple(t) => Value::from(t.to_vec()),
        }
    }

    /// Parses a cell of the tabular index back into a typed value.
    ///
    /// A cell starting with `"` is a JSON string literal and always reads as
    /// text. Otherwise the order of attempts is: empty → `Null`, integer,
    /// float, boolean, whitespace-separated integer triple, text.
    pub fn from_cell(cell: &str) -> Self {
        if cell.starts_with('"') {
            if let Ok(text) = serde_json::from_str::<String>(cell) {
                return Self::Text(text);
            }
        }
        Self::infer_cell(cell)
    }

    fn infer_cell(cell: &str) -> Self {
        if cell.is_empty() {
            return Self::Null;
        }
        if let Ok(i) = cell.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = cell.parse::<f64>() {
            return Self::Float(f);
        }
        match cell {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        let parts: Vec<_> = cell.split_whitespace().collect();
        if parts.len() == 3 {
            let parsed: Result<Vec<i64>, _> = parts.iter().map(|p| p.parse::<i64>()).collect();
            if let Ok(v) = parsed {
                return Self::Triple([v[0], v[1], v[2]]);
            }
        }
        Self::Text(cell.to_string())
    }

    /// Renders the value as an index cell; the inverse of [`ParamValue::from_cell`].
    ///
    /// Text is written bare unless it would read back as another type, in
    /// which case it is written as a JSON string literal.
    pub fn to_cell(&self) -> String {
        match self {
            Self::Null => String::new(),
            // Debug formatting keeps a decimal point, so floats never read back as integers.
            Self::Float(f) => format!("{:?}", f),
            Self::Text(s) => {
                let bare_reads_back =
                    !s.starts_with('"') && matches!(Self::infer_cell(s), Self::Text(ref t) if t == s);
                if bare_reads_back {
                    s.clone()
                } else {
                    serde_json::Value::String(s.clone()).to_string()
                }
            }
            other => other.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn float_bits(f: f64) -> u64 {
        if f == 0.0 { 0.0f64.to_bits() } else { f.to_bits() }
    }

    pub(crate) fn type_tag(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Triple(_) => "triple",
        }
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => Self::float_bits(*a) == Self::float_bits(*b),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Triple(a), Self::Triple(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => Self::float_bits(*f).hash(state),
            Self::Text(s) => s.hash(state),
            Self::Triple(t) => t.hash(state),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
            Self::Triple([a, b, c]) => write!(f, "{} {} {}", a, b, c),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<[i64; 3]> for ParamValue {
    fn from(value: [i64; 3]) -> Self {
        Self::Triple(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn cells_round_trip_with_their_types() {
        let values = [
            ParamValue::Null,
            ParamValue::Int(42),
            ParamValue::Float(10.0),
            ParamValue::Float(1.5e-7),
            ParamValue::Bool(true),
            ParamValue::Triple([2, 3, 4]),
            ParamValue::Text("CO2".into()),
        ];
        for value in values {
            assert_eq!(ParamValue::from_cell(&value.to_cell()), value);
        }
    }

    #[test]
    fn text_that_looks_like_another_type_keeps_its_type() {
        let values = [
            ParamValue::Text("298".into()),
            ParamValue::Text("1.5e5".into()),
            ParamValue::Text(String::new()),
            ParamValue::Text("true".into()),
            ParamValue::Text("1 2 3".into()),
            ParamValue::Text("\"quoted\"".into()),
            ParamValue::Text("\"".into()),
        ];
        for value in values {
            let cell = value.to_cell();
            assert_eq!(ParamValue::from_cell(&cell), value, "cell {:?}", cell);
        }
    }

    #[test]
    fn ordinary_text_is_written_bare() {
        assert_eq!(ParamValue::Text("MIL-47".into()).to_cell(), "MIL-47");
        assert_eq!(ParamValue::Text("298".into()).to_cell(), "\"298\"");
        assert_eq!(ParamValue::Text(String::new()).to_cell(), "\"\"");
    }

    #[test]
    fn integral_float_is_written_with_decimal_point() {
        assert_eq!(ParamValue::Float(1000000.0).to_cell(), "1000000.0");
    }

    #[test]
    fn negative_zero_equals_zero_and_hashes_alike() {
        let mut set = HashSet::new();
        set.insert(ParamValue::Float(0.0));
        assert!(set.contains(&ParamValue::Float(-0.0)));
    }

    #[test]
    fn int_and_float_are_distinct_values() {
        assert_ne!(ParamValue::Int(10), ParamValue::Float(10.0));
    }

    #[test]
    fn from_json_accepts_scalars_and_triples() {
        assert_eq!(ParamValue::from_json(&json!(null)).unwrap(), ParamValue::Null);
        assert_eq!(ParamValue::from_json(&json!(298)).unwrap(), ParamValue::Int(298));
        assert_eq!(
            ParamValue::from_json(&json!(0.5)).unwrap(),
            ParamValue::Float(0.5)
        );
        assert_eq!(
            ParamValue::from_json(&json!([1, 2, 3])).unwrap(),
            ParamValue::Triple([1, 2, 3])
        );
        assert!(ParamValue::from_json(&json!([1, 2])).is_err());
        assert!(ParamValue::from_json(&json!({"a": 1})).is_err());
    }

    #[test]
    fn serde_uses_plain_json_shapes() {
        let v: ParamValue = serde_json::from_str("[2, 2, 2]").unwrap();
        assert_eq!(v, ParamValue::Triple([2, 2, 2]));
        let v: ParamValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(v, ParamValue::Float(12.5));
        let v: ParamValue = serde_json::from_str("null").unwrap();
        assert!(v.is_null());
        assert_eq!(serde_json::to_string(&ParamValue::Int(3)).unwrap(), "3");
    }
}
