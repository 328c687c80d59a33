//! Owned, thread-safe data values
//!
//! A [`Datum`] is what crosses the boundary between learner code and the
//! rest of the engine: test inputs going in, actual values coming out. Unlike
//! runtime values it owns its contents, so it can be sent across threads,
//! serialized into reports and compared without an interpreter.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::runtime::number_to_string;

/// A JSON-like value with JavaScript's `undefined`
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Datum {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Datum>),
    Object(IndexMap<String, Datum>),
    /// A value with no data representation (function, circular reference,
    /// over-deep nesting), kept as a descriptive label
    Opaque(String),
}

impl Datum {
    pub fn is_nullish(&self) -> bool {
        matches!(self, Datum::Undefined | Datum::Null)
    }

    /// Name of the variant as JavaScript's `typeof` would report it
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Undefined => "undefined",
            Datum::Null | Datum::Array(_) | Datum::Object(_) => "object",
            Datum::Bool(_) => "boolean",
            Datum::Number(_) => "number",
            Datum::String(_) => "string",
            Datum::Opaque(_) => "opaque",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Datum]> {
        match self {
            Datum::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Datum>> {
        match self {
            Datum::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Property of an object or element of an array
    pub fn get(&self, key: &str) -> Option<&Datum> {
        match self {
            Datum::Object(map) => map.get(key),
            Datum::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Lossy conversion to JSON: `undefined` becomes `null`, non-finite
    /// numbers become `null` and opaque values their label
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Datum::Undefined | Datum::Null => serde_json::Value::Null,
            Datum::Bool(b) => serde_json::Value::Bool(*b),
            Datum::Number(n) => number_to_json(*n),
            Datum::String(s) => serde_json::Value::String(s.clone()),
            Datum::Array(items) => {
                serde_json::Value::Array(items.iter().map(Datum::to_json).collect())
            }
            Datum::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Datum::Opaque(label) => serde_json::Value::String(label.clone()),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl From<serde_json::Value> for Datum {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Datum::Null,
            serde_json::Value::Bool(b) => Datum::Bool(b),
            serde_json::Value::Number(n) => Datum::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Datum::String(s),
            serde_json::Value::Array(items) => {
                Datum::Array(items.into_iter().map(Datum::from).collect())
            }
            serde_json::Value::Object(map) => {
                Datum::Object(map.into_iter().map(|(k, v)| (k, Datum::from(v))).collect())
            }
        }
    }
}

impl From<f64> for Datum {
    fn from(n: f64) -> Self {
        Datum::Number(n)
    }
}

impl From<i32> for Datum {
    fn from(n: i32) -> Self {
        Datum::Number(f64::from(n))
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(s)
    }
}

impl From<Vec<Datum>> for Datum {
    fn from(items: Vec<Datum>) -> Self {
        Datum::Array(items)
    }
}

impl Serialize for Datum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Datum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Datum::from)
    }
}

/// Compact, JavaScript-flavoured rendering used in reports
impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Undefined => f.write_str("undefined"),
            Datum::Null => f.write_str("null"),
            Datum::Bool(b) => write!(f, "{}", b),
            Datum::Number(n) => f.write_str(&number_to_string(*n)),
            Datum::String(s) => write!(f, "{:?}", s),
            Datum::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Datum::Object(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{:?}:{}", key, value)?;
                }
                f.write_str("}")
            }
            Datum::Opaque(label) => f.write_str(label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_key_order() {
        let datum = Datum::from(json!({"zeta": 1, "alpha": [true, null]}));
        let keys: Vec<&String> = datum.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha"]);
        assert_eq!(datum.get("alpha").and_then(|a| a.get("0")), Some(&Datum::Bool(true)));
    }

    #[test]
    fn test_serialize_lossy_values() {
        let datum = Datum::Array(vec![
            Datum::Undefined,
            Datum::Number(3.0),
            Datum::Number(f64::NAN),
            Datum::Opaque("[Function: f]".into()),
        ]);
        assert_eq!(
            serde_json::to_string(&datum).unwrap(),
            r#"[null,3,null,"[Function: f]"]"#
        );
    }

    #[test]
    fn test_display() {
        let datum = Datum::from(json!({"name": "Ada", "tags": [1, 2.5]}));
        assert_eq!(datum.to_string(), r#"{"name":"Ada","tags":[1,2.5]}"#);
        assert_eq!(Datum::Undefined.to_string(), "undefined");
    }

    #[test]
    fn test_deserialize_through_serde() {
        let datum: Datum = serde_json::from_str(r#"{"a": [1, "x"]}"#).unwrap();
        assert_eq!(datum.get("a").and_then(|a| a.get("1")), Some(&Datum::from("x")));
    }
}
