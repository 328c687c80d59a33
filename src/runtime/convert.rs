//! Conversion between runtime values and [`Datum`] snapshots

use std::rc::Rc;

use indexmap::IndexMap;

use super::value::*;
use crate::datum::Datum;

/// Nesting depth past which a snapshot stops descending
pub const MAX_SNAPSHOT_DEPTH: usize = 512;

/// Take an owned snapshot of a runtime value
///
/// Functions become [`Datum::Opaque`] with their inspected label, as do
/// circular references and anything nested deeper than
/// [`MAX_SNAPSHOT_DEPTH`]. Objects without enumerable data of their own
/// (`Set`, `Map`, errors, regular expressions) snapshot as empty objects.
pub fn to_datum(value: &Value) -> Datum {
    snapshot(value, &mut Vec::new())
}

fn snapshot(value: &Value, stack: &mut Vec<ObjectRef>) -> Datum {
    let obj = match value {
        Value::Undefined => return Datum::Undefined,
        Value::Null => return Datum::Null,
        Value::Boolean(b) => return Datum::Bool(*b),
        Value::Number(n) => return Datum::Number(*n),
        Value::String(s) => return Datum::String(s.clone()),
        Value::Object(obj) => obj,
    };

    if obj.borrow().is_callable() {
        return Datum::Opaque(inspect(value));
    }
    if stack.iter().any(|seen| Rc::ptr_eq(seen, obj)) {
        return Datum::Opaque("[Circular]".to_string());
    }
    if stack.len() >= MAX_SNAPSHOT_DEPTH {
        return Datum::Opaque("[Nested]".to_string());
    }

    stack.push(obj.clone());
    let o = obj.borrow();
    let datum = match &o.kind {
        ObjectKind::Array(elements) => {
            Datum::Array(elements.iter().map(|e| snapshot(e, stack)).collect())
        }
        ObjectKind::Ordinary => {
            let mut map = IndexMap::with_capacity(o.properties.len());
            for key in o.own_keys() {
                let item = o.get_own(&key).unwrap_or(Value::Undefined);
                let item = snapshot(&item, stack);
                map.insert(key, item);
            }
            Datum::Object(map)
        }
        _ => Datum::Object(IndexMap::new()),
    };
    drop(o);
    stack.pop();
    datum
}

/// Build a fresh runtime value from a snapshot
pub fn from_datum(datum: &Datum) -> Value {
    match datum {
        Datum::Undefined => Value::Undefined,
        Datum::Null => Value::Null,
        Datum::Bool(b) => Value::Boolean(*b),
        Datum::Number(n) => Value::Number(*n),
        Datum::String(s) | Datum::Opaque(s) => Value::String(s.clone()),
        Datum::Array(items) => Value::new_array(items.iter().map(from_datum).collect()),
        Datum::Object(map) => {
            let mut object = Object::new(ObjectKind::Ordinary);
            for (key, item) in map {
                object.properties.insert(key.clone(), from_datum(item));
            }
            Value::from_object(object)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_preserves_structure() {
        let datum = Datum::from(json!({"users": [{"name": "Ada", "age": 36}], "ok": true}));
        assert_eq!(to_datum(&from_datum(&datum)), datum);
    }

    #[test]
    fn test_cycle_is_opaque() {
        let array = Value::new_array(vec![Value::Number(1.0)]);
        if let Value::Object(obj) = &array {
            if let ObjectKind::Array(elements) = &mut obj.borrow_mut().kind {
                elements.push(array.clone());
            }
        }
        assert_eq!(
            to_datum(&array),
            Datum::Array(vec![Datum::Number(1.0), Datum::Opaque("[Circular]".into())])
        );
        // break the cycle so the test does not leak
        if let Value::Object(obj) = &array {
            if let ObjectKind::Array(elements) = &mut obj.borrow_mut().kind {
                elements.clear();
            }
        }
    }

    #[test]
    fn test_deep_nesting_is_cut_off() {
        let mut value = Value::Null;
        for _ in 0..(MAX_SNAPSHOT_DEPTH + 10) {
            value = Value::new_array(vec![value]);
        }
        let mut datum = to_datum(&value);
        let mut depth = 0;
        while let Datum::Array(mut items) = datum {
            datum = items.remove(0);
            depth += 1;
        }
        assert_eq!(depth, MAX_SNAPSHOT_DEPTH);
        assert_eq!(datum, Datum::Opaque("[Nested]".into()));
    }

    #[test]
    fn test_collections_snapshot_as_empty_objects() {
        let set = Value::from_object(Object::new(ObjectKind::Set(vec![Value::Number(1.0)])));
        assert_eq!(to_datum(&set), Datum::Object(IndexMap::new()));
    }
}
