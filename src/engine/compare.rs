//! Structural equality between actual and expected values

use crate::datum::Datum;

/// Deep structural equality with JavaScript strict-equality leaves
///
/// Primitives compare with `===` (so `NaN` never equals itself and `0`
/// equals `-0`). After that, a null or undefined on either side is unequal,
/// arrays compare element-wise in order, and objects compare by key set and
/// per-key values regardless of key order. Anything else, including an array
/// against an object and any opaque value, is unequal.
pub fn deep_equal(a: &Datum, b: &Datum) -> bool {
    if strict_equal(a, b) {
        return true;
    }
    if a.is_nullish() || b.is_nullish() {
        return false;
    }

    match (a, b) {
        (Datum::Array(x), Datum::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| deep_equal(l, r))
        }
        (Datum::Object(x), Datum::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| deep_equal(value, other)))
        }
        _ => false,
    }
}

/// `===` on the primitive variants; containers are never strictly equal
/// because snapshots never share identity
fn strict_equal(a: &Datum, b: &Datum) -> bool {
    match (a, b) {
        (Datum::Undefined, Datum::Undefined) | (Datum::Null, Datum::Null) => true,
        (Datum::Bool(x), Datum::Bool(y)) => x == y,
        (Datum::Number(x), Datum::Number(y)) => x == y,
        (Datum::String(x), Datum::String(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(value: serde_json::Value) -> Datum {
        Datum::from(value)
    }

    #[test]
    fn test_primitives() {
        assert!(deep_equal(&d(json!(1)), &d(json!(1.0))));
        assert!(deep_equal(&Datum::Number(0.0), &Datum::Number(-0.0)));
        assert!(!deep_equal(&Datum::Number(f64::NAN), &Datum::Number(f64::NAN)));
        assert!(!deep_equal(&d(json!("1")), &d(json!(1))));
        assert!(deep_equal(&Datum::Undefined, &Datum::Undefined));
        assert!(!deep_equal(&Datum::Undefined, &Datum::Null));
    }

    #[test]
    fn test_objects_ignore_key_order() {
        assert!(deep_equal(
            &d(json!({"a": 1, "b": [1, 2]})),
            &d(json!({"b": [1, 2], "a": 1}))
        ));
        assert!(!deep_equal(&d(json!({"a": 1})), &d(json!({"a": 1, "b": 2}))));
        assert!(!deep_equal(&d(json!({"a": 1})), &d(json!({"b": 1}))));
    }

    #[test]
    fn test_arrays_respect_order() {
        assert!(deep_equal(&d(json!([1, [2, 3]])), &d(json!([1, [2, 3]]))));
        assert!(!deep_equal(&d(json!([1, 2])), &d(json!([2, 1]))));
        assert!(!deep_equal(&d(json!([1])), &d(json!([1, 1]))));
    }

    #[test]
    fn test_mismatched_shapes() {
        assert!(!deep_equal(&d(json!([])), &d(json!({}))));
        assert!(!deep_equal(&d(json!({})), &Datum::Null));
        let f = Datum::Opaque("[Function: f]".into());
        assert!(!deep_equal(&f, &f.clone()));
    }
}
