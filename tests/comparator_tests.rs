//! Structural comparison of returned values against expectations

mod common;
use common::{case, d};
use kata::engine::deep_equal;
use kata::{Datum, TestCase, TestEngine};
use pretty_assertions::assert_eq;
use serde_json::json;

/// Run `body` as `processUsers` and report whether it matched `expected`
fn matches(body: &str, expected: Datum) -> bool {
    let code = format!("function processUsers() {{ {} }}", body);
    let outcome = TestEngine::default().execute(&code, &[TestCase::new("compare", expected)]);
    let result = &outcome.report().expect("report").results[0];
    assert_eq!(result.error, None, "{}", body);
    result.passed
}

mod datums {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_key_order_is_ignored() {
        assert!(deep_equal(
            &d(json!({"a": 1, "b": [1, 2]})),
            &d(json!({"b": [1, 2], "a": 1}))
        ));
    }

    #[test]
    fn test_array_order_matters() {
        assert!(!deep_equal(&d(json!([1, 2])), &d(json!([2, 1]))));
        assert!(!deep_equal(&d(json!([1, 2])), &d(json!([1, 2, 3]))));
    }

    #[test]
    fn test_extra_key_is_unequal() {
        assert!(!deep_equal(&d(json!({"a": 1})), &d(json!({"a": 1, "b": 2}))));
        assert!(!deep_equal(&d(json!({"a": 1, "b": 2})), &d(json!({"a": 1}))));
    }

    #[test]
    fn test_nullish_values() {
        assert!(deep_equal(&Datum::Null, &Datum::Null));
        assert!(deep_equal(&Datum::Undefined, &Datum::Undefined));
        assert!(!deep_equal(&Datum::Null, &Datum::Undefined));
        assert!(!deep_equal(&Datum::Null, &d(json!({}))));
        assert!(!deep_equal(&d(json!(0)), &Datum::Null));
    }

    #[test]
    fn test_array_against_object() {
        assert!(!deep_equal(&d(json!([])), &d(json!({}))));
        assert!(!deep_equal(&d(json!({"0": 1})), &d(json!([1]))));
    }

    #[test]
    fn test_opaque_values_never_match() {
        let label = Datum::Opaque("[Function: f]".to_string());
        assert!(!deep_equal(&label, &label.clone()));
        assert!(!deep_equal(&label, &d(json!("[Function: f]"))));
    }
}

mod returned_values {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_numbers_compare_strictly() {
        assert!(matches("return 1.0", d(json!(1))));
        assert!(matches("return -0", d(json!(0))));
        assert!(!matches("return '5'", d(json!(5))));
        assert!(!matches("return NaN", Datum::Number(f64::NAN)));
    }

    #[test]
    fn test_object_built_in_a_different_order() {
        assert!(matches(
            "const o = {}; o.y = 2; o.x = 1; return o",
            d(json!({"x": 1, "y": 2}))
        ));
    }

    #[test]
    fn test_undefined_property_matches_undefined() {
        let mut expected = indexmap::IndexMap::new();
        expected.insert("value".to_string(), Datum::Undefined);
        assert!(matches("return { value: undefined }", Datum::Object(expected)));
        assert!(!matches("return { value: undefined }", d(json!({"value": null}))));
    }

    #[test]
    fn test_missing_return_is_undefined() {
        assert!(matches("const unused = 1;", Datum::Undefined));
        assert!(!matches("const unused = 1;", Datum::Null));
    }

    #[test]
    fn test_collections_snapshot_as_empty_objects() {
        assert!(matches("return new Map([['a', 1]])", d(json!({}))));
        assert!(matches("return new Set([1])", d(json!({}))));
    }

    #[test]
    fn test_functions_never_match() {
        assert!(!matches("return function f() {}", d(json!("[Function: f]"))));
    }

    #[test]
    fn test_nested_structures() {
        assert!(matches(
            "return { users: [{ name: 'Ana', tags: ['a'] }], total: 1 }",
            d(json!({"total": 1, "users": [{"tags": ["a"], "name": "Ana"}]}))
        ));
        assert!(!matches(
            "return { users: [{ name: 'Ana', tags: ['a'] }], total: 1 }",
            d(json!({"total": 1, "users": [{"tags": ["b"], "name": "Ana"}]}))
        ));
    }

    #[test]
    fn test_expected_is_reported_back() {
        let outcome = TestEngine::default().execute(
            "function processUsers() { return [3, 2, 1]; }",
            &[case("order", None, vec![], json!([1, 2, 3]))],
        );
        let result = &outcome.report().unwrap().results[0];
        assert!(!result.passed);
        assert_eq!(result.expected, d(json!([1, 2, 3])));
        assert_eq!(result.actual, Some(d(json!([3, 2, 1]))));
    }
}
