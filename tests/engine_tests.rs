//! Integration tests for the test engine

mod common;
use common::{case, d};
use kata::engine::run_one;
use kata::{run_tests, Datum, EngineConfig, Outcome, ResultKind, TestEngine};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::{Duration, Instant};

fn report(outcome: &Outcome) -> &kata::AggregatedReport {
    outcome
        .report()
        .unwrap_or_else(|| panic!("expected a report, got {:?}", outcome))
}

mod scenarios {
    use super::*;
    use pretty_assertions::assert_eq;

    const ADD: &str = "function add(a,b){return a+b;}";

    #[test]
    fn test_passing_case() {
        let outcome = TestEngine::default().execute(
            ADD,
            &[case("basic", Some("add"), vec![json!(2), json!(3)], json!(5))],
        );
        let result = &report(&outcome).results[0];
        assert_eq!(result.name, "basic");
        assert!(result.passed);
        assert_eq!(result.actual, Some(Datum::from(5)));
        assert_eq!(result.error, None);
        assert_eq!(
            serde_json::to_value(result).unwrap(),
            json!({"name": "basic", "passed": true, "expected": 5, "actual": 5, "error": null, "kind": "case"})
        );
    }

    #[test]
    fn test_wrong_answer() {
        let outcome = TestEngine::default().execute(
            "function add(a,b){return a-b;}",
            &[case("basic", Some("add"), vec![json!(2), json!(3)], json!(5))],
        );
        let result = &report(&outcome).results[0];
        assert!(!result.passed);
        assert_eq!(result.actual, Some(Datum::from(-1)));
        assert_eq!(result.error, None);
    }

    #[test]
    fn test_syntax_error_without_validation() {
        let config = EngineConfig::default().with_syntax_validation(false);
        let outcome = run_tests(
            "function add(a,b){return a+b",
            &[case("basic", Some("add"), vec![json!(2), json!(3)], json!(5))],
            config,
        );
        let result = &report(&outcome).results[0];
        assert!(!result.passed);
        assert_eq!(result.actual, None);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_syntax_error_with_validation() {
        let outcome = TestEngine::default().execute(
            "function add(a,b){return a+b",
            &[case("basic", Some("add"), vec![json!(2), json!(3)], json!(5))],
        );
        assert!(outcome.error_message().unwrap().starts_with("Syntax error: "));
    }

    #[test]
    fn test_missing_function() {
        let config = EngineConfig::default().with_syntax_validation(false);
        let outcome = run_tests(
            ADD,
            &[case("t", Some("missing"), vec![json!(1)], json!(1))],
            config,
        );
        let result = &report(&outcome).results[0];
        assert!(!result.passed);
        assert_eq!(result.error.as_deref(), Some("Function missing not found"));
    }

    #[test]
    fn test_missing_function_fails_validation() {
        let outcome = TestEngine::default()
            .execute(ADD, &[case("t", Some("missing"), vec![json!(1)], json!(1))]);
        assert_eq!(
            outcome.error_message(),
            Some("Function missing not found in code")
        );
    }

    #[test]
    fn test_empty_inputs() {
        let engine = TestEngine::default();
        assert_eq!(
            engine.execute("", &[case("t", None, vec![], json!(1))]),
            Outcome::error("No code provided")
        );
        assert_eq!(
            engine.execute(ADD, &[]),
            Outcome::error("No test cases available for this problem")
        );
    }
}

mod curriculum {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_process_users() {
        let code = r#"
            function processUsers(users) {
                users.forEach(user => console.log(user.name));
                const emails = users.map(user => user.email);
                const adults = users.filter(user => user.age > 25);
                return { emails, adults };
            }
        "#;
        let users = json!([
            { "name": "Alice", "email": "alice@example.com", "age": 28 },
            { "name": "Bob", "email": "bob@example.com", "age": 22 }
        ]);
        let cases = vec![
            case(
                "Basic user processing",
                None,
                vec![users],
                json!({
                    "emails": ["alice@example.com", "bob@example.com"],
                    "adults": [{ "name": "Alice", "email": "alice@example.com", "age": 28 }]
                }),
            ),
            case("Empty array", None, vec![json!([])], json!({ "adults": [], "emails": [] })),
        ];
        let outcome = TestEngine::default().execute(code, &cases);
        let report = report(&outcome);
        assert!(report.all_passed, "{}", report);
        assert_eq!(report.passed_count, 2);
    }

    #[test]
    fn test_analyze_products_with_default_parameter() {
        let code = r#"
            function analyzeProducts(products, budget = 100) {
                const totalPrice = products.reduce((sum, p) => sum + p.price, 0);
                const laptop = products.find(p => p.name.toLowerCase().includes('laptop'));
                const hasOutOfStock = products.some(p => !p.inStock);
                const allAffordable = products.every(p => p.price <= budget);
                return { totalPrice, laptop, hasOutOfStock, allAffordable };
            }
        "#;
        let products = json!([
            { "name": "Laptop", "price": 999, "inStock": true },
            { "name": "Mouse", "price": 25, "inStock": false }
        ]);
        let expected = json!({
            "totalPrice": 1024,
            "laptop": { "name": "Laptop", "price": 999, "inStock": true },
            "hasOutOfStock": true,
            "allAffordable": false
        });
        let outcome = TestEngine::default().execute(
            code,
            &[case("analysis", Some("analyzeProducts"), vec![products], expected)],
        );
        assert!(outcome.all_passed(), "{:?}", outcome);
    }

    #[test]
    fn test_multiple_helpers_by_name() {
        let code = r#"
            function formatName(fullName) {
                return fullName.split(' ')
                    .map(name => name.charAt(0).toUpperCase() + name.slice(1))
                    .join(' ');
            }
            function getInitials(fullName) {
                return fullName.split(' ').map(name => name.charAt(0).toUpperCase()).join('');
            }
            const truncateMiddle = (text, max) =>
                text.length <= max ? text : text.slice(0, Math.ceil((max - 3) / 2)) + '...' + text.slice(-Math.floor((max - 3) / 2));
        "#;
        let cases = vec![
            case("format", Some("formatName"), vec![json!("john doe smith")], json!("John Doe Smith")),
            case("initials", Some("getInitials"), vec![json!("john doe smith")], json!("JDS")),
            case("truncate", Some("truncateMiddle"), vec![json!("abcdefghij"), json!(7)], json!("ab...ij")),
        ];
        let outcome = TestEngine::default().execute(code, &cases);
        assert!(outcome.all_passed(), "{}", report(&outcome));
    }

    #[test]
    fn test_regex_text_processing() {
        let code = r#"
            function cleanText(text) { return text.replace(/\s+/g, ' ').trim(); }
            function extractNumbers(text) {
                const matches = text.match(/\d+/g);
                return matches ? matches.map(Number) : [];
            }
        "#;
        let cases = vec![
            case(
                "clean",
                Some("cleanText"),
                vec![json!("Hello  World! This is   a test.")],
                json!("Hello World! This is a test."),
            ),
            case("numbers", Some("extractNumbers"), vec![json!("a1b22c333")], json!([1, 22, 333])),
            case("no numbers", Some("extractNumbers"), vec![json!("none")], json!([])),
        ];
        let outcome = TestEngine::default().execute(code, &cases);
        assert!(outcome.all_passed(), "{}", report(&outcome));
    }
}

mod errors {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_thrown_error_message_is_verbatim() {
        let code = "function processUsers() { throw new RangeError('too many users'); }";
        let outcome = TestEngine::default().execute(code, &[case("t", None, vec![], json!(null))]);
        let result = &report(&outcome).results[0];
        assert_eq!(result.error.as_deref(), Some("too many users"));
        assert_eq!(result.actual, None);
    }

    #[test]
    fn test_thrown_string_uses_its_text() {
        let code = "function processUsers() { throw 'plain failure'; }";
        let outcome = TestEngine::default().execute(code, &[case("t", None, vec![], json!(null))]);
        assert_eq!(
            report(&outcome).results[0].error.as_deref(),
            Some("plain failure")
        );
    }

    #[test]
    fn test_type_error_on_missing_property() {
        let code = "function processUsers(user) { return user.profile.name; }";
        let outcome =
            TestEngine::default().execute(code, &[case("t", None, vec![json!({})], json!(null))]);
        assert_eq!(
            report(&outcome).results[0].error.as_deref(),
            Some("Cannot read properties of undefined (reading 'name')")
        );
    }

    #[test]
    fn test_one_failure_does_not_stop_the_batch() {
        let code = "function processUsers(n) { if (n < 0) throw new Error('negative'); return n * 2; }";
        let cases = vec![
            case("neg", None, vec![json!(-1)], json!(null)),
            case("pos", None, vec![json!(4)], json!(8)),
        ];
        let outcome = TestEngine::default().execute(code, &cases);
        let report = report(&outcome);
        assert_eq!(report.total_count, 2);
        assert_eq!(report.passed_count, 1);
        assert!(report.results[1].passed);
    }

    #[test]
    fn test_state_does_not_leak_between_cases() {
        let code = "let calls = 0; function processUsers() { calls += 1; return calls; }";
        let cases = vec![
            case("first", None, vec![], json!(1)),
            case("second", None, vec![], json!(1)),
        ];
        assert!(TestEngine::default().execute(code, &cases).all_passed());
    }

    #[test]
    fn test_input_is_not_shared_with_expected() {
        let code = "function processUsers(xs) { xs.push(4); return xs; }";
        let outcome = TestEngine::default()
            .execute(code, &[case("t", None, vec![json!([1, 2, 3])], json!([1, 2, 3, 4]))]);
        let result = &report(&outcome).results[0];
        assert!(result.passed);
        assert_eq!(result.expected, d(json!([1, 2, 3, 4])));
    }
}

mod limits {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_infinite_loop_times_out() {
        let mut engine = TestEngine::default();
        engine.set_timeout(Duration::from_millis(300));
        let started = Instant::now();
        let outcome = engine.execute(
            "function processUsers() { while (true) {} }",
            &[case("a", None, vec![], json!(1)), case("b", None, vec![], json!(1))],
        );
        let report = report(&outcome);
        assert_eq!(report.total_count, 1);
        assert_eq!(report.results[0].name, "Timeout");
        assert_eq!(report.results[0].kind, ResultKind::Timeout);
        assert_eq!(
            report.results[0].error.as_deref(),
            Some("Test execution timed out after 300ms")
        );
        assert!(!report.all_passed);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_runaway_recursion_is_a_test_error() {
        let code = "function processUsers(n) { return processUsers(n + 1); }";
        let outcome = TestEngine::default().execute(code, &[case("t", None, vec![json!(0)], json!(0))]);
        assert_eq!(
            report(&outcome).results[0].error.as_deref(),
            Some("Maximum call stack size exceeded")
        );
    }

    #[test]
    fn test_run_one_recursion_from_a_plain_thread() {
        let code = "function sum(n) { return n === 0 ? 0 : n + sum(n - 1); }";
        let result = run_one(
            code,
            &case("deep", Some("sum"), vec![json!(900)], json!(405450)),
            &EngineConfig::default(),
        );
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_nesting_just_under_the_limit_is_accepted() {
        let nested = |depth: usize| {
            format!(
                "function add(a, b) {{ return {}a + b{}; }}",
                "(".repeat(depth),
                ")".repeat(depth)
            )
        };
        let cases = [case("adds", Some("add"), vec![json!(2), json!(3)], json!(5))];

        let outcome = TestEngine::default().execute(&nested(44), &cases);
        assert!(outcome.all_passed(), "{:?}", outcome);

        let outcome = TestEngine::default().execute(&nested(80), &cases);
        let error = outcome.error_message().unwrap();
        assert!(error.starts_with("Syntax error: Code is nested too deeply"), "{}", error);
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let mut engine = TestEngine::default();
        engine.set_timeout(Duration::ZERO);
        assert_eq!(engine.config().timeout, Duration::from_millis(5000));

        let outcome = run_tests(
            "function add(a, b) { return a + b; }",
            &[case("adds", Some("add"), vec![json!(2), json!(3)], json!(5))],
            EngineConfig::default().with_timeout(Duration::ZERO),
        );
        assert!(outcome.all_passed(), "{:?}", outcome);
    }

    #[test]
    fn test_stack_overflow_is_catchable() {
        let code = r#"
            function processUsers() {
                function deep() { return deep(); }
                try { deep(); } catch (e) { return e instanceof RangeError; }
                return false;
            }
        "#;
        let config = EngineConfig::default().with_max_call_depth(200);
        assert!(run_tests(code, &[case("t", None, vec![], json!(true))], config).all_passed());
    }

    #[test]
    fn test_operation_budget() {
        let config = EngineConfig::default().with_max_operations(50_000);
        let code = "function processUsers() { let i = 0; while (true) { i++; } }";
        let outcome = run_tests(code, &[case("t", None, vec![], json!(null))], config);
        let error = report(&outcome).results[0].error.clone().unwrap();
        assert!(error.starts_with("Operation limit exceeded"), "{}", error);
    }

    #[test]
    fn test_circular_return_value_fails_cleanly() {
        let code = "function processUsers() { const a = { name: 'loop' }; a.self = a; return a; }";
        let outcome = TestEngine::default()
            .execute(code, &[case("t", None, vec![], json!({"name": "loop"}))]);
        let result = &report(&outcome).results[0];
        assert!(!result.passed);
        assert_eq!(
            result.actual.as_ref().and_then(|a| a.get("self")),
            Some(&Datum::Opaque("[Circular]".to_string()))
        );
    }
}
