//! Shared test helpers for integration tests

use std::thread;

use kata::runtime::{to_datum, Runtime};
use kata::{Datum, TestCase};

/// Stack for helper threads; the evaluator recurses on the host stack
const STACK_SIZE: usize = 64 * 1024 * 1024;

/// Run JavaScript code and snapshot the result
#[allow(dead_code)]
pub fn run_js(code: &str) -> kata::Result<Datum> {
    let code = code.to_string();
    thread::Builder::new()
        .stack_size(STACK_SIZE)
        .spawn(move || {
            let mut runtime = Runtime::new();
            runtime.eval(&code).map(|value| to_datum(&value))
        })
        .expect("spawn evaluator thread")
        .join()
        .expect("evaluator thread panicked")
}

/// Run JavaScript and get the error message, or the value's rendering
#[allow(dead_code)]
pub fn run_js_string(code: &str) -> String {
    match run_js(code) {
        Ok(value) => value.to_string(),
        Err(e) => format!("Error: {}", e.message()),
    }
}

/// Build a datum from JSON
#[allow(dead_code)]
pub fn d(value: serde_json::Value) -> Datum {
    Datum::from(value)
}

/// Test case calling `function_name` with JSON arguments
#[allow(dead_code)]
pub fn case(
    name: &str,
    function_name: Option<&str>,
    input: Vec<serde_json::Value>,
    expected: serde_json::Value,
) -> TestCase {
    let case = TestCase::new(name, d(expected)).with_input(input.into_iter().map(d).collect());
    match function_name {
        Some(f) => case.with_function(f),
        None => case,
    }
}
