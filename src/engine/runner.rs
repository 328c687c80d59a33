//! Running test cases
//!
//! [`run_one`] executes a single case on a big-stack worker and joins it.
//! [`run_all`] moves a whole batch onto a dedicated worker thread and waits
//! for it with a deadline; when the deadline passes it raises the worker's interrupt
//! flag, which the interpreter polls, and reports a timeout sentinel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use super::context::{ExecutionContext, Extracted};
use super::results::{format_error, format_panic, process_test_result};
use super::types::{TestCase, TestResult};
use crate::config::EngineConfig;
use crate::datum::Datum;
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::{from_datum, to_datum, Runtime, Value};

/// Stack reserved for the batch worker; the evaluator recurses on the host
/// stack, so deep learner recursion needs headroom
pub const WORKER_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Run one test case and wait for it
///
/// Never fails: every error becomes a failed [`TestResult`]. The case runs
/// on a [`WORKER_STACK_SIZE`] thread, so recursion up to the call-depth
/// limit is safe from any caller. There is no deadline; use [`run_all`]
/// for that.
pub fn run_one(code: &str, test_case: &TestCase, config: &EngineConfig) -> TestResult {
    let job = {
        let code = code.to_string();
        let test_case = test_case.clone();
        let config = config.clone();
        move || run_case(&code, &test_case, &config, None)
    };
    with_worker_stack("kata-case", job).unwrap_or_else(|message| {
        warn!(test = %test_case.name, error = %message, "test case worker failed");
        process_test_result(
            test_case.name.clone(),
            test_case.expected.clone(),
            None,
            Some(message),
        )
    })
}

/// Run `job` on a thread with [`WORKER_STACK_SIZE`] of stack and join it
///
/// A failed spawn or a panic comes back as an error message.
pub(crate) fn with_worker_stack<T, F>(name: &str, job: F) -> std::result::Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(job)
        .map_err(|e| format!("Failed to start test execution: {}", e))?;
    handle.join().map_err(|payload| format_panic(payload.as_ref()))
}

fn run_case(
    code: &str,
    test_case: &TestCase,
    config: &EngineConfig,
    interrupt: Option<&Arc<AtomicBool>>,
) -> TestResult {
    let started = Instant::now();
    let result = match execute(code, test_case, config, interrupt) {
        Ok(actual) => process_test_result(
            test_case.name.clone(),
            test_case.expected.clone(),
            Some(actual),
            None,
        ),
        Err(err) => process_test_result(
            test_case.name.clone(),
            test_case.expected.clone(),
            None,
            Some(format_error(&err)),
        ),
    };
    debug!(
        test = %test_case.name,
        passed = result.passed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "test case finished"
    );
    result
}

fn execute(
    code: &str,
    test_case: &TestCase,
    config: &EngineConfig,
    interrupt: Option<&Arc<AtomicBool>>,
) -> Result<Datum> {
    let context = ExecutionContext::new(code, test_case.target(), config)?;
    let mut runtime = Runtime::with_limits(config.resource_limits());
    if let Some(flag) = interrupt {
        runtime.set_interrupt(flag.clone());
    }

    let extracted = context.instantiate(&mut runtime)?;
    let target = resolve_target(&mut runtime, extracted, test_case.target())?;

    let args: Vec<Value> = test_case.input.iter().map(from_datum).collect();
    let actual = runtime.call(&target, &args)?;
    Ok(to_datum(&actual))
}

/// Pick the function to call out of what the submission produced
///
/// With a function name and an object (or function map) the name is looked
/// up as a property; otherwise the produced value itself must be callable.
fn resolve_target(
    runtime: &mut Runtime,
    extracted: Extracted,
    function_name: Option<&str>,
) -> Result<Value> {
    let not_found = |name: &str| Error::runtime(ErrorKind::GenericError, format!("Function {} not found", name));

    match (extracted, function_name) {
        (Extracted::Functions(map), Some(name)) => map
            .get(name)
            .filter(|value| value.to_boolean())
            .cloned()
            .ok_or_else(|| not_found(name)),
        (Extracted::Single(value), Some(name))
            if matches!(value, Value::Null)
                || (matches!(value, Value::Object(_)) && !value.is_callable()) =>
        {
            let property = runtime.get_property(&value, name)?;
            if property.to_boolean() {
                Ok(property)
            } else {
                Err(not_found(name))
            }
        }
        (Extracted::Single(value), _) if value.is_callable() => Ok(value),
        _ => Err(Error::runtime(
            ErrorKind::GenericError,
            "No valid function found in user code",
        )),
    }
}

fn run_sequence(
    code: &str,
    test_cases: &[TestCase],
    config: &EngineConfig,
    interrupt: &Arc<AtomicBool>,
) -> Vec<TestResult> {
    test_cases
        .iter()
        .map(|case| run_case(code, case, config, Some(interrupt)))
        .collect()
}

/// Run every case in order on a worker thread, bounded by `config.timeout`
///
/// Returns one result per case, or a single sentinel result when the batch
/// timed out or the worker could not finish.
#[tracing::instrument(skip(code, test_cases, config), fields(cases = test_cases.len(), timeout_ms = config.timeout.as_millis() as u64))]
pub fn run_all(code: &str, test_cases: &[TestCase], config: &EngineConfig) -> Vec<TestResult> {
    let timeout = config.timeout;
    let interrupt = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let worker = {
        let code = code.to_string();
        let test_cases = test_cases.to_vec();
        let config = config.clone();
        let interrupt = interrupt.clone();
        thread::Builder::new()
            .name("kata-batch".to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || {
                let results = run_sequence(&code, &test_cases, &config, &interrupt);
                // The receiver is gone once the batch timed out
                let _ = tx.send(results);
            })
    };

    let handle = match worker {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "failed to spawn batch worker");
            return vec![TestResult::execution_error(format!(
                "Failed to start test execution: {}",
                e
            ))];
        }
    };

    match rx.recv_timeout(timeout) {
        Ok(results) => results,
        Err(RecvTimeoutError::Timeout) => {
            interrupt.store(true, Ordering::Relaxed);
            warn!(timeout_ms = timeout.as_millis() as u64, "test batch timed out");
            vec![TestResult::timeout(timeout)]
        }
        Err(RecvTimeoutError::Disconnected) => {
            let message = match handle.join() {
                Err(payload) => format_panic(payload.as_ref()),
                Ok(()) => "Test execution stopped unexpectedly".to_string(),
            };
            warn!(error = %message, "batch worker failed");
            vec![TestResult::execution_error(message)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::ResultKind;
    use serde_json::json;
    use std::time::Duration;

    fn case(expected: serde_json::Value, input: Vec<serde_json::Value>) -> TestCase {
        TestCase::new("case", Datum::from(expected))
            .with_input(input.into_iter().map(Datum::from).collect())
    }

    #[test]
    fn test_run_one_passes() {
        let code = "function processUsers(users) { return users.map(u => u.name); }";
        let result = run_one(
            code,
            &case(json!(["Ada"]), vec![json!([{"name": "Ada"}])]),
            &EngineConfig::default(),
        );
        assert!(result.passed, "{:?}", result);
        assert_eq!(result.error, None);
    }

    #[test]
    fn test_run_one_reports_thrown_message() {
        let code = "function processUsers() { throw new Error('nope'); }";
        let result = run_one(code, &case(json!(null), vec![]), &EngineConfig::default());
        assert!(!result.passed);
        assert_eq!(result.actual, None);
        assert_eq!(result.error.as_deref(), Some("nope"));
    }

    #[test]
    fn test_missing_named_function() {
        let code = "function formatName(u) { return u; }";
        let test_case = case(json!(1), vec![]).with_function("getInitials");
        let result = run_one(code, &test_case, &EngineConfig::default());
        assert_eq!(result.error.as_deref(), Some("Function getInitials not found"));
    }

    #[test]
    fn test_no_callable_target() {
        let result = run_one("const x = 1;", &case(json!(1), vec![]), &EngineConfig::default());
        assert_eq!(
            result.error.as_deref(),
            Some("No valid function found in user code")
        );
    }

    #[test]
    fn test_returned_object_is_searched_by_name() {
        let code = "return { triple: (n) => n * 3 };";
        let test_case = case(json!(9), vec![json!(3)]).with_function("triple");
        assert!(run_one(code, &test_case, &EngineConfig::default()).passed);
    }

    #[test]
    fn test_run_one_survives_deep_recursion() {
        // 900 frames would overflow a default 2 MiB test thread
        let code = "function sum(n) { return n === 0 ? 0 : n + sum(n - 1); }";
        let test_case = case(json!(405450), vec![json!(900)]).with_function("sum");
        let result = run_one(code, &test_case, &EngineConfig::default());
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_worker_stack_reports_panics() {
        let outcome: std::result::Result<(), String> =
            with_worker_stack("kata-test", || panic!("boom"));
        assert_eq!(outcome, Err("boom".to_string()));
    }

    #[test]
    fn test_run_all_keeps_order() {
        let code = "function processUsers(n) { return n + 1; }";
        let cases = vec![case(json!(2), vec![json!(1)]), case(json!(5), vec![json!(3)])];
        let results = run_all(code, &cases, &EngineConfig::default());
        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert_eq!(results[1].actual, Some(Datum::from(4)));
    }

    #[test]
    fn test_run_all_times_out() {
        let config = EngineConfig::default().with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let results = run_all("while (true) {}", &[case(json!(1), vec![])], &config);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ResultKind::Timeout);
        assert_eq!(
            results[0].error.as_deref(),
            Some("Test execution timed out after 200ms")
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
