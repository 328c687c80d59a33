//! Building and summarizing test results

use std::any::Any;

use super::compare::deep_equal;
use super::types::{AggregatedReport, ResultKind, TestResult};
use crate::datum::Datum;
use crate::error::Error;

/// Fallback when an error carries no message at all
pub const UNKNOWN_ERROR: &str = "Unknown error occurred";

/// Build the result of one test case
///
/// A result with an error never passes; otherwise `actual` (treated as
/// `null` when missing) is compared structurally with `expected`.
pub fn process_test_result(
    name: impl Into<String>,
    expected: Datum,
    actual: Option<Datum>,
    error: Option<String>,
) -> TestResult {
    let passed = error.is_none() && deep_equal(actual.as_ref().unwrap_or(&Datum::Null), &expected);
    TestResult {
        name: name.into(),
        passed,
        expected,
        actual,
        error,
        kind: ResultKind::Case,
    }
}

/// Count passes over a list of results
pub fn aggregate_results(results: Vec<TestResult>) -> AggregatedReport {
    let passed_count = results.iter().filter(|r| r.passed).count();
    let total_count = results.len();
    AggregatedReport {
        results,
        passed_count,
        total_count,
        all_passed: passed_count == total_count,
    }
}

/// User-facing message of an error, never empty
pub fn format_error(error: &Error) -> String {
    non_empty(error.message())
}

/// Message carried by a panic payload
pub fn format_panic(payload: &(dyn Any + Send)) -> String {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::new()
    };
    non_empty(message)
}

fn non_empty(message: String) -> String {
    if message.is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_never_passes() {
        let result = process_test_result(
            "t",
            Datum::Null,
            None,
            Some("boom".to_string()),
        );
        assert!(!result.passed);
        assert_eq!(result.actual, None);
    }

    #[test]
    fn test_missing_actual_compares_as_null() {
        assert!(process_test_result("t", Datum::Null, None, None).passed);
        assert!(!process_test_result("t", Datum::Undefined, None, None).passed);
    }

    #[test]
    fn test_aggregate_counts() {
        let results = vec![
            process_test_result("a", Datum::from(1), Some(Datum::from(1)), None),
            process_test_result("b", Datum::from(1), Some(Datum::from(2)), None),
        ];
        let report = aggregate_results(results);
        assert_eq!(report.passed_count, 1);
        assert_eq!(report.total_count, 2);
        assert!(!report.all_passed);
        assert!(aggregate_results(vec![]).all_passed);
    }

    #[test]
    fn test_format_error() {
        assert_eq!(format_error(&Error::Uncaught(String::new())), UNKNOWN_ERROR);
        assert_eq!(format_error(&Error::type_error("bad")), "bad");
        let payload: Box<dyn Any + Send> = Box::new("worker failed");
        assert_eq!(format_panic(payload.as_ref()), "worker failed");
    }
}
