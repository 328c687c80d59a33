//! Test cases, results and reports

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::datum::Datum;

/// Name of the sentinel result reported when a batch exceeds its budget
pub const TIMEOUT_RESULT_NAME: &str = "Timeout";

/// Name of the sentinel result reported when the batch itself failed
pub const EXECUTION_ERROR_RESULT_NAME: &str = "Execution Error";

/// One declarative test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub name: String,
    /// Function to call; the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    /// Positional arguments
    #[serde(default)]
    pub input: Vec<Datum>,
    /// An omitted `expected` means `undefined`
    #[serde(default)]
    pub expected: Datum,
}

impl TestCase {
    pub fn new(name: impl Into<String>, expected: impl Into<Datum>) -> Self {
        Self {
            name: name.into(),
            function_name: None,
            input: Vec::new(),
            expected: expected.into(),
        }
    }

    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    pub fn with_input(mut self, input: Vec<Datum>) -> Self {
        self.input = input;
        self
    }

    /// The function name, treating an empty string as absent
    pub fn target(&self) -> Option<&str> {
        self.function_name.as_deref().filter(|name| !name.is_empty())
    }
}

/// Discriminates ordinary results from the batch-level sentinels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResultKind {
    #[default]
    Case,
    Timeout,
    ExecutionError,
}

/// Outcome of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub expected: Datum,
    /// `None` when execution failed before producing a value
    pub actual: Option<Datum>,
    pub error: Option<String>,
    #[serde(default)]
    pub kind: ResultKind,
}

impl TestResult {
    /// Sentinel for a batch that ran past its budget
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            name: TIMEOUT_RESULT_NAME.to_string(),
            passed: false,
            expected: Datum::Null,
            actual: None,
            error: Some(format!(
                "Test execution timed out after {}ms",
                timeout.as_millis()
            )),
            kind: ResultKind::Timeout,
        }
    }

    /// Sentinel for a batch that could not run to completion
    pub fn execution_error(message: impl Into<String>) -> Self {
        Self {
            name: EXECUTION_ERROR_RESULT_NAME.to_string(),
            passed: false,
            expected: Datum::Null,
            actual: None,
            error: Some(message.into()),
            kind: ResultKind::ExecutionError,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.kind != ResultKind::Case
    }
}

/// Summary of a whole submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedReport {
    pub results: Vec<TestResult>,
    pub passed_count: usize,
    pub total_count: usize,
    pub all_passed: bool,
}

impl fmt::Display for AggregatedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "  Test Results")?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;

        for result in &self.results {
            let icon = match (result.kind, result.passed) {
                (ResultKind::Timeout, _) => "⏱",
                (_, true) => "✓",
                (_, false) => "✗",
            };
            writeln!(f, "  {} {}", icon, result.name)?;
            if result.passed {
                continue;
            }
            match &result.error {
                Some(error) => writeln!(f, "      error:    {}", error)?,
                None => {
                    writeln!(f, "      expected: {}", result.expected)?;
                    if let Some(actual) = &result.actual {
                        writeln!(f, "      actual:   {}", actual)?;
                    }
                }
            }
        }

        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        write!(
            f,
            "  {}/{} tests passed",
            self.passed_count, self.total_count
        )?;
        if self.all_passed {
            write!(f, "  🎉")?;
        }
        writeln!(f)
    }
}

/// What the engine returns for a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Report(AggregatedReport),
    /// The submission was rejected before any test ran
    Error { error: String },
}

impl Outcome {
    pub fn error(message: impl Into<String>) -> Self {
        Outcome::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error { .. })
    }

    pub fn report(&self) -> Option<&AggregatedReport> {
        match self {
            Outcome::Report(report) => Some(report),
            Outcome::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Outcome::Error { error } => Some(error),
            Outcome::Report(_) => None,
        }
    }

    /// True only for a report in which every test passed
    pub fn all_passed(&self) -> bool {
        self.report().is_some_and(|r| r.all_passed)
    }
}

/// Test cases file: a bare array or `{ "testCases": [...] }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TestSuite {
    Cases(Vec<TestCase>),
    Wrapped {
        #[serde(rename = "testCases")]
        test_cases: Vec<TestCase>,
    },
}

impl TestSuite {
    pub fn into_cases(self) -> Vec<TestCase> {
        match self {
            TestSuite::Cases(cases) | TestSuite::Wrapped { test_cases: cases } => cases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_defaults() {
        let case: TestCase = serde_json::from_value(json!({"name": "empty"})).unwrap();
        assert_eq!(case.input, Vec::<Datum>::new());
        assert_eq!(case.expected, Datum::Undefined);
        assert_eq!(case.target(), None);
    }

    #[test]
    fn test_empty_function_name_is_absent() {
        let case = TestCase::new("t", 1).with_function("");
        assert_eq!(case.target(), None);
    }

    #[test]
    fn test_timeout_sentinel() {
        let result = TestResult::timeout(Duration::from_millis(250));
        assert_eq!(result.name, "Timeout");
        assert_eq!(
            result.error.as_deref(),
            Some("Test execution timed out after 250ms")
        );
        assert!(result.is_sentinel());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = Outcome::error("No code provided");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"error": "No code provided"})
        );

        let report = Outcome::Report(AggregatedReport {
            results: vec![],
            passed_count: 0,
            total_count: 0,
            all_passed: true,
        });
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"results": [], "passedCount": 0, "totalCount": 0, "allPassed": true})
        );
    }

    #[test]
    fn test_report_display() {
        let report = AggregatedReport {
            results: vec![
                TestResult {
                    name: "adds".to_string(),
                    passed: false,
                    expected: Datum::from(3),
                    actual: Some(Datum::from(4)),
                    error: None,
                    kind: ResultKind::Case,
                },
                TestResult::timeout(Duration::from_millis(10)),
            ],
            passed_count: 0,
            total_count: 2,
            all_passed: false,
        };
        let text = report.to_string();
        assert!(text.contains("✗ adds"));
        assert!(text.contains("expected: 3"));
        assert!(text.contains("actual:   4"));
        assert!(text.contains("⏱ Timeout"));
        assert!(text.contains("0/2 tests passed"));
    }

    #[test]
    fn test_suite_shapes() {
        let bare: TestSuite = serde_json::from_str(r#"[{"name": "a", "expected": 1}]"#).unwrap();
        let wrapped: TestSuite =
            serde_json::from_str(r#"{"testCases": [{"name": "a", "expected": 1}]}"#).unwrap();
        assert_eq!(bare.into_cases(), wrapped.into_cases());
    }
}
