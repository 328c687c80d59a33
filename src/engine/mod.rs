//! Test execution engine
//!
//! The pipeline for one submission:
//!
//! ```text
//! code + cases → validate → run_all (worker thread, deadline)
//!              → run_one per case → deep_equal → aggregate → Outcome
//! ```
//!
//! [`TestEngine`] holds nothing but its [`EngineConfig`]; every case gets a
//! fresh runtime, so state never leaks between cases or submissions.

pub mod compare;
pub mod context;
pub mod results;
pub mod runner;
pub mod types;
pub mod validator;

pub use compare::deep_equal;
pub use context::{ExecutionContext, Extracted};
pub use results::{aggregate_results, format_error, process_test_result, UNKNOWN_ERROR};
pub use runner::{run_all, run_one};
pub use types::{AggregatedReport, Outcome, ResultKind, TestCase, TestResult, TestSuite};
pub use validator::{validate_code, Validation};

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{EngineConfig, DEFAULT_TIMEOUT};

/// Rejection for an empty submission
pub const NO_CODE: &str = "No code provided";

/// Rejection for a problem without test cases
pub const NO_TEST_CASES: &str = "No test cases available for this problem";

/// Runs submissions against test cases
#[derive(Debug, Clone, Default)]
pub struct TestEngine {
    config: EngineConfig,
}

impl TestEngine {
    /// A zero timeout would time out every batch before it starts; it falls
    /// back to [`DEFAULT_TIMEOUT`]
    pub fn new(mut config: EngineConfig) -> Self {
        config.timeout = usable_timeout(config.timeout);
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = usable_timeout(timeout);
    }

    pub fn set_syntax_validation(&mut self, enabled: bool) {
        self.config.validate_syntax = enabled;
    }

    /// Run `code` against `test_cases`
    ///
    /// Input problems and static validation failures come back as
    /// [`Outcome::Error`]; everything that happens while tests run is
    /// reported per test inside the [`AggregatedReport`].
    #[tracing::instrument(skip_all, fields(cases = test_cases.len()))]
    pub fn execute(&self, code: &str, test_cases: &[TestCase]) -> Outcome {
        if code.is_empty() {
            return Outcome::error(NO_CODE);
        }
        if test_cases.is_empty() {
            return Outcome::error(NO_TEST_CASES);
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.validate_and_run(code, test_cases))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = results::format_panic(payload.as_ref());
                warn!(error = %message, "test engine panicked");
                Outcome::error(message)
            }
        }
    }

    fn validate_and_run(&self, code: &str, test_cases: &[TestCase]) -> Outcome {
        if self.config.validate_syntax {
            // Parsing recurses too, so it gets the worker's stack
            let job = {
                let code = code.to_string();
                let target = test_cases[0].target().map(str::to_string);
                move || validate_code(&code, target.as_deref())
            };
            let validation = match runner::with_worker_stack("kata-validate", job) {
                Ok(validation) => validation,
                Err(message) => return Outcome::error(message),
            };
            if let Some(error) = validation.error {
                info!(%error, "submission rejected");
                return Outcome::error(error);
            }
        }

        let report = aggregate_results(run_all(code, test_cases, &self.config));
        info!(
            passed = report.passed_count,
            total = report.total_count,
            "submission finished"
        );
        Outcome::Report(report)
    }
}

fn usable_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        warn!("zero timeout requested, using the default");
        DEFAULT_TIMEOUT
    } else {
        timeout
    }
}

/// Build an engine from a configuration
pub fn create_test_engine(config: EngineConfig) -> TestEngine {
    TestEngine::new(config)
}

/// One-shot convenience: build an engine and run a submission
pub fn run_tests(code: &str, test_cases: &[TestCase], config: EngineConfig) -> Outcome {
    create_test_engine(config).execute(code, test_cases)
}
