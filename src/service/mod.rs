//! Test service with lifecycle observers
//!
//! [`TestService`] wraps a [`TestEngine`] for hosts that want to hear about
//! each run (progress displays, persistence of attempts, timers). Observers
//! are registered on the service itself; there is no global registry. The
//! service runs one submission at a time and rejects overlapping requests.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::{results, Outcome, TestCase, TestEngine, NO_TEST_CASES};

/// Rejection while another submission is still running
pub const ALREADY_RUNNING: &str = "Test execution already in progress";

/// Rejection for an empty submission
pub const NO_CODE_FOR_TESTING: &str = "No code provided for testing";

/// Per-request overrides of the engine configuration
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    pub validate_syntax: Option<bool>,
}

/// A submission to run
#[derive(Debug, Clone)]
pub struct TestRequest {
    pub code: String,
    pub test_cases: Vec<TestCase>,
    pub options: RunOptions,
}

impl TestRequest {
    pub fn new(code: impl Into<String>, test_cases: Vec<TestCase>) -> Self {
        Self {
            code: code.into(),
            test_cases,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }
}

/// Emitted before the engine starts
#[derive(Debug, Clone)]
pub struct TestStarted<'a> {
    pub code: &'a str,
    pub test_count: usize,
    pub timestamp: SystemTime,
}

/// Emitted after the engine returned
#[derive(Debug, Clone)]
pub struct TestCompleted<'a> {
    pub code: &'a str,
    pub outcome: &'a Outcome,
    /// False when the outcome is a rejection rather than a report
    pub success: bool,
    pub timestamp: SystemTime,
}

/// Emitted when the run itself failed
#[derive(Debug, Clone)]
pub struct TestFailed<'a> {
    pub code: &'a str,
    pub error: &'a str,
    pub timestamp: SystemTime,
}

/// Receives run lifecycle events; every method defaults to doing nothing
pub trait TestObserver: Send + Sync {
    fn on_started(&self, _event: &TestStarted<'_>) {}

    fn on_completed(&self, _event: &TestCompleted<'_>) {}

    fn on_error(&self, _event: &TestFailed<'_>) {}
}

/// Snapshot of the service for status displays
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub is_running: bool,
    pub timeout_ms: u64,
    pub validate_syntax: bool,
}

/// Clears the running flag when a run ends, including by panic
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs submissions through an engine and notifies observers
pub struct TestService {
    config: EngineConfig,
    observers: Vec<Arc<dyn TestObserver>>,
    running: AtomicBool,
}

impl TestService {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            observers: Vec::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TestObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn subscribe(&mut self, observer: Arc<dyn TestObserver>) {
        self.observers.push(observer);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            is_running: self.is_running(),
            timeout_ms: self.config.timeout.as_millis() as u64,
            validate_syntax: self.config.validate_syntax,
        }
    }

    /// Run a submission unless one is already in flight
    pub fn execute(&self, request: &TestRequest) -> Outcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("test execution already in progress");
            return Outcome::error(ALREADY_RUNNING);
        }
        let _guard = RunningGuard(&self.running);
        self.run(request)
    }

    fn run(&self, request: &TestRequest) -> Outcome {
        if request.code.is_empty() {
            return Outcome::error(NO_CODE_FOR_TESTING);
        }
        if request.test_cases.is_empty() {
            return Outcome::error(NO_TEST_CASES);
        }

        let code = request.code.as_str();
        self.notify(|observer| {
            observer.on_started(&TestStarted {
                code,
                test_count: request.test_cases.len(),
                timestamp: SystemTime::now(),
            })
        });

        let engine = TestEngine::new(self.effective_config(&request.options));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            engine.execute(code, &request.test_cases)
        }));

        match outcome {
            Ok(outcome) => {
                debug!(success = !outcome.is_error(), "notifying completion");
                self.notify(|observer| {
                    observer.on_completed(&TestCompleted {
                        code,
                        outcome: &outcome,
                        success: !outcome.is_error(),
                        timestamp: SystemTime::now(),
                    })
                });
                outcome
            }
            Err(payload) => {
                let error = results::format_panic(payload.as_ref());
                self.notify(|observer| {
                    observer.on_error(&TestFailed {
                        code,
                        error: &error,
                        timestamp: SystemTime::now(),
                    })
                });
                Outcome::error(error)
            }
        }
    }

    fn effective_config(&self, options: &RunOptions) -> EngineConfig {
        let mut config = self.config.clone();
        if let Some(timeout) = options.timeout {
            config.timeout = timeout;
        }
        if let Some(validate) = options.validate_syntax {
            config.validate_syntax = validate;
        }
        config
    }

    fn notify(&self, event: impl Fn(&dyn TestObserver)) {
        for observer in &self.observers {
            event(observer.as_ref());
        }
    }
}

impl Default for TestService {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Datum;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl TestObserver for Recorder {
        fn on_started(&self, event: &TestStarted<'_>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("started:{}", event.test_count));
        }

        fn on_completed(&self, event: &TestCompleted<'_>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("completed:{}", event.success));
        }
    }

    #[test]
    fn test_observers_see_lifecycle() {
        let recorder = Arc::new(Recorder::default());
        let service = TestService::default().with_observer(recorder.clone());
        let request = TestRequest::new(
            "function processUsers() { return 1; }",
            vec![TestCase::new("one", 1)],
        );
        assert!(service.execute(&request).all_passed());
        assert_eq!(
            *recorder.events.lock().unwrap(),
            ["started:1", "completed:true"]
        );
        assert!(!service.is_running());
    }

    #[test]
    fn test_rejections_skip_events() {
        let recorder = Arc::new(Recorder::default());
        let service = TestService::default().with_observer(recorder.clone());
        let outcome = service.execute(&TestRequest::new("", vec![TestCase::new("t", Datum::Null)]));
        assert_eq!(outcome.error_message(), Some(NO_CODE_FOR_TESTING));
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_options_override_config() {
        let service = TestService::default();
        let config = service.effective_config(&RunOptions {
            timeout: Some(Duration::from_millis(10)),
            validate_syntax: Some(false),
        });
        assert_eq!(config.timeout, Duration::from_millis(10));
        assert!(!config.validate_syntax);
        assert_eq!(service.status().timeout_ms, 5000);
    }
}
