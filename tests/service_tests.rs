//! Test service lifecycle and concurrency guard

mod common;
use common::case;
use kata::service::{
    RunOptions, TestCompleted, TestFailed, TestObserver, TestRequest, TestService, TestStarted,
    ALREADY_RUNNING,
};
use kata::EngineConfig;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
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

    fn on_error(&self, event: &TestFailed<'_>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("error:{}", event.error));
    }
}

mod lifecycle {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_events_for_a_passing_run() {
        let recorder = Arc::new(Recorder::default());
        let service = TestService::new(EngineConfig::default()).with_observer(recorder.clone());
        let request = TestRequest::new(
            "function double(n) { return n * 2; }",
            vec![
                case("one", Some("double"), vec![json!(1)], json!(2)),
                case("two", Some("double"), vec![json!(2)], json!(4)),
            ],
        );

        let outcome = service.execute(&request);
        assert!(outcome.all_passed());
        assert_eq!(recorder.events(), vec!["started:2", "completed:true"]);
        assert!(!service.is_running());
    }

    #[test]
    fn test_validation_failure_completes_without_success() {
        let recorder = Arc::new(Recorder::default());
        let service = TestService::new(EngineConfig::default()).with_observer(recorder.clone());
        let request = TestRequest::new(
            "function double(n) { return n * 2",
            vec![case("one", Some("double"), vec![json!(1)], json!(2))],
        );

        let outcome = service.execute(&request);
        assert!(outcome.is_error());
        assert_eq!(recorder.events(), vec!["started:1", "completed:false"]);
    }

    #[test]
    fn test_rejections_emit_nothing() {
        let recorder = Arc::new(Recorder::default());
        let service = TestService::new(EngineConfig::default()).with_observer(recorder.clone());

        let empty = service.execute(&TestRequest::new("", vec![case("t", None, vec![], json!(1))]));
        assert_eq!(empty.error_message(), Some("No code provided for testing"));

        let no_cases = service.execute(&TestRequest::new("function processUsers() {}", vec![]));
        assert_eq!(
            no_cases.error_message(),
            Some("No test cases available for this problem")
        );
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_request_options_override_config() {
        let service = TestService::new(EngineConfig::default());
        let request = TestRequest::new(
            "function processUsers() { while (true) {} }",
            vec![case("spin", None, vec![], json!(null))],
        )
        .with_options(RunOptions {
            timeout: Some(Duration::from_millis(150)),
            validate_syntax: Some(false),
        });

        let outcome = service.execute(&request);
        let report = outcome.report().unwrap();
        assert_eq!(
            report.results[0].error.as_deref(),
            Some("Test execution timed out after 150ms")
        );
        assert_eq!(service.status().timeout_ms, 5000);
    }
}

mod concurrency {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_overlapping_run_is_rejected() {
        let config = EngineConfig::default().with_timeout(Duration::from_millis(1500));
        let service = Arc::new(TestService::new(config));

        let busy = {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service.execute(&TestRequest::new(
                    "function processUsers() { while (true) {} }",
                    vec![case("spin", None, vec![], json!(null))],
                ))
            })
        };

        let deadline = Instant::now() + Duration::from_secs(1);
        while !service.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(service.is_running());

        let rejected = service.execute(&TestRequest::new(
            "function processUsers() { return 1; }",
            vec![case("t", None, vec![], json!(1))],
        ));
        assert_eq!(rejected.error_message(), Some(ALREADY_RUNNING));

        let first = busy.join().unwrap();
        assert_eq!(first.report().unwrap().results[0].name, "Timeout");
        assert!(!service.is_running());

        let after = service.execute(&TestRequest::new(
            "function processUsers() { return 1; }",
            vec![case("t", None, vec![], json!(1))],
        ));
        assert!(after.all_passed());
    }
}
