//! Config files and the command-line front end

use kata::{EngineConfig, Error};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::Duration;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn kata(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kata"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run kata binary")
}

const SOLUTION: &str = r#"
function formatName(fullName) {
    return fullName.split(' ').map(n => n.charAt(0).toUpperCase() + n.slice(1)).join(' ');
}
"#;

const TESTS: &str = r#"{
  "testCases": [
    { "name": "two words", "functionName": "formatName", "input": ["ada lovelace"], "expected": "Ada Lovelace" },
    { "name": "one word", "functionName": "formatName", "input": ["kata"], "expected": "Kata" }
  ]
}"#;

mod config_files {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "kata.json",
            r#"{ "timeout": 1200, "defaultFunction": "solve", "maxOperations": 100000 }"#,
        );
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(1200));
        assert_eq!(config.default_function, "solve");
        assert_eq!(config.max_operations, Some(100_000));
        assert!(config.validate_syntax);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = EngineConfig::from_file(dir.path().join("absent.json")).unwrap_err();
        assert!(err.message().starts_with("cannot read"), "{}", err);
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "zero.json", r#"{ "timeout": 0 }"#);
        let err = EngineConfig::from_file(&path).unwrap_err();
        assert_eq!(err.message(), "timeout must be greater than zero");
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.json", "{ timeout: ");
        let err = EngineConfig::from_file(&path).unwrap_err();
        assert!(err.message().starts_with("invalid config"), "{}", err);
    }
}

mod cli {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_passing_submission() {
        let dir = TempDir::new().unwrap();
        let code = write(&dir, "solution.js", SOLUTION);
        let tests = write(&dir, "tests.json", TESTS);

        let output = kata(&["run", code.to_str().unwrap(), tests.to_str().unwrap()]);
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(output.status.success(), "{}", stdout);
        assert!(stdout.contains("✓ two words"));
        assert!(stdout.contains("2/2 tests passed"));
    }

    #[test]
    fn test_run_json_output_and_failure_exit() {
        let dir = TempDir::new().unwrap();
        let code = write(&dir, "solution.js", "function formatName(s) { return s; }");
        let tests = write(&dir, "tests.json", TESTS);

        let output = kata(&["run", code.to_str().unwrap(), tests.to_str().unwrap(), "--json"]);
        assert_eq!(output.status.code(), Some(1));
        let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(outcome["passedCount"], 0);
        assert_eq!(outcome["totalCount"], 2);
        assert_eq!(outcome["results"][0]["actual"], "ada lovelace");
    }

    #[test]
    fn test_run_with_bare_array_and_timeout() {
        let dir = TempDir::new().unwrap();
        let code = write(&dir, "spin.js", "function processUsers() { for (;;) {} }");
        let tests = write(&dir, "tests.json", r#"[{ "name": "spins", "expected": 1 }]"#);

        let output = kata(&[
            "run",
            code.to_str().unwrap(),
            tests.to_str().unwrap(),
            "--timeout-ms",
            "200",
            "--json",
        ]);
        assert_eq!(output.status.code(), Some(1));
        let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(outcome["results"][0]["name"], "Timeout");
        assert_eq!(
            outcome["results"][0]["error"],
            "Test execution timed out after 200ms"
        );
    }

    #[test]
    fn test_check_reports_missing_function() {
        let dir = TempDir::new().unwrap();
        let code = write(&dir, "solution.js", SOLUTION);

        let ok = kata(&["check", code.to_str().unwrap(), "--function", "formatName"]);
        assert!(ok.status.success());

        let missing = kata(&["check", code.to_str().unwrap(), "-f", "getInitials"]);
        assert_eq!(missing.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&missing.stderr)
            .contains("Function getInitials not found in code"));
    }

    #[test]
    fn test_eval_prints_console_and_value() {
        let output = kata(&["eval", "console.log('hi'); [1, 2].map(x => x * 3)"]);
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hi\n[ 3, 6 ]\n");
    }

    #[test]
    fn test_unreadable_input_exits_with_two() {
        let output = kata(&["run", "/nonexistent/code.js", "/nonexistent/tests.json"]);
        assert_eq!(output.status.code(), Some(2));
        assert!(String::from_utf8_lossy(&output.stderr).contains("cannot read"));
    }
}
