//! Engine configuration
//!
//! [`EngineConfig`] is plain data with builder-style setters. It serializes
//! as camelCase JSON with the timeout in milliseconds, so a config file looks
//! like:
//!
//! ```json
//! { "timeout": 2000, "validateSyntax": true, "defaultFunction": "solve" }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::runtime::{ResourceLimits, DEFAULT_STACK_DEPTH};

/// Default wall-clock budget for one batch of test cases
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Function extracted when a test case names none
pub const DEFAULT_FUNCTION: &str = "processUsers";

/// Functions collected when the target is not bound, for problems whose
/// tests exercise several helpers
pub const KNOWN_FUNCTIONS: [&str; 5] = [
    "formatName",
    "getInitials",
    "truncateMiddle",
    "analyzeProducts",
    "processUsers",
];

/// Configuration for a [`TestEngine`](crate::engine::TestEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Budget for a whole batch; exceeded batches report a timeout sentinel
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Parse the code and check the target function name before running
    pub validate_syntax: bool,
    /// Target when a test case has no `functionName`
    pub default_function: String,
    /// Names collected into a function map when the target is not bound
    pub known_functions: Vec<String>,
    /// Maximum nesting of calls in learner code
    pub max_call_depth: usize,
    /// Optional cap on evaluation steps per test case
    pub max_operations: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            validate_syntax: true,
            default_function: DEFAULT_FUNCTION.to_string(),
            known_functions: KNOWN_FUNCTIONS.iter().map(|s| s.to_string()).collect(),
            max_call_depth: DEFAULT_STACK_DEPTH,
            max_operations: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_syntax_validation(mut self, enabled: bool) -> Self {
        self.validate_syntax = enabled;
        self
    }

    pub fn with_default_function(mut self, name: impl Into<String>) -> Self {
        self.default_function = name.into();
        self
    }

    pub fn with_known_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_functions = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_operations(mut self, ops: u64) -> Self {
        self.max_operations = Some(ops);
        self
    }

    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::ConfigError(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::ConfigError(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_call_depth == 0 {
            return Err(Error::ConfigError(
                "maxCallDepth must be greater than zero".to_string(),
            ));
        }
        if self.default_function.trim().is_empty() {
            return Err(Error::ConfigError(
                "defaultFunction must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Interpreter limits for one test case
    pub fn resource_limits(&self) -> ResourceLimits {
        let limits = ResourceLimits::new().with_stack_depth_limit(self.max_call_depth);
        match self.max_operations {
            Some(ops) => limits.with_operation_limit(ops),
            None => limits,
        }
    }
}

mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert!(config.validate_syntax);
        assert_eq!(config.default_function, "processUsers");
        assert_eq!(config.known_functions.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{"timeout": 250, "validateSyntax": false}"#)
            .unwrap();
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(!config.validate_syntax);
        assert_eq!(config.max_call_depth, DEFAULT_STACK_DEPTH);
    }

    #[test]
    fn test_serializes_camel_case_millis() {
        let json = serde_json::to_value(EngineConfig::default().with_timeout(Duration::from_secs(2)))
            .unwrap();
        assert_eq!(json["timeout"], 2000);
        assert_eq!(json["defaultFunction"], "processUsers");
        assert_eq!(json["maxOperations"], serde_json::Value::Null);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = EngineConfig::from_json_str(r#"{"timeout": 0}"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_resource_limits() {
        let limits = EngineConfig::default()
            .with_max_call_depth(64)
            .with_max_operations(1_000)
            .resource_limits();
        assert_eq!(limits.stack_depth_limit, Some(64));
        assert_eq!(limits.operation_limit, Some(1_000));
    }
}
