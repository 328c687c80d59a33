//! Error types for the kata engine

use std::fmt;
use thiserror::Error;

/// Source location in learner code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
    /// Byte offset in source
    pub offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Format a source snippet with a caret under the offending column
pub fn format_error_context(source: &str, location: &SourceLocation) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let line_idx = (location.line.saturating_sub(1)) as usize;

    if line_idx >= lines.len() {
        return String::new();
    }

    let width = format!("{}", location.line + 1).len().max(3);
    let mut out = String::new();

    if line_idx > 0 {
        out.push_str(&format!(
            "{:>width$} | {}\n",
            location.line - 1,
            lines[line_idx - 1],
            width = width
        ));
    }
    out.push_str(&format!(
        "{:>width$} | {}\n",
        location.line,
        lines[line_idx],
        width = width
    ));
    out.push_str(&format!(
        "{:>width$} | {}^\n",
        "",
        " ".repeat(location.column.saturating_sub(1) as usize),
        width = width
    ));

    out
}

/// Main error type for kata
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid token or character
    #[error("SyntaxError: {message} at {location}{}", if source_context.is_empty() { String::new() } else { format!("\n{}", source_context) })]
    LexerError {
        message: String,
        location: SourceLocation,
        source_context: String,
    },

    /// Invalid syntax
    #[error("SyntaxError: {message} at {location}{}", if source_context.is_empty() { String::new() } else { format!("\n{}", source_context) })]
    ParseError {
        message: String,
        location: SourceLocation,
        source_context: String,
    },

    /// An error object escaped learner code (TypeError, user `throw new Error`, ...)
    #[error("{kind}: {message}")]
    RuntimeError { kind: ErrorKind, message: String },

    /// A non-error value was thrown and never caught
    #[error("Uncaught {0}")]
    Uncaught(String),

    /// Resource limit exceeded while running learner code
    #[error("ResourceLimitError: {kind}: {message}")]
    ResourceLimitError {
        kind: ResourceLimitKind,
        message: String,
    },

    /// Execution was stopped from outside through the interrupt flag
    #[error("Execution interrupted")]
    Interrupted,

    /// Invalid engine configuration
    #[error("ConfigError: {0}")]
    ConfigError(String),

    /// Engine bug
    #[error("InternalError: {0}")]
    InternalError(String),

    #[error("IOError: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("JSONError: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },
}

/// Resource limit kinds enforced by the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLimitKind {
    /// Execution time limit exceeded
    TimeLimit,
    /// Operation count limit exceeded
    OperationLimit,
}

impl fmt::Display for ResourceLimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceLimitKind::TimeLimit => write!(f, "TimeLimit"),
            ResourceLimitKind::OperationLimit => write!(f, "OperationLimit"),
        }
    }
}

/// JavaScript error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum ErrorKind {
    /// Wrong type for an operation
    TypeError,
    /// Undeclared or uninitialized binding
    ReferenceError,
    /// Value out of range (including stack overflow)
    RangeError,
    /// Invalid syntax detected at runtime (`JSON.parse`, `new RegExp`)
    SyntaxError,
    /// Plain `Error` and user-named errors
    GenericError,
}

impl ErrorKind {
    /// Constructor name for this kind
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::GenericError => "Error",
        }
    }

    /// Map an error constructor name back to a kind; unknown names are generic
    pub fn from_name(name: &str) -> Self {
        match name {
            "TypeError" => ErrorKind::TypeError,
            "ReferenceError" => ErrorKind::ReferenceError,
            "RangeError" => ErrorKind::RangeError,
            "SyntaxError" => ErrorKind::SyntaxError,
            _ => ErrorKind::GenericError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Error {
    /// Create a lexer error with source context
    pub fn lexer_error_with_context(
        message: impl Into<String>,
        location: SourceLocation,
        source: &str,
    ) -> Self {
        Error::LexerError {
            message: message.into(),
            source_context: format_error_context(source, &location),
            location,
        }
    }

    /// Create a parse error with source context
    pub fn parse_error_with_context(
        message: impl Into<String>,
        location: SourceLocation,
        source: &str,
    ) -> Self {
        Error::ParseError {
            message: message.into(),
            source_context: format_error_context(source, &location),
            location,
        }
    }

    pub fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind,
            message: message.into(),
        }
    }

    /// Create a TypeError
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::TypeError, message)
    }

    /// Create a ReferenceError
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::ReferenceError, message)
    }

    /// Create a RangeError
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::RangeError, message)
    }

    /// Create a time limit exceeded error
    pub fn time_limit_exceeded(elapsed_ms: u64, limit_ms: u64) -> Self {
        Error::ResourceLimitError {
            kind: ResourceLimitKind::TimeLimit,
            message: format!(
                "Execution time limit exceeded: {}ms elapsed, limit was {}ms",
                elapsed_ms, limit_ms
            ),
        }
    }

    /// Create an operation limit exceeded error
    pub fn operation_limit_exceeded(ops: u64, limit: u64) -> Self {
        Error::ResourceLimitError {
            kind: ResourceLimitKind::OperationLimit,
            message: format!(
                "Operation limit exceeded: {} operations executed, limit was {}",
                ops, limit
            ),
        }
    }

    /// True for lexer and parser failures
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, Error::LexerError { .. } | Error::ParseError { .. })
    }

    /// Short, user-facing message, the equivalent of reading `error.message`
    ///
    /// Thrown `Error` objects yield their message verbatim, thrown plain values
    /// their string form, and syntax errors the parser message with its location.
    pub fn message(&self) -> String {
        match self {
            Error::LexerError {
                message, location, ..
            }
            | Error::ParseError {
                message, location, ..
            } => format!("{} at {}", message, location),
            Error::RuntimeError { message, .. } => message.clone(),
            Error::Uncaught(value) => value.clone(),
            Error::ResourceLimitError { message, .. } => message.clone(),
            Error::ConfigError(message) | Error::InternalError(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for kata
pub type Result<T> = std::result::Result<T, Error>;

/// Standardized error message templates following engine conventions
pub mod messages {
    pub const NOT_A_FUNCTION: &str = "is not a function";
    pub const NOT_A_CONSTRUCTOR: &str = "is not a constructor";
    pub const NOT_ITERABLE: &str = "is not iterable";
    pub const IS_NOT_DEFINED: &str = "is not defined";
    pub const CONST_ASSIGNMENT: &str = "Assignment to constant variable.";
    pub const MAXIMUM_CALL_STACK: &str = "Maximum call stack size exceeded";
    pub const INVALID_ARRAY_LENGTH: &str = "Invalid array length";
    pub const INVALID_STRING_LENGTH: &str = "Invalid string length";
    pub const UNEXPECTED_END: &str = "Unexpected end of input";
    pub const INVALID_LEFT_HAND_SIDE: &str = "Invalid left-hand side in assignment";

    /// "x is not a function"
    pub fn not_a_function(name: &str) -> String {
        format!("{} {}", name, NOT_A_FUNCTION)
    }

    /// "x is not a constructor"
    pub fn not_a_constructor(name: &str) -> String {
        format!("{} {}", name, NOT_A_CONSTRUCTOR)
    }

    /// "x is not iterable"
    pub fn not_iterable(name: &str) -> String {
        format!("{} {}", name, NOT_ITERABLE)
    }

    /// "x is not defined"
    pub fn not_defined(name: &str) -> String {
        format!("{} {}", name, IS_NOT_DEFINED)
    }

    /// "Cannot access 'x' before initialization"
    pub fn before_initialization(name: &str) -> String {
        format!("Cannot access '{}' before initialization", name)
    }

    /// "Cannot read properties of undefined (reading 'x')"
    pub fn cannot_read_property(prop: &str, of: &str) -> String {
        format!("Cannot read properties of {} (reading '{}')", of, prop)
    }

    /// "Cannot set properties of undefined (setting 'x')"
    pub fn cannot_set_property(prop: &str, of: &str) -> String {
        format!("Cannot set properties of {} (setting '{}')", of, prop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_points_at_column() {
        let source = "let a = 1;\nlet b = ;\nlet c = 3;";
        let loc = SourceLocation {
            line: 2,
            column: 9,
            offset: 19,
        };
        let ctx = format_error_context(source, &loc);
        assert!(ctx.contains("  2 | let b = ;"));
        assert!(ctx.contains("        ^"));
    }

    #[test]
    fn test_message_of_runtime_error_is_bare() {
        let err = Error::type_error("x is not a function");
        assert_eq!(err.message(), "x is not a function");
        assert_eq!(err.to_string(), "TypeError: x is not a function");
    }

    #[test]
    fn test_message_of_uncaught_value() {
        let err = Error::Uncaught("oops".to_string());
        assert_eq!(err.message(), "oops");
    }

    #[test]
    fn test_error_kind_names_round_trip() {
        for kind in [
            ErrorKind::TypeError,
            ErrorKind::ReferenceError,
            ErrorKind::RangeError,
            ErrorKind::SyntaxError,
            ErrorKind::GenericError,
        ] {
            assert_eq!(ErrorKind::from_name(kind.name()), kind);
        }
        assert_eq!(ErrorKind::from_name("ValidationError"), ErrorKind::GenericError);
    }
}
