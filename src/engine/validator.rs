//! Static checks run before any learner code executes

use serde::Serialize;

use crate::parser::parse;

/// Result of validating a submission without running it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl Validation {
    fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    fn invalid(message: String) -> Self {
        Self {
            is_valid: false,
            error: Some(message),
        }
    }
}

/// Parse `code` as a function body and check that `function_name`, when
/// given, appears somewhere in the source text
///
/// The name check is a substring test, so a name that only occurs inside a
/// comment or string still passes.
pub fn validate_code(code: &str, function_name: Option<&str>) -> Validation {
    if let Err(err) = parse(code) {
        return Validation::invalid(format!("Syntax error: {}", err.message()));
    }
    match function_name.filter(|name| !name.is_empty()) {
        Some(name) if !code.contains(name) => {
            Validation::invalid(format!("Function {} not found in code", name))
        }
        _ => Validation::valid(),
    }
}
