//! Turning learner code into callable functions
//!
//! The submission is compiled as the body of a function and run in a fresh
//! scope. Afterwards the target function is looked up among the bindings the
//! body left behind; when it is missing, every known helper that is bound is
//! collected instead so tests can pick one by name.

use indexmap::IndexMap;

use crate::ast::Program;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::parser::parse;
use crate::runtime::{BodyOutcome, Runtime, Value};

/// What running a submission produced
pub enum Extracted {
    /// The target binding, or the value of a top-level `return`
    Single(Value),
    /// Known helper functions found in the body scope, by name
    Functions(IndexMap<String, Value>),
}

/// A compiled submission ready to be instantiated in a runtime
#[derive(Debug)]
pub struct ExecutionContext {
    program: Program,
    target: String,
    known_functions: Vec<String>,
}

impl ExecutionContext {
    /// Compile `code`; syntax errors surface here
    pub fn new(code: &str, function_name: Option<&str>, config: &EngineConfig) -> Result<Self> {
        let program = parse(code)?;
        let target = function_name
            .filter(|name| !name.is_empty())
            .unwrap_or(&config.default_function)
            .to_string();
        Ok(Self {
            program,
            target,
            known_functions: config.known_functions.clone(),
        })
    }

    /// Name looked up after the body ran
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Run the body in `runtime` and extract the function(s) under test
    ///
    /// Errors thrown by the body propagate unchanged.
    pub fn instantiate(&self, runtime: &mut Runtime) -> Result<Extracted> {
        let bindings = match runtime.run_body(&self.program)? {
            BodyOutcome::Returned(value) => return Ok(Extracted::Single(value)),
            BodyOutcome::Completed(bindings) => bindings,
        };

        let resolve = |name: &str| {
            bindings
                .get(name)
                .or_else(|| runtime.get_global(name))
                .filter(|value| !value.is_undefined())
        };

        if let Some(value) = resolve(&self.target) {
            return Ok(Extracted::Single(value));
        }

        let functions = self
            .known_functions
            .iter()
            .filter_map(|name| resolve(name).map(|value| (name.clone(), value)))
            .collect();
        Ok(Extracted::Functions(functions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(code: &str, function_name: Option<&str>) -> Extracted {
        let config = EngineConfig::default();
        let context = ExecutionContext::new(code, function_name, &config).unwrap();
        context.instantiate(&mut Runtime::new()).unwrap()
    }

    #[test]
    fn test_default_target() {
        let code = "function processUsers(users) { return users.length; }";
        assert!(matches!(extract(code, None), Extracted::Single(v) if v.is_callable()));
    }

    #[test]
    fn test_named_target_with_const_arrow() {
        let code = "const double = (x) => x * 2;";
        assert!(matches!(extract(code, Some("double")), Extracted::Single(v) if v.is_callable()));
    }

    #[test]
    fn test_known_functions_map() {
        let code = "function formatName(u) { return u; }\nfunction getInitials(u) { return u; }";
        match extract(code, Some("getInitials")) {
            Extracted::Single(_) => {}
            Extracted::Functions(_) => panic!("bound target should be returned directly"),
        }
        match extract(code, None) {
            Extracted::Functions(map) => {
                let names: Vec<&String> = map.keys().collect();
                assert_eq!(names, ["formatName", "getInitials"]);
            }
            Extracted::Single(_) => panic!("expected function map"),
        }
    }

    #[test]
    fn test_top_level_return_wins() {
        let code = "function processUsers() {}\nreturn 7;";
        assert!(matches!(extract(code, None), Extracted::Single(Value::Number(n)) if n == 7.0));
    }

    #[test]
    fn test_unassigned_var_is_unbound() {
        let code = "var processUsers;";
        assert!(matches!(extract(code, None), Extracted::Functions(map) if map.is_empty()));
    }

    #[test]
    fn test_syntax_error_surfaces_at_build() {
        let config = EngineConfig::default();
        let err = ExecutionContext::new("let = ;", None, &config).unwrap_err();
        assert!(err.is_syntax_error());
    }

    #[test]
    fn test_body_errors_propagate() {
        let config = EngineConfig::default();
        let context = ExecutionContext::new("throw new Error('setup failed')", None, &config)
            .unwrap();
        let err = context.instantiate(&mut Runtime::new()).err().unwrap();
        assert_eq!(err.message(), "setup failed");
    }
}
