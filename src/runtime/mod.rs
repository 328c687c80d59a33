//! Runtime environment for kata
//!
//! This module provides the execution environment for learner code: the
//! tree-walking interpreter, value types, built-in functions and the
//! resource limits that keep a runaway submission in check.

mod builtins;
mod convert;
mod environment;
mod interpreter;
mod methods;
mod value;

pub use convert::{from_datum, to_datum, MAX_SNAPSHOT_DEPTH};
pub use interpreter::{
    Bindings, BodyOutcome, ConsoleLevel, Interpreter, DEFAULT_STACK_DEPTH, MAX_ARRAY_LENGTH,
};
pub use value::{inspect, number_to_string, Object, ObjectKind, Value};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::ast::Program;
use crate::error::Result;

/// Resource limits for sandboxed execution
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum execution time in milliseconds
    pub time_limit_ms: Option<u64>,
    /// Maximum number of evaluation steps
    pub operation_limit: Option<u64>,
    /// Maximum call stack depth
    pub stack_depth_limit: Option<usize>,
    /// How often to check limits (every N operations)
    pub check_interval: u64,
}

impl ResourceLimits {
    /// Create new resource limits with default check interval
    pub fn new() -> Self {
        Self {
            time_limit_ms: None,
            operation_limit: None,
            stack_depth_limit: None,
            check_interval: 1000,
        }
    }

    /// Set time limit in milliseconds
    pub fn with_time_limit(mut self, ms: u64) -> Self {
        self.time_limit_ms = Some(ms);
        self
    }

    /// Set operation limit
    pub fn with_operation_limit(mut self, ops: u64) -> Self {
        self.operation_limit = Some(ops);
        self
    }

    /// Set stack depth limit
    pub fn with_stack_depth_limit(mut self, depth: usize) -> Self {
        self.stack_depth_limit = Some(depth);
        self
    }

    /// Set how many operations pass between limit checks
    pub fn with_check_interval(mut self, interval: u64) -> Self {
        self.check_interval = interval.max(1);
        self
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::new()
    }
}

/// The kata runtime
pub struct Runtime {
    interp: Interpreter,
}

impl Runtime {
    /// Create a new runtime with no limits beyond the default call depth
    pub fn new() -> Self {
        Self::with_limits(ResourceLimits::new())
    }

    /// Create a runtime with resource limits
    pub fn with_limits(limits: ResourceLimits) -> Self {
        Self {
            interp: Interpreter::new(limits),
        }
    }

    /// Stop execution cooperatively once `flag` is raised
    pub fn set_interrupt(&mut self, flag: Arc<AtomicBool>) {
        self.interp.set_interrupt(flag);
    }

    /// Evaluate source code, returning the value of a top-level `return`
    /// or else the completion value of the last expression statement
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        let program = crate::parser::parse(source)?;
        match self.run_body(&program)? {
            BodyOutcome::Returned(value) => Ok(value),
            BodyOutcome::Completed(_) => Ok(self.interp.completion_value()),
        }
    }

    /// Run a parsed program as the body of a function
    pub fn run_body(&mut self, program: &Program) -> Result<BodyOutcome> {
        self.interp
            .run_program(program)
            .map_err(|interrupt| self.interp.into_error(interrupt))
    }

    /// Call a function value
    pub fn call(&mut self, function: &Value, args: &[Value]) -> Result<Value> {
        self.interp
            .call(function, Value::Undefined, args)
            .map_err(|interrupt| self.interp.into_error(interrupt))
    }

    /// Value of a global binding
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.interp.global().borrow().get_own(name)
    }

    /// Read a property the way `target[key]` would
    pub fn get_property(&mut self, target: &Value, key: &str) -> Result<Value> {
        self.interp
            .get(target, key)
            .map_err(|interrupt| self.interp.into_error(interrupt))
    }

    /// Lines written through `console.*`, in order
    pub fn console_output(&self) -> &[String] {
        self.interp.console_output()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_eval_completion_value() {
        let mut rt = Runtime::new();
        let value = rt.eval("const xs = [1, 2, 3]; xs.map(x => x * 2).join('-')").unwrap();
        assert_eq!(value.to_js_string(), "2-4-6");
    }

    #[test]
    fn test_eval_top_level_return() {
        let mut rt = Runtime::new();
        let value = rt.eval("return 40 + 2; 'unreachable'").unwrap();
        assert!(matches!(value, Value::Number(n) if n == 42.0));
    }

    #[test]
    fn test_call_extracted_function() {
        let mut rt = Runtime::new();
        let program = crate::parser::parse("function add(a, b) { return a + b; }").unwrap();
        let BodyOutcome::Completed(bindings) = rt.run_body(&program).unwrap() else {
            panic!("expected completed body");
        };
        let add = bindings.get("add").unwrap();
        let sum = rt
            .call(&add, &[Value::Number(2.0), Value::Number(3.0)])
            .unwrap();
        assert!(matches!(sum, Value::Number(n) if n == 5.0));
    }

    #[test]
    fn test_uncaught_error_message() {
        let mut rt = Runtime::new();
        let err = rt.eval("throw new TypeError('bad input')").unwrap_err();
        assert_eq!(err.to_string(), "TypeError: bad input");
        assert_eq!(err.message(), "bad input");
    }

    #[test]
    fn test_operation_limit() {
        let limits = ResourceLimits::new()
            .with_operation_limit(10_000)
            .with_check_interval(100);
        let mut rt = Runtime::with_limits(limits);
        let err = rt.eval("while (true) {}").unwrap_err();
        assert!(matches!(err, Error::ResourceLimitError { .. }));
    }

    #[test]
    fn test_console_capture() {
        let mut rt = Runtime::new();
        rt.eval("console.log('hi', 1, [2]); console.warn({ a: 1 })").unwrap();
        assert_eq!(rt.console_output(), ["hi 1 [ 2 ]", "{ a: 1 }"]);
    }
}
