//! kata: the code-execution and test-verification engine of a coding
//! practice trainer
//!
//! Learners submit a block of JavaScript; the engine runs it in an isolated
//! interpreter, extracts the function under test, calls it with each test
//! case's inputs and compares the result structurally with the expected
//! value. A batch that runs too long is stopped and reported as a timeout.
//!
//! # Quick Start
//!
//! ```no_run
//! use kata::{run_tests, Datum, EngineConfig, TestCase};
//!
//! let code = "function processUsers(users) { return users.length; }";
//! let cases = vec![TestCase::new("counts users", 2)
//!     .with_input(vec![Datum::Array(vec![Datum::Null, Datum::Null])])];
//!
//! let outcome = run_tests(code, &cases, EngineConfig::default());
//! assert!(outcome.all_passed());
//! ```
//!
//! # Module Overview
//!
//! The pipeline flows: source → [`lexer`] → [`parser`] → [`ast`] →
//! [`runtime`] → [`engine`] → [`Outcome`]
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Interpreter** | [`lexer`], [`parser`], [`ast`], [`runtime`] |
//! | **Testing** | [`engine`], [`datum`], [`service`] |
//! | **Setup** | [`config`], [`Error`] |
#![allow(clippy::new_without_default)]
#![allow(clippy::should_implement_trait)]

pub mod ast;
pub mod config;
pub mod datum;
pub mod engine;
pub mod lexer;
pub mod parser;
pub mod prelude;
pub mod runtime;
pub mod service;

mod error;

pub use config::EngineConfig;
pub use datum::Datum;
pub use engine::{
    create_test_engine, run_tests, AggregatedReport, Outcome, ResultKind, TestCase, TestEngine,
    TestResult,
};
pub use error::{Error, ErrorKind, Result, SourceLocation};
pub use runtime::{Runtime, Value};

/// kata version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
