//! Prelude module for convenient imports
//!
//! ```no_run
//! use kata::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let engine = TestEngine::new(EngineConfig::default());
//!     let outcome = engine.execute("return (x) => x;", &[TestCase::new("id", 1).with_input(vec![1.into()])]);
//!     println!("{}", serde_json::to_string(&outcome)?);
//!     Ok(())
//! }
//! ```

// Engine
pub use crate::engine::{
    deep_equal, run_all, run_one, validate_code, AggregatedReport, Outcome, ResultKind, TestCase,
    TestEngine, TestResult,
};

// Data and configuration
pub use crate::config::EngineConfig;
pub use crate::datum::Datum;

// Interpreter
pub use crate::runtime::{ResourceLimits, Runtime, Value};

// Service
pub use crate::service::{TestObserver, TestRequest, TestService};

// Error handling
pub use crate::error::{Error, ErrorKind, Result};
