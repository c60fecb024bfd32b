//! suitest: a suite-based test execution engine.
//!
//! Tests are grouped into suites. A suite owns one shared instance and four
//! kinds of lifecycle hooks; each test records structured assertions and
//! console output while it runs, under a timeout. Whole files run in one
//! process, or fan out across worker processes when several files are given.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Framework**: Source units, the registry and suite/test definitions
//! - **Capture**: Per-test assertion and console scopes
//! - **Executor**: Single tests, the lifecycle state machine and suites
//! - **Orchestrator**: Discovery, in-process runs and worker fan-out
//! - **Report**: The event stream, console output and JUnit XML
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use suitest::report::NullConsumer;
//! use suitest::{Registry, check_eq, executor::SuiteExecutor};
//!
//! #[derive(Default)]
//! struct Arithmetic;
//!
//! let mut registry = Registry::new();
//! registry.suite::<Arithmetic>().test("adds", |_, ctx| async move {
//!     check_eq!(ctx, 2 + 2, 4)?;
//!     Ok(())
//! });
//! registry.init()?;
//!
//! let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
//! let result = runtime.block_on(
//!     SuiteExecutor::new(Arc::new(NullConsumer)).execute_suite(&registry.suites()[0]),
//! );
//! assert_eq!(result.success, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[macro_use]
mod macros;

pub mod capture;
pub mod cli;
pub mod config;
pub mod executor;
pub mod framework;
pub mod orchestrator;
pub mod report;
pub mod result;

// Re-export commonly used types
pub use capture::TestContext;
pub use config::{Config, load_config};
pub use framework::{
    Catalog, Raise, Registry, ShouldThrow, SourceUnit, SuiteBuilder, TestBuilder, TestError,
};
pub use orchestrator::{Orchestrator, RunSummary};
pub use report::{Consumer, Event};
pub use result::{SuiteResult, SuitesResult, TestResult, TestStatus};
