//! Suite and test execution.
//!
//! # Architecture
//!
//! ```text
//! SuiteExecutor::execute_suite
//!     │
//!     ├── PhaseManager::start_all          beforeAll hooks
//!     │   for each test:
//!     ├── PhaseManager::start_each         beforeEach hooks
//!     ├── TestExecutor::execute            capture scopes + guarded run + validation
//!     ├── PhaseManager::end_each           afterEach hooks
//!     └── PhaseManager::end_all            afterAll hooks
//! ```
//!
//! Every test body and hook runs through [`run_guarded`]: it is spawned as
//! its own task and raced against a timeout. A task that loses the race is
//! detached, not aborted, and keeps running in the background.

pub mod phase;
pub mod suite;

pub use phase::{Breakout, PhaseManager, PhaseState};
pub use suite::SuiteExecutor;
pub use test::TestExecutor;

use std::any::Any;
use std::path::Path;
use std::time::Duration;

use crate::framework::{SourceLocation, TestError, TestFuture};
use crate::result::LineRange;

/// Timeout applied when neither the test nor the configuration sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Runs `future` on its own task, waiting at most `limit` for it.
///
/// A panic inside the task is reported as [`TestError::Panicked`]; running
/// out of time as [`TestError::Timeout`].
pub async fn run_guarded(future: TestFuture, limit: Duration) -> Result<(), TestError> {
    let handle = tokio::spawn(future);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => Err(TestError::Panicked {
            message: if join_error.is_panic() {
                panic_message(join_error.into_panic())
            } else {
                "task was cancelled".to_string()
            },
        }),
        Err(_elapsed) => Err(TestError::Timeout),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "test panicked".to_string(),
        },
    }
}

/// Picks where to attribute an error: its own location when it has a
/// meaningful one, otherwise the declaration it came from.
pub(crate) fn attribute(error: &TestError, file: &Path, lines: LineRange) -> SourceLocation {
    error
        .location()
        .filter(|location| location.line > 1)
        .unwrap_or_else(|| SourceLocation::new(file, lines.start))
}
