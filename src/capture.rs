//! Capture of assertions and console output during a test.
//!
//! An executor owns one [`AssertionCapture`] and one [`ConsoleCapture`].
//! For each test it opens both scopes and hands the test a [`TestContext`]
//! holding handles to them. Everything the test checks or prints through
//! the context lands in the scopes and ends up in its `TestResult`.

pub mod assertion;
pub mod console;

pub use assertion::{AssertionCapture, AssertionRecorder};
pub use console::{ConsoleCapture, ConsoleHandle, ConsoleWriter, Stream};

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::framework::{SourceLocation, TestError};
use crate::result::{Assertion, ErrorInfo, Operator};

/// Handle given to every test body.
///
/// Console output is captured only when written through [`out`](Self::out),
/// [`err`](Self::err) or the [`stdout`](Self::stdout) and [`stderr`](Self::stderr)
/// writers. A bare `println!` or `eprintln!` goes straight to the process
/// streams and never reaches the test's captured output.
///
/// ```
/// # use suitest::capture::TestContext;
/// # use suitest::framework::TestError;
/// async fn adds(ctx: TestContext) -> Result<(), TestError> {
///     ctx.equal(2 + 2, 4, "sum")?;
///     ctx.out("done");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TestContext {
    test: Arc<str>,
    assertions: AssertionRecorder,
    console: ConsoleHandle,
}

impl TestContext {
    pub fn new(test: impl Into<Arc<str>>, assertions: AssertionRecorder, console: ConsoleHandle) -> Self {
        Self {
            test: test.into(),
            assertions,
            console,
        }
    }

    /// A context bound to no scope. Checks still return their outcome but
    /// nothing is recorded.
    pub fn detached(test: impl Into<Arc<str>>) -> Self {
        Self::new(test, AssertionRecorder::detached(), ConsoleHandle::detached())
    }

    /// The `Class::method` id of the running test.
    pub fn test_id(&self) -> &str {
        &self.test
    }

    /// Starts a check attributed to `location` with the given source text.
    /// Used by the `check*!` macros.
    pub fn check(&self, location: SourceLocation, source: impl Into<String>) -> Check<'_> {
        Check {
            ctx: self,
            location,
            source: source.into(),
        }
    }

    #[track_caller]
    pub fn ok(&self, condition: bool, message: impl Into<String>) -> Result<(), TestError> {
        self.check(SourceLocation::caller(), String::new())
            .ok(condition, message)
    }

    #[track_caller]
    pub fn equal<L, R>(&self, left: L, right: R, message: impl Into<String>) -> Result<(), TestError>
    where
        L: PartialEq<R> + Debug,
        R: Debug,
    {
        self.check(SourceLocation::caller(), String::new())
            .equal(left, right, message)
    }

    #[track_caller]
    pub fn not_equal<L, R>(
        &self,
        left: L,
        right: R,
        message: impl Into<String>,
    ) -> Result<(), TestError>
    where
        L: PartialEq<R> + Debug,
        R: Debug,
    {
        self.check(SourceLocation::caller(), String::new())
            .not_equal(left, right, message)
    }

    /// Passes when `result` is an error.
    #[track_caller]
    pub fn throws<T, E: Display>(
        &self,
        result: Result<T, E>,
        message: impl Into<String>,
    ) -> Result<(), TestError> {
        self.check(SourceLocation::caller(), String::new())
            .throws(result, message)
    }

    /// Records an unconditional failure.
    #[track_caller]
    pub fn fail(&self, message: impl Into<String>) -> Result<(), TestError> {
        self.check(SourceLocation::caller(), String::new()).fail(message)
    }

    /// Appends a line to the test's captured stdout.
    pub fn out(&self, line: impl AsRef<str>) {
        self.console.write(Stream::Stdout, &format!("{}\n", line.as_ref()));
    }

    /// Appends a line to the test's captured stderr.
    pub fn err(&self, line: impl AsRef<str>) {
        self.console.write(Stream::Stderr, &format!("{}\n", line.as_ref()));
    }

    pub fn stdout(&self) -> ConsoleWriter {
        self.console.writer(Stream::Stdout)
    }

    pub fn stderr(&self) -> ConsoleWriter {
        self.console.writer(Stream::Stderr)
    }
}

/// One pending structured check.
pub struct Check<'a> {
    ctx: &'a TestContext,
    location: SourceLocation,
    source: String,
}

impl Check<'_> {
    pub fn ok(self, condition: bool, message: impl Into<String>) -> Result<(), TestError> {
        let source = self.source_or(|| condition.to_string());
        let failure = (!condition).then(|| format!("assertion failed: {}", source));
        self.record(Operator::Ok, source, message.into(), failure)
    }

    pub fn equal<L, R>(self, left: L, right: R, message: impl Into<String>) -> Result<(), TestError>
    where
        L: PartialEq<R> + Debug,
        R: Debug,
    {
        let source = self.source_or(|| format!("{:?} == {:?}", left, right));
        let failure = (left != right).then(|| format!("expected {:?} to equal {:?}", left, right));
        self.record(Operator::Equal, source, message.into(), failure)
    }

    pub fn not_equal<L, R>(
        self,
        left: L,
        right: R,
        message: impl Into<String>,
    ) -> Result<(), TestError>
    where
        L: PartialEq<R> + Debug,
        R: Debug,
    {
        let source = self.source_or(|| format!("{:?} != {:?}", left, right));
        let failure =
            (left == right).then(|| format!("expected {:?} to not equal {:?}", left, right));
        self.record(Operator::NotEqual, source, message.into(), failure)
    }

    pub fn throws<T, E: Display>(
        self,
        result: Result<T, E>,
        message: impl Into<String>,
    ) -> Result<(), TestError> {
        let source = self.source_or(|| "throws".to_string());
        let failure = match result {
            Ok(_) => Some("expected an error to be thrown".to_string()),
            Err(_) => None,
        };
        self.record(Operator::Throws, source, message.into(), failure)
    }

    pub fn fail(self, message: impl Into<String>) -> Result<(), TestError> {
        let message = message.into();
        let source = self.source_or(|| "fail".to_string());
        let failure = if message.is_empty() {
            "failed".to_string()
        } else {
            message.clone()
        };
        self.record(Operator::Fail, source, message, Some(failure))
    }

    fn source_or(&self, render: impl FnOnce() -> String) -> String {
        if self.source.is_empty() {
            render()
        } else {
            self.source.clone()
        }
    }

    fn record(
        self,
        operator: Operator,
        source: String,
        message: String,
        failure: Option<String>,
    ) -> Result<(), TestError> {
        let message = match (&failure, message.is_empty()) {
            (Some(detail), true) => detail.clone(),
            _ => message,
        };
        let assertion = Assertion {
            file: self.location.file,
            line: self.location.line,
            operator,
            source,
            message,
            error: failure.map(|detail| ErrorInfo {
                kind: "AssertionError".to_string(),
                message: detail,
            }),
        };
        let passed = assertion.passed();
        self.ctx.assertions.record(assertion.clone());
        if passed {
            Ok(())
        } else {
            Err(TestError::Assertion(Box::new(assertion)))
        }
    }
}
