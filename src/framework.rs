//! Suite and test definitions.
//!
//! This module holds the registration-time data model: what a suite is,
//! what a test declares about itself, and what a test body may raise.
//!
//! # Architecture
//!
//! ```text
//! SourceUnit::load(&mut Registry)
//!        │
//!        ▼
//! Registry ──suite::<S>()──► SuiteBuilder<S> ──test()/before_each()/..──► SuiteConfig
//!        │                                                                   │
//!        │ init()  (finalize: validate names, settle line ranges)            │
//!        ▼                                                                   ▼
//! classes() ─────────────────────────────────────────────► [TestConfig] + hooks + instance
//! ```
//!
//! `TestConfig` and `SuiteConfig` are immutable once the registry is
//! finalized, with one exception: the suite instance, which is created
//! lazily on first use and then shared by every test and hook of the suite.

pub mod registry;

use std::any::{Any, TypeId};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;

use crate::capture::TestContext;
use crate::result::{Assertion, ErrorInfo, LineRange};

pub use registry::{Catalog, Registry, RegistryError, SourceUnit, SuiteBuilder, TestBuilder};

/// The shared, type-erased suite instance.
pub type SuiteInstance = Arc<dyn Any + Send + Sync>;

/// A boxed test or hook body.
pub type TestFuture = BoxFuture<'static, Result<(), TestError>>;

/// A type-erased test method.
pub type TestFn = Arc<dyn Fn(SuiteInstance, TestContext) -> TestFuture + Send + Sync>;

/// A type-erased lifecycle hook.
pub type HookFn = Arc<dyn Fn(SuiteInstance) -> TestFuture + Send + Sync>;

type Factory = Arc<dyn Fn() -> SuiteInstance + Send + Sync>;

/// A file and line in the test sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self {
            file: PathBuf::from(location.file()),
            line: location.line(),
        }
    }
}

/// Errors a test body or lifecycle hook can produce.
///
/// A failed structured assertion is [`TestError::Assertion`]; anything else
/// is treated as an uncaught error when reported.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TestError {
    /// A structured comparison failed.
    #[error("{}", .0.message)]
    Assertion(Box<Assertion>),

    /// An error raised by test code.
    #[error("{message}")]
    Thrown {
        kind: String,
        message: String,
        location: Option<SourceLocation>,
    },

    /// The test or hook did not finish within its timeout.
    #[error("Operation timed out")]
    Timeout,

    /// The test or hook panicked.
    #[error("{message}")]
    Panicked { message: String },

    /// The outcome did not match the test's declared expectation.
    #[error("{0}")]
    Expectation(String),
}

impl TestError {
    /// Raises a plain error with the given message at the caller's location.
    #[track_caller]
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown {
            kind: "Error".to_string(),
            message: message.into(),
            location: Some(SourceLocation::caller()),
        }
    }

    /// Raises `error`, recording its type name as the error kind.
    #[track_caller]
    pub fn raise<E: std::error::Error + 'static>(error: E) -> Self {
        Self::Thrown {
            kind: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
            location: Some(SourceLocation::caller()),
        }
    }

    /// Returns the error's kind, used for kind-based expectations and reports.
    pub fn kind(&self) -> &str {
        match self {
            TestError::Assertion(_) => "AssertionError",
            TestError::Thrown { kind, .. } => kind,
            TestError::Timeout => "TimeoutError",
            TestError::Panicked { .. } => "Panic",
            TestError::Expectation(_) => "ExpectationError",
        }
    }

    /// Best-known source location of the error, if any.
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            TestError::Assertion(assertion) => Some(SourceLocation {
                file: assertion.file.clone(),
                line: assertion.line,
            }),
            TestError::Thrown { location, .. } => location.clone(),
            _ => None,
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, TestError::Assertion(_))
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Converts foreign errors into [`TestError`] so `?` works inside tests.
///
/// ```
/// use suitest::framework::{Raise, TestError};
///
/// fn parse(input: &str) -> Result<i32, TestError> {
///     input.parse::<i32>().raise()
/// }
///
/// assert!(parse("12").is_ok());
/// assert!(parse("twelve").unwrap_err().kind().ends_with("ParseIntError"));
/// ```
pub trait Raise<T> {
    fn raise(self) -> Result<T, TestError>;
}

impl<T, E: std::error::Error + 'static> Raise<T> for Result<T, E> {
    #[track_caller]
    fn raise(self) -> Result<T, TestError> {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(TestError::raise(error)),
        }
    }
}

/// What a test declares about the error it is expected to raise.
#[derive(Clone)]
pub enum ShouldThrow {
    /// `true`: any error passes. `false`: behaves as if nothing was declared.
    Flag(bool),
    /// The error message must contain this substring.
    Contains(String),
    /// The error message must match this pattern.
    Matches(Regex),
    /// The error kind must match (full type name or its last path segment).
    Kind(String),
    /// The predicate decides, given the error or its absence.
    Predicate(Arc<dyn Fn(Option<&TestError>) -> bool + Send + Sync>),
}

impl ShouldThrow {
    pub fn any() -> Self {
        Self::Flag(true)
    }

    pub fn containing(needle: impl Into<String>) -> Self {
        Self::Contains(needle.into())
    }

    pub fn matching(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Matches(Regex::new(pattern)?))
    }

    /// Expects an error raised from a value of type `E`.
    pub fn kind<E: 'static>() -> Self {
        Self::Kind(std::any::type_name::<E>().to_string())
    }

    pub fn kind_named(name: impl Into<String>) -> Self {
        Self::Kind(name.into())
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(Option<&TestError>) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Validates an outcome (`None` = returned normally) against this
    /// expectation.
    pub fn validate(&self, outcome: Option<TestError>) -> Result<(), TestError> {
        match (self, outcome) {
            (ShouldThrow::Flag(false), None) => Ok(()),
            (ShouldThrow::Flag(false), Some(error)) => Err(error),
            (ShouldThrow::Flag(true), Some(_)) => Ok(()),
            (ShouldThrow::Flag(true), None) => Err(TestError::Expectation(
                "expected an error to be thrown".to_string(),
            )),
            (ShouldThrow::Contains(needle), Some(error)) => {
                let actual = error.to_string();
                if actual.contains(needle.as_str()) {
                    Ok(())
                } else {
                    Err(TestError::Expectation(format!(
                        "expected error message to contain {:?}, got {:?}",
                        needle, actual
                    )))
                }
            }
            (ShouldThrow::Contains(needle), None) => Err(TestError::Expectation(format!(
                "expected an error containing {:?} to be thrown",
                needle
            ))),
            (ShouldThrow::Matches(pattern), Some(error)) => {
                let actual = error.to_string();
                if pattern.is_match(&actual) {
                    Ok(())
                } else {
                    Err(TestError::Expectation(format!(
                        "expected error message to match /{}/, got {:?}",
                        pattern.as_str(),
                        actual
                    )))
                }
            }
            (ShouldThrow::Matches(pattern), None) => Err(TestError::Expectation(format!(
                "expected an error matching /{}/ to be thrown",
                pattern.as_str()
            ))),
            (ShouldThrow::Kind(expected), Some(error)) => {
                if kind_matches(expected, error.kind()) {
                    Ok(())
                } else {
                    Err(TestError::Expectation(format!(
                        "expected error of kind {}, got {} ({})",
                        expected,
                        error.kind(),
                        error
                    )))
                }
            }
            (ShouldThrow::Kind(expected), None) => Err(TestError::Expectation(format!(
                "expected an error of kind {} to be thrown",
                expected
            ))),
            (ShouldThrow::Predicate(predicate), outcome) => {
                if predicate(outcome.as_ref()) {
                    Ok(())
                } else {
                    Err(TestError::Expectation(match outcome {
                        Some(error) => format!("error rejected by expectation: {}", error),
                        None => "expectation rejected a test that did not throw".to_string(),
                    }))
                }
            }
        }
    }
}

impl fmt::Debug for ShouldThrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShouldThrow::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            ShouldThrow::Contains(needle) => f.debug_tuple("Contains").field(needle).finish(),
            ShouldThrow::Matches(pattern) => {
                f.debug_tuple("Matches").field(&pattern.as_str()).finish()
            }
            ShouldThrow::Kind(kind) => f.debug_tuple("Kind").field(kind).finish(),
            ShouldThrow::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Validates an outcome against an optional expectation.
///
/// With no expectation, a normal return passes and any error fails.
pub fn validate_outcome(
    expectation: Option<&ShouldThrow>,
    outcome: Option<TestError>,
) -> Result<(), TestError> {
    match expectation {
        Some(expectation) => expectation.validate(outcome),
        None => match outcome {
            Some(error) => Err(error),
            None => Ok(()),
        },
    }
}

fn kind_matches(expected: &str, actual: &str) -> bool {
    expected == actual || short_type_name(actual) == expected || short_type_name(expected) == actual
}

/// Strips module paths and generic arguments from a type name.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Stable identity of a suite class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId {
    type_id: TypeId,
    type_name: &'static str,
}

impl ClassId {
    pub fn of<S: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            type_name: std::any::type_name::<S>(),
        }
    }

    /// The unqualified class name.
    pub fn name(&self) -> &'static str {
        short_type_name(self.type_name)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One of the four lifecycle stages of a suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    BeforeAll,
    BeforeEach,
    AfterEach,
    AfterAll,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::BeforeAll => "beforeAll",
            Phase::BeforeEach => "beforeEach",
            Phase::AfterEach => "afterEach",
            Phase::AfterAll => "afterAll",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A registered lifecycle hook listener.
#[derive(Clone)]
pub struct Hook {
    pub location: SourceLocation,
    run: HookFn,
}

impl Hook {
    pub fn new(location: SourceLocation, run: HookFn) -> Self {
        Self { location, run }
    }

    pub(crate) fn invoke(&self, instance: SuiteInstance) -> TestFuture {
        (self.run)(instance)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Declaration of a single test method.
#[derive(Clone)]
pub struct TestConfig {
    pub class: ClassId,
    pub method: String,
    pub description: String,
    pub file: PathBuf,
    pub lines: LineRange,
    pub skip: bool,
    pub should_throw: Option<ShouldThrow>,
    /// Overrides the process-wide default timeout.
    pub timeout: Option<Duration>,
    pub(crate) explicit_end: bool,
    run: TestFn,
}

impl TestConfig {
    pub fn new(
        class: ClassId,
        method: impl Into<String>,
        location: SourceLocation,
        run: TestFn,
    ) -> Self {
        let method = method.into();
        Self {
            class,
            description: method.clone(),
            method,
            file: location.file,
            lines: LineRange::at(location.line),
            skip: false,
            should_throw: None,
            timeout: None,
            explicit_end: false,
            run,
        }
    }

    pub(crate) fn invoke(&self, instance: SuiteInstance, ctx: TestContext) -> TestFuture {
        (self.run)(instance, ctx)
    }

    /// Fully qualified test id, `Class::method`.
    pub fn id(&self) -> String {
        format!("{}::{}", self.class.name(), self.method)
    }
}

impl fmt::Debug for TestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestConfig")
            .field("class", &self.class.name())
            .field("method", &self.method)
            .field("description", &self.description)
            .field("file", &self.file)
            .field("lines", &self.lines)
            .field("skip", &self.skip)
            .field("should_throw", &self.should_throw)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A registered suite: its hooks, its tests and its lazily created instance.
pub struct SuiteConfig {
    pub class: ClassId,
    pub class_name: String,
    pub file: PathBuf,
    pub lines: LineRange,
    pub before_all: Vec<Hook>,
    pub before_each: Vec<Hook>,
    pub after_all: Vec<Hook>,
    pub after_each: Vec<Hook>,
    pub tests: Vec<TestConfig>,
    pub(crate) explicit_end: bool,
    factory: Factory,
    instance: OnceLock<SuiteInstance>,
}

impl SuiteConfig {
    pub fn new<S, F>(location: SourceLocation, factory: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let class = ClassId::of::<S>();
        Self {
            class,
            class_name: class.name().to_string(),
            file: location.file,
            lines: LineRange::at(location.line),
            before_all: Vec::new(),
            before_each: Vec::new(),
            after_all: Vec::new(),
            after_each: Vec::new(),
            tests: Vec::new(),
            explicit_end: false,
            factory: Arc::new(move || Arc::new(factory()) as SuiteInstance),
            instance: OnceLock::new(),
        }
    }

    /// Returns the suite instance, creating it on first use.
    pub fn instance(&self) -> SuiteInstance {
        self.instance.get_or_init(|| (self.factory)()).clone()
    }

    pub fn has_instance(&self) -> bool {
        self.instance.get().is_some()
    }

    pub fn hooks(&self, phase: Phase) -> &[Hook] {
        match phase {
            Phase::BeforeAll => &self.before_all,
            Phase::BeforeEach => &self.before_each,
            Phase::AfterEach => &self.after_each,
            Phase::AfterAll => &self.after_all,
        }
    }

    pub(crate) fn hooks_mut(&mut self, phase: Phase) -> &mut Vec<Hook> {
        match phase {
            Phase::BeforeAll => &mut self.before_all,
            Phase::BeforeEach => &mut self.before_each,
            Phase::AfterEach => &mut self.after_each,
            Phase::AfterAll => &mut self.after_all,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Finds the test whose line range contains `line`, falling back to the
    /// closest test declared above it.
    pub fn test_at_line(&self, line: u32) -> Option<&TestConfig> {
        self.tests
            .iter()
            .find(|t| t.lines.contains(line))
            .or_else(|| {
                self.tests
                    .iter()
                    .filter(|t| t.lines.start <= line)
                    .max_by_key(|t| t.lines.start)
            })
    }
}

impl fmt::Debug for SuiteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteConfig")
            .field("class_name", &self.class_name)
            .field("file", &self.file)
            .field("lines", &self.lines)
            .field("tests", &self.tests)
            .field("before_all", &self.before_all.len())
            .field("before_each", &self.before_each.len())
            .field("after_all", &self.after_all.len())
            .field("after_each", &self.after_each.len())
            .field("has_instance", &self.has_instance())
            .finish()
    }
}
