//! Result types produced by a test run.
//!
//! Results are created fresh for every run, owned by the executor that
//! produced them, and handed to the orchestrator for merging. All of them
//! serialize with serde so a worker process can send its [`SuitesResult`]
//! back to the parent as a single JSON message.
//!
//! # Counting
//!
//! `total` counts tests that *ran*: `total = success + fail`. Skipped
//! tests are tracked separately and excluded from `total`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// An inclusive range of source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// A range covering a single line.
    pub fn at(line: u32) -> Self {
        Self::new(line, line)
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// The comparison an [`Assertion`] performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    /// A boolean condition was checked.
    Ok,
    /// Two values were compared for equality.
    Equal,
    /// Two values were compared for inequality.
    NotEqual,
    /// An expression was expected to produce an error.
    Throws,
    /// An unconditional failure.
    Fail,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Ok => "ok",
            Operator::Equal => "equal",
            Operator::NotEqual => "notEqual",
            Operator::Throws => "throws",
            Operator::Fail => "fail",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A serializable description of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// The error's kind (type name for raised errors, a fixed label for the rest).
    pub kind: String,
    pub message: String,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// One structured check recorded while a test ran.
///
/// An assertion passed when `error` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub file: PathBuf,
    pub line: u32,
    pub operator: Operator,
    /// Literal source text of the checked expression.
    pub source: String,
    pub message: String,
    pub error: Option<ErrorInfo>,
}

impl Assertion {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome status of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Fail,
    Skip,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestStatus::Success => "success",
            TestStatus::Fail => "fail",
            TestStatus::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// The result of executing one test (or a synthetic suite-level failure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub status: TestStatus,
    /// Test method name, or the phase name for a lifecycle failure.
    pub method: String,
    pub class_name: String,
    pub description: String,
    pub file: PathBuf,
    pub lines: LineRange,
    pub error: Option<ErrorInfo>,
    /// Assertions in execution order.
    pub assertions: Vec<Assertion>,
    /// Captured console output keyed by stream name (`stdout`, `stderr`).
    pub output: BTreeMap<String, String>,
    #[serde(default)]
    pub duration: Duration,
}

impl TestResult {
    pub fn is_fail(&self) -> bool {
        self.status == TestStatus::Fail
    }
}

/// Aggregated results of one suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub success: usize,
    pub fail: usize,
    pub skip: usize,
    pub total: usize,
    pub file: PathBuf,
    pub class_name: String,
    pub lines: LineRange,
    pub tests: Vec<TestResult>,
}

impl SuiteResult {
    pub fn new(class_name: impl Into<String>, file: impl Into<PathBuf>, lines: LineRange) -> Self {
        Self {
            success: 0,
            fail: 0,
            skip: 0,
            total: 0,
            file: file.into(),
            class_name: class_name.into(),
            lines,
            tests: Vec::new(),
        }
    }

    /// Appends a test result and updates the counters.
    pub fn push(&mut self, result: TestResult) {
        match result.status {
            TestStatus::Success => self.success += 1,
            TestStatus::Fail => self.fail += 1,
            TestStatus::Skip => self.skip += 1,
        }
        self.total = self.success + self.fail;
        self.tests.push(result);
    }

    pub fn has_failures(&self) -> bool {
        self.fail > 0
    }
}

/// Results aggregated across suites and files.
///
/// Merging is commutative and associative on the counters; the suite list
/// is concatenated in merge order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuitesResult {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
    pub suites: Vec<SuiteResult>,
}

impl SuitesResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one suite's result to the aggregate.
    pub fn push(&mut self, suite: SuiteResult) {
        self.passed += suite.success;
        self.failed += suite.fail;
        self.skipped += suite.skip;
        self.total += suite.total;
        self.suites.push(suite);
    }

    /// Merges another aggregate into this one.
    pub fn merge(&mut self, other: SuitesResult) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.total += other.total;
        self.suites.extend(other.suites);
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(method: &str, status: TestStatus) -> TestResult {
        TestResult {
            status,
            method: method.to_string(),
            class_name: "MathSuite".to_string(),
            description: method.to_string(),
            file: PathBuf::from("tests/math.rs"),
            lines: LineRange::at(1),
            error: None,
            assertions: Vec::new(),
            output: BTreeMap::new(),
            duration: Duration::ZERO,
        }
    }

    fn make_suite(name: &str, statuses: &[TestStatus]) -> SuiteResult {
        let mut suite = SuiteResult::new(name, "tests/math.rs", LineRange::new(1, 40));
        for (i, status) in statuses.iter().enumerate() {
            suite.push(make_result(&format!("t{}", i), *status));
        }
        suite
    }

    #[test]
    fn test_suite_counts_exclude_skip_from_total() {
        let suite = make_suite(
            "MathSuite",
            &[TestStatus::Success, TestStatus::Fail, TestStatus::Skip],
        );

        assert_eq!(suite.success, 1);
        assert_eq!(suite.fail, 1);
        assert_eq!(suite.skip, 1);
        assert_eq!(suite.total, 2);
        assert_eq!(suite.success + suite.fail + suite.skip, suite.tests.len());
    }

    #[test]
    fn test_failure_helpers() {
        let clean = make_suite("MathSuite", &[TestStatus::Success, TestStatus::Skip]);
        assert!(!clean.has_failures());
        assert!(clean.tests.iter().all(|t| !t.is_fail()));

        let broken = make_suite("MathSuite", &[TestStatus::Success, TestStatus::Fail]);
        assert!(broken.has_failures());
        assert!(broken.tests[1].is_fail());
    }

    #[test]
    fn test_merge_is_commutative() {
        let mut a = SuitesResult::new();
        a.push(make_suite("A", &[TestStatus::Success, TestStatus::Fail]));
        let mut b = SuitesResult::new();
        b.push(make_suite("B", &[TestStatus::Skip, TestStatus::Success]));
        b.push(make_suite("C", &[TestStatus::Success]));

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        assert_eq!(
            (ab.passed, ab.failed, ab.skipped, ab.total),
            (ba.passed, ba.failed, ba.skipped, ba.total)
        );
        assert_eq!((ab.passed, ab.failed, ab.skipped, ab.total), (3, 1, 1, 4));

        let mut left: Vec<_> = ab.suites.iter().map(|s| s.class_name.clone()).collect();
        let mut right: Vec<_> = ba.suites.iter().map(|s| s.class_name.clone()).collect();
        left.sort();
        right.sort();
        assert_eq!(left, right);
    }

    #[test]
    fn test_merge_is_associative() {
        let parts: Vec<SuitesResult> = [
            &[TestStatus::Success][..],
            &[TestStatus::Fail, TestStatus::Skip][..],
            &[TestStatus::Success, TestStatus::Success][..],
        ]
        .iter()
        .enumerate()
        .map(|(i, statuses)| {
            let mut r = SuitesResult::new();
            r.push(make_suite(&format!("S{}", i), statuses));
            r
        })
        .collect();

        let mut left = parts[0].clone();
        left.merge(parts[1].clone());
        left.merge(parts[2].clone());

        let mut tail = parts[1].clone();
        tail.merge(parts[2].clone());
        let mut right = parts[0].clone();
        right.merge(tail);

        assert_eq!(left, right);
    }

    #[test]
    fn test_results_roundtrip_through_json() {
        let mut result = SuitesResult::new();
        let mut suite = make_suite("A", &[TestStatus::Success]);
        suite.tests[0].assertions.push(Assertion {
            file: PathBuf::from("tests/math.rs"),
            line: 7,
            operator: Operator::Equal,
            source: "1 == 1".to_string(),
            message: "should be equal".to_string(),
            error: None,
        });
        result.push(suite);

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"operator\":\"equal\""));
        assert!(json.contains("\"status\":\"success\""));
        let back: SuitesResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_line_range() {
        let range = LineRange::new(10, 4);
        assert_eq!(range.end, 10);
        assert!(LineRange::new(3, 8).contains(8));
        assert!(!LineRange::new(3, 8).contains(9));
        assert_eq!(LineRange::new(3, 8).to_string(), "3-8");
        assert_eq!(Operator::NotEqual.to_string(), "notEqual");
    }
}
