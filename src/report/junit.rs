//! JUnit XML report generation.
//!
//! Each [`SuiteResult`] becomes one `<testsuite>`; each test one
//! `<testcase>`:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <testsuites name="suitest" tests="3" failures="1" skipped="1" time="0.120" timestamp="...">
//!   <testsuite name="MathSuite" file="tests/math.rs" tests="3" failures="1" skipped="1" time="0.120">
//!     <testcase classname="MathSuite" name="adds" file="tests/math.rs" line="12" time="0.001"/>
//!     <testcase classname="MathSuite" name="divides" file="tests/math.rs" line="20" time="0.002">
//!       <failure message="expected 2 to equal 3" type="AssertionError">
//!         tests/math.rs:22 a / b == 3
//!       </failure>
//!     </testcase>
//!     <testcase classname="MathSuite" name="later" file="tests/math.rs" line="30" time="0.000">
//!       <skipped/>
//!     </testcase>
//!   </testsuite>
//! </testsuites>
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::info;

use crate::result::{SuiteResult, SuitesResult, TestResult, TestStatus};

/// Writes the JUnit report for `results` to `path`, creating parent
/// directories as needed.
pub fn write_junit(path: &Path, results: &SuitesResult, duration: Duration) -> Result<()> {
    let xml = generate_junit(results, duration)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    std::fs::write(path, xml)
        .with_context(|| format!("Failed to write JUnit XML: {}", path.display()))?;
    info!("JUnit XML written to: {}", path.display());
    Ok(())
}

/// Renders `results` as a JUnit XML document.
pub fn generate_junit(results: &SuitesResult, duration: Duration) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let tests: usize = results.suites.iter().map(|s| s.tests.len()).sum();
    let mut testsuites = BytesStart::new("testsuites");
    testsuites.push_attribute(("name", "suitest"));
    testsuites.push_attribute(("tests", tests.to_string().as_str()));
    testsuites.push_attribute(("failures", results.failed.to_string().as_str()));
    testsuites.push_attribute(("skipped", results.skipped.to_string().as_str()));
    testsuites.push_attribute(("time", seconds(duration).as_str()));
    testsuites.push_attribute(("timestamp", chrono::Utc::now().to_rfc3339().as_str()));
    writer.write_event(Event::Start(testsuites))?;

    for suite in &results.suites {
        write_testsuite(&mut writer, suite)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    String::from_utf8(writer.into_inner()).context("JUnit XML is not valid UTF-8")
}

fn write_testsuite<W: std::io::Write>(writer: &mut Writer<W>, suite: &SuiteResult) -> Result<()> {
    let time: Duration = suite.tests.iter().map(|t| t.duration).sum();
    let file = suite.file.display().to_string();

    let mut testsuite = BytesStart::new("testsuite");
    testsuite.push_attribute(("name", suite.class_name.as_str()));
    testsuite.push_attribute(("file", file.as_str()));
    testsuite.push_attribute(("tests", suite.tests.len().to_string().as_str()));
    testsuite.push_attribute(("failures", suite.fail.to_string().as_str()));
    testsuite.push_attribute(("skipped", suite.skip.to_string().as_str()));
    testsuite.push_attribute(("time", seconds(time).as_str()));
    writer.write_event(Event::Start(testsuite))?;

    for test in &suite.tests {
        write_testcase(writer, test)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    Ok(())
}

fn write_testcase<W: std::io::Write>(writer: &mut Writer<W>, result: &TestResult) -> Result<()> {
    let file = result.file.display().to_string();

    let mut testcase = BytesStart::new("testcase");
    testcase.push_attribute(("classname", result.class_name.as_str()));
    testcase.push_attribute(("name", result.method.as_str()));
    testcase.push_attribute(("file", file.as_str()));
    testcase.push_attribute(("line", result.lines.start.to_string().as_str()));
    testcase.push_attribute(("time", seconds(result.duration).as_str()));

    if result.status == TestStatus::Success && result.output.is_empty() {
        writer.write_event(Event::Empty(testcase))?;
        return Ok(());
    }

    writer.write_event(Event::Start(testcase))?;

    match result.status {
        TestStatus::Success => {}
        TestStatus::Skip => {
            writer.write_event(Event::Empty(BytesStart::new("skipped")))?;
        }
        TestStatus::Fail => {
            let mut failure = BytesStart::new("failure");
            if let Some(error) = &result.error {
                failure.push_attribute(("message", sanitize(&error.message).as_str()));
                failure.push_attribute(("type", sanitize(&error.kind).as_str()));
            }
            writer.write_event(Event::Start(failure))?;

            let detail: Vec<String> = result
                .assertions
                .iter()
                .filter(|a| !a.passed())
                .map(|a| format!("{}:{} {}", a.file.display(), a.line, a.source))
                .collect();
            if !detail.is_empty() {
                writer.write_event(Event::Text(BytesText::new(&sanitize(&detail.join("\n")))))?;
            }

            writer.write_event(Event::End(BytesEnd::new("failure")))?;
        }
    }

    for (stream, element) in [("stdout", "system-out"), ("stderr", "system-err")] {
        if let Some(text) = result.output.get(stream) {
            writer.write_event(Event::Start(BytesStart::new(element)))?;
            writer.write_event(Event::Text(BytesText::new(&sanitize(text))))?;
            writer.write_event(Event::End(BytesEnd::new(element)))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

fn seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

/// Drops characters that are not allowed in XML 1.0. Escaping is left to
/// the writer.
fn sanitize(s: &str) -> String {
    s.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r' | ' '..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}'))
        .collect()
}
