//! Live console output for in-process runs.

use super::{Consumer, Event};
use crate::result::TestStatus;

/// Consumer that prints suites and tests as they run.
///
/// In verbose mode every test start and every assertion is printed too.
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Consumer for ConsoleReporter {
    fn on_event(&self, event: &Event<'_>) {
        match event {
            Event::SuiteStarted(suite) => {
                println!(
                    "{} {} {}",
                    console::style("SUITE").cyan().bold(),
                    suite.class_name,
                    console::style(suite.file.display()).dim()
                );
            }
            Event::TestStarted(test) => {
                if self.verbose {
                    println!("  {} {}", console::style("RUN ").dim(), test.method);
                }
            }
            Event::Assertion(assertion) => {
                if self.verbose || !assertion.passed() {
                    let mark = if assertion.passed() {
                        console::style("ok").green()
                    } else {
                        console::style("not ok").red()
                    };
                    println!(
                        "      {} {} {}",
                        mark,
                        assertion.source,
                        console::style(format!("({}:{})", assertion.file.display(), assertion.line))
                            .dim()
                    );
                }
            }
            Event::TestFinished(result) => {
                let status = match result.status {
                    TestStatus::Success => console::style("PASS").green(),
                    TestStatus::Fail => console::style("FAIL").red(),
                    TestStatus::Skip => console::style("SKIP").yellow(),
                };
                println!(
                    "  {} {} {}",
                    status,
                    result.method,
                    console::style(format!("({:?})", result.duration)).dim()
                );
                if let Some(error) = &result.error {
                    println!("       {}", console::style(error).red().dim());
                }
            }
            Event::SuiteFinished(result) => {
                let verdict = if result.has_failures() {
                    console::style("FAILED").red().bold()
                } else {
                    console::style("ok").green().bold()
                };
                println!(
                    "  {} {} passed, {} failed, {} skipped",
                    verdict,
                    console::style(result.success).green(),
                    console::style(result.fail).red(),
                    console::style(result.skip).yellow()
                );
            }
        }
    }
}
