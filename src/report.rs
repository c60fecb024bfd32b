//! Execution events, consumers and result reporting.
//!
//! Executors emit a fixed stream of [`Event`]s to a [`Consumer`] in
//! execution order:
//!
//! ```text
//! suite before
//!   test before
//!     assertion*
//!   test after
//!   ...
//! suite after
//! ```
//!
//! Consumers are side-effect-only sinks. They must not panic; a panic
//! during the abort path of a suite is caught and recorded as a suite
//! failure, anywhere else it propagates.

pub mod console;
pub mod junit;

pub use console::ConsoleReporter;
pub use junit::{generate_junit, write_junit};

use std::sync::Arc;

use ::console::style;

use crate::framework::{SuiteConfig, TestConfig};
use crate::orchestrator::RunSummary;
use crate::result::{Assertion, SuiteResult, TestResult};

/// Whether an event describes something starting or finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Before,
    After,
}

/// What an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Suite,
    Test,
    Assertion,
}

/// One entry in the execution event stream.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    SuiteStarted(&'a SuiteConfig),
    SuiteFinished(&'a SuiteResult),
    TestStarted(&'a TestConfig),
    TestFinished(&'a TestResult),
    Assertion(&'a Assertion),
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::SuiteStarted(_) | Event::SuiteFinished(_) => EventKind::Suite,
            Event::TestStarted(_) | Event::TestFinished(_) => EventKind::Test,
            Event::Assertion(_) => EventKind::Assertion,
        }
    }

    pub fn phase(&self) -> EventPhase {
        match self {
            Event::SuiteStarted(_) | Event::TestStarted(_) => EventPhase::Before,
            Event::SuiteFinished(_) | Event::TestFinished(_) | Event::Assertion(_) => {
                EventPhase::After
            }
        }
    }
}

/// A sink for execution events.
pub trait Consumer: Send + Sync {
    fn on_event(&self, event: &Event<'_>);
}

/// A consumer that ignores every event.
pub struct NullConsumer;

impl Consumer for NullConsumer {
    fn on_event(&self, _event: &Event<'_>) {}
}

/// A consumer that forwards each event to several consumers in order.
#[derive(Default)]
pub struct MultiConsumer {
    consumers: Vec<Arc<dyn Consumer>>,
}

impl MultiConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_consumer<C: Consumer + 'static>(mut self, consumer: C) -> Self {
        self.consumers.push(Arc::new(consumer));
        self
    }

    pub fn push(&mut self, consumer: Arc<dyn Consumer>) {
        self.consumers.push(consumer);
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

impl Consumer for MultiConsumer {
    fn on_event(&self, event: &Event<'_>) {
        for consumer in &self.consumers {
            consumer.on_event(event);
        }
    }
}

/// Prints the aggregate of a run to stdout, followed by details of every
/// failed test and worker.
pub fn print_summary(summary: &RunSummary) {
    let results = &summary.results;

    println!();
    println!("Test Results:");
    println!("  Suites:  {}", results.suites.len());
    println!("  Total:   {}", results.total);
    println!("  Passed:  {}", style(results.passed).green());
    println!("  Failed:  {}", style(results.failed).red());
    println!("  Skipped: {}", style(results.skipped).yellow());
    if !summary.worker_failures.is_empty() {
        println!(
            "  Workers failed: {}",
            style(summary.worker_failures.len()).red().bold()
        );
    }
    println!("  Duration: {:?}", summary.duration);

    println!();
    if summary.success() {
        println!("{}", style("All tests passed!").green().bold());
        return;
    }
    println!("{}", style("Some tests failed.").red().bold());

    let failed: Vec<&TestResult> = results
        .suites
        .iter()
        .flat_map(|suite| suite.tests.iter())
        .filter(|test| test.is_fail())
        .collect();
    if !failed.is_empty() {
        println!();
        println!("Failed tests:");
        for test in failed {
            println!(
                "  - {}::{} ({}:{})",
                test.class_name,
                test.method,
                test.file.display(),
                test.lines
            );
            if let Some(error) = &test.error {
                println!("    {}", style(error).dim());
            }
            for (stream, text) in &test.output {
                println!();
                println!("    {}", style(format!("{}:", stream)).dim());
                for line in text.lines() {
                    println!("      {}", line);
                }
            }
        }
    }

    if !summary.worker_failures.is_empty() {
        println!();
        println!("Failed workers:");
        for (file, error) in &summary.worker_failures {
            println!("  - {}", file.display());
            for line in error.to_string().lines() {
                println!("    {}", style(line).dim());
            }
        }
    }
}
