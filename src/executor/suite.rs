//! Suite execution.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::phase::{Breakout, PhaseManager, suite_failure};
use super::test::TestExecutor;
use crate::framework::{SuiteConfig, SuiteInstance, TestConfig, TestError};
use crate::report::{Consumer, Event};
use crate::result::SuiteResult;

/// Drives lifecycle phases and tests over a suite and aggregates the results.
pub struct SuiteExecutor {
    consumer: Arc<dyn Consumer>,
    tests: TestExecutor,
}

impl SuiteExecutor {
    pub fn new(consumer: Arc<dyn Consumer>) -> Self {
        Self {
            tests: TestExecutor::new(Arc::clone(&consumer)),
            consumer,
        }
    }

    /// Sets the timeout for tests without their own and for every hook.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.tests = self.tests.with_default_timeout(timeout);
        self
    }

    /// Runs every test of `suite` in declaration order.
    pub async fn execute_suite(&self, suite: &SuiteConfig) -> SuiteResult {
        let tests: Vec<&TestConfig> = suite.tests.iter().collect();
        self.run(suite, &tests).await
    }

    /// Runs the lifecycle around the single test declared at `line`.
    pub async fn execute_suite_test(&self, suite: &SuiteConfig, line: u32) -> SuiteResult {
        match suite.test_at_line(line) {
            Some(test) => {
                debug!("Line {} selects {}", line, test.id());
                self.run(suite, &[test]).await
            }
            None => {
                warn!("No test of {} at line {}", suite.class_name, line);
                self.run(suite, &[]).await
            }
        }
    }

    async fn run(&self, suite: &SuiteConfig, tests: &[&TestConfig]) -> SuiteResult {
        info!("Running suite {} ({} tests)", suite.class_name, tests.len());
        self.consumer.on_event(&Event::SuiteStarted(suite));

        let mut result = SuiteResult::new(suite.class_name.as_str(), suite.file.as_path(), suite.lines);
        let instance = suite.instance();
        let mut phases = PhaseManager::new(suite, instance.clone(), self.tests.default_timeout());

        if let Err(breakout) = self.drive(&mut phases, instance, tests, &mut result).await {
            self.abort(suite, breakout, &mut result);
        }

        info!(
            "Suite {} finished: {} passed, {} failed, {} skipped",
            suite.class_name, result.success, result.fail, result.skip
        );
        self.consumer.on_event(&Event::SuiteFinished(&result));
        result
    }

    async fn drive(
        &self,
        phases: &mut PhaseManager<'_>,
        instance: SuiteInstance,
        tests: &[&TestConfig],
        result: &mut SuiteResult,
    ) -> Result<(), Breakout> {
        phases.start_all().await?;
        for test in tests {
            if test.skip {
                result.push(self.tests.execute(instance.clone(), test).await);
                continue;
            }
            phases.start_each().await?;
            result.push(self.tests.execute(instance.clone(), test).await);
            phases.end_each().await?;
        }
        phases.end_all().await
    }

    /// Records the breakout failure. A consumer panic while reporting it
    /// becomes one more suite-level failure.
    fn abort(&self, suite: &SuiteConfig, breakout: Breakout, result: &mut SuiteResult) {
        let failure = breakout.into_result();
        warn!(
            "Aborting suite {} after {} failure",
            suite.class_name, failure.method
        );
        let reported = catch_unwind(AssertUnwindSafe(|| {
            self.consumer.on_event(&Event::TestFinished(&failure));
        }));
        result.push(failure);

        if reported.is_err() {
            error!("Consumer panicked while aborting suite {}", suite.class_name);
            result.push(suite_failure(
                suite,
                &TestError::Thrown {
                    kind: "Error".to_string(),
                    message: format!("suite {} failed while aborting", suite.class_name),
                    location: None,
                },
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{Registry, ShouldThrow};
    use crate::report::NullConsumer;
    use crate::result::TestStatus;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Labels(Mutex<Vec<String>>);

    impl Consumer for Labels {
        fn on_event(&self, event: &Event<'_>) {
            let label = match event {
                Event::SuiteStarted(s) => format!("suite before {}", s.class_name),
                Event::SuiteFinished(r) => format!("suite after {}", r.class_name),
                Event::TestStarted(t) => format!("test before {}", t.method),
                Event::TestFinished(r) => format!("test after {} {}", r.method, r.status),
                Event::Assertion(a) => format!("assertion {}", a.operator),
            };
            self.0.lock().unwrap().push(label);
        }
    }

    struct PanicsOnFailure;

    impl Consumer for PanicsOnFailure {
        fn on_event(&self, event: &Event<'_>) {
            if let Event::TestFinished(result) = event
                && result.method == "beforeAll"
            {
                panic!("reporter crashed");
            }
        }
    }

    #[derive(Default)]
    struct Counter {
        each: AtomicUsize,
        teardowns: AtomicUsize,
    }

    fn executor(consumer: Arc<dyn Consumer>) -> SuiteExecutor {
        SuiteExecutor::new(consumer).with_default_timeout(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_one_passing_equal() {
        let mut registry = Registry::new();
        registry.suite::<Counter>().test("one", |_, ctx| async move {
            crate::check_eq!(ctx, 1, 1)?;
            Ok(())
        });
        registry.init().unwrap();

        let labels = Arc::new(Labels::default());
        let result = executor(labels.clone()).execute_suite(&registry.suites()[0]).await;

        assert_eq!((result.success, result.fail, result.total), (1, 0, 1));
        assert_eq!(
            *labels.0.lock().unwrap(),
            vec![
                "suite before Counter",
                "test before one",
                "assertion equal",
                "test after one success",
                "suite after Counter",
            ]
        );
    }

    #[tokio::test]
    async fn test_counts_and_shared_instance() {
        let mut registry = Registry::new();
        let mut suite = registry.suite::<Counter>();
        suite.before_each(|c| async move {
            c.each.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        suite.test("first", |c, ctx| async move {
            ctx.equal(c.each.load(Ordering::SeqCst), 1usize, "")
        });
        suite.test("second", |c, ctx| async move {
            ctx.equal(c.each.load(Ordering::SeqCst), 2usize, "")
        });
        suite.test("broken", |_, _| async { Err(TestError::thrown("nope")) });
        suite.test("skipped", |_, _| async { Ok(()) }).skip();
        suite
            .test("expected", |_, _| async { Err(TestError::thrown("nope")) })
            .should_throw(ShouldThrow::containing("no"));
        registry.init().unwrap();

        let config = &registry.suites()[0];
        let result = executor(Arc::new(NullConsumer)).execute_suite(config).await;

        assert_eq!(result.success, 3);
        assert_eq!(result.fail, 1);
        assert_eq!(result.skip, 1);
        assert_eq!(result.total, result.success + result.fail);
        assert_eq!(result.success + result.fail + result.skip, config.tests.len());

        // Skipped tests do not trigger beforeEach.
        let counter = config.instance().downcast::<Counter>().unwrap();
        assert_eq!(counter.each.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failing_before_each_aborts_rest() {
        let mut registry = Registry::new();
        let mut suite = registry.suite::<Counter>();
        suite.before_each(|c| async move {
            if c.each.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(TestError::thrown("fixture exhausted"));
            }
            Ok(())
        });
        suite.after_all(|c| async move {
            c.teardowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        suite.test("a", |_, _| async { Ok(()) });
        suite.test("b", |_, _| async { Ok(()) });
        suite.test("c", |_, _| async { Ok(()) });
        registry.init().unwrap();

        let config = &registry.suites()[0];
        let labels = Arc::new(Labels::default());
        let result = executor(labels.clone()).execute_suite(config).await;

        let methods: Vec<_> = result.tests.iter().map(|t| t.method.as_str()).collect();
        assert_eq!(methods, vec!["a", "beforeEach"]);
        assert_eq!(result.tests[0].status, TestStatus::Success);
        assert_eq!(result.tests[1].status, TestStatus::Fail);
        assert_eq!(result.tests[1].assertions[0].source, "(outer)");
        assert_eq!((result.success, result.fail), (1, 1));

        let counter = config.instance().downcast::<Counter>().unwrap();
        assert_eq!(counter.teardowns.load(Ordering::SeqCst), 0);

        let labels = labels.0.lock().unwrap();
        assert!(labels.contains(&"test after beforeEach fail".to_string()));
        assert_eq!(labels.last().unwrap(), "suite after Counter");
    }

    #[tokio::test]
    async fn test_consumer_panic_during_abort_is_contained() {
        let mut registry = Registry::new();
        let mut suite = registry.suite::<Counter>();
        suite.before_all(|_| async { Err(TestError::thrown("no network")) });
        suite.test("a", |_, _| async { Ok(()) });
        registry.init().unwrap();

        let result = executor(Arc::new(PanicsOnFailure))
            .execute_suite(&registry.suites()[0])
            .await;

        let methods: Vec<_> = result.tests.iter().map(|t| t.method.as_str()).collect();
        assert_eq!(methods, vec!["beforeAll", "suite"]);
        assert_eq!(result.fail, 2);
    }

    #[tokio::test]
    async fn test_execute_suite_test_selects_by_line() {
        let mut registry = Registry::new();
        let mut suite = registry.suite::<Counter>();
        suite.before_each(|c| async move {
            c.each.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        suite.test("first", |_, _| async { Ok(()) });
        suite.test("second", |_, _| async { Err(TestError::thrown("picked")) });
        registry.init().unwrap();

        let config = &registry.suites()[0];
        let line = config.tests[1].lines.start;
        let result = executor(Arc::new(NullConsumer))
            .execute_suite_test(config, line)
            .await;

        assert_eq!(result.tests.len(), 1);
        assert_eq!(result.tests[0].method, "second");
        assert_eq!(result.fail, 1);
        let counter = config.instance().downcast::<Counter>().unwrap();
        assert_eq!(counter.each.load(Ordering::SeqCst), 1);
    }
}
