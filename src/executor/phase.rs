//! Lifecycle phase state machine for one suite run.
//!
//! ```text
//! Idle ─► AllSetup ─► ( EachSetup ─► Running ─► EachTeardown )* ─► AllTeardown ─► Done
//!   └──────────────────────── any hook failure ──────────────────────────► Broken
//! ```
//!
//! A failing or timed-out hook moves the manager to [`PhaseState::Broken`]
//! and yields a [`Breakout`] carrying one synthetic failed result. The
//! caller must stop the suite run there; no later hook runs, including
//! teardown.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{attribute, run_guarded};
use crate::framework::{Hook, Phase, SuiteConfig, SuiteInstance, TestError};
use crate::result::{Assertion, Operator, TestResult, TestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    Idle,
    AllSetup,
    EachSetup,
    Running,
    EachTeardown,
    AllTeardown,
    Done,
    Broken,
}

/// Signal that the rest of the suite run must be abandoned. Holds the
/// failure that has to be recorded for it.
#[derive(Debug)]
pub struct Breakout(pub TestResult);

impl Breakout {
    pub fn into_result(self) -> TestResult {
        self.0
    }
}

pub struct PhaseManager<'s> {
    suite: &'s SuiteConfig,
    instance: SuiteInstance,
    timeout: Duration,
    state: PhaseState,
}

impl<'s> PhaseManager<'s> {
    pub fn new(suite: &'s SuiteConfig, instance: SuiteInstance, timeout: Duration) -> Self {
        Self {
            suite,
            instance,
            timeout,
            state: PhaseState::Idle,
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    /// Runs the `beforeAll` hooks.
    pub async fn start_all(&mut self) -> Result<(), Breakout> {
        self.run(Phase::BeforeAll, PhaseState::AllSetup).await
    }

    /// Runs the `beforeEach` hooks; on success the manager is ready for a test.
    pub async fn start_each(&mut self) -> Result<(), Breakout> {
        self.run(Phase::BeforeEach, PhaseState::EachSetup).await?;
        self.advance(PhaseState::Running);
        Ok(())
    }

    /// Runs the `afterEach` hooks.
    pub async fn end_each(&mut self) -> Result<(), Breakout> {
        self.run(Phase::AfterEach, PhaseState::EachTeardown).await
    }

    /// Runs the `afterAll` hooks and completes the run.
    pub async fn end_all(&mut self) -> Result<(), Breakout> {
        self.run(Phase::AfterAll, PhaseState::AllTeardown).await?;
        self.advance(PhaseState::Done);
        Ok(())
    }

    fn advance(&mut self, state: PhaseState) {
        if self.state != PhaseState::Broken {
            self.state = state;
        }
    }

    async fn run(&mut self, phase: Phase, state: PhaseState) -> Result<(), Breakout> {
        if self.state == PhaseState::Broken {
            warn!(
                "{} of {} requested after the run broke; ignoring",
                phase, self.suite.class_name
            );
            return Ok(());
        }

        self.state = state;
        let suite = self.suite;
        for hook in suite.hooks(phase) {
            let started = Instant::now();
            if let Err(error) = run_guarded(hook.invoke(self.instance.clone()), self.timeout).await {
                self.state = PhaseState::Broken;
                warn!(
                    "{} hook of {} failed at {}:{}: {}",
                    phase,
                    suite.class_name,
                    hook.location.file.display(),
                    hook.location.line,
                    error
                );
                let mut failure = phase_failure(suite, phase, hook, &error);
                failure.duration = started.elapsed();
                return Err(Breakout(failure));
            }
        }
        debug!(
            "{} of {} done ({} hooks)",
            phase,
            suite.class_name,
            suite.hooks(phase).len()
        );
        Ok(())
    }
}

fn phase_failure(suite: &SuiteConfig, phase: Phase, hook: &Hook, error: &TestError) -> TestResult {
    let location = match error.location() {
        Some(location) if location.line > 1 => location,
        _ => hook.location.clone(),
    };
    TestResult {
        status: TestStatus::Fail,
        method: phase.name().to_string(),
        class_name: suite.class_name.clone(),
        description: format!("{} hook of {}", phase, suite.class_name),
        file: suite.file.clone(),
        lines: suite.lines,
        error: Some(error.info()),
        assertions: vec![Assertion {
            file: location.file,
            line: location.line,
            operator: Operator::Throws,
            source: "(outer)".to_string(),
            message: error.to_string(),
            error: Some(error.info()),
        }],
        output: Default::default(),
        duration: Duration::ZERO,
    }
}

/// A suite-level failure not tied to any hook.
pub(crate) fn suite_failure(suite: &SuiteConfig, error: &TestError) -> TestResult {
    let location = attribute(error, &suite.file, suite.lines);
    TestResult {
        status: TestStatus::Fail,
        method: "suite".to_string(),
        class_name: suite.class_name.clone(),
        description: format!("run of {}", suite.class_name),
        file: suite.file.clone(),
        lines: suite.lines,
        error: Some(error.info()),
        assertions: vec![Assertion {
            file: location.file,
            line: location.line,
            operator: Operator::Throws,
            source: "(outer)".to_string(),
            message: error.to_string(),
            error: Some(error.info()),
        }],
        output: Default::default(),
        duration: Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Registry;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Journal {
        entries: Mutex<Vec<&'static str>>,
    }

    impl Journal {
        fn log(&self, entry: &'static str) {
            self.entries.lock().unwrap().push(entry);
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let mut registry = Registry::new();
        registry
            .suite::<Journal>()
            .before_all(|j| async move {
                j.log("all 1");
                Ok(())
            })
            .before_all(|j| async move {
                j.log("all 2");
                Ok(())
            })
            .before_each(|j| async move {
                j.log("each");
                Ok(())
            });
        registry.init().unwrap();

        let suite = &registry.suites()[0];
        let mut phases = PhaseManager::new(suite, suite.instance(), Duration::from_secs(1));
        assert_eq!(phases.state(), PhaseState::Idle);
        phases.start_all().await.unwrap();
        assert_eq!(phases.state(), PhaseState::AllSetup);
        phases.start_each().await.unwrap();
        assert_eq!(phases.state(), PhaseState::Running);
        phases.end_each().await.unwrap();
        phases.end_all().await.unwrap();
        assert_eq!(phases.state(), PhaseState::Done);

        let journal = suite.instance().downcast::<Journal>().unwrap();
        assert_eq!(*journal.entries.lock().unwrap(), vec!["all 1", "all 2", "each"]);
    }

    #[tokio::test]
    async fn test_failing_hook_breaks_out() {
        let mut registry = Registry::new();
        registry
            .suite::<Journal>()
            .before_all(|_| async { Err(TestError::thrown("database unavailable")) })
            .before_all(|j| async move {
                j.log("never");
                Ok(())
            });
        registry.init().unwrap();

        let suite = &registry.suites()[0];
        let mut phases = PhaseManager::new(suite, suite.instance(), Duration::from_secs(1));
        let failure = phases.start_all().await.unwrap_err().into_result();

        assert_eq!(phases.state(), PhaseState::Broken);
        assert_eq!(failure.status, TestStatus::Fail);
        assert_eq!(failure.method, "beforeAll");
        assert_eq!(failure.assertions.len(), 1);
        assert_eq!(failure.assertions[0].source, "(outer)");
        assert_eq!(failure.assertions[0].operator, Operator::Throws);
        assert_eq!(failure.error.unwrap().message, "database unavailable");

        let journal = suite.instance().downcast::<Journal>().unwrap();
        assert!(journal.entries.lock().unwrap().is_empty());
        assert!(phases.end_all().await.is_ok());
        assert_eq!(phases.state(), PhaseState::Broken);
    }

    #[tokio::test]
    async fn test_hook_timeout_points_at_hook() {
        let mut registry = Registry::new();
        registry.suite::<Journal>().after_each(|_| async {
            futures::future::pending::<()>().await;
            Ok(())
        });
        registry.init().unwrap();

        let suite = &registry.suites()[0];
        let hook_line = suite.after_each[0].location.line;
        let mut phases = PhaseManager::new(suite, suite.instance(), Duration::from_millis(30));
        let failure = phases.end_each().await.unwrap_err().into_result();

        assert_eq!(failure.method, "afterEach");
        assert_eq!(failure.error.as_ref().unwrap().message, "Operation timed out");
        assert_eq!(failure.assertions[0].line, hook_line);
    }
}
