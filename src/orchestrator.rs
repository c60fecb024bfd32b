//! Run orchestration: discovery, in-process runs and worker fan-out.
//!
//! # Architecture
//!
//! ```text
//! discover(patterns) ──► [files]
//!                           │
//!              ┌────────────┴─────────────┐
//!          one file                   many files
//!              │                          │
//!   run_file_in_process          bounded dispatch loop
//!   (Registry → SuiteExecutor)   (WorkerLauncher per file, first to finish merges first)
//!              │                          │
//!              └────────────┬─────────────┘
//!                           ▼
//!                      RunSummary
//! ```
//!
//! Results merge in completion order. Merging is commutative, so the final
//! counters do not depend on which worker finishes first.

pub mod discovery;
pub mod worker;

pub use discovery::{Discovery, DiscoveryError};
pub use worker::{
    ProcessLauncher, WORKER_ENV, WorkerError, WorkerLauncher, is_worker, parse_message,
    send_message,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::executor::SuiteExecutor;
use crate::framework::{Catalog, Registry, RegistryError, SuiteConfig};
use crate::report::{Consumer, NullConsumer};
use crate::result::SuitesResult;

/// Errors that stop a run before any result is produced.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The file is not part of the runner's catalog.
    #[error("No source unit registered for {}", .0.display())]
    UnknownFile(PathBuf),

    /// A source unit registered an invalid suite.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Discovery failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// A line selection was given for a multi-file run.
    #[error("A line selection needs exactly one file, got {0}")]
    LineNeedsOneFile(usize),
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Merged results of every file that reported back.
    pub results: SuitesResult,

    /// Files whose worker failed; their results are missing from `results`.
    pub worker_failures: Vec<(PathBuf, WorkerError)>,

    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl RunSummary {
    /// A run succeeds when no test failed and every worker reported back.
    ///
    /// ```
    /// use suitest::orchestrator::RunSummary;
    ///
    /// let summary = RunSummary::default();
    /// assert!(summary.success());
    /// assert_eq!(summary.exit_code(), 0);
    /// ```
    pub fn success(&self) -> bool {
        self.results.success() && self.worker_failures.is_empty()
    }

    /// Returns an appropriate process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }
}

/// Loads the unit for `file`, finalizes its registry and runs its suites
/// one after another.
///
/// With `line`, only the suite declared around that line runs, and only
/// the test at that line within it.
pub async fn run_file_in_process(
    catalog: &Catalog,
    file: &Path,
    consumer: Arc<dyn Consumer>,
    timeout: Duration,
    line: Option<u32>,
) -> Result<SuitesResult, RunError> {
    let unit = catalog
        .find(file)
        .ok_or_else(|| RunError::UnknownFile(file.to_path_buf()))?;

    let mut registry = Registry::new();
    unit.load(&mut registry);
    registry.init()?;

    let executor = SuiteExecutor::new(consumer).with_default_timeout(timeout);
    let mut results = SuitesResult::new();

    match line {
        Some(line) => match suite_at_line(registry.suites(), line) {
            Some(suite) => results.push(executor.execute_suite_test(suite, line).await),
            None => warn!("No suite in {} at line {}", file.display(), line),
        },
        None => {
            for suite in registry.suites() {
                results.push(executor.execute_suite(suite).await);
            }
        }
    }

    Ok(results)
}

/// The suite whose range contains `line`, else the closest one declared above it.
fn suite_at_line(suites: &[SuiteConfig], line: u32) -> Option<&SuiteConfig> {
    suites
        .iter()
        .find(|suite| suite.lines.contains(line))
        .or_else(|| {
            suites
                .iter()
                .filter(|suite| suite.lines.start <= line)
                .max_by_key(|suite| suite.lines.start)
        })
}

/// Coordinates a run over many files.
///
/// # Type Parameters
///
/// - `L`: how files are run in isolation when more than one file is given
pub struct Orchestrator<L> {
    config: Config,
    catalog: Arc<Catalog>,
    launcher: Arc<L>,
    consumer: Arc<dyn Consumer>,
    max_workers: usize,
    show_progress: bool,
}

impl<L: WorkerLauncher> Orchestrator<L> {
    pub fn new(config: Config, catalog: Arc<Catalog>, launcher: L) -> Self {
        let max_workers = config.suitest.worker_bound();
        Self {
            config,
            catalog,
            launcher: Arc::new(launcher),
            consumer: Arc::new(NullConsumer),
            max_workers,
            show_progress: false,
        }
    }

    /// Sets the consumer for in-process runs. Workers never report events.
    pub fn with_consumer(mut self, consumer: Arc<dyn Consumer>) -> Self {
        self.consumer = consumer;
        self
    }

    /// Overrides the concurrency bound. Values below 1 are raised to 1.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Finds the source units matched by `patterns`, or by the configured
    /// include patterns when none are given.
    pub fn discover(&self, patterns: &[String]) -> Result<Vec<PathBuf>, DiscoveryError> {
        let patterns = if patterns.is_empty() {
            &self.config.suitest.include
        } else {
            patterns
        };
        Discovery::from_config(&self.config.suitest).discover(patterns)
    }

    /// Runs `files`: one file in this process, several across workers.
    pub async fn run(&self, files: &[PathBuf], line: Option<u32>) -> Result<RunSummary, RunError> {
        let start = Instant::now();

        if line.is_some() && files.len() != 1 {
            return Err(RunError::LineNeedsOneFile(files.len()));
        }

        let mut summary = match files {
            [] => {
                warn!("No source units to run");
                RunSummary::default()
            }
            [file] => {
                info!("Running {} in process", file.display());
                let results = run_file_in_process(
                    &self.catalog,
                    file,
                    Arc::clone(&self.consumer),
                    self.config.suitest.default_timeout(),
                    line,
                )
                .await?;
                RunSummary {
                    results,
                    ..RunSummary::default()
                }
            }
            _ => self.run_parallel(files).await,
        };

        summary.duration = start.elapsed();
        info!(
            "Run finished in {:?}: {} passed, {} failed, {} skipped",
            summary.duration,
            summary.results.passed,
            summary.results.failed,
            summary.results.skipped
        );
        Ok(summary)
    }

    /// Bounded fan-out: keeps at most `max_workers` files in flight and
    /// merges whichever finishes first.
    async fn run_parallel(&self, files: &[PathBuf]) -> RunSummary {
        let bound = self.max_workers.max(1);
        info!("Running {} files across up to {} workers", files.len(), bound);

        let progress = self.progress_bar(files.len());
        let mut summary = RunSummary::default();
        let mut pending = FuturesUnordered::new();
        let mut in_flight: BTreeMap<usize, &Path> = BTreeMap::new();
        let mut queue = files.iter().enumerate();

        loop {
            while pending.len() < bound {
                let Some((index, file)) = queue.next() else {
                    break;
                };
                debug!("Dispatching #{} {}", index, file.display());
                in_flight.insert(index, file.as_path());
                let launcher = Arc::clone(&self.launcher);
                let file = file.clone();
                pending.push(async move {
                    let outcome = launcher.run_file(&file).await;
                    (index, outcome)
                });
            }

            let Some((index, outcome)) = pending.next().await else {
                break;
            };
            let Some(file) = in_flight.remove(&index) else {
                continue;
            };

            match outcome {
                Ok(results) => {
                    debug!(
                        "#{} {} done: {} passed, {} failed",
                        index,
                        file.display(),
                        results.passed,
                        results.failed
                    );
                    summary.results.merge(results);
                }
                Err(e) => {
                    error!("Worker for {} failed: {}", file.display(), e);
                    summary.worker_failures.push((file.to_path_buf(), e));
                }
            }

            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        summary
    }

    fn progress_bar(&self, len: usize) -> Option<indicatif::ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = indicatif::ProgressBar::new(len as u64);
        let style = indicatif::ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar());
        pb.set_style(style);
        Some(pb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{SourceUnit, TestError};
    use crate::result::{LineRange, SuiteResult, TestResult, TestStatus};
    use async_trait::async_trait;
    use std::collections::BTreeMap as Map;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Pretends each file holds one suite; file names decide the outcome.
    #[derive(Default)]
    struct FakeLauncher {
        running: AtomicUsize,
        peak: AtomicUsize,
        seen: Mutex<Vec<PathBuf>>,
    }

    fn file_result(file: &Path) -> SuitesResult {
        let name = file.file_stem().unwrap().to_string_lossy().to_string();
        let mut suite = SuiteResult::new(name.as_str(), file, LineRange::new(1, 10));
        let status = if name.contains("fail") {
            TestStatus::Fail
        } else {
            TestStatus::Success
        };
        suite.push(TestResult {
            status,
            method: "only".to_string(),
            class_name: name,
            description: String::new(),
            file: file.to_path_buf(),
            lines: LineRange::at(2),
            error: None,
            assertions: Vec::new(),
            output: Map::new(),
            duration: Duration::ZERO,
        });
        let mut results = SuitesResult::new();
        results.push(suite);
        results
    }

    #[async_trait]
    impl WorkerLauncher for FakeLauncher {
        async fn run_file(&self, file: &Path) -> Result<SuitesResult, WorkerError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().unwrap().push(file.to_path_buf());

            // Later files finish first.
            let delay = 60u64.saturating_sub(10 * self.seen.lock().unwrap().len() as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if file.to_string_lossy().contains("crash") {
                return Err(WorkerError::Crashed {
                    status: "exit status: 101".to_string(),
                    stderr: "thread 'main' panicked".to_string(),
                });
            }
            Ok(file_result(file))
        }
    }

    fn files(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("tests/{}.rs", n))).collect()
    }

    #[tokio::test]
    async fn test_dispatch_respects_bound_and_merges() {
        let orchestrator =
            Orchestrator::new(Config::default(), Arc::new(Catalog::new()), FakeLauncher::default())
                .with_max_workers(2);
        let files = files(&["a", "b_fail", "c", "d", "e"]);

        let summary = orchestrator.run(&files, None).await.unwrap();

        assert!(orchestrator.launcher.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(orchestrator.launcher.seen.lock().unwrap().len(), 5);

        let mut isolated = SuitesResult::new();
        for file in &files {
            isolated.merge(file_result(file));
        }
        let counters = |r: &SuitesResult| (r.passed, r.failed, r.skipped, r.total);
        assert_eq!(counters(&summary.results), counters(&isolated));
        assert_eq!(summary.results.suites.len(), 5);
        assert!(!summary.success());
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_worker_failure_does_not_stop_siblings() {
        let orchestrator =
            Orchestrator::new(Config::default(), Arc::new(Catalog::new()), FakeLauncher::default())
                .with_max_workers(2);
        let files = files(&["a", "crash", "c"]);

        let summary = orchestrator.run(&files, None).await.unwrap();

        assert_eq!(summary.results.passed, 2);
        assert_eq!(summary.worker_failures.len(), 1);
        assert_eq!(summary.worker_failures[0].0, PathBuf::from("tests/crash.rs"));
        assert!(summary.results.success());
        assert!(!summary.success());
    }

    #[derive(Default)]
    struct Arithmetic;

    fn register_arithmetic(registry: &mut Registry) {
        let mut suite = registry.suite::<Arithmetic>();
        suite.test("adds", |_, ctx| async move { ctx.equal(1 + 1, 2, "") });
        suite.test("fails", |_, _| async { Err(TestError::thrown("broken")) });
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::new().with_unit(SourceUnit::new("tests/arithmetic.rs", register_arithmetic)))
    }

    #[tokio::test]
    async fn test_single_file_runs_in_process() {
        let orchestrator = Orchestrator::new(Config::default(), catalog(), FakeLauncher::default());

        let summary = orchestrator
            .run(&[PathBuf::from("./tests/arithmetic.rs")], None)
            .await
            .unwrap();

        assert!(orchestrator.launcher.seen.lock().unwrap().is_empty());
        assert_eq!(summary.results.passed, 1);
        assert_eq!(summary.results.failed, 1);
        assert_eq!(summary.results.suites[0].class_name, "Arithmetic");
    }

    #[tokio::test]
    async fn test_line_selects_one_test() {
        let catalog = catalog();
        let mut registry = Registry::new();
        register_arithmetic(&mut registry);
        registry.init().unwrap();
        let line = registry.suites()[0].tests[1].lines.start;

        let results = run_file_in_process(
            &catalog,
            Path::new("tests/arithmetic.rs"),
            Arc::new(NullConsumer),
            Duration::from_secs(1),
            Some(line),
        )
        .await
        .unwrap();

        assert_eq!(results.suites[0].tests.len(), 1);
        assert_eq!(results.suites[0].tests[0].method, "fails");
    }

    #[tokio::test]
    async fn test_run_errors() {
        let orchestrator = Orchestrator::new(Config::default(), catalog(), FakeLauncher::default());

        let err = orchestrator
            .run(&[PathBuf::from("tests/unknown.rs")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::UnknownFile(_)));

        let err = orchestrator.run(&files(&["a", "b"]), Some(3)).await.unwrap_err();
        assert!(matches!(err, RunError::LineNeedsOneFile(2)));

        let summary = orchestrator.run(&[], None).await.unwrap();
        assert!(summary.success());
        assert_eq!(summary.results.total, 0);
    }
}
