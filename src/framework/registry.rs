//! Two-phase suite registry and source-unit catalog.
//!
//! Registration is explicit: each source unit exposes a `register` function
//! (usually via [`source_unit!`](crate::source_unit)) that populates a
//! [`Registry`]. Once every unit of interest is loaded, [`Registry::init`]
//! finalizes the pending suites exactly once.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use super::{
    ClassId, Hook, HookFn, Phase, ShouldThrow, SourceLocation, SuiteConfig, SuiteInstance,
    TestConfig, TestError, TestFn, TestFuture,
};
use crate::capture::TestContext;

/// Errors raised while finalizing the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two tests in one suite share a method name.
    #[error("Duplicate test {method:?} in suite {class}")]
    DuplicateTest { class: String, method: String },
}

/// Owned map of suites keyed by class identity.
#[derive(Default)]
pub struct Registry {
    suites: Vec<SuiteConfig>,
    index: HashMap<ClassId, usize>,
    finalized: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the suite for `class`, creating it with `create` if needed.
    pub fn get_or_create(
        &mut self,
        class: ClassId,
        create: impl FnOnce() -> SuiteConfig,
    ) -> &mut SuiteConfig {
        if self.finalized {
            warn!("Suite {} registered after init; registry will be finalized again", class);
            self.finalized = false;
        }
        let idx = match self.index.get(&class) {
            Some(&idx) => idx,
            None => {
                let suite = create();
                debug!("Registering suite {} from {}", class, suite.file.display());
                self.suites.push(suite);
                self.index.insert(class, self.suites.len() - 1);
                self.suites.len() - 1
            }
        };
        &mut self.suites[idx]
    }

    /// Registers (or reopens) the suite for `S`, constructing its instance
    /// with `S::default()` on first use.
    #[track_caller]
    pub fn suite<S>(&mut self) -> SuiteBuilder<'_, S>
    where
        S: Default + Send + Sync + 'static,
    {
        self.suite_with(S::default)
    }

    /// Registers (or reopens) the suite for `S` with a custom factory.
    #[track_caller]
    pub fn suite_with<S, F>(&mut self, factory: F) -> SuiteBuilder<'_, S>
    where
        S: Send + Sync + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let location = SourceLocation::caller();
        let suite = self.get_or_create(ClassId::of::<S>(), move || {
            SuiteConfig::new(location, factory)
        });
        SuiteBuilder {
            suite,
            _marker: PhantomData,
        }
    }

    pub fn get(&self, class: &ClassId) -> Option<&SuiteConfig> {
        self.index.get(class).map(|&idx| &self.suites[idx])
    }

    /// Class ids in registration order.
    pub fn classes(&self) -> Vec<ClassId> {
        self.suites.iter().map(|s| s.class).collect()
    }

    pub fn suites(&self) -> &[SuiteConfig] {
        &self.suites
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Finalizes all pending suites. Calling it again is a no-op.
    ///
    /// Rejects duplicate method names within a suite and settles line ranges:
    /// a test without an explicit end line ends one line before the next
    /// test in the suite begins, and a suite spans all of its tests.
    pub fn init(&mut self) -> Result<(), RegistryError> {
        if self.finalized {
            return Ok(());
        }

        for suite in &mut self.suites {
            let mut seen = HashSet::new();
            for test in &suite.tests {
                if !seen.insert(test.method.as_str()) {
                    return Err(RegistryError::DuplicateTest {
                        class: suite.class_name.clone(),
                        method: test.method.clone(),
                    });
                }
            }

            let starts: Vec<u32> = suite.tests.iter().map(|t| t.lines.start).collect();
            let suite_end = suite.explicit_end.then_some(suite.lines.end);
            for test in &mut suite.tests {
                if test.explicit_end {
                    continue;
                }
                let next_start = starts.iter().copied().filter(|&s| s > test.lines.start).min();
                test.lines.end = match (next_start, suite_end) {
                    (Some(next), _) => next - 1,
                    (None, Some(end)) => end,
                    (None, None) => test.lines.start,
                }
                .max(test.lines.start);
            }

            if let Some(last) = suite.tests.iter().map(|t| t.lines.end).max() {
                suite.lines.end = suite.lines.end.max(last);
            }

            if suite.tests.is_empty() {
                warn!("Suite {} declares no tests", suite.class_name);
            }
        }

        self.finalized = true;
        debug!("Registry finalized with {} suites", self.suites.len());
        Ok(())
    }
}

/// Typed handle for declaring a suite's tests and hooks.
pub struct SuiteBuilder<'r, S> {
    suite: &'r mut SuiteConfig,
    _marker: PhantomData<fn() -> S>,
}

impl<'r, S: Send + Sync + 'static> SuiteBuilder<'r, S> {
    /// Declares a test method. The caller's line becomes the test's start line.
    #[track_caller]
    pub fn test<F, Fut>(&mut self, name: &str, body: F) -> TestBuilder<'_>
    where
        F: Fn(Arc<S>, TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        let location = SourceLocation::caller();
        let class = self.suite.class;
        let run: TestFn = Arc::new(move |instance: SuiteInstance, ctx: TestContext| {
            match instance.downcast::<S>() {
                Ok(suite) => body(suite, ctx).boxed(),
                Err(_) => instance_mismatch::<S>(),
            }
        });
        let tests = &mut self.suite.tests;
        tests.push(TestConfig::new(class, name, location, run));
        let idx = tests.len() - 1;
        TestBuilder {
            test: &mut tests[idx],
        }
    }

    #[track_caller]
    pub fn before_all<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.hook(Phase::BeforeAll, SourceLocation::caller(), hook)
    }

    #[track_caller]
    pub fn before_each<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.hook(Phase::BeforeEach, SourceLocation::caller(), hook)
    }

    #[track_caller]
    pub fn after_each<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.hook(Phase::AfterEach, SourceLocation::caller(), hook)
    }

    #[track_caller]
    pub fn after_all<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.hook(Phase::AfterAll, SourceLocation::caller(), hook)
    }

    /// Sets the last line of the suite declaration.
    pub fn ends_at(&mut self, line: u32) -> &mut Self {
        self.suite.lines.end = line.max(self.suite.lines.start);
        self.suite.explicit_end = true;
        self
    }

    fn hook<F, Fut>(&mut self, phase: Phase, location: SourceLocation, hook: F) -> &mut Self
    where
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        let run: HookFn = Arc::new(move |instance: SuiteInstance| match instance.downcast::<S>() {
            Ok(suite) => hook(suite).boxed(),
            Err(_) => instance_mismatch::<S>(),
        });
        self.suite.hooks_mut(phase).push(Hook::new(location, run));
        self
    }
}

fn instance_mismatch<S>() -> TestFuture {
    let message = format!(
        "suite instance is not a {}",
        std::any::type_name::<S>()
    );
    futures::future::ready(Err(TestError::Thrown {
        kind: "Error".to_string(),
        message,
        location: None,
    }))
    .boxed()
}

/// Chained options for a declared test.
pub struct TestBuilder<'a> {
    test: &'a mut TestConfig,
}

impl TestBuilder<'_> {
    pub fn description(self, description: impl Into<String>) -> Self {
        self.test.description = description.into();
        self
    }

    pub fn skip(self) -> Self {
        self.test.skip = true;
        self
    }

    pub fn should_throw(self, expectation: ShouldThrow) -> Self {
        self.test.should_throw = Some(expectation);
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.test.timeout = Some(timeout);
        self
    }

    /// Sets the last line of the test declaration.
    pub fn ends_at(self, line: u32) -> Self {
        self.test.lines.end = line.max(self.test.lines.start);
        self.test.explicit_end = true;
        self
    }
}

/// A file that registers suites.
///
/// Usually declared with [`source_unit!`](crate::source_unit), which binds
/// the unit to the file it appears in.
#[derive(Clone, Copy)]
pub struct SourceUnit {
    file: &'static str,
    register: fn(&mut Registry),
}

impl SourceUnit {
    pub const fn new(file: &'static str, register: fn(&mut Registry)) -> Self {
        Self { file, register }
    }

    pub fn file(&self) -> &Path {
        Path::new(self.file)
    }

    /// Runs the unit's registration against `registry`.
    pub fn load(&self, registry: &mut Registry) {
        debug!("Loading source unit {}", self.file);
        (self.register)(registry);
    }
}

impl std::fmt::Debug for SourceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceUnit").field("file", &self.file).finish()
    }
}

/// The set of source units compiled into a runner binary.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    units: Vec<SourceUnit>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(mut self, unit: SourceUnit) -> Self {
        self.add(unit);
        self
    }

    pub fn add(&mut self, unit: SourceUnit) {
        self.units.push(unit);
    }

    /// Finds the unit registered for `path`.
    ///
    /// Paths are compared after lexical normalization, then by canonical
    /// path when both exist on disk.
    pub fn find(&self, path: &Path) -> Option<&SourceUnit> {
        let wanted = normalize_path(path);
        self.units
            .iter()
            .find(|u| normalize_path(u.file()) == wanted)
            .or_else(|| {
                let canonical = std::fs::canonicalize(path).ok()?;
                self.units
                    .iter()
                    .find(|u| std::fs::canonicalize(u.file()).ok().as_ref() == Some(&canonical))
            })
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Lexically normalizes a path: strips the current directory prefix from
/// absolute paths, drops `.` components and resolves `..` where possible.
pub fn normalize_path(path: &Path) -> PathBuf {
    let relative = if path.is_absolute() {
        std::env::current_dir()
            .ok()
            .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
            .unwrap_or_else(|| path.to_path_buf())
    } else {
        path.to_path_buf()
    };

    let mut out: Vec<Component<'_>> = Vec::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MathSuite {
        calls: AtomicUsize,
    }

    struct OtherSuite;

    fn register_math(registry: &mut Registry) {
        let mut suite = registry.suite::<MathSuite>();
        suite.test("adds", |_, _| async { Ok(()) });
        suite.test("subtracts", |_, _| async { Ok(()) });
        suite.test("multiplies", |_, _| async { Ok(()) }).ends_at(500);
    }

    #[test]
    fn test_get_or_create_reuses_suite() {
        let mut registry = Registry::new();
        registry.suite::<MathSuite>().test("one", |_, _| async { Ok(()) });
        registry.suite::<MathSuite>().test("two", |_, _| async { Ok(()) });
        registry
            .suite_with(|| OtherSuite)
            .test("three", |_, _| async { Ok(()) });

        assert_eq!(registry.suites().len(), 2);
        let classes = registry.classes();
        assert_eq!(classes[0].name(), "MathSuite");
        assert_eq!(classes[1].name(), "OtherSuite");
        assert_eq!(registry.get(&classes[0]).unwrap().tests.len(), 2);
    }

    #[test]
    fn test_init_settles_line_ranges() {
        let mut registry = Registry::new();
        register_math(&mut registry);
        registry.init().unwrap();

        let suite = &registry.suites()[0];
        let (a, b, c) = (&suite.tests[0], &suite.tests[1], &suite.tests[2]);
        assert!(a.lines.start < b.lines.start);
        assert_eq!(a.lines.end, b.lines.start - 1);
        assert_eq!(b.lines.end, c.lines.start - 1);
        assert_eq!(c.lines.end, 500);
        assert_eq!(suite.lines.end, 500);
        assert!(suite.file.ends_with("registry.rs"));

        assert_eq!(suite.test_at_line(b.lines.start).unwrap().method, "subtracts");
        assert_eq!(suite.test_at_line(a.lines.end).unwrap().method, "adds");
        assert_eq!(suite.test_at_line(10_000).unwrap().method, "multiplies");
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut registry = Registry::new();
        register_math(&mut registry);
        registry.init().unwrap();
        let before: Vec<_> = registry.suites()[0].tests.iter().map(|t| t.lines).collect();

        registry.init().unwrap();
        let after: Vec<_> = registry.suites()[0].tests.iter().map(|t| t.lines).collect();
        assert!(registry.is_finalized());
        assert_eq!(before, after);
    }

    #[test]
    fn test_duplicate_test_rejected() {
        let mut registry = Registry::new();
        let mut suite = registry.suite::<MathSuite>();
        suite.test("same", |_, _| async { Ok(()) });
        suite.test("same", |_, _| async { Ok(()) });

        let err = registry.init().unwrap_err();
        assert!(err.to_string().contains("same"));
        assert!(!registry.is_finalized());
    }

    #[test]
    fn test_builder_options() {
        let mut registry = Registry::new();
        registry
            .suite::<MathSuite>()
            .test("slow", |_, _| async { Ok(()) })
            .description("a slow one")
            .skip()
            .timeout(Duration::from_millis(50))
            .should_throw(ShouldThrow::any());

        let test = &registry.suites()[0].tests[0];
        assert_eq!(test.description, "a slow one");
        assert!(test.skip);
        assert_eq!(test.timeout, Some(Duration::from_millis(50)));
        assert!(matches!(test.should_throw, Some(ShouldThrow::Flag(true))));
        assert_eq!(test.id(), "MathSuite::slow");
    }

    #[tokio::test]
    async fn test_hooks_are_bound_to_instance() {
        let mut registry = Registry::new();
        registry
            .suite::<MathSuite>()
            .before_each(|s| async move {
                s.calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .after_all(|_| async { Ok(()) });

        let suite = &registry.suites()[0];
        assert_eq!(suite.hooks(Phase::BeforeEach).len(), 1);
        assert_eq!(suite.hooks(Phase::AfterAll).len(), 1);
        assert!(suite.hooks(Phase::BeforeAll).is_empty());

        let instance = suite.instance();
        suite.before_each[0].invoke(instance.clone()).await.unwrap();
        suite.before_each[0].invoke(instance.clone()).await.unwrap();
        let typed = instance.downcast::<MathSuite>().unwrap();
        assert_eq!(typed.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_catalog_find_normalizes() {
        let catalog = Catalog::new()
            .with_unit(SourceUnit::new("src/../demos/arithmetic.rs", register_math))
            .with_unit(SourceUnit::new("demos/lifecycle.rs", register_math));

        assert!(catalog.find(Path::new("demos/arithmetic.rs")).is_some());
        assert!(catalog.find(Path::new("./demos/lifecycle.rs")).is_some());
        assert!(catalog.find(Path::new("demos/missing.rs")).is_none());
        assert_eq!(catalog.len(), 2);

        let mut registry = Registry::new();
        catalog.units()[0].load(&mut registry);
        assert_eq!(registry.suites()[0].tests.len(), 3);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("a/./b/../c.rs")), PathBuf::from("a/c.rs"));
        assert_eq!(normalize_path(Path::new("../x.rs")), PathBuf::from("../x.rs"));
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(normalize_path(&cwd.join("t/u.rs")), PathBuf::from("t/u.rs"));
    }
}
