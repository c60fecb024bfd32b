//! Scoped recorder for structured assertions.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::result::Assertion;

type Callback = Arc<dyn Fn(&Assertion) + Send + Sync>;

struct Scope {
    generation: u64,
    test: String,
    records: Vec<Assertion>,
    on_assertion: Callback,
}

#[derive(Default)]
struct State {
    generation: u64,
    scope: Option<Scope>,
}

/// Owner of the single assertion capture scope of an executor.
///
/// `start` opens a scope and hands out an [`AssertionRecorder`] bound to it;
/// `end` closes the scope and returns what was recorded, in order.
#[derive(Clone, Default)]
pub struct AssertionCapture {
    state: Arc<Mutex<State>>,
}

impl AssertionCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a scope for `test`. Every recorded assertion is also passed to
    /// `on_assertion` as it happens.
    pub fn start<F>(&self, test: impl Into<String>, on_assertion: F) -> AssertionRecorder
    where
        F: Fn(&Assertion) + Send + Sync + 'static,
    {
        let mut state = lock(&self.state);
        if let Some(previous) = state.scope.take() {
            warn!(
                "Assertion scope for {} was never closed; discarding {} records",
                previous.test,
                previous.records.len()
            );
        }
        state.generation += 1;
        state.scope = Some(Scope {
            generation: state.generation,
            test: test.into(),
            records: Vec::new(),
            on_assertion: Arc::new(on_assertion),
        });
        AssertionRecorder {
            state: Arc::clone(&self.state),
            generation: state.generation,
        }
    }

    /// Closes the active scope and returns its records.
    pub fn end(&self) -> Vec<Assertion> {
        lock(&self.state)
            .scope
            .take()
            .map(|scope| scope.records)
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        lock(&self.state).scope.is_some()
    }
}

/// Handle that appends to the scope it was issued for.
///
/// Records arriving after that scope closed are dropped.
#[derive(Clone)]
pub struct AssertionRecorder {
    state: Arc<Mutex<State>>,
    generation: u64,
}

impl AssertionRecorder {
    /// Appends `assertion` and notifies the scope's listener.
    /// Returns false when the scope is no longer active.
    pub fn record(&self, assertion: Assertion) -> bool {
        let callback = {
            let mut state = lock(&self.state);
            match state.scope.as_mut() {
                Some(scope) if scope.generation == self.generation => {
                    scope.records.push(assertion.clone());
                    Arc::clone(&scope.on_assertion)
                }
                _ => {
                    debug!(
                        "Dropping assertion at {}:{} from a closed scope",
                        assertion.file.display(),
                        assertion.line
                    );
                    return false;
                }
            }
        };
        callback(&assertion);
        true
    }

    /// A recorder whose scope never existed. Everything it records is dropped.
    pub fn detached() -> Self {
        Self {
            state: Arc::default(),
            generation: 0,
        }
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
