//! Per-test console buffers.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

/// A captured output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn name(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Default)]
struct State {
    generation: u64,
    active: bool,
    buffers: BTreeMap<String, String>,
}

/// Owner of the single console capture scope of an executor.
#[derive(Clone, Default)]
pub struct ConsoleCapture {
    state: Arc<Mutex<State>>,
}

impl ConsoleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a fresh scope and returns a handle that writes into it.
    pub fn start(&self) -> ConsoleHandle {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.active = true;
        state.buffers.clear();
        ConsoleHandle {
            state: Arc::clone(&self.state),
            generation: state.generation,
        }
    }

    /// Closes the scope and returns the non-empty buffers keyed by stream name.
    pub fn end(&self) -> BTreeMap<String, String> {
        let mut state = lock(&self.state);
        state.active = false;
        std::mem::take(&mut state.buffers)
            .into_iter()
            .filter(|(_, text)| !text.is_empty())
            .collect()
    }
}

/// Write access to one console scope.
#[derive(Clone)]
pub struct ConsoleHandle {
    state: Arc<Mutex<State>>,
    generation: u64,
}

impl ConsoleHandle {
    /// Appends `text` to `stream`. Returns false if the scope has closed.
    pub fn write(&self, stream: Stream, text: &str) -> bool {
        let mut state = lock(&self.state);
        if !state.active || state.generation != self.generation {
            debug!("Dropping {} bytes of {} from a closed scope", text.len(), stream);
            return false;
        }
        state
            .buffers
            .entry(stream.name().to_string())
            .or_default()
            .push_str(text);
        true
    }

    pub fn writer(&self, stream: Stream) -> ConsoleWriter {
        ConsoleWriter {
            handle: self.clone(),
            stream,
        }
    }

    /// A handle that discards everything.
    pub fn detached() -> Self {
        Self {
            state: Arc::default(),
            generation: 0,
        }
    }
}

/// [`io::Write`] adapter over a console scope, for `writeln!` and friends.
pub struct ConsoleWriter {
    handle: ConsoleHandle,
    stream: Stream,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle
            .write(self.stream, &String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
