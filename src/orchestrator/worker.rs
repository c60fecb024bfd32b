//! Worker processes.
//!
//! The parent re-invokes its own executable once per file with
//! [`WORKER_ENV`] set. The worker runs that file with event reporting
//! suppressed and prints its [`SuitesResult`] as a single JSON line on
//! stdout. It exits 0 once the message is sent, whatever the tests did;
//! any other exit status means the worker crashed.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::debug;

use crate::result::SuitesResult;

/// Environment flag that puts the binary in worker mode.
pub const WORKER_ENV: &str = "SUITEST_WORKER";

/// Whether this process was launched as a worker.
pub fn is_worker() -> bool {
    std::env::var_os(WORKER_ENV).is_some_and(|value| value == "1")
}

/// Errors surfaced by a failed worker. The file's results are lost.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    /// The worker process could not be started.
    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    /// The worker exited abnormally.
    #[error("Worker exited with {status}\n{stderr}")]
    Crashed { status: String, stderr: String },

    /// The worker exited cleanly but its message was missing or unreadable.
    #[error("Worker sent no usable result ({reason})\n{stderr}")]
    Protocol { reason: String, stderr: String },
}

/// Runs one file in isolation and returns its aggregate.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn run_file(&self, file: &Path) -> Result<SuitesResult, WorkerError>;
}

/// Launches workers as child processes of a runner binary.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    config: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            config: None,
        }
    }

    /// A launcher that re-invokes the running executable.
    pub fn current() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Passes `--config <path>` to every worker.
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }
}

enum OutputLine {
    Stdout(String),
    Stderr(String),
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn run_file(&self, file: &Path) -> Result<SuitesResult, WorkerError> {
        let mut command = tokio::process::Command::new(&self.program);
        if let Some(config) = &self.config {
            command.arg("--config").arg(config);
        }
        command
            .arg(file)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Spawning worker for {}", file.display());
        let mut child = command
            .spawn()
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Spawn("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| WorkerError::Spawn("stderr not captured".to_string()))?;

        let stdout_lines = LinesStream::new(BufReader::new(stdout).lines())
            .map(|line| OutputLine::Stdout(line.unwrap_or_default()));
        let stderr_lines = LinesStream::new(BufReader::new(stderr).lines())
            .map(|line| OutputLine::Stderr(line.unwrap_or_default()));
        let mut lines = stream::select(stdout_lines, stderr_lines);

        let mut out = String::new();
        let mut err = String::new();
        while let Some(line) = lines.next().await {
            match line {
                OutputLine::Stdout(s) => {
                    out.push_str(&s);
                    out.push('\n');
                }
                OutputLine::Stderr(s) => {
                    debug!("[{}] {}", file.display(), s);
                    err.push_str(&s);
                    err.push('\n');
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;
        if !status.success() {
            return Err(WorkerError::Crashed {
                status: status.to_string(),
                stderr: err,
            });
        }

        parse_message(&out).map_err(|reason| WorkerError::Protocol { reason, stderr: err })
    }
}

/// Extracts the worker's message: the last stdout line that starts with `{`.
pub fn parse_message(stdout: &str) -> Result<SuitesResult, String> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with('{'))
        .ok_or_else(|| "no result message on stdout".to_string())?;
    serde_json::from_str(line).map_err(|e| format!("invalid result message: {}", e))
}

/// Writes `results` as the worker's single message line.
pub fn send_message(mut out: impl Write, results: &SuitesResult) -> std::io::Result<()> {
    let line = serde_json::to_string(results)?;
    writeln!(out, "{}", line)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{LineRange, SuiteResult};

    fn sample() -> SuitesResult {
        let mut results = SuitesResult::new();
        results.push(SuiteResult::new("MathSuite", "tests/math.rs", LineRange::new(1, 9)));
        results
    }

    #[test]
    fn test_message_roundtrip_with_noise() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(b"some log line\n{not json either\n");
        send_message(&mut buffer, &sample()).unwrap();
        buffer.extend_from_slice(b"trailing text\n");

        let stdout = String::from_utf8(buffer).unwrap();
        let parsed = parse_message(&stdout).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_missing_or_bad_message() {
        assert!(parse_message("").unwrap_err().contains("no result message"));
        assert!(parse_message("{\"passed\": \"x\"}").unwrap_err().contains("invalid"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_crashed_worker_carries_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("worker.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"cannot load $1\" >&2\nexit 3\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = ProcessLauncher::new(&script)
            .run_file(Path::new("tests/math.rs"))
            .await
            .unwrap_err();
        match err {
            WorkerError::Crashed { stderr, .. } => {
                assert!(stderr.contains("cannot load tests/math.rs"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_without_message_is_protocol_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("worker.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"worker=$SUITEST_WORKER\"\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = ProcessLauncher::new(&script)
            .run_file(Path::new("tests/math.rs"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Protocol { .. }));
    }
}
