//! Configuration schema definitions for suitest.
//!
//! This module defines all configuration types that can be deserialized from
//! TOML configuration files.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── SuitestConfig          - Core settings (timeouts, workers, discovery)
//! └── ReportConfig           - Output and reporting settings
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure for suitest.
///
/// # TOML Structure
///
/// ```toml
/// [suitest]
/// default_timeout_ms = 5000
/// max_workers = 4
/// include = ["tests/**/*.rs"]
///
/// [report]
/// output_dir = "test-results"
/// junit = true
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Core execution and discovery settings.
    #[serde(default)]
    pub suitest: SuitestConfig,

    /// Report configuration for output generation.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Core suitest execution settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `default_timeout_ms` | 5000 |
/// | `max_workers` | CPU count - 1 (min 1) |
/// | `marker` | `"source_unit!"` |
/// | `include` | `["tests/**/*.rs"]` |
/// | `exclude` | `["target", "node_modules", "vendor", ".git"]` |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SuitestConfig {
    /// Timeout applied to every test and lifecycle hook that does not
    /// declare its own, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Maximum number of worker processes when more than one file runs.
    ///
    /// If unset, one less than the number of logical CPUs is used.
    pub max_workers: Option<usize>,

    /// Token whose presence on any line marks a file as a source unit.
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Glob patterns searched when no patterns are given on the command line.
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Path components that exclude a file from discovery
    /// (dependency and vendor trees).
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

impl Default for SuitestConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_workers: None,
            marker: default_marker(),
            include: default_include(),
            exclude: default_exclude(),
        }
    }
}

impl SuitestConfig {
    /// The default per-test timeout as a [`Duration`].
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Concurrency bound for worker fan-out. Never less than 1.
    pub fn worker_bound(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_marker() -> String {
    "source_unit!".to_string()
}

fn default_include() -> Vec<String> {
    vec!["tests/**/*.rs".to_string()]
}

fn default_exclude() -> Vec<String> {
    ["target", "node_modules", "vendor", ".git"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Configuration for test result reporting.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `output_dir` | `"test-results"` |
/// | `junit` | `false` |
/// | `junit_file` | `"junit.xml"` |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Directory where report files are written.
    #[serde(default = "default_report_dir")]
    pub output_dir: PathBuf,

    /// Whether to write a JUnit XML report after the run.
    #[serde(default)]
    pub junit: bool,

    /// Filename for the JUnit XML report, relative to `output_dir`.
    #[serde(default = "default_junit_file")]
    pub junit_file: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_report_dir(),
            junit: false,
            junit_file: default_junit_file(),
        }
    }
}

impl ReportConfig {
    /// Full path of the JUnit report.
    pub fn junit_path(&self) -> PathBuf {
        self.output_dir.join(&self.junit_file)
    }
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("test-results")
}

fn default_junit_file() -> String {
    "junit.xml".to_string()
}
