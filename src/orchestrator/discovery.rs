//! Source-unit discovery.
//!
//! Expands glob patterns, drops directories and anything under an excluded
//! path component, then keeps the files that contain the marker token on
//! some line. The scan stops at the first matching line.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::SuitestConfig;

/// Errors that can occur during discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A pattern is not a valid glob.
    #[error("Invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
}

/// Finds source units on disk.
#[derive(Debug, Clone)]
pub struct Discovery {
    marker: String,
    exclude: Vec<String>,
}

impl Discovery {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            exclude: Vec::new(),
        }
    }

    pub fn from_config(config: &SuitestConfig) -> Self {
        Self::new(config.marker.as_str()).with_exclude(config.exclude.iter().cloned())
    }

    pub fn with_exclude(mut self, components: impl IntoIterator<Item = String>) -> Self {
        self.exclude.extend(components);
        self
    }

    /// Returns the qualifying files matched by `patterns`, in pattern order,
    /// without duplicates.
    pub fn discover(&self, patterns: &[String]) -> Result<Vec<PathBuf>, DiscoveryError> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for pattern in patterns {
            let entries = glob::glob(pattern).map_err(|source| DiscoveryError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;

            for entry in entries {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!("Skipping unreadable path: {}", e);
                        continue;
                    }
                };
                if path.is_dir() || self.is_excluded(&path) || !seen.insert(path.clone()) {
                    continue;
                }
                match self.contains_marker(&path) {
                    Ok(true) => files.push(path),
                    Ok(false) => debug!("No marker in {}", path.display()),
                    Err(e) => warn!("Failed to scan {}: {}", path.display(), e),
                }
            }
        }

        debug!("Discovered {} source units", files.len());
        Ok(files)
    }

    /// Whether any component of `path` is excluded.
    pub fn is_excluded(&self, path: &Path) -> bool {
        path.components().any(|component| {
            let name = component.as_os_str();
            self.exclude.iter().any(|excluded| name == excluded.as_str())
        })
    }

    /// Streams `path` line by line until a line contains the marker.
    pub fn contains_marker(&self, path: &Path) -> io::Result<bool> {
        let needle = self.marker.as_bytes();
        if needle.is_empty() {
            return Ok(true);
        }
        let reader = BufReader::new(File::open(path)?);
        for line in reader.split(b'\n') {
            let line = line?;
            if line.windows(needle.len()).any(|window| window == needle) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
