//! Artifact discovery
//!
//! Scans a domain's artifact directory for files matching the primary glob,
//! then the legacy glob, and picks the most recently modified match.

use crate::errors::ConfigError;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, instrument};

/// A located artifact file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// A file-name glob supporting `*` and `?`, compiled to an anchored regex
#[derive(Debug, Clone)]
pub struct FilePattern {
    source: String,
    regex: Regex,
}

impl FilePattern {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        if pattern.is_empty() || pattern.contains('/') || pattern.contains('\\') {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "must be a non-empty file name pattern".to_string(),
            });
        }
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');
        let regex = Regex::new(&expr).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Primary and legacy patterns for one domain directory
#[derive(Debug, Clone)]
pub struct Locator {
    pub directory: PathBuf,
    pub primary: FilePattern,
    pub legacy: Option<FilePattern>,
}

impl Locator {
    /// Newest matching artifact, or `None` when the directory is absent or empty
    #[instrument(skip(self), fields(dir = %self.directory.display()))]
    pub fn locate(&self) -> Option<ArtifactRef> {
        let found = newest_match(&self.directory, &self.primary).or_else(|| {
            self.legacy
                .as_ref()
                .and_then(|legacy| newest_match(&self.directory, legacy))
        });
        match &found {
            Some(r) => debug!(path = %r.path.display(), "located artifact"),
            None => debug!("no artifact present"),
        }
        found
    }
}

fn newest_match(directory: &Path, pattern: &FilePattern) -> Option<ArtifactRef> {
    let entries = fs::read_dir(directory).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| pattern.matches(name))
                .unwrap_or(false)
        })
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            Some(ArtifactRef {
                path: entry.path(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            })
        })
        // Ties on mtime resolve by path so the choice is stable across scans.
        .max_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| a.path.cmp(&b.path))
        })
}
