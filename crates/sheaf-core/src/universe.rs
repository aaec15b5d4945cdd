//! The ordered universe of work items.
//!
//! Order defines the cursor: offset `n` always means "the n-th identifier of
//! this list". The universe is loaded fresh at the start of every invocation
//! and must not change while a cycle is in flight.

use std::collections::HashSet;
use std::path::Path;

use crate::AppError;
use crate::config::UniverseConfig;

/// Ordered, duplicate-free list of work-item identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    items: Vec<String>,
}

impl Universe {
    /// Builds a universe from raw identifiers.
    ///
    /// Identifiers are trimmed; blank entries are skipped. Duplicates keep
    /// their first position and are logged. An empty result is a
    /// configuration error.
    pub fn new<I, T>(items: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut duplicates = 0usize;

        for item in items {
            let id = item.as_ref().trim();
            if id.is_empty() {
                continue;
            }
            if seen.insert(id.to_string()) {
                ordered.push(id.to_string());
            } else {
                duplicates += 1;
                tracing::warn!(id, "Duplicate work item dropped from universe");
            }
        }

        if ordered.is_empty() {
            return Err(AppError::ConfigError(
                "work-item universe is empty".to_string(),
            ));
        }
        if duplicates > 0 {
            tracing::warn!(duplicates, kept = ordered.len(), "Universe contained duplicates");
        }

        Ok(Self { items: ordered })
    }

    /// Reads a newline-separated list. Lines starting with `#` are comments.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read universe file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::new(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.starts_with('#')),
        )
    }

    /// Loads the universe described by the `[universe]` config section.
    pub fn from_config(config: &UniverseConfig) -> Result<Self, AppError> {
        match (&config.path, config.items.is_empty()) {
            (Some(_), false) => Err(AppError::ConfigError(
                "universe: set either `items` or `path`, not both".to_string(),
            )),
            (Some(path), true) => Self::from_file(path),
            (None, _) => Self::new(&config.items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// The identifiers in `[offset, offset + len)`, clipped to the universe end.
    pub fn window(&self, offset: usize, len: usize) -> &[String] {
        let start = offset.min(self.items.len());
        let end = offset.saturating_add(len).min(self.items.len());
        &self.items[start..end]
    }
}
