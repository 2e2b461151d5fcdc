//! Partial → page dependency map.
//!
//! Filled while pages build, written wholesale after a full build and read by
//! the watcher to decide which pages a partial change affects.
//!
//! ```json
//! {
//!   "nav": ["index.html", "about.html"],
//!   "home": ["blog/index.html"]
//! }
//! ```

use crate::log;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io::ErrorKind, path::Path};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyMap {
    map: BTreeMap<String, Vec<String>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `page` consumed `partial`. Repeats are ignored.
    pub fn record(&mut self, partial: &str, page: &str) {
        let pages = self.map.entry(partial.to_string()).or_default();
        if !pages.iter().any(|p| p == page) {
            pages.push(page.to_string());
        }
    }

    /// Pages that consumed `partial`, in first-use order.
    pub fn dependents(&self, partial: &str) -> &[String] {
        self.map.get(partial).map(Vec::as_slice).unwrap_or_default()
    }

    /// Overwrite `path` with the whole map.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Read a persisted map. Missing or unreadable maps are empty.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    log!("watch"; "dependency map not found: {}", path.display());
                } else {
                    log!("error"; "failed to read {}: {e}", path.display());
                }
                return Self::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            log!("error"; "failed to parse {}: {e}", path.display());
            Self::new()
        })
    }
}
