//! Partial cache and `@PARTIAL(name)` expansion.

use super::tokens::{TokenMap, replace_tokens};
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use std::{fs, io::ErrorKind, path::Path, sync::LazyLock};

static RE_PARTIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@PARTIAL\(([^)]+)\)").unwrap());

/// Rendered partials keyed by name.
///
/// Directory partials are keyed by file stem; page partials by their
/// `[page_partials]` alias.
#[derive(Debug, Default)]
pub struct PartialCache {
    entries: FxHashMap<String, String>,
}

impl PartialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.html` file directly under `dir`, token-substituted.
    ///
    /// A missing directory means no partials. Subdirectories are ignored.
    pub fn load_dir(&mut self, dir: &Path, tokens: &TokenMap) -> Result<usize> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", dir.display()));
            }
        };

        let mut count = 0;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "html") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read partial {}", path.display()))?;
            self.entries
                .insert(key.to_string(), replace_tokens(&content, tokens));
            count += 1;
        }
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, content: String) {
        self.entries.insert(name.to_string(), content);
    }
}

/// Replace every `@PARTIAL(name)` marker via `resolve`.
///
/// Names are trimmed. `resolve` is called once per marker, in document order,
/// and is where dependencies get recorded. The first error aborts expansion.
pub fn expand_partials<F>(html: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    if !html.contains("@PARTIAL(") {
        return Ok(html.to_string());
    }

    let mut error = None;
    let out = RE_PARTIAL.replace_all(html, |caps: &Captures| {
        if error.is_some() {
            return String::new();
        }
        match resolve(caps[1].trim()) {
            Ok(content) => content,
            Err(e) => {
                error = Some(e);
                String::new()
            }
        }
    });

    match error {
        Some(e) => Err(e),
        None => Ok(out.into_owned()),
    }
}
