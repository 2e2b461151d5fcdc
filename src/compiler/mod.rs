//! Page assembly.
//!
//! - **tokens**: literal token substitution and `$key` aliases
//! - **partials**: partial cache and `@PARTIAL(name)` expansion
//! - **rules**: per-path rule table and resolution
//! - **inject**: structural injection around `<head>` / `<body>`
//! - **transform**: deferred content transforms
//! - **deps**: partial → page dependency map
//! - **pages**: the per-page pipeline
//!
//! # Page Flow
//!
//! ```text
//! read ──► directive? ──► tokens ──► @PARTIAL ──► rules ──► transforms ──► write
//!                                        │           │
//!                                        └───────────┴──► DependencyMap
//! ```

pub mod deps;
pub mod error;
pub mod inject;
pub mod pages;
pub mod partials;
pub mod rules;
pub mod tokens;
pub mod transform;

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use pages::BuildContext;

/// Files to ignore during directory traversal
const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// Extensions of files that go through the page pipeline.
const PROCESSABLE_SUFFIXES: &[&str] = &[".html", ".htm", ".js", ".js.download", ".webmanifest"];

/// File names that go through the page pipeline regardless of extension.
const PROCESSABLE_NAMES: &[&str] = &["_redirects"];

/// Collect all files from a directory recursively, in enumeration order.
pub fn collect_all_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_str().unwrap_or_default();
            !IGNORED_FILES.contains(&name)
        })
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Whether `rel` is transformed (true) or copied byte-for-byte (false).
pub fn is_processable(rel: &str) -> bool {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    PROCESSABLE_NAMES.contains(&name) || PROCESSABLE_SUFFIXES.iter().any(|s| name.ends_with(s))
}
