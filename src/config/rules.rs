//! `[[rules."<key>"]]` entries.
//!
//! These are the raw, deserialized shapes. They are compiled into
//! [`crate::compiler::rules::RuleTable`] once at startup.
//!
//! # Example
//! ```toml
//! [[rules."pages/*"]]
//! pre_body_close = "footer"
//! post_head_open = { concat = ["meta", "fonts"] }
//! find = "old"
//! replace_all = "new"
//! rename = { pattern = "\\.html$", replacement = ".htm" }
//! transform = "minify"
//! skip = ["pages/legal.html"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One rule as written in stitch.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleConfig {
    pub pre_body_close: Option<InjectionSource>,
    pub pre_head_close: Option<InjectionSource>,
    pub post_body_open: Option<InjectionSource>,
    pub post_head_open: Option<InjectionSource>,

    /// Literal text to look for.
    pub find: Option<String>,
    /// Replace the first occurrence of `find`.
    pub replace: Option<String>,
    /// Replace every occurrence of `find`.
    pub replace_all: Option<String>,

    /// Output directory override; the page keeps its relative path under it.
    pub output: Option<PathBuf>,
    pub rename: Option<RenameConfig>,
    pub transform: Option<TransformKind>,

    /// Relative page paths this rule does not apply to.
    pub skip: Vec<String>,
}

/// What an injection point inserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InjectionSource {
    /// Name of a cached partial.
    Partial(String),
    /// Content computed at injection time.
    Computed(Generator),
}

/// Computed partial generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Generator {
    /// Cached partials joined with newlines.
    Concat(Vec<String>),
    /// `<script>window.<var> = {...};</script>` built from env variables.
    EnvScript { var: String, keys: Vec<String> },
    /// Stdout of a command fed the current page content.
    Command(Vec<String>),
}

/// Destination path rewrite: regex replacement over the output path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameConfig {
    pub pattern: String,
    pub replacement: String,
}

/// Deferred content transforms, applied after the whole rule pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Minify,
    HtmlToJs,
    Command(Vec<String>),
}
