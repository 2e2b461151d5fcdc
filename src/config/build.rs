//! `[build]` section configuration.
//!
//! Source and output locations of the assembly pipeline.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in stitch.toml - build pipeline paths.
///
/// # Example
/// ```toml
/// [build]
/// pages = "src/main"          # Pages root, mirrored into `output`
/// partials = "src/partials"   # Fragments referenced by @PARTIAL(name)
/// output = "dist"
/// deps_map = "dev/partial-to-main.json"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Pages root directory.
    #[serde(default = "defaults::build::pages")]
    #[educe(Default = defaults::build::pages())]
    pub pages: PathBuf,

    /// Partials directory (flat, `*.html`).
    #[serde(default = "defaults::build::partials")]
    #[educe(Default = defaults::build::partials())]
    pub partials: PathBuf,

    /// Build output directory.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Where the partial→page dependency map is persisted after a full build.
    #[serde(default = "defaults::build::deps_map")]
    #[educe(Default = defaults::build::deps_map())]
    pub deps_map: PathBuf,
}
