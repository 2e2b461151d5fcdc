//! `[render]` section configuration.
//!
//! External template renderer for pages that opt in with a leading directive.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[render]` section in stitch.toml.
///
/// A page whose content starts with `directive` has the directive stripped and
/// its final content piped through `command` (stdin → stdout).
///
/// # Example
/// ```toml
/// [render]
/// directive = "@ejs"
/// command = ["ejs", "--stdin"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Marker a page must start with to opt into rendering.
    #[serde(default = "defaults::render::directive")]
    #[educe(Default = defaults::render::directive())]
    pub directive: String,

    /// Renderer command line. Empty means rendering is unavailable.
    pub command: Vec<String>,
}

impl RenderConfig {
    pub fn is_enabled(&self) -> bool {
        !self.command.is_empty()
    }
}
