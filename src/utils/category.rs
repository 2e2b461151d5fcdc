//! File category classification for watch mode.
//!
//! | Category | Rebuild scope                                  | Example               |
//! |----------|------------------------------------------------|-----------------------|
//! | Page     | The page, plus dependents if it is a partial   | `src/main/**`         |
//! | Partial  | Pages recorded as consuming it                 | `src/partials/*.html` |
//! | Config   | Full rebuild                                   | `stitch.toml`         |
//! | Unknown  | Ignored                                        | anything else         |

use crate::config::SiteConfig;
use std::{
    env,
    path::{Path, PathBuf},
};

/// Category of a changed file, used to determine rebuild scope in watch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Page,
    Partial,
    Config,
    Unknown,
}

impl FileCategory {
    /// Short name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Partial => "partial",
            Self::Config => "config",
            Self::Unknown => "unknown",
        }
    }

    /// Watched location for this category.
    pub fn path(self, config: &SiteConfig) -> Option<&Path> {
        match self {
            Self::Page => Some(&config.build.pages),
            Self::Partial => Some(&config.build.partials),
            Self::Config => Some(&config.config_path),
            Self::Unknown => None,
        }
    }

    /// Returns true if this category is watched as a directory.
    pub const fn is_directory(self) -> bool {
        matches!(self, Self::Page | Self::Partial)
    }
}

/// Categorize a changed path.
///
/// Partials are checked before pages so a partials directory nested inside
/// the pages root still counts as partials.
pub fn categorize_path(path: &Path, config: &SiteConfig) -> FileCategory {
    let path = normalize_path(path);

    if path == config.config_path {
        FileCategory::Config
    } else if path.starts_with(&config.build.partials) {
        FileCategory::Partial
    } else if path.starts_with(&config.build.pages) {
        FileCategory::Page
    } else {
        FileCategory::Unknown
    }
}

/// Normalize a path to absolute form for reliable comparison.
///
/// Existing paths are canonicalized; missing ones (e.g. a deleted file) are
/// made absolute against the current directory.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_at(root: &Path) -> SiteConfig {
        let mut config = SiteConfig::default();
        config.config_path = root.join("stitch.toml");
        config.build.pages = root.join("src/main");
        config.build.partials = root.join("src/main/_partials");
        config
    }

    #[test]
    fn test_category_name() {
        assert_eq!(FileCategory::Page.name(), "page");
        assert_eq!(FileCategory::Partial.name(), "partial");
        assert_eq!(FileCategory::Config.name(), "config");
        assert_eq!(FileCategory::Unknown.name(), "unknown");
    }

    #[test]
    fn test_is_directory() {
        assert!(FileCategory::Page.is_directory());
        assert!(FileCategory::Partial.is_directory());
        assert!(!FileCategory::Config.is_directory());
        assert!(!FileCategory::Unknown.is_directory());
    }

    #[test]
    fn test_categorize_path() {
        let root = Path::new("/nonexistent/site");
        let config = config_at(root);

        assert_eq!(
            categorize_path(&root.join("stitch.toml"), &config),
            FileCategory::Config
        );
        assert_eq!(
            categorize_path(&root.join("src/main/index.html"), &config),
            FileCategory::Page
        );
        assert_eq!(
            categorize_path(&root.join("src/main/_partials/nav.html"), &config),
            FileCategory::Partial
        );
        assert_eq!(
            categorize_path(&root.join("README.md"), &config),
            FileCategory::Unknown
        );
    }

    #[test]
    fn test_category_path() {
        let root = Path::new("/nonexistent/site");
        let config = config_at(root);

        assert_eq!(
            FileCategory::Config.path(&config),
            Some(root.join("stitch.toml").as_path())
        );
        assert_eq!(FileCategory::Unknown.path(&config), None);
    }

    #[test]
    fn test_normalize_path_absolute() {
        let normalized = normalize_path(Path::new("/absolute/path/file.txt"));
        assert_eq!(normalized, PathBuf::from("/absolute/path/file.txt"));
    }

    #[test]
    fn test_normalize_path_relative() {
        let normalized = normalize_path(Path::new("missing/file.txt"));
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("missing/file.txt"));
    }
}
