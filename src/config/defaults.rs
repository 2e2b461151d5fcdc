//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn pages() -> PathBuf {
        "src/main".into()
    }

    pub fn partials() -> PathBuf {
        "src/partials".into()
    }

    pub fn output() -> PathBuf {
        "dist".into()
    }

    pub fn deps_map() -> PathBuf {
        "dev/partial-to-main.json".into()
    }
}

// ============================================================================
// [env] Section Defaults
// ============================================================================

pub mod env {
    use std::path::PathBuf;

    pub fn mode() -> String {
        "dev".into()
    }

    pub fn vars_file() -> PathBuf {
        "wrangler.toml".into()
    }
}

// ============================================================================
// [render] Section Defaults
// ============================================================================

pub mod render {
    pub fn directive() -> String {
        "@ejs".into()
    }
}

// ============================================================================
// [watch] Section Defaults
// ============================================================================

pub mod watch {
    pub fn debounce_ms() -> u64 {
        1000
    }
}
