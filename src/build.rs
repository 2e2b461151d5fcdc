//! Site building orchestration.
//!
//! # Architecture
//!
//! ```text
//! build_site(files)
//!     │
//!     ├── load_partials()      partials dir, then page partials
//!     │
//!     ├── files empty?
//!     │     ├── yes: walk pages root ──► process_file() each
//!     │     │        save dependency map
//!     │     └── no:  process_file() for each listed file / directory
//!     │
//!     └── log "done"
//! ```
//!
//! Pages are processed strictly one after another; the first error aborts
//! the build.

use crate::{
    compiler::{BuildContext, collect_all_files},
    config::SiteConfig,
    log,
    utils::category::normalize_path,
};
use anyhow::{Result, bail};
use std::{path::PathBuf, time::Instant};

/// Build the whole pages tree, or only `files` when non-empty.
///
/// `files` are resolved against the project root. The dependency map is
/// only persisted after a full build, since a partial build sees only part
/// of the graph.
pub fn build_site(config: &SiteConfig, files: &[PathBuf]) -> Result<()> {
    let start = Instant::now();
    let mut ctx = BuildContext::new(config);
    ctx.load_partials()?;

    if files.is_empty() {
        if !config.build.pages.is_dir() {
            bail!(
                "Pages directory not found: {}",
                config.build.pages.display()
            );
        }
        for path in collect_all_files(&config.build.pages) {
            ctx.process_file(&path)?;
        }
        ctx.deps().save(&config.build.deps_map)?;
    } else {
        for file in files {
            let path = normalize_path(&config.root.join(file));
            if path.is_dir() {
                for path in collect_all_files(&path) {
                    ctx.process_file(&path)?;
                }
            } else {
                ctx.process_file(&path)?;
            }
        }
    }

    log!("build"; "done in {:.2?}", start.elapsed());
    Ok(())
}
