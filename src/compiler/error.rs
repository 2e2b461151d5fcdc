//! Build-time error types.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while assembling pages.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Partial `{partial}` not found for {page}")]
    MissingPartial { partial: String, page: String },

    #[error("No {tag} tag found in file \"{file}\"")]
    MissingTag { tag: &'static str, file: String },

    #[error("Partial cycle detected: {}", chain.join(" -> "))]
    PartialCycle { chain: Vec<String> },

    #[error("{page} starts with a render directive but [render] command is empty")]
    RendererNotConfigured { page: String },

    #[error("{} is outside the pages directory", path.display())]
    OutsidePages { path: PathBuf },
}
