//! Deferred content transforms.

use crate::compiler::tokens::TokenMap;
use crate::config::rules::TransformKind;
use crate::utils::exec;
use anyhow::{Context, Result};
use std::path::Path;

/// Where command transforms run and which env vars they see.
pub struct TransformEnv<'a> {
    pub root: &'a Path,
    pub vars: &'a TokenMap,
}

impl TransformKind {
    pub fn apply(&self, content: &str, env: &TransformEnv<'_>) -> Result<String> {
        match self {
            Self::Minify => minify(content),
            Self::HtmlToJs => Ok(html_to_js(content)),
            Self::Command(command) => exec::pipe(Some(env.root), command, content, env.vars),
        }
    }
}

fn minify(html: &str) -> Result<String> {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = true;
    cfg.remove_bangs = true;
    cfg.remove_processing_instructions = true;

    let bytes = minify_html::minify(html.as_bytes(), &cfg);
    String::from_utf8(bytes).context("Minified output is not valid UTF-8")
}

/// Wrap content as an ES module default export.
pub fn html_to_js(src: &str) -> String {
    let escaped = src
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace('$', "\\$");
    format!("export default `\n{escaped}\n`;\n")
}
