//! Per-path rule table.
//!
//! Rules are grouped under a match key and resolved per page in four tiers:
//!
//! ```text
//! "pages/foo.html"  exact path
//! "pages/*"         top-level directory wildcard
//! "*.html"          extension wildcard
//! "*"               catch-all
//! ```
//!
//! Surviving rules keep tier order, so a catch-all rule runs after (and may
//! override) an exact one.

use super::inject::InjectionPoint;
use crate::config::error::ConfigError;
use crate::config::rules::{Generator, InjectionSource, RuleConfig, TransformKind};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Single-occurrence or all-occurrence replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    First,
    All,
}

/// One operation of a compiled rule.
#[derive(Debug, Clone)]
pub enum Op {
    StaticPartial {
        point: InjectionPoint,
        partial: String,
    },
    ComputedPartial {
        point: InjectionPoint,
        generator: Generator,
    },
    FindReplace {
        find: String,
        replace: String,
        mode: ReplaceMode,
    },
    /// Absolute output directory; the page keeps its relative path under it.
    OutputOverride(PathBuf),
    Rename {
        pattern: Regex,
        replacement: String,
    },
    Transform(TransformKind),
}

/// A compiled rule: ordered ops plus the pages it skips.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub ops: Vec<Op>,
    pub skip: Vec<String>,
}

impl Rule {
    /// Compile a configured rule. Relative `output` paths resolve against `root`.
    pub fn compile(key: &str, config: &RuleConfig, root: &Path) -> Result<Self, ConfigError> {
        let mut ops = Vec::new();

        let points = [
            (InjectionPoint::PreBodyClose, &config.pre_body_close),
            (InjectionPoint::PreHeadClose, &config.pre_head_close),
            (InjectionPoint::PostBodyOpen, &config.post_body_open),
            (InjectionPoint::PostHeadOpen, &config.post_head_open),
        ];
        for (point, source) in points {
            match source {
                Some(InjectionSource::Partial(partial)) => ops.push(Op::StaticPartial {
                    point,
                    partial: partial.clone(),
                }),
                Some(InjectionSource::Computed(generator)) => ops.push(Op::ComputedPartial {
                    point,
                    generator: generator.clone(),
                }),
                None => {}
            }
        }

        match (&config.find, &config.replace, &config.replace_all) {
            (Some(find), _, _) if find.is_empty() => {
                return Err(ConfigError::Validation(format!(
                    "[rules.\"{key}\"] `find` must not be empty"
                )));
            }
            (Some(_), Some(_), Some(_)) => {
                return Err(ConfigError::Validation(format!(
                    "[rules.\"{key}\"] sets both `replace` and `replace_all`"
                )));
            }
            (Some(find), _, Some(replace)) => ops.push(Op::FindReplace {
                find: find.clone(),
                replace: replace.clone(),
                mode: ReplaceMode::All,
            }),
            (Some(find), Some(replace), None) => ops.push(Op::FindReplace {
                find: find.clone(),
                replace: replace.clone(),
                mode: ReplaceMode::First,
            }),
            (Some(_), None, None) => {
                return Err(ConfigError::Validation(format!(
                    "[rules.\"{key}\"] `find` requires `replace` or `replace_all`"
                )));
            }
            (None, _, _) => {}
        }

        if let Some(output) = &config.output {
            ops.push(Op::OutputOverride(root.join(output)));
        }

        if let Some(rename) = &config.rename {
            let pattern = Regex::new(&rename.pattern).map_err(|e| {
                ConfigError::Validation(format!("[rules.\"{key}\"] invalid rename pattern: {e}"))
            })?;
            ops.push(Op::Rename {
                pattern,
                replacement: rename.replacement.clone(),
            });
        }

        if let Some(transform) = &config.transform {
            if let TransformKind::Command(command) = transform
                && command.is_empty()
            {
                return Err(ConfigError::Validation(format!(
                    "[rules.\"{key}\"] transform command must have at least one element"
                )));
            }
            ops.push(Op::Transform(transform.clone()));
        }

        Ok(Self {
            ops,
            skip: config.skip.clone(),
        })
    }

    /// A rule that only relocates output.
    pub fn output_override(dir: PathBuf) -> Self {
        Self {
            ops: vec![Op::OutputOverride(dir)],
            skip: Vec::new(),
        }
    }

    fn applies_to(&self, rel: &str) -> bool {
        !self.skip.iter().any(|s| s == rel)
    }
}

/// Match key → ordered rules.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: FxHashMap<String, Vec<Rule>>,
}

impl RuleTable {
    pub fn compile(
        configs: &HashMap<String, Vec<RuleConfig>>,
        root: &Path,
    ) -> Result<Self, ConfigError> {
        let mut table = Self::default();
        for (key, list) in configs {
            for config in list {
                table.push(key, Rule::compile(key, config, root)?);
            }
        }
        Ok(table)
    }

    /// Append a rule under `key`, after any existing ones.
    pub fn push(&mut self, key: &str, rule: Rule) {
        self.rules.entry(key.to_string()).or_default().push(rule);
    }

    /// Rules applying to the page at `rel` (relative to the pages root, `/`
    /// separated), in tier order.
    pub fn resolve(&self, rel: &str) -> Vec<&Rule> {
        match_keys(rel)
            .iter()
            .filter_map(|key| self.rules.get(key))
            .flatten()
            .filter(|rule| rule.applies_to(rel))
            .collect()
    }
}

/// Candidate keys for `rel`, highest precedence first.
///
/// The directory tier uses the first path segment, so a top-level file
/// `index.html` yields `index.html/*`. The extension tier uses the text after
/// the last dot, or the whole path when there is none.
fn match_keys(rel: &str) -> [String; 4] {
    let first = rel.split('/').next().unwrap_or(rel);
    let ext = rel.rsplit('.').next().unwrap_or(rel);
    [
        rel.to_string(),
        format!("{first}/*"),
        format!("*.{ext}"),
        "*".to_string(),
    ]
}
