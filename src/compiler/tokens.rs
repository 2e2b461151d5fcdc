//! Literal token substitution.
//!
//! A [`TokenMap`] is an insertion-ordered string map. Substitution walks it in
//! order and replaces every occurrence of each key, so a later key may rewrite
//! text produced by an earlier replacement.

use crate::config::error::ConfigError;
use indexmap::IndexMap;

/// Insertion-ordered `token → replacement` map.
///
/// Re-inserting an existing key updates its value in place and keeps its
/// original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMap(IndexMap<String, String>);

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TokenMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(&k.into(), &v.into());
        }
        map
    }
}

/// Resolve `$key` aliases against the same map.
///
/// A value starting with `$` (and longer than one character) is replaced by
/// the value of the key named after the `$`. Lookups go against the
/// unresolved map, one level deep.
pub fn resolve_aliases(map: &TokenMap) -> Result<TokenMap, ConfigError> {
    let mut out = TokenMap::new();

    for (key, value) in map.iter() {
        let resolved = match value.strip_prefix('$') {
            Some(target) if !target.is_empty() => {
                map.get(target).ok_or_else(|| ConfigError::MissingAlias {
                    alias: value.to_string(),
                    key: key.to_string(),
                })?
            }
            _ => value,
        };
        out.insert(key, resolved);
    }

    Ok(out)
}

/// Replace every literal occurrence of every non-empty key, in map order.
pub fn replace_tokens(content: &str, map: &TokenMap) -> String {
    let mut out = content.to_string();
    for (needle, replacement) in map.iter() {
        if needle.is_empty() || !out.contains(needle) {
            continue;
        }
        out = out.replace(needle, replacement);
    }
    out
}
