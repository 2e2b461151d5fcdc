//! `[env]` section configuration and environment layering.
//!
//! Variables are collected from two files and exposed to pages as `[KEY]`
//! tokens:
//!
//! ```text
//! vars_file [vars]    (process environment wins over these)
//!        │
//!        ▼
//! .env / .env.<mode>  (overrides everything above)
//!        │
//!        ▼
//!   EnvVars  ──► tokens "[KEY]" = value
//! ```

use super::defaults;
use crate::compiler::tokens::TokenMap;
use crate::log;
use anyhow::{Context, Result};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Ordered environment variables (insertion order, in-place updates).
pub type EnvVars = TokenMap;

/// `[env]` section in stitch.toml.
///
/// # Example
/// ```toml
/// [env]
/// mode = "production"         # reads .env.production
/// vars_file = "wrangler.toml" # [vars] table
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
    /// Environment mode; `dev` reads `.env`, anything else `.env.<mode>`.
    #[serde(default = "defaults::env::mode")]
    #[educe(Default = defaults::env::mode())]
    pub mode: String,

    /// TOML file whose `[vars]` table seeds the environment.
    #[serde(default = "defaults::env::vars_file")]
    #[educe(Default = defaults::env::vars_file())]
    pub vars_file: PathBuf,
}

impl EnvConfig {
    /// Name of the dotenv file for the current mode.
    pub fn env_file_name(&self) -> String {
        if self.mode == "dev" {
            ".env".to_string()
        } else {
            format!(".env.{}", self.mode)
        }
    }
}

/// Load all environment layers relative to `root`.
pub fn load_env(root: &Path, env: &EnvConfig) -> Result<EnvVars> {
    let mut vars = load_vars_file(&root.join(&env.vars_file))?;
    if !vars.is_empty() {
        log!("env"; "from {}: {}", env.vars_file.display(), vars.keys().join(", "));
    }

    let env_file = env.env_file_name();
    let dotenv = match fs::read_to_string(root.join(&env_file)) {
        Ok(content) => parse_dotenv(&content),
        Err(e) if e.kind() == ErrorKind::NotFound => TokenMap::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {env_file}")),
    };
    if !dotenv.is_empty() {
        log!("env"; "from {}: {}", env_file, dotenv.keys().join(", "));
    }

    for (key, value) in dotenv.iter() {
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Read the `[vars]` table of a TOML file.
///
/// A variable already present in the process environment keeps the process
/// value. A missing file yields no variables.
fn load_vars_file(path: &Path) -> Result<EnvVars> {
    let mut vars = EnvVars::new();

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log!("env"; "{} not found", path.display());
            return Ok(vars);
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    let table: toml::Table =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

    if let Some(toml::Value::Table(entries)) = table.get("vars") {
        for (key, value) in entries {
            let resolved = std::env::var(key).unwrap_or_else(|_| scalar_to_string(value));
            vars.insert(key, &resolved);
        }
    }

    Ok(vars)
}

/// Render a TOML scalar the way it reads in the source file.
pub fn scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse dotenv content into ordered key/value pairs.
///
/// Supports `export KEY=VALUE`, `#` comments, single quotes (literal) and
/// double quotes (with `\n`, `\r`, `\t`, `\"`, `\\` escapes). Unquoted values
/// end at a ` #` comment.
pub fn parse_dotenv(content: &str) -> EnvVars {
    let mut vars = EnvVars::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key, &parse_value(value.trim()));
    }

    vars
}

fn parse_value(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return unescape(&raw[1..raw.len() - 1]);
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].to_string();
    }
    match raw.find(" #") {
        Some(pos) => raw[..pos].trim_end().to_string(),
        None => raw.to_string(),
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_env_file_name() {
        let mut env = EnvConfig::default();
        assert_eq!(env.env_file_name(), ".env");
        env.mode = "production".into();
        assert_eq!(env.env_file_name(), ".env.production");
    }

    #[test]
    fn test_parse_dotenv_basic() {
        let vars = parse_dotenv("A=1\n# comment\n\nexport B = two\nbroken line\n=nokey");
        assert_eq!(vars.keys(), vec!["A", "B"]);
        assert_eq!(vars.get("A"), Some("1"));
        assert_eq!(vars.get("B"), Some("two"));
    }

    #[test]
    fn test_parse_dotenv_quotes() {
        let vars = parse_dotenv(
            "D=\"line\\nbreak\"\nS='raw \\n kept'\nC=value # trailing\nH=a#b",
        );
        assert_eq!(vars.get("D"), Some("line\nbreak"));
        assert_eq!(vars.get("S"), Some("raw \\n kept"));
        assert_eq!(vars.get("C"), Some("value"));
        assert_eq!(vars.get("H"), Some("a#b"));
    }

    #[test]
    fn test_parse_dotenv_later_wins_in_place() {
        let vars = parse_dotenv("A=1\nB=2\nA=3");
        assert_eq!(vars.keys(), vec!["A", "B"]);
        assert_eq!(vars.get("A"), Some("3"));
    }

    #[test]
    fn test_load_env_layers() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("wrangler.toml"),
            "name = \"site\"\n[vars]\nSTITCH_TEST_API = \"https://api\"\nSTITCH_TEST_PORT = 8080\n",
        )
        .unwrap();
        fs::write(dir.path().join(".env"), "STITCH_TEST_PORT=9000\nSTITCH_TEST_KEY=k").unwrap();

        let vars = load_env(dir.path(), &EnvConfig::default()).unwrap();

        assert_eq!(vars.get("STITCH_TEST_API"), Some("https://api"));
        assert_eq!(vars.get("STITCH_TEST_PORT"), Some("9000"));
        assert_eq!(vars.get("STITCH_TEST_KEY"), Some("k"));
        assert_eq!(
            vars.keys(),
            vec!["STITCH_TEST_API", "STITCH_TEST_PORT", "STITCH_TEST_KEY"]
        );
    }

    #[test]
    fn test_load_env_mode_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "STITCH_TEST_MODE=dev").unwrap();
        fs::write(dir.path().join(".env.staging"), "STITCH_TEST_MODE=staging").unwrap();

        let env = EnvConfig {
            mode: "staging".into(),
            ..Default::default()
        };
        let vars = load_env(dir.path(), &env).unwrap();
        assert_eq!(vars.get("STITCH_TEST_MODE"), Some("staging"));
    }

    #[test]
    fn test_load_env_missing_files() {
        let dir = TempDir::new().unwrap();
        let vars = load_env(dir.path(), &EnvConfig::default()).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(&toml::Value::String("x".into())), "x");
        assert_eq!(scalar_to_string(&toml::Value::Integer(42)), "42");
        assert_eq!(scalar_to_string(&toml::Value::Boolean(true)), "true");
    }
}
