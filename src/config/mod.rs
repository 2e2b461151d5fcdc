//! Site configuration management for `stitch.toml`.
//!
//! # Sections
//!
//! | Section           | Purpose                                        |
//! |-------------------|------------------------------------------------|
//! | `[build]`         | Pages, partials, output, dependency map paths  |
//! | `[env]`           | Environment mode and vars file                 |
//! | `[render]`        | External template renderer                     |
//! | `[watch]`         | Watch driver debounce                          |
//! | `[tokens]`        | Literal token replacements, `$key` aliases     |
//! | `[page_partials]` | Pages whose render is usable as a partial      |
//! | `[guards]`        | Directory output relocation                    |
//! | `[rules]`         | Per-path injection/transform rules             |
//!
//! Loading composes everything once: env layers become `[KEY]` tokens,
//! aliases are resolved and rules compiled. The result is read-only for the
//! rest of the run.
//!
//! ```text
//! stitch.toml ──► SiteConfig (raw)
//!                   │ normalize paths against root
//!                   │ apply mode (--env > STITCH_ENV > [env].mode)
//!                   │ compose: env vars, tokens, aliases, rules, guards
//!                   ▼
//!                 SiteConfig (composed)
//! ```

pub mod build;
pub mod defaults;
pub mod env;
pub mod error;
pub mod render;
pub mod rules;
pub mod watch;

use build::BuildConfig;
use env::{EnvConfig, EnvVars, load_env, scalar_to_string};
use error::ConfigError;
use render::RenderConfig;
use rules::RuleConfig;
use watch::WatchConfig;

use crate::cli::Cli;
use crate::compiler::rules::{Rule, RuleTable};
use crate::compiler::tokens::{TokenMap, resolve_aliases};
use crate::log;
use crate::utils::category::normalize_path;
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

/// Environment variable selecting the env mode when `--env` is absent.
pub const ENV_MODE_VAR: &str = "STITCH_ENV";

/// Root configuration structure representing stitch.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Absolute project root; relative paths resolve against it
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub env: EnvConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    /// Raw token table, in file order.
    #[serde(default)]
    pub tokens: toml::Table,

    /// Partial alias → page path relative to the pages root.
    #[serde(default)]
    pub page_partials: toml::Table,

    /// `"/dir"` → output subdirectory for everything under `dir/`.
    #[serde(default)]
    pub guards: BTreeMap<String, String>,

    #[serde(default)]
    pub rules: HashMap<String, Vec<RuleConfig>>,

    /// Resolved token map: `[tokens]` plus `[KEY]` env entries.
    #[serde(skip)]
    pub replacements: TokenMap,

    #[serde(skip)]
    pub rule_table: RuleTable,

    #[serde(skip)]
    pub env_vars: EnvVars,

    /// `(alias, page)` pairs from `[page_partials]`, in file order.
    #[serde(skip)]
    pub page_aliases: Vec<(String, String)>,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load and compose the configuration selected by CLI arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let mode = cli
            .env
            .clone()
            .or_else(|| std::env::var(ENV_MODE_VAR).ok().filter(|m| !m.is_empty()));
        Self::load_from(root, &cli.config, mode)
    }

    /// Load `config` (relative to `root`) and compose it.
    ///
    /// `mode` overrides `[env].mode` when given.
    pub fn load_from(root: &Path, config: &Path, mode: Option<String>) -> Result<Self> {
        let root = normalize_path(root);
        let config_path = normalize_path(&root.join(config));
        if !config_path.is_file() {
            bail!("Config file not found: {}", config_path.display());
        }

        let mut site = Self::from_path(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        site.config_path = config_path;
        site.update_path_with_root(&root);
        if let Some(mode) = mode {
            site.env.mode = mode;
        }
        log!("env"; "mode: {}", site.env.mode);

        site.compose()?;
        site.validate()?;
        Ok(site)
    }

    /// Update all paths relative to root directory and normalize to absolute paths
    fn update_path_with_root(&mut self, root: &Path) {
        self.root = root.to_path_buf();
        self.build.pages = normalize_path(&root.join(&self.build.pages));
        self.build.partials = normalize_path(&root.join(&self.build.partials));
        self.build.output = normalize_path(&root.join(&self.build.output));
        self.build.deps_map = normalize_path(&root.join(&self.build.deps_map));

        let vars_file = shellexpand::tilde(&self.env.vars_file.to_string_lossy()).into_owned();
        self.env.vars_file = normalize_path(&root.join(vars_file));
    }

    /// Build the derived lookup structures from the raw sections.
    ///
    /// Env vars are appended after `[tokens]` so a `[KEY]` from the
    /// environment replaces a same-named entry in place.
    fn compose(&mut self) -> Result<()> {
        self.env_vars = load_env(&self.root, &self.env)?;

        let mut tokens = TokenMap::new();
        for (key, value) in &self.tokens {
            tokens.insert(key, &Self::scalar("tokens", key, value)?);
        }
        for (key, value) in self.env_vars.iter() {
            tokens.insert(&format!("[{key}]"), value);
        }
        self.replacements = resolve_aliases(&tokens)?;

        self.page_aliases = self
            .page_partials
            .iter()
            .map(|(alias, page)| {
                let page = Self::scalar("page_partials", alias, page)?;
                Ok((alias.clone(), page.trim_start_matches('/').to_string()))
            })
            .collect::<Result<_, ConfigError>>()?;

        self.rule_table = RuleTable::compile(&self.rules, &self.root)?;
        for (dir, target) in &self.guards {
            let key = format!("{}/*", dir.trim_matches('/'));
            let out = self.build.output.join(target.trim_start_matches('/'));
            self.rule_table.push(&key, Rule::output_override(out));
        }

        Ok(())
    }

    /// Scalar table value as a string; tables and arrays are rejected.
    fn scalar(section: &str, key: &str, value: &toml::Value) -> Result<String, ConfigError> {
        match value {
            toml::Value::Table(_) | toml::Value::Array(_) => Err(ConfigError::Validation(format!(
                "[{section}] `{key}` must be a string or scalar"
            ))),
            other => Ok(scalar_to_string(other)),
        }
    }

    /// Page path registered under a partial alias.
    pub fn page_alias(&self, alias: &str) -> Option<&str> {
        self.page_aliases
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, page)| page.as_str())
    }

    /// Partial alias for a page path relative to the pages root.
    pub fn alias_of_page(&self, rel: &str) -> Option<&str> {
        self.page_aliases
            .iter()
            .find(|(_, page)| page == rel)
            .map(|(alias, _)| alias.as_str())
    }

    /// Validate the composed configuration.
    pub fn validate(&self) -> Result<()> {
        if self.build.pages == self.build.output {
            bail!(ConfigError::Validation(
                "[build.pages] and [build.output] must differ".into()
            ));
        }

        if self.render.is_enabled() {
            Self::check_command_installed("[render.command]", &self.render.command)?;
        }

        for (alias, page) in &self.page_aliases {
            if !self.build.pages.join(page).is_file() {
                bail!(ConfigError::Validation(format!(
                    "[page_partials] `{alias}` points to missing page `{page}`"
                )));
            }
        }

        Ok(())
    }

    /// Check if a command is installed and available
    fn check_command_installed(field: &str, command: &[String]) -> Result<()> {
        let Some(cmd) = command.first() else {
            bail!(ConfigError::Validation(format!(
                "{field} must have at least one element"
            )));
        };

        which::which(cmd)
            .with_context(|| format!("`{cmd}` not found. Please install it first."))?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
