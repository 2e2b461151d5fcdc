//! Per-page pipeline.
//!
//! [`BuildContext`] owns everything that changes during a run: the partial
//! cache, the dependency map, the visited set and the page partial render
//! state. Configuration is borrowed read-only.
//!
//! A page partial shares the cache namespace with the partials directory;
//! when both define a name, the page render replaces the directory file.

use super::{
    deps::DependencyMap,
    error::BuildError,
    is_processable,
    partials::{PartialCache, expand_partials},
    rules::{Op, ReplaceMode},
    tokens::replace_tokens,
    transform::TransformEnv,
};
use crate::config::{
    SiteConfig,
    rules::{Generator, TransformKind},
};
use crate::log;
use crate::utils::exec;
use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Mutable state of one build run.
pub struct BuildContext<'a> {
    config: &'a SiteConfig,
    partials: PartialCache,
    deps: DependencyMap,
    /// Absolute paths already processed this run.
    visited: FxHashSet<PathBuf>,
    /// Aliases of page partials currently being rendered, outermost first.
    rendering: Vec<String>,
    /// Aliases whose page render is in the cache.
    rendered: FxHashSet<String>,
}

impl<'a> BuildContext<'a> {
    pub fn new(config: &'a SiteConfig) -> Self {
        Self {
            config,
            partials: PartialCache::new(),
            deps: DependencyMap::new(),
            visited: FxHashSet::default(),
            rendering: Vec::new(),
            rendered: FxHashSet::default(),
        }
    }

    pub fn deps(&self) -> &DependencyMap {
        &self.deps
    }

    /// Fill the partial cache: the partials directory first, then every page
    /// partial in declaration order.
    pub fn load_partials(&mut self) -> Result<()> {
        let config = self.config;

        let count = self
            .partials
            .load_dir(&config.build.partials, &config.replacements)?;
        if count > 0 {
            log!("partial"; "loaded {count} from {}", config.build.partials.display());
        }

        for (alias, _) in &config.page_aliases {
            if !self.rendered.contains(alias) {
                self.render_page_partial(alias)?;
            }
        }
        Ok(())
    }

    /// Process one file under the pages root.
    ///
    /// Returns the final content of a transformed page, or `None` when the
    /// file was copied or had already been processed this run.
    pub fn process_file(&mut self, abs: &Path) -> Result<Option<String>> {
        if !self.visited.insert(abs.to_path_buf()) {
            return Ok(None);
        }

        let config = self.config;
        let rel_path = abs
            .strip_prefix(&config.build.pages)
            .map_err(|_| BuildError::OutsidePages {
                path: abs.to_path_buf(),
            })?;
        let rel = rel_path.to_string_lossy().replace('\\', "/");
        let mut dest = config.build.output.join(rel_path);

        if !is_processable(&rel) {
            create_parent(&dest)?;
            fs::copy(abs, &dest).with_context(|| format!("Failed to copy {rel}"))?;
            log!("copy"; "{rel}");
            return Ok(None);
        }

        let mut html =
            fs::read_to_string(abs).with_context(|| format!("Failed to read {rel}"))?;
        let mut transforms = Vec::new();

        let directive = &config.render.directive;
        if !directive.is_empty()
            && let Some(rest) = html.strip_prefix(directive.as_str())
        {
            if !config.render.is_enabled() {
                return Err(BuildError::RendererNotConfigured { page: rel }.into());
            }
            html = rest.trim_start().to_string();
            transforms.push(TransformKind::Command(config.render.command.clone()));
        }

        html = replace_tokens(&html, &config.replacements);
        html = expand_partials(&html, |name| self.resolve_partial(name, &rel))?;

        for rule in config.rule_table.resolve(&rel) {
            for op in &rule.ops {
                match op {
                    Op::StaticPartial { point, partial } => {
                        let part = self.resolve_partial(partial, &rel)?;
                        html = point.inject(&html, &part, &rel)?;
                    }
                    Op::ComputedPartial { point, generator } => {
                        let part = self.generate(generator, &html, &rel)?;
                        html = point.inject(&html, &part, &rel)?;
                    }
                    Op::FindReplace {
                        find,
                        replace,
                        mode,
                    } => {
                        html = match mode {
                            ReplaceMode::First => html.replacen(find.as_str(), replace, 1),
                            ReplaceMode::All => html.replace(find.as_str(), replace),
                        };
                    }
                    Op::OutputOverride(dir) => dest = dir.join(rel_path),
                    Op::Rename {
                        pattern,
                        replacement,
                    } => {
                        let renamed = pattern
                            .replace(&dest.to_string_lossy(), replacement.as_str())
                            .into_owned();
                        dest = PathBuf::from(renamed);
                    }
                    Op::Transform(kind) => transforms.push(kind.clone()),
                }
            }
        }

        let env = TransformEnv {
            root: &config.root,
            vars: &config.env_vars,
        };
        for transform in &transforms {
            html = transform
                .apply(&html, &env)
                .with_context(|| format!("Transform failed for {rel}"))?;
        }

        create_parent(&dest)?;
        fs::write(&dest, &html).with_context(|| format!("Failed to write {}", dest.display()))?;
        log!("page"; "{rel}");

        Ok(Some(html))
    }

    /// Content of partial `name` as consumed by `page`, recording the
    /// dependency.
    ///
    /// Page partials not rendered yet are rendered on demand.
    fn resolve_partial(&mut self, name: &str, page: &str) -> Result<String> {
        let content = if self.config.page_alias(name).is_some() && !self.rendered.contains(name) {
            self.render_page_partial(name)?
        } else {
            self.partials
                .get(name)
                .map(str::to_string)
                .ok_or_else(|| BuildError::MissingPartial {
                    partial: name.to_string(),
                    page: page.to_string(),
                })?
        };

        self.deps.record(name, page);
        Ok(content)
    }

    /// Render the page registered under `alias` and cache its final content.
    fn render_page_partial(&mut self, alias: &str) -> Result<String> {
        let config = self.config;
        let Some(page) = config.page_alias(alias) else {
            return Err(BuildError::MissingPartial {
                partial: alias.to_string(),
                page: String::new(),
            }
            .into());
        };

        if self.rendering.iter().any(|a| a == alias) {
            let mut chain = self.rendering.clone();
            chain.push(alias.to_string());
            return Err(BuildError::PartialCycle { chain }.into());
        }

        self.rendering.push(alias.to_string());
        let rendered = self.process_file(&config.build.pages.join(page));
        self.rendering.pop();

        let content = match rendered? {
            Some(content) => content,
            // Already built under another alias for the same page.
            None => config
                .page_aliases
                .iter()
                .filter(|(other, target)| {
                    other != alias && target == page && self.rendered.contains(other)
                })
                .find_map(|(other, _)| self.partials.get(other))
                .map(str::to_string)
                .with_context(|| {
                    format!("Page partial `{alias}` ({page}) did not produce content")
                })?,
        };

        self.partials.insert(alias, content.clone());
        self.rendered.insert(alias.to_string());
        Ok(content)
    }

    /// Produce a computed partial.
    fn generate(&mut self, generator: &Generator, html: &str, page: &str) -> Result<String> {
        let config = self.config;
        match generator {
            Generator::Concat(names) => {
                let parts = names
                    .iter()
                    .map(|name| self.resolve_partial(name, page))
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join("\n"))
            }
            Generator::EnvScript { var, keys } => {
                let values: serde_json::Map<String, serde_json::Value> = keys
                    .iter()
                    .filter_map(|key| {
                        let value = match config.env_vars.get(key) {
                            Some(value) => value.to_string(),
                            None => std::env::var(key).ok()?,
                        };
                        Some((key.clone(), serde_json::Value::from(value)))
                    })
                    .collect();
                let json = serde_json::to_string(&values)?.replace("</", "<\\/");
                Ok(format!("<script>window.{var} = {json};</script>"))
            }
            Generator::Command(command) => {
                exec::pipe(Some(&config.root), command, html, &config.env_vars)
                    .with_context(|| format!("Partial command failed for {page}"))
            }
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Site skeleton: `stitch.toml` plus files relative to the root.
    fn make_site(toml: &str, files: &[(&str, &str)]) -> (TempDir, SiteConfig) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stitch.toml"), toml).unwrap();
        for (path, content) in files {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let config = SiteConfig::load_from(dir.path(), Path::new("stitch.toml"), None).unwrap();
        (dir, config)
    }

    fn build_one(config: &SiteConfig, rel: &str) -> Result<Option<String>> {
        let mut ctx = BuildContext::new(config);
        ctx.load_partials()?;
        ctx.process_file(&config.build.pages.join(rel))
    }

    fn read_output(config: &SiteConfig, rel: &str) -> String {
        fs::read_to_string(config.build.output.join(rel)).unwrap()
    }

    #[test]
    fn test_tokens_and_partials() {
        let (_dir, config) = make_site(
            "[tokens]\n\"[SITE_NAME]\" = \"Acme\"",
            &[
                ("src/main/index.html", "<h1>[SITE_NAME]</h1>@PARTIAL(nav)[SITE_NAME]"),
                ("src/partials/nav.html", "<nav>[SITE_NAME]</nav>"),
            ],
        );

        let mut ctx = BuildContext::new(&config);
        ctx.load_partials().unwrap();
        let out = ctx
            .process_file(&config.build.pages.join("index.html"))
            .unwrap()
            .unwrap();

        assert_eq!(out, "<h1>Acme</h1><nav>Acme</nav>Acme");
        assert_eq!(read_output(&config, "index.html"), out);
        assert_eq!(ctx.deps().dependents("nav"), ["index.html"]);
    }

    #[test]
    fn test_missing_partial() {
        let (_dir, config) = make_site("", &[("src/main/index.html", "@PARTIAL(ghost)")]);
        let err = build_one(&config, "index.html").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingPartial { partial, page }) if partial == "ghost" && page == "index.html"
        ));
    }

    #[test]
    fn test_non_processable_copied_verbatim() {
        let (_dir, config) = make_site(
            "[tokens]\nX = \"y\"",
            &[("src/main/img/logo.svg", "X @PARTIAL(nav)")],
        );
        assert!(build_one(&config, "img/logo.svg").unwrap().is_none());
        assert_eq!(read_output(&config, "img/logo.svg"), "X @PARTIAL(nav)");
    }

    #[test]
    fn test_page_processed_once() {
        let (_dir, config) = make_site("", &[("src/main/a.html", "a")]);
        let mut ctx = BuildContext::new(&config);
        let abs = config.build.pages.join("a.html");

        assert!(ctx.process_file(&abs).unwrap().is_some());
        assert!(ctx.process_file(&abs).unwrap().is_none());
    }

    #[test]
    fn test_outside_pages() {
        let (_dir, config) = make_site("", &[("other/a.html", "a")]);
        let mut ctx = BuildContext::new(&config);
        let err = ctx
            .process_file(&config.root.join("other/a.html"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::OutsidePages { .. })
        ));
    }

    #[test]
    fn test_rule_pipeline_injection_and_find() {
        let (_dir, config) = make_site(
            r#"
            [[rules."pages/*"]]
            pre_body_close = "footer"
            post_head_open = { concat = ["meta", "footer"] }
            find = "old"
            replace_all = "new"
            "#,
            &[
                ("src/main/pages/foo.html", "<html><head></head><body>old old</body></html>"),
                ("src/partials/footer.html", "<footer/>"),
                ("src/partials/meta.html", "<meta/>"),
            ],
        );

        let mut ctx = BuildContext::new(&config);
        ctx.load_partials().unwrap();
        let out = ctx
            .process_file(&config.build.pages.join("pages/foo.html"))
            .unwrap()
            .unwrap();

        assert_eq!(
            out,
            "<html><head>\n<meta/>\n<footer/></head><body>new new<footer/>\n</body></html>"
        );
        assert_eq!(ctx.deps().dependents("footer"), ["pages/foo.html"]);
        assert_eq!(ctx.deps().dependents("meta"), ["pages/foo.html"]);
    }

    #[test]
    fn test_missing_body_tag() {
        let (_dir, config) = make_site(
            "[[rules.\"pages/*\"]]\npre_body_close = \"footer\"",
            &[
                ("src/main/pages/foo.html", "<p>no body</p>"),
                ("src/partials/footer.html", "<footer/>"),
            ],
        );
        let err = build_one(&config, "pages/foo.html").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingTag { tag: "</body>", file }) if file == "pages/foo.html"
        ));
    }

    #[test]
    fn test_replace_first_only() {
        let (_dir, config) = make_site(
            "[[rules.\"*.html\"]]\nfind = \"a\"\nreplace = \"b\"",
            &[("src/main/x.html", "aaa")],
        );
        assert_eq!(build_one(&config, "x.html").unwrap().unwrap(), "baa");
    }

    #[test]
    fn test_later_output_override_wins() {
        let (_dir, config) = make_site(
            r#"
            [[rules."x.html"]]
            output = "first"

            [[rules."*"]]
            output = "second"
            "#,
            &[("src/main/x.html", "x")],
        );
        build_one(&config, "x.html").unwrap();

        assert!(config.root.join("second/x.html").is_file());
        assert!(!config.root.join("first/x.html").exists());
        assert!(!config.build.output.join("x.html").exists());
    }

    #[test]
    fn test_rename_and_html_to_js() {
        let (_dir, config) = make_site(
            r#"
            [[rules."fragments/*"]]
            rename = { pattern = "\\.html$", replacement = ".js" }
            transform = "html_to_js"
            "#,
            &[("src/main/fragments/card.html", "<b>${x}</b>")],
        );
        build_one(&config, "fragments/card.html").unwrap();

        assert_eq!(
            read_output(&config, "fragments/card.js"),
            "export default `\n<b>\\${x}</b>\n`;\n"
        );
        assert!(!config.build.output.join("fragments/card.html").exists());
    }

    #[test]
    fn test_env_script_generator() {
        let (dir, _) = make_site("", &[]);
        fs::write(dir.path().join(".env"), "STITCH_PAGES_API=https://x/</script>").unwrap();
        fs::write(
            dir.path().join("stitch.toml"),
            "[[rules.\"*\"]]\npre_head_close = { env_script = { var = \"ENV\", keys = [\"STITCH_PAGES_API\", \"ABSENT\"] } }",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("src/main")).unwrap();
        fs::write(dir.path().join("src/main/i.html"), "<head></head>").unwrap();
        let config = SiteConfig::load_from(dir.path(), Path::new("stitch.toml"), None).unwrap();

        let out = build_one(&config, "i.html").unwrap().unwrap();
        assert_eq!(
            out,
            "<head><script>window.ENV = {\"STITCH_PAGES_API\":\"https://x/<\\/script>\"};</script>\n</head>"
        );
    }

    #[test]
    fn test_env_script_falls_back_to_process_env() {
        let (dir, _) = make_site("", &[("src/main/i.html", "<head></head>")]);
        fs::write(dir.path().join(".env"), "STITCH_SHADOWED=from-dotenv").unwrap();
        fs::write(
            dir.path().join("stitch.toml"),
            "[[rules.\"*\"]]\npre_head_close = { env_script = { var = \"ENV\", keys = [\"PATH\", \"STITCH_SHADOWED\"] } }",
        )
        .unwrap();
        let config = SiteConfig::load_from(dir.path(), Path::new("stitch.toml"), None).unwrap();

        let mut expected = serde_json::Map::new();
        expected.insert("PATH".into(), std::env::var("PATH").unwrap().into());
        expected.insert("STITCH_SHADOWED".into(), "from-dotenv".into());
        let json = serde_json::to_string(&expected).unwrap().replace("</", "<\\/");

        let out = build_one(&config, "i.html").unwrap().unwrap();
        assert_eq!(
            out,
            format!("<head><script>window.ENV = {json};</script>\n</head>")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_receives_current_content() {
        let (_dir, config) = make_site(
            r#"
            [[rules."*"]]
            find = "draft"
            replace = "final"
            post_body_open = { command = ["tr", "a-z", "A-Z"] }
            "#,
            &[("src/main/c.html", "<body>draft</body>")],
        );
        let out = build_one(&config, "c.html").unwrap().unwrap();
        // Injections run before find/replace within a rule
        assert_eq!(out, "<body>\n<BODY>DRAFT</BODY>final</body>");
    }

    #[test]
    fn test_page_partial() {
        let (_dir, config) = make_site(
            "[page_partials]\ncard = \"card.html\"",
            &[
                ("src/main/card.html", "<div>card</div>"),
                ("src/main/index.html", "@PARTIAL(card)"),
            ],
        );

        let mut ctx = BuildContext::new(&config);
        ctx.load_partials().unwrap();
        // Rendered eagerly, so the page itself is already built
        assert!(config.build.output.join("card.html").is_file());

        let out = ctx
            .process_file(&config.build.pages.join("index.html"))
            .unwrap()
            .unwrap();
        assert_eq!(out, "<div>card</div>");
        assert_eq!(ctx.deps().dependents("card"), ["index.html"]);
    }

    #[test]
    fn test_page_partial_replaces_partials_dir_file() {
        let (_dir, config) = make_site(
            "[page_partials]\nhome = \"home.html\"",
            &[
                ("src/partials/home.html", "DIR-PARTIAL"),
                ("src/main/home.html", "PAGE-RENDER"),
                ("src/main/index.html", "@PARTIAL(home)"),
            ],
        );
        let out = build_one(&config, "index.html").unwrap().unwrap();
        assert_eq!(out, "PAGE-RENDER");
    }

    #[test]
    fn test_page_partial_on_demand_replaces_partials_dir_file() {
        // `first` is rendered before `home` and pulls it in early
        let (_dir, config) = make_site(
            "[page_partials]\nfirst = \"first.html\"\nhome = \"home.html\"",
            &[
                ("src/partials/home.html", "DIR-PARTIAL"),
                ("src/main/first.html", "<@PARTIAL(home)>"),
                ("src/main/home.html", "PAGE-RENDER"),
            ],
        );
        let mut ctx = BuildContext::new(&config);
        ctx.load_partials().unwrap();

        assert_eq!(ctx.partials.get("first"), Some("<PAGE-RENDER>"));
        assert_eq!(ctx.partials.get("home"), Some("PAGE-RENDER"));
    }

    #[test]
    fn test_page_partial_referencing_later_page_partial() {
        let (_dir, config) = make_site(
            "[page_partials]\nouter = \"outer.html\"\ninner = \"inner.html\"",
            &[
                ("src/main/outer.html", "[@PARTIAL(inner)]"),
                ("src/main/inner.html", "in"),
            ],
        );
        let mut ctx = BuildContext::new(&config);
        ctx.load_partials().unwrap();

        assert_eq!(ctx.partials.get("outer"), Some("[in]"));
        assert_eq!(ctx.deps().dependents("inner"), ["outer.html"]);
    }

    #[test]
    fn test_two_aliases_one_page() {
        let (_dir, config) = make_site(
            "[page_partials]\na = \"p.html\"\nb = \"p.html\"",
            &[("src/main/p.html", "P")],
        );
        let mut ctx = BuildContext::new(&config);
        ctx.load_partials().unwrap();

        assert_eq!(ctx.partials.get("a"), Some("P"));
        assert_eq!(ctx.partials.get("b"), Some("P"));
    }

    #[test]
    fn test_page_partial_cycle() {
        let (_dir, config) = make_site(
            "[page_partials]\na = \"a.html\"\nb = \"b.html\"",
            &[
                ("src/main/a.html", "@PARTIAL(b)"),
                ("src/main/b.html", "@PARTIAL(a)"),
            ],
        );
        let mut ctx = BuildContext::new(&config);
        let err = ctx.load_partials().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::PartialCycle { chain }) if chain == &["a", "b", "a"]
        ));
    }

    #[test]
    fn test_render_directive_without_command() {
        let (_dir, config) = make_site("", &[("src/main/t.html", "@ejs\n<p/>")]);
        let err = build_one(&config, "t.html").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::RendererNotConfigured { page }) if page == "t.html"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_render_directive_runs_first() {
        let (_dir, config) = make_site(
            r#"
            [render]
            command = ["tr", "a-z", "A-Z"]

            [[rules."*"]]
            transform = { command = ["tr", "P", "Q"] }
            "#,
            &[("src/main/t.html", "@ejs   \n<p>x</p>")],
        );
        let out = build_one(&config, "t.html").unwrap().unwrap();
        assert_eq!(out, "<Q>X</Q>");
    }
}
