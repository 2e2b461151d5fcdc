//! File system watcher driving incremental rebuilds.
//!
//! Monitors the pages root, the partials directory and the config file.
//! Every change is mapped to a [`RebuildScope`], debounced per changed path
//! and finally handed to a `stitch build` subprocess, so a failing rebuild
//! never takes the watcher down.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐   ┌──────────────┐   ┌───────────┐   ┌───────┐ │
//! │  │ notify   │──▶│ plan_rebuild │──▶│ Debouncer │──▶│ stitch│ │
//! │  │ events   │   │ (deps map)   │   │ (per path)│   │ build │ │
//! │  └──────────┘   └──────────────┘   └───────────┘   └───────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::{
    compiler::deps::DependencyMap,
    config::SiteConfig,
    log,
    logger::WatchStatus,
    utils::{
        category::{FileCategory, categorize_path, normalize_path},
        exec::{self, FilterRule},
    },
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashMap;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::RecvTimeoutError,
    },
    time::{Duration, Instant},
};

/// Idle wait when nothing is pending.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-file progress of the rebuild subprocess; only its summary and errors
/// are relayed.
static REBUILD_FILTER: FilterRule = FilterRule::new(&["[page]", "[copy]", "[partial]", "[env]"]);

const WATCH_CATEGORIES: &[FileCategory] = &[
    FileCategory::Page,
    FileCategory::Partial,
    FileCategory::Config,
];

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts) or a dotfile.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

// =============================================================================
// Rebuild Planning
// =============================================================================

/// What a change requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildScope {
    /// Build the whole pages tree.
    Full,
    /// Build only these absolute paths.
    Files(Vec<PathBuf>),
}

impl RebuildScope {
    /// Union with `other`; a full rebuild absorbs everything.
    fn merge(&mut self, other: Self) {
        match other {
            Self::Full => *self = Self::Full,
            Self::Files(more) => {
                if let Self::Files(files) = self {
                    for file in more {
                        if !files.contains(&file) {
                            files.push(file);
                        }
                    }
                }
            }
        }
    }
}

/// Decide what a change of `path` requires, given the persisted map.
///
/// - partial: the pages recorded as consuming it (full build if none are
///   known yet)
/// - config: full build
/// - page: the page itself if it still exists, plus the dependents of its
///   alias when it is registered as a page partial
pub fn plan_rebuild(
    path: &Path,
    config: &SiteConfig,
    deps: &DependencyMap,
) -> Option<RebuildScope> {
    let pages = &config.build.pages;
    let path = &normalize_path(path);

    match categorize_path(path, config) {
        FileCategory::Config => Some(RebuildScope::Full),
        FileCategory::Partial => {
            let key = path.file_stem()?.to_str()?;
            let dependents = deps.dependents(key);
            if dependents.is_empty() {
                log!("watch"; "no pages recorded for partial `{key}`");
                return Some(RebuildScope::Full);
            }
            Some(RebuildScope::Files(
                dependents.iter().map(|rel| pages.join(rel)).collect(),
            ))
        }
        FileCategory::Page => {
            let mut files = Vec::new();
            if path.is_file() {
                files.push(path.to_path_buf());
            }

            let rel = path.strip_prefix(pages).ok()?.to_string_lossy().replace('\\', "/");
            if let Some(alias) = config.alias_of_page(&rel) {
                files.extend(deps.dependents(alias).iter().map(|rel| pages.join(rel)));
            }

            (!files.is_empty()).then_some(RebuildScope::Files(files))
        }
        FileCategory::Unknown => None,
    }
}

// =============================================================================
// Debounce State
// =============================================================================

#[derive(Debug)]
struct Pending {
    scope: RebuildScope,
    deadline: Instant,
}

/// Per-path timers with cancel-and-reschedule semantics.
///
/// A repeated trigger for the same path pushes its deadline back and merges
/// the affected files, so a burst of events yields one rebuild after the
/// quiet period.
struct Debouncer {
    delay: Duration,
    pending: FxHashMap<PathBuf, Pending>,
}

impl Debouncer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: FxHashMap::default(),
        }
    }

    fn schedule(&mut self, key: PathBuf, scope: RebuildScope, now: Instant) {
        let deadline = now + self.delay;
        match self.pending.get_mut(&key) {
            Some(pending) => {
                pending.scope.merge(scope);
                pending.deadline = deadline;
            }
            None => {
                self.pending.insert(key, Pending { scope, deadline });
            }
        }
    }

    /// Remove and return every rebuild whose quiet period has elapsed.
    fn take_due(&mut self, now: Instant) -> Vec<(PathBuf, RebuildScope)> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        due.into_iter()
            .filter_map(|key| {
                let pending = self.pending.remove(&key)?;
                Some((key, pending.scope))
            })
            .collect()
    }

    /// Time until the next deadline.
    fn timeout(&self, now: Instant) -> Duration {
        self.pending
            .values()
            .map(|p| p.deadline.saturating_duration_since(now))
            .min()
            .unwrap_or(IDLE_TIMEOUT)
    }
}

// =============================================================================
// Rebuild Execution
// =============================================================================

/// Run `stitch build [files]` for `scope` in a subprocess.
fn run_rebuild(config: &SiteConfig, scope: &RebuildScope) -> Result<String> {
    let exe = std::env::current_exe().context("Failed to locate stitch executable")?;
    let mut args: Vec<OsString> = vec![
        "--root".into(),
        config.root.clone().into(),
        "--config".into(),
        config.config_path.clone().into(),
        "--env".into(),
        config.env.mode.clone().into(),
        "build".into(),
    ];
    if let RebuildScope::Files(files) = scope {
        args.extend(files.iter().map(|f| f.clone().into_os_string()));
    }

    let output = exec::exec(
        Some(&config.root),
        &[exe.to_string_lossy().into_owned()],
        &args,
        &REBUILD_FILTER,
    )?;
    Ok(REBUILD_FILTER.apply(&String::from_utf8_lossy(&output.stdout)))
}

fn handle_due(config: &SiteConfig, trigger: &Path, scope: &RebuildScope, status: &mut WatchStatus) {
    let trigger = rel_path(trigger, &config.root);
    match scope {
        RebuildScope::Full => log!("watch"; "{trigger} changed, rebuilding all"),
        RebuildScope::Files(files) => log!(
            "watch"; "{trigger} changed, rebuilding {}",
            files
                .iter()
                .map(|f| rel_path(f, &config.build.pages))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }

    match run_rebuild(config, scope) {
        Ok(stdout) => {
            let stdout = stdout.trim_end();
            if !stdout.is_empty() {
                println!("{stdout}");
            }
            status.success(&format!("rebuilt after {trigger} changed"));
        }
        Err(e) => status.error(&format!("rebuild failed ({trigger})"), &format!("{e:#}")),
    }
}

// =============================================================================
// Watcher Setup
// =============================================================================

fn setup_watchers(watcher: &mut impl Watcher, config: &SiteConfig) -> Result<()> {
    for &cat in WATCH_CATEGORIES {
        if let Some(path) = cat.path(config)
            && path.exists()
        {
            let mode = if cat.is_directory() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };

            watcher
                .watch(path, mode)
                .with_context(|| format!("Failed to watch {}: {}", cat.name(), path.display()))?;
            log!("watch"; "{}: {}", cat.name(), rel_path(path, &config.root));
        }
    }
    Ok(())
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Public API
// =============================================================================

/// Watch sources and rebuild affected pages until interrupted.
pub fn watch_for_changes_blocking(config: &SiteConfig) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Failed to set Ctrl+C handler")?;
    }

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    setup_watchers(&mut watcher, config)?;

    let mut debouncer = Debouncer::new(config.watch.debounce());
    let mut status = WatchStatus::new();

    while running.load(Ordering::SeqCst) {
        // Wake at least once a second to notice Ctrl+C.
        let timeout = debouncer.timeout(Instant::now()).min(Duration::from_secs(1));

        match rx.recv_timeout(timeout) {
            Ok(Ok(event)) if is_relevant(&event) => {
                let deps = DependencyMap::load(&config.build.deps_map);
                for path in event.paths.into_iter().filter(|p| !is_temp_file(p)) {
                    if let Some(scope) = plan_rebuild(&path, config, &deps) {
                        debouncer.schedule(path, scope, Instant::now());
                    }
                }
            }
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Disconnected) => break,
            _ => {}
        }

        for (trigger, scope) in debouncer.take_due(Instant::now()) {
            handle_due(config, &trigger, &scope, &mut status);
        }
    }

    log!("watch"; "stopped");
    Ok(())
}
