//! External command execution.
//!
//! Two shapes are needed: [`exec`] runs a command and relays its stderr (the
//! watcher's rebuild subprocess), and [`pipe`] feeds content through a filter
//! command's stdin and returns its stdout (renderers and command transforms).

use crate::compiler::tokens::TokenMap;
use crate::log;
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use std::{
    borrow::Cow,
    ffi::OsString,
    io::{ErrorKind, Write},
    path::Path,
    process::{Command, Output, Stdio},
    sync::LazyLock,
    thread,
};

/// Run `cmd args...` in `root` and capture its output.
///
/// Stderr of a successful run is logged through `filter`; a non-zero exit is
/// an error carrying the filtered stderr.
pub fn exec(
    root: Option<&Path>,
    cmd: &[String],
    args: &[OsString],
    filter: &'static FilterRule,
) -> Result<Output> {
    let (name, mut command) = prepare(root, cmd)?;
    command.args(args);

    let output = command
        .output()
        .with_context(|| format!("Failed to execute `{name}`"))?;

    log_output(&name, &output, filter)?;
    Ok(output)
}

/// Pipe `input` through `cmd` and return its stdout.
///
/// `envs` are set on the child in addition to the inherited environment.
pub fn pipe(
    root: Option<&Path>,
    cmd: &[String],
    input: &str,
    envs: &TokenMap,
) -> Result<String> {
    let (name, mut command) = prepare(root, cmd)?;
    command
        .envs(envs.iter())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to spawn `{name}`"))?;

    // Feed stdin from another thread so a child filling its stdout pipe
    // cannot deadlock against us.
    let mut stdin = child.stdin.take().context("Failed to acquire stdin")?;
    let input = input.to_owned();
    let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

    let output = child
        .wait_with_output()
        .with_context(|| format!("`{name}` process failed"))?;

    let written = writer
        .join()
        .map_err(|_| anyhow!("Failed to join stdin writer thread"))?;

    log_output(&name, &output, &EMPTY_FILTER)?;
    // A successful child may exit without draining its stdin.
    if let Err(e) = written
        && e.kind() != ErrorKind::BrokenPipe
    {
        return Err(e).with_context(|| format!("Failed to write stdin of `{name}`"));
    }
    String::from_utf8(output.stdout).with_context(|| format!("`{name}` produced invalid UTF-8"))
}

fn prepare(root: Option<&Path>, cmd: &[String]) -> Result<(String, Command)> {
    let (program, rest) = cmd.split_first().context("Empty command")?;

    let mut command = Command::new(program);
    command.args(rest);

    if let Some(dir) = root {
        command.current_dir(dir);
    }

    Ok((program.clone(), command))
}

// ============================================================================
// Output Filtering
// ============================================================================

fn strip_ansi(s: &str) -> Cow<'_, str> {
    static RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    RE.replace_all(s, "")
}

/// Line prefixes to drop from relayed command output.
pub struct FilterRule {
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    fn should_skip(&self, line: &str) -> bool {
        line.is_empty() || self.skip_prefixes.iter().any(|p| line.starts_with(p))
    }

    /// Lines of `output` that survive the filter, joined back together.
    pub fn apply(&self, output: &str) -> String {
        output
            .lines()
            .filter(|line| !self.should_skip(strip_ansi(line).trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Log the lines of `output` that survive the filter as one message.
    pub fn log(&self, name: &str, output: &str) {
        let lines = self.apply(output);
        if !lines.is_empty() {
            log!(name; "{lines}");
        }
    }
}

/// No filtering.
pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

fn log_output(name: &str, output: &Output, filter: &'static FilterRule) -> Result<()> {
    if !output.status.success() {
        bail!(format_error(name, output, filter));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    filter.log(name, stderr.trim());
    Ok(())
}

fn format_error(name: &str, output: &Output, filter: &'static FilterRule) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let error_msg = filter.apply(&stderr);

    let mut msg = format!("Command `{name}` failed with {}", output.status);
    if !error_msg.is_empty() {
        msg.push('\n');
        msg.push_str(&error_msg);
    }

    let stdout = stdout.trim();
    if !stdout.is_empty() {
        msg.push_str("\nStdout:\n");
        msg.push_str(stdout);
    }
    msg
}
