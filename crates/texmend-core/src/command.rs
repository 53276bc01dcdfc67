//! External process execution.
//!
//! Everything that spawns a process goes through the [`CommandRunner`] trait
//! so the build pipeline can be exercised without a TeX installation.
//! [`system_runner`] selects the implementation for the host OS once, at
//! startup; callers above it never branch on the platform.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// Search path for TeX input files.
pub const TEXINPUTS: &str = "TEXINPUTS";
/// Search path for BibTeX style files.
pub const BSTINPUTS: &str = "BSTINPUTS";

/// Separator between entries of a search-path variable.
pub const PATH_LIST_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

// cmd.exe exits with this code when the command is not recognised.
const CMD_NOT_RECOGNISED: i32 = 9009;

/// A fully described process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Extra environment variables, added to the inherited environment.
    pub env: Vec<(String, String)>,
    /// Directory prepended to the inherited `PATH`.
    pub path_prefix: Option<PathBuf>,
    /// Capture stdout/stderr instead of inheriting the parent's streams.
    pub capture: bool,
    /// The program is a shell script (e.g. `tlmgr.bat`) rather than a binary.
    pub shell_script: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            path_prefix: None,
            capture: true,
            shell_script: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn path_prefix(mut self, dir: Option<PathBuf>) -> Self {
        self.path_prefix = dir;
        self
    }

    pub fn shell_script(mut self, shell_script: bool) -> Self {
        self.shell_script = shell_script;
        self
    }

    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Looks up an environment override by name.
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Human readable command line, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The outcome of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl CommandResult {
    /// A result with the given exit code and no captured output.
    pub fn exit(code: i32) -> Self {
        Self {
            code: Some(code),
            success: code == 0,
            stdout: None,
            stderr: None,
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = Some(stdout.into());
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = Some(stderr.into());
        self
    }

    fn from_output(output: std::process::Output, captured: bool) -> Self {
        let text = |bytes: Vec<u8>| {
            if captured && !bytes.is_empty() {
                Some(String::from_utf8_lossy(&bytes).into_owned())
            } else {
                None
            }
        };
        Self {
            code: output.status.code(),
            success: output.status.success(),
            stdout: text(output.stdout),
            stderr: text(output.stderr),
        }
    }
}

/// Runs external programs.
///
/// Implementations must not fail for a non-zero exit status; that is
/// reported through [`CommandResult`]. They fail only when the program
/// cannot be started, with [`CoreError::ExecutableNotFound`] if it does not exist.
#[async_trait]
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult>;
}

/// Executes programs directly. Used on unix-like systems.
#[derive(Debug, Default)]
pub struct DirectRunner;

#[async_trait]
impl CommandRunner for DirectRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        execute(cmd, spec).await
    }
}

/// Executes shell scripts through `cmd.exe` with quoted arguments and
/// binaries directly. Used on Windows.
#[derive(Debug, Default)]
pub struct WindowsShellRunner;

#[async_trait]
impl CommandRunner for WindowsShellRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult> {
        if !spec.shell_script {
            let mut cmd = Command::new(&spec.program);
            cmd.args(&spec.args);
            return execute(cmd, spec).await;
        }

        let line = windows_command_line(&spec.program, &spec.args);
        let mut cmd = Command::new("cmd.exe");
        cmd.args(["/d", "/s", "/c"]);
        #[cfg(windows)]
        cmd.raw_arg(format!("\"{line}\""));
        #[cfg(not(windows))]
        cmd.arg(line);

        let result = execute(cmd, spec).await?;
        if result.code == Some(CMD_NOT_RECOGNISED) {
            return Err(CoreError::ExecutableNotFound {
                program: spec.program.clone(),
            });
        }
        Ok(result)
    }
}

/// The runner for the host platform.
pub fn system_runner() -> Arc<dyn CommandRunner> {
    if cfg!(windows) {
        Arc::new(WindowsShellRunner)
    } else {
        Arc::new(DirectRunner)
    }
}

async fn execute(mut cmd: Command, spec: &CommandSpec) -> Result<CommandResult> {
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if let Some(prefix) = &spec.path_prefix {
        if let Some(path) = prefixed_path(prefix) {
            cmd.env("PATH", path);
        }
    }

    cmd.stdin(Stdio::null()).kill_on_drop(true);
    if spec.capture {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    }

    debug!("running {}", spec.display());
    match cmd.output().await {
        Ok(output) => Ok(CommandResult::from_output(output, spec.capture)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CoreError::ExecutableNotFound {
            program: spec.program.clone(),
        }),
        Err(source) => Err(CoreError::Spawn {
            program: spec.program.clone(),
            source,
        }),
    }
}

/// The inherited `PATH` with `prefix` in front of it.
fn prefixed_path(prefix: &Path) -> Option<OsString> {
    let mut paths = vec![prefix.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).ok()
}

/// Formats extra search directories for `TEXINPUTS`/`BSTINPUTS`.
///
/// The trailing separator tells TeX to also search its default locations.
pub fn search_path_value(dirs: &[PathBuf]) -> String {
    let mut value = String::new();
    for dir in dirs {
        value.push_str(&dir.to_string_lossy());
        value.push(PATH_LIST_SEPARATOR);
    }
    value
}

/// Quotes one argument for a `cmd.exe /s /c` command line.
pub fn quote_windows_arg(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg.chars().any(|c| {
            c.is_whitespace() || matches!(c, '"' | '&' | '|' | '<' | '>' | '^' | '(' | ')' | '%' | '!')
        });
    if !needs_quotes {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => {
                backslashes += 1;
                continue;
            }
            '"' => {
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
            }
            _ => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                quoted.push(c);
            }
        }
        backslashes = 0;
    }
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted
}

/// Builds the quoted command line passed to `cmd.exe`.
pub fn windows_command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(quote_windows_arg)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A runner that answers from a closure instead of spawning processes.
#[cfg(test)]
pub(crate) struct MockCommandRunner {
    handler: Box<dyn Fn(&CommandSpec) -> Result<CommandResult> + Send + Sync>,
    pub calls: std::sync::Mutex<Vec<CommandSpec>>,
}

#[cfg(test)]
impl MockCommandRunner {
    pub fn new(handler: impl Fn(&CommandSpec) -> Result<CommandResult> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(CommandSpec::display).collect()
    }
}

#[cfg(test)]
impl std::fmt::Debug for MockCommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCommandRunner").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult> {
        self.calls.lock().unwrap().push(spec.clone());
        (self.handler)(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_path_value_has_trailing_separator() {
        let dirs = vec![PathBuf::from("a"), PathBuf::from("b")];
        let sep = PATH_LIST_SEPARATOR;
        assert_eq!(search_path_value(&dirs), format!("a{sep}b{sep}"));
    }

    #[test]
    fn test_quote_plain_arg_untouched() {
        assert_eq!(quote_windows_arg("--version"), "--version");
    }

    #[test]
    fn test_quote_arg_with_spaces() {
        assert_eq!(quote_windows_arg("C:\\Program Files\\tl"), "\"C:\\Program Files\\tl\"");
    }

    #[test]
    fn test_quote_arg_with_quotes_and_trailing_backslash() {
        assert_eq!(quote_windows_arg("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote_windows_arg("dir name\\"), "\"dir name\\\\\"");
    }

    #[test]
    fn test_quote_empty_and_metacharacters() {
        assert_eq!(quote_windows_arg(""), "\"\"");
        assert_eq!(quote_windows_arg("a&b"), "\"a&b\"");
    }

    #[test]
    fn test_windows_command_line() {
        let args = vec!["install".to_string(), "my pkg".to_string()];
        assert_eq!(windows_command_line("tlmgr", &args), "tlmgr install \"my pkg\"");
    }

    #[test]
    fn test_spec_builder() {
        let spec = CommandSpec::new("pdflatex")
            .arg("-halt-on-error")
            .args(["doc.tex"])
            .env(TEXINPUTS, "x:")
            .current_dir("/tmp");
        assert_eq!(spec.display(), "pdflatex -halt-on-error doc.tex");
        assert_eq!(spec.env_var(TEXINPUTS), Some("x:"));
        assert_eq!(spec.env_var(BSTINPUTS), None);
        assert!(spec.capture);
    }

    #[test]
    fn test_prefixed_path_comes_first() {
        let path = prefixed_path(Path::new("/opt/tinytex/bin")).unwrap();
        let first = std::env::split_paths(&path).next().unwrap();
        assert_eq!(first, PathBuf::from("/opt/tinytex/bin"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_direct_runner_reports_exit_code() {
        let result = DirectRunner
            .run(&CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(result.code, Some(3));
        assert!(!result.success);
        assert_eq!(result.stdout.as_deref(), Some("out\n"));
        assert_eq!(result.stderr.as_deref(), Some("err\n"));
    }

    #[tokio::test]
    async fn test_direct_runner_missing_executable() {
        let err = DirectRunner
            .run(&CommandSpec::new("texmend-definitely-not-a-program"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ExecutableNotFound { .. }));
    }
}
