//! Detection of the installed TeX distribution.

use crate::command::{CommandRunner, CommandSpec};
use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Overrides the TinyTeX install root, mostly for tests and portable installs.
pub const TINYTEX_ROOT_ENV: &str = "TEXMEND_TINYTEX_ROOT";

/// What is known about the TeX distribution used for a compile session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TexDistribution {
    /// A TinyTeX installation was found and is preferred.
    pub has_tinytex: bool,
    /// `tlmgr` is callable.
    pub has_texlive: bool,
    /// Binaries resolve through the inherited `PATH` rather than a private install.
    pub using_global: bool,
    /// Directory prepended to `PATH` for every engine and package tool call.
    pub bin_dir: Option<PathBuf>,
}

impl TexDistribution {
    /// Probes the system. TinyTeX is only considered when `prefer_tinytex` is set.
    pub async fn detect(runner: &dyn CommandRunner, prefer_tinytex: bool) -> Self {
        let bin_dir = if prefer_tinytex { tinytex_bin_dir() } else { None };
        let has_tinytex = bin_dir.is_some();
        if let Some(dir) = &bin_dir {
            info!("using TinyTeX at {}", dir.display());
        }

        let has_texlive = has_texlive(runner, bin_dir.as_deref()).await;
        debug!("tlmgr available: {has_texlive}");

        Self {
            has_tinytex,
            has_texlive,
            using_global: !has_tinytex,
            bin_dir,
        }
    }

    /// A global distribution with no package tool, as assumed when nothing is probed.
    pub fn global() -> Self {
        Self {
            using_global: true,
            ..Self::default()
        }
    }
}

/// The TinyTeX install root for this OS, whether or not it exists.
pub fn tinytex_root() -> Option<PathBuf> {
    if let Some(root) = std::env::var_os(TINYTEX_ROOT_ENV) {
        return Some(PathBuf::from(root));
    }
    if cfg!(windows) {
        dirs::data_dir().map(|d| d.join("TinyTeX"))
    } else if cfg!(target_os = "macos") {
        dirs::home_dir().map(|d| d.join("Library").join("TinyTeX"))
    } else {
        dirs::home_dir().map(|d| d.join(".TinyTeX"))
    }
}

/// Platform directory names under `<root>/bin`, most specific first.
fn platform_bin_names() -> Vec<String> {
    let arch = std::env::consts::ARCH;
    if cfg!(windows) {
        vec!["windows".into(), "win32".into()]
    } else if cfg!(target_os = "macos") {
        vec!["universal-darwin".into(), format!("{arch}-darwin")]
    } else {
        vec![format!("{arch}-linux")]
    }
}

/// The TinyTeX binary directory, if TinyTeX is installed.
pub fn tinytex_bin_dir() -> Option<PathBuf> {
    let bin = tinytex_root()?.join("bin");
    platform_bin_names()
        .into_iter()
        .map(|name| bin.join(name))
        .find(|dir| dir.is_dir())
}

/// Whether `tlmgr` is installed and answers `--version`.
pub async fn has_texlive(runner: &dyn CommandRunner, bin_dir: Option<&Path>) -> bool {
    let spec = CommandSpec::new("tlmgr")
        .arg("--version")
        .shell_script(true)
        .path_prefix(bin_dir.map(Path::to_path_buf));
    matches!(runner.run(&spec).await, Ok(result) if result.code == Some(0))
}

/// Whether any LaTeX distribution is installed, judged by `pdftex --version`.
pub async fn has_latex_distribution(runner: &dyn CommandRunner, bin_dir: Option<&Path>) -> bool {
    let spec = CommandSpec::new("pdftex")
        .arg("--version")
        .path_prefix(bin_dir.map(Path::to_path_buf));
    matches!(runner.run(&spec).await, Ok(result) if result.code == Some(0))
}

/// Locates `tlmgr` in `bin_dir` first, then on `PATH`.
pub fn locate_tlmgr(bin_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = bin_dir {
        let cwd = std::env::current_dir().unwrap_or_else(|_| dir.to_path_buf());
        if let Ok(path) = which::which_in("tlmgr", Some(dir), cwd) {
            return Some(path);
        }
    }
    which::which("tlmgr").ok()
}
