use super::{InstallStatus, PackageBackend};
use crate::command::{CommandResult, CommandRunner, CommandSpec};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;

/// Executable name of the TeX Live Manager.
pub const TLMGR: &str = "tlmgr";

// tlmgr exits with 255 when a package could not be installed.
const NOT_INSTALLED: i32 = 255;

// Resolved without a search; its files are not indexed under a usable name.
const FANDOL: &str = "fandol";

/// Backend implementation for the TeX Live Manager (`tlmgr`).
#[derive(Debug)]
pub struct TlmgrBackend {
    runner: Arc<dyn CommandRunner>,
    bin_dir: Option<PathBuf>,
    opts: Vec<String>,
}

impl TlmgrBackend {
    /// `opts` are passed to every `search`, `install`, `update` and `info` call.
    pub fn new(runner: Arc<dyn CommandRunner>, bin_dir: Option<PathBuf>, opts: Vec<String>) -> Self {
        Self {
            runner,
            bin_dir,
            opts,
        }
    }

    async fn tlmgr(&self, cmd: &str, args: Vec<String>) -> Result<CommandResult> {
        let spec = CommandSpec::new(TLMGR)
            .arg(cmd)
            .args(args)
            .shell_script(true)
            .path_prefix(self.bin_dir.clone());
        self.runner.run(&spec).await
    }

    fn with_opts<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut all = self.opts.clone();
        all.extend(args.into_iter().map(str::to_string));
        all
    }

    async fn search_term(&self, term: &str) -> Result<Vec<String>> {
        info!("finding package for {term}");
        if term == FANDOL {
            return Ok(vec![FANDOL.to_string()]);
        }

        let mut args = vec!["--file".to_string(), "--global".to_string()];
        args.extend(self.with_opts([term]));
        let result = self.tlmgr("search", args).await?;
        match (result.code, result.stdout) {
            (Some(0), Some(stdout)) => Ok(parse_search_output(&stdout, term)),
            _ => Ok(vec![]),
        }
    }

    /// Whether `tlmgr` lists the package as installed.
    pub async fn verify_installed(&self, package: &str) -> Result<bool> {
        let args = ["--list", "--only-installed", "--data", "name"]
            .into_iter()
            .map(str::to_string)
            .chain(self.with_opts([package]))
            .collect();
        let result = self.tlmgr("info", args).await?;
        Ok(result.stdout.as_deref().map(str::trim) == Some(package))
    }

    async fn install_package(&self, package: &str) -> Result<InstallStatus> {
        let mut result = self.tlmgr("install", self.with_opts([package])).await?;
        check_install_code(&result)?;

        if !self.verify_installed(package).await? {
            info!("updating tlmgr before retrying {package}");
            let update = self.update(false, true).await?;
            if !update.success {
                return Err(CoreError::SelfUpdateFailed { tool: TLMGR });
            }
            result = self.tlmgr("install", self.with_opts([package])).await?;
            check_install_code(&result)?;
        }

        if result.success {
            Ok(InstallStatus::complete(package))
        } else {
            Ok(InstallStatus::failed(package, result.stderr))
        }
    }

    /// Links binaries of newly installed packages into the system directories.
    async fn add_path(&self) {
        match self.tlmgr("path", self.with_opts(["add"])).await {
            Ok(result) if result.success => {}
            Ok(result) => debug!("tlmgr path add returned {:?}", result.code),
            Err(e) => warn!("tlmgr path add failed: {e}"),
        }
    }
}

fn check_install_code(result: &CommandResult) -> Result<()> {
    match result.code {
        Some(0) | Some(NOT_INSTALLED) => Ok(()),
        code => Err(CoreError::PackageTool {
            tool: TLMGR,
            code: code.unwrap_or(-1),
            stderr: result.stderr.clone().unwrap_or_default(),
        }),
    }
}

#[async_trait]
impl PackageBackend for TlmgrBackend {
    async fn search(&self, terms: &[String]) -> Result<Vec<String>> {
        let mut packages: Vec<String> = Vec::new();
        for term in terms {
            for package in self.search_term(term).await? {
                if !packages.contains(&package) {
                    packages.push(package);
                }
            }
        }
        Ok(packages)
    }

    async fn install(&self, packages: &[String]) -> Result<Vec<InstallStatus>> {
        let total = packages.len();
        info!(
            "> {total} {} to install",
            if total == 1 { "package" } else { "packages" }
        );

        let mut statuses = Vec::with_capacity(total);
        for (i, package) in packages.iter().enumerate() {
            info!("> installing {package} ({} of {total})", i + 1);
            statuses.push(self.install_package(package).await?);
        }
        self.add_path().await;
        Ok(statuses)
    }

    async fn update(&self, all: bool, self_update: bool) -> Result<CommandResult> {
        let mut args = self.opts.clone();
        if all {
            args.push("--all".into());
        }
        if self_update {
            args.push("--self".into());
        }
        self.tlmgr("update", args).await
    }

    async fn is_available(&self) -> bool {
        matches!(self.tlmgr("--version", vec![]).await, Ok(r) if r.code == Some(0))
    }

    fn name(&self) -> &'static str {
        TLMGR
    }
}

/// Extracts package names from `tlmgr search --file` output.
///
/// The output is a `<package>:` header followed by indented file paths. A
/// package matches when one of its paths ends in `/<term>`, where `term` is
/// a regular expression. Architecture suffixes (`pkg.x86_64-linux`) are dropped.
pub fn parse_search_output(text: &str, term: &str) -> Vec<String> {
    let term_re = Regex::new(&format!("/{term}$"))
        .or_else(|_| Regex::new(&format!("/{}$", regex::escape(term))));
    let Ok(term_re) = term_re else {
        return vec![];
    };

    let mut packages: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(header) = line.strip_suffix(':').filter(|h| !h.is_empty()) {
            let name = header.split('.').next().unwrap_or(header);
            current = Some(name.to_string());
        } else if let Some(package) = &current {
            if term_re.is_match(line) {
                if !packages.contains(package) {
                    packages.push(package.clone());
                }
                current = None;
            }
        }
    }
    packages
}
