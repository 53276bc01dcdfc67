//! Package manager abstraction for TeX distributions.
//!
//! ## Overview
//!
//! The build pipeline resolves missing fonts, style files and hyphenation
//! patterns by asking a package tool to search for and install them. This
//! module puts that tool behind the [`PackageResolver`] facade and the
//! [`PackageBackend`] trait, so the pipeline never knows which tool is in use.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ PackageResolver │  ← Facade, enforces the install memo
//! └────────┬────────┘
//!          │ Arc<dyn PackageBackend>
//!          ▼
//! ┌──────────────────┐
//! │ PackageBackend   │
//! │   (trait)        │
//! └────────┬─────────┘
//!    ┌─────┴──────┐
//! TlmgrBackend  NoOpBackend
//! ```
//!
//! Backends run their tool through a [`CommandRunner`], so every parsing
//! and retry path is testable without a TeX distribution.
//!
//! ## The install memo
//!
//! A log that keeps reporting the same missing file after its package was
//! installed would otherwise make the pipeline install forever.
//! [`PackageResolver::install_new`] only installs packages that are not yet
//! in the session's [`PackageInstallMemo`] and reports
//! [`InstallOutcome::NoNewPackages`] when nothing new is left to try.
//!
//! ## Examples
//!
//! ```
//! use texmend_core::package_manager::{
//!     InstallOutcome, NoOpBackend, PackageInstallMemo, PackageResolver,
//! };
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let resolver = PackageResolver::with_backend(Arc::new(NoOpBackend));
//! let mut memo = PackageInstallMemo::default();
//! let names = vec!["framed".to_string()];
//!
//! let first = resolver.install_new(&mut memo, &names).await.unwrap();
//! assert!(matches!(first, InstallOutcome::Failed(_)));
//!
//! // The same proposal is refused the second time.
//! let second = resolver.install_new(&mut memo, &names).await.unwrap();
//! assert_eq!(second, InstallOutcome::NoNewPackages);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use crate::command::{CommandResult, CommandRunner};
use crate::error::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

mod tlmgr;

pub use tlmgr::{parse_search_output, TlmgrBackend, TLMGR};

/// The state of a package installation operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    /// The package was successfully installed.
    Complete,
    /// The installation failed (see [`InstallStatus::message`] for details).
    Failed,
    /// The installation state is unknown (e.g., no package manager available).
    Unknown,
}

/// The result of a package installation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStatus {
    /// The name of the package that was installed (or attempted).
    pub name: String,
    pub state: InstallState,
    /// Diagnostic output, typically populated when `state` is [`InstallState::Failed`].
    pub message: Option<String>,
}

impl InstallStatus {
    pub fn complete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: InstallState::Complete,
            message: None,
        }
    }

    pub fn failed(name: impl Into<String>, message: Option<String>) -> Self {
        Self {
            name: name.into(),
            state: InstallState::Failed,
            message,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == InstallState::Complete
    }
}

/// Trait defining the interface for TeX package manager backends.
///
/// # Errors
///
/// Methods fail only when the tool cannot be run at all or reports a hard
/// error. An install that ran but did not succeed is reported through
/// [`InstallStatus`].
#[async_trait]
pub trait PackageBackend: std::fmt::Debug + Send + Sync {
    /// Finds the packages providing files that match the search terms.
    ///
    /// Terms are regular expressions matched against the end of file paths
    /// in the package index. Results are deduplicated.
    async fn search(&self, terms: &[String]) -> Result<Vec<String>>;

    /// Installs the packages, one status per package.
    async fn install(&self, packages: &[String]) -> Result<Vec<InstallStatus>>;

    /// Updates installed packages (`all`) and/or the tool itself (`self_update`).
    async fn update(&self, all: bool, self_update: bool) -> Result<CommandResult>;

    /// Whether the tool can actually be called.
    async fn is_available(&self) -> bool;

    /// Returns a human-readable name for this backend (e.g., "tlmgr").
    fn name(&self) -> &'static str;
}

/// A backend used when no package manager is detected.
#[derive(Debug)]
pub struct NoOpBackend;

#[async_trait]
impl PackageBackend for NoOpBackend {
    async fn search(&self, _terms: &[String]) -> Result<Vec<String>> {
        Ok(vec![])
    }

    async fn install(&self, packages: &[String]) -> Result<Vec<InstallStatus>> {
        Ok(packages
            .iter()
            .map(|name| InstallStatus {
                name: name.clone(),
                state: InstallState::Unknown,
                message: Some("No package manager found".into()),
            })
            .collect())
    }

    async fn update(&self, _all: bool, _self_update: bool) -> Result<CommandResult> {
        Ok(CommandResult::exit(0))
    }

    async fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Packages already attempted in one compile session.
///
/// The memo only grows, so every call to [`PackageResolver::install_new`]
/// either attempts at least one package never tried before or refuses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInstallMemo {
    attempted: BTreeSet<String>,
}

impl PackageInstallMemo {
    /// The proposed packages not attempted yet, in proposal order and without duplicates.
    pub fn new_candidates(&self, proposed: &[String]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        proposed
            .iter()
            .filter(|name| !self.attempted.contains(*name) && seen.insert(name.as_str()))
            .cloned()
            .collect()
    }

    pub fn record(&mut self, packages: &[String]) {
        self.attempted.extend(packages.iter().cloned());
    }

    pub fn contains(&self, package: &str) -> bool {
        self.attempted.contains(package)
    }

    pub fn attempted(&self) -> impl Iterator<Item = &str> {
        self.attempted.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attempted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted.is_empty()
    }
}

/// The result of [`PackageResolver::install_new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Every new package was installed.
    Installed(Vec<String>),
    /// All proposed packages were attempted before; nothing was run.
    NoNewPackages,
    /// At least one new package did not install.
    Failed(Vec<InstallStatus>),
}

/// High-level facade for TeX package management operations.
///
/// `PackageResolver` is cheaply cloneable (uses `Arc` internally).
#[derive(Clone, Debug)]
pub struct PackageResolver {
    backend: Arc<dyn PackageBackend>,
}

impl PackageResolver {
    /// Detects the package tool, looking in `bin_dir` before `PATH`.
    ///
    /// `opts` are extra arguments passed to every tool invocation.
    pub fn detect(runner: Arc<dyn CommandRunner>, bin_dir: Option<PathBuf>, opts: Vec<String>) -> Self {
        if let Some(path) = crate::distribution::locate_tlmgr(bin_dir.as_deref()) {
            info!("Detected tlmgr at {:?}", path);
            return Self::with_backend(Arc::new(TlmgrBackend::new(runner, bin_dir, opts)));
        }

        warn!("No package manager detected");
        Self::with_backend(Arc::new(NoOpBackend))
    }

    /// Creates a resolver with a specific backend (useful for testing).
    pub fn with_backend(backend: Arc<dyn PackageBackend>) -> Self {
        Self { backend }
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    /// Checks if the package tool can be called.
    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    pub async fn search(&self, terms: &[String]) -> Result<Vec<String>> {
        self.backend.search(terms).await
    }

    /// Installs the packages and reports whether all of them succeeded.
    pub async fn install(&self, packages: &[String]) -> Result<bool> {
        let statuses = self.backend.install(packages).await?;
        Ok(statuses.iter().all(InstallStatus::is_complete))
    }

    pub async fn update(&self, all: bool, self_update: bool) -> Result<CommandResult> {
        self.backend.update(all, self_update).await
    }

    /// Installs the proposed packages that the memo has not seen yet.
    ///
    /// New candidates are recorded in the memo before installing, so a
    /// failed install is not retried either.
    pub async fn install_new(
        &self,
        memo: &mut PackageInstallMemo,
        proposed: &[String],
    ) -> Result<InstallOutcome> {
        let fresh = memo.new_candidates(proposed);
        if fresh.is_empty() {
            warn!(
                "already tried to install {}, giving up",
                proposed.join(", ")
            );
            return Ok(InstallOutcome::NoNewPackages);
        }

        memo.record(&fresh);
        let statuses = self.backend.install(&fresh).await?;
        if statuses.iter().all(InstallStatus::is_complete) {
            Ok(InstallOutcome::Installed(fresh))
        } else {
            for status in statuses.iter().filter(|s| !s.is_complete()) {
                warn!(
                    "failed to install {}: {}",
                    status.name,
                    status.message.as_deref().unwrap_or("unknown error")
                );
            }
            Ok(InstallOutcome::Failed(statuses))
        }
    }
}
