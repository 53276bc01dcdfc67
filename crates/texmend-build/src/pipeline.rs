//! The compile orchestrator.
//!
//! [`ConvergenceController::generate_pdf`] sequences the stages of one build:
//!
//! ```text
//! cleanup → initial compile ⟲ (install & retry)
//!         → index pass?        (one extra typeset pass, then the index engine)
//!         → bibliography pass? (one install & retry)
//!         → convergence loop   (reruns until the log settles, bounded by max runs)
//! ```
//!
//! It is the only place that decides between retrying, failing and warning.

use crate::artifacts;
use crate::engine::{fix_aux_bibdata, EngineRunner, StageResult};
use crate::error::BuildError;
use crate::request::{BibCommand, CompileRequest, DocumentPaths};
use crate::session::SessionState;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use texmend_core::package_manager::{NoOpBackend, PackageBackend};
use texmend_core::{CommandRunner, InstallOutcome, PackageResolver, TexDistribution};
use texmend_log::{
    LogAnalyzer, contains_biblio_data, find_bib_style_file, find_index_error, find_latex_error,
    find_missing_hyphenation_files, needs_recompilation_file, needs_tool_update, read_log,
};

/// Upper bound on initial compile attempts. Every retry installs at least
/// one package never tried before, so this is only reached by a log that
/// keeps proposing new packages.
const MAX_INITIAL_ATTEMPTS: u32 = 25;

macro_rules! progress {
    ($quiet:expr, $($arg:tt)+) => {
        if !$quiet {
            info!($($arg)+);
        }
    };
}

/// A finished build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileOutcome {
    pub output: PathBuf,
    pub log: PathBuf,
    pub typeset_runs: u32,
    /// False when the rerun budget ran out while the log still asked for another pass.
    pub converged: bool,
    pub index_created: bool,
    pub bibliography_created: bool,
    pub installed_packages: Vec<String>,
}

/// What an attempt to install missing packages achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    Installed,
    NothingDetected,
    NoMatchingPackages,
    AlreadyAttempted,
    InstallFailed,
}

impl Recovery {
    fn title(self) -> &'static str {
        match self {
            Recovery::Installed => "packages installed",
            Recovery::NothingDetected => "error",
            Recovery::NoMatchingPackages => "no matching packages",
            Recovery::AlreadyAttempted => "missing packages (automatic installation failed)",
            Recovery::InstallFailed => "package installation error",
        }
    }
}

/// Drives a document to a finished PDF.
#[derive(Debug)]
pub struct ConvergenceController {
    runner: Arc<dyn CommandRunner>,
    resolver: PackageResolver,
    distribution: TexDistribution,
    analyzer: LogAnalyzer,
    /// Package tool availability already established by detection.
    tool_available: Option<bool>,
}

impl ConvergenceController {
    pub fn new(runner: Arc<dyn CommandRunner>, resolver: PackageResolver, distribution: TexDistribution) -> Self {
        Self {
            runner,
            resolver,
            distribution,
            analyzer: LogAnalyzer::new(),
            tool_available: None,
        }
    }

    /// Probes the system for the distribution and package tool `request` will use.
    pub async fn detect(runner: Arc<dyn CommandRunner>, request: &CompileRequest) -> Self {
        let distribution = TexDistribution::detect(runner.as_ref(), request.prefer_tinytex).await;
        let resolver = if distribution.has_texlive {
            PackageResolver::detect(
                runner.clone(),
                distribution.bin_dir.clone(),
                request.engine.tlmgr_opts.clone(),
            )
        } else {
            PackageResolver::with_backend(Arc::new(NoOpBackend))
        };
        let tool_available = distribution.has_texlive && resolver.name() != NoOpBackend.name();
        Self {
            tool_available: Some(tool_available),
            ..Self::new(runner, resolver, distribution)
        }
    }

    /// Replaces the missing-package analyzer, e.g. with extra rules.
    pub fn with_analyzer(mut self, analyzer: LogAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn distribution(&self) -> &TexDistribution {
        &self.distribution
    }

    async fn package_tool_available(&self) -> bool {
        match self.tool_available {
            Some(known) => known,
            None => self.resolver.is_available().await,
        }
    }

    /// Builds the PDF for `request` in a fresh session.
    pub async fn generate_pdf(&self, request: &CompileRequest) -> Result<CompileOutcome, BuildError> {
        let mut session = SessionState::new();
        self.generate_pdf_with_session(request, &mut session).await
    }

    /// Builds the PDF, recording installs and pass counts in `session`.
    pub async fn generate_pdf_with_session(
        &self,
        request: &CompileRequest,
        session: &mut SessionState,
    ) -> Result<CompileOutcome, BuildError> {
        let paths = request.paths()?;
        if paths.working_dir.exists() {
            artifacts::cleanup(&paths.working_dir, &paths.stem)?;
        } else {
            std::fs::create_dir_all(&paths.working_dir)?;
        }

        let auto_install = request.auto_install && self.package_tool_available().await;
        if request.auto_install && !auto_install {
            info!("no package tool available, automatic installation disabled");
        }

        let engines = EngineRunner::new(
            self.runner.as_ref(),
            &self.resolver,
            &self.distribution,
            request,
            &paths,
            auto_install,
        );

        let initial = self.initial_compile(&engines, request, auto_install, session).await?;
        let initial_needs_rerun = needs_recompilation_file(&initial.log);

        let idx = paths.working_file("idx");
        let index_created = if idx.exists() {
            // Page numbers may still move, so typeset once more before indexing.
            progress!(request.quiet, "re-compiling document for index");
            let stage = engines.run_typeset_engine(session).await?;
            if !stage.succeeded() {
                return Err(compile_failed("error compiling latex", &stage));
            }
            self.make_index(&engines, &idx, request, session).await?
        } else {
            false
        };

        let bibliography_created = self
            .make_bibliography(&engines, &paths, request, auto_install, session)
            .await?;

        let min_reruns = request.min_runs.saturating_sub(1);
        let max_reruns = request.max_runs.saturating_sub(1);
        let mut converged = !initial_needs_rerun;
        if (index_created || bibliography_created || min_reruns > 0 || initial_needs_rerun) && max_reruns > 0 {
            converged = self
                .recompile_until_complete(&engines, request, min_reruns, max_reruns, session)
                .await?;
        }

        if request.clean {
            artifacts::cleanup(&paths.working_dir, &paths.stem)?;
        }

        Ok(CompileOutcome {
            output: paths.pdf(),
            log: paths.log(),
            typeset_runs: session.typeset_runs,
            converged,
            index_created,
            bibliography_created,
            installed_packages: session.installed.clone(),
        })
    }

    async fn initial_compile(
        &self,
        engines: &EngineRunner<'_>,
        request: &CompileRequest,
        auto_install: bool,
        session: &mut SessionState,
    ) -> Result<StageResult, BuildError> {
        let mut last_log = None;
        for _ in 0..MAX_INITIAL_ATTEMPTS {
            let stage = engines.run_typeset_engine(session).await?;
            last_log = Some(stage.log.clone());
            let log_text = read_log(&stage.log).ok();

            if stage.succeeded() {
                let Some(package) = log_text.as_deref().and_then(find_missing_hyphenation_files) else {
                    return Ok(stage);
                };
                if !auto_install {
                    warn!("hyphenation patterns missing ({package}), automatic installation disabled");
                    return Ok(stage);
                }
                match self.resolver.install_new(&mut session.memo, &[package]).await? {
                    InstallOutcome::Installed(installed) => {
                        session.record_installed(installed);
                        continue;
                    }
                    InstallOutcome::NoNewPackages | InstallOutcome::Failed(_) => {
                        return Err(BuildError::CompileFailed {
                            title: "missing hyphenation file".into(),
                            detail: None,
                            log: Some(stage.log),
                        });
                    }
                }
            }

            if !auto_install {
                return Err(compile_failed(
                    "missing packages (automatic installation disabled)",
                    &stage,
                ));
            }

            if !session.packages_updated {
                self.update_distribution(request, session).await;
            }

            if let Some(module) = log_text.as_deref().and_then(needs_tool_update) {
                if session.tool_outdated_retried {
                    return Err(BuildError::ToolOutdated {
                        detail: log_text.as_deref().and_then(|t| find_latex_error(t, stage.stderr())),
                        log: Some(stage.log),
                    });
                }
                info!("loading {module} aborted, retrying with the updated package tool");
                session.tool_outdated_retried = true;
                continue;
            }

            let Some(text) = log_text.as_deref() else {
                return Err(compile_failed(Recovery::AlreadyAttempted.title(), &stage));
            };
            let log_dir = stage.log.parent().unwrap_or(Path::new("."));
            let terms = self.analyzer.find_missing_fonts_and_packages(text, log_dir);
            match self.install_for_terms(&terms, session).await? {
                Recovery::Installed => continue,
                failure => return Err(compile_failed(failure.title(), &stage)),
            }
        }

        Err(BuildError::CompileFailed {
            title: format!("giving up after {MAX_INITIAL_ATTEMPTS} attempts"),
            detail: None,
            log: last_log,
        })
    }

    /// Updates the package tool and every installed package, once per session.
    async fn update_distribution(&self, request: &CompileRequest, session: &mut SessionState) {
        progress!(request.quiet, "updating tlmgr");
        match self.resolver.update(false, true).await {
            Ok(result) if result.success => session.tool_updated = true,
            Ok(result) => warn!("updating tlmgr returned {:?}", result.code),
            Err(e) => warn!("updating tlmgr failed: {e}"),
        }

        progress!(request.quiet, "updating existing packages");
        match self.resolver.update(true, false).await {
            Ok(result) if !result.success => warn!("updating packages returned {:?}", result.code),
            Ok(_) => {}
            Err(e) => warn!("updating packages failed: {e}"),
        }
        session.packages_updated = true;
    }

    async fn install_for_terms(&self, terms: &[String], session: &mut SessionState) -> Result<Recovery, BuildError> {
        if terms.is_empty() {
            return Ok(Recovery::NothingDetected);
        }
        let packages = self.resolver.search(terms).await?;
        if packages.is_empty() {
            return Ok(Recovery::NoMatchingPackages);
        }
        Ok(match self.resolver.install_new(&mut session.memo, &packages).await? {
            InstallOutcome::Installed(installed) => {
                session.record_installed(installed);
                Recovery::Installed
            }
            InstallOutcome::NoNewPackages => Recovery::AlreadyAttempted,
            InstallOutcome::Failed(_) => Recovery::InstallFailed,
        })
    }

    async fn make_index(
        &self,
        engines: &EngineRunner<'_>,
        idx: &Path,
        request: &CompileRequest,
        session: &mut SessionState,
    ) -> Result<bool, BuildError> {
        progress!(request.quiet, "making index");
        let stage = engines.run_index_engine(idx, session).await?;

        if stage.result.code != Some(0) {
            let code = stage.result.code.map_or_else(|| "none".to_string(), |c| c.to_string());
            return Err(BuildError::IndexFailed {
                title: format!("result code {code}"),
                detail: None,
                log: Some(stage.log),
            });
        }
        if let Some(error) = read_log(&stage.log).ok().as_deref().and_then(find_index_error) {
            return Err(BuildError::IndexFailed {
                title: "error generating index".into(),
                detail: Some(error),
                log: Some(stage.log),
            });
        }
        Ok(true)
    }

    async fn make_bibliography(
        &self,
        engines: &EngineRunner<'_>,
        paths: &DocumentPaths,
        request: &CompileRequest,
        auto_install: bool,
        session: &mut SessionState,
    ) -> Result<bool, BuildError> {
        let command = request.engine.bib_command();
        let intermediate = paths.working_file(command.intermediate_extension());
        let mut recovered = false;

        loop {
            let Ok(data) = read_log(&intermediate) else {
                return Ok(false);
            };
            if command == BibCommand::Bibtex && !contains_biblio_data(&data) {
                return Ok(false);
            }

            progress!(request.quiet, "generating bibliography");
            if cfg!(windows) && command == BibCommand::Bibtex && !self.distribution.using_global {
                fix_aux_bibdata(&intermediate)?;
            }

            let stage = engines.run_bib_engine(command, session).await?;
            if stage.result.code == Some(0) {
                return Ok(true);
            }

            let style = read_log(&stage.log).ok().as_deref().and_then(find_bib_style_file);
            if let Some(style) = style.filter(|_| auto_install && !recovered) {
                recovered = true;
                match self.install_for_terms(&[style], session).await? {
                    Recovery::Installed => continue,
                    failure => {
                        return Err(BuildError::BibliographyFailed {
                            title: failure.title().into(),
                            detail: stage.stderr().map(|s| s.trim().to_string()),
                            log: Some(stage.log),
                        });
                    }
                }
            }

            return Err(BuildError::BibliographyFailed {
                title: "error generating bibliography".into(),
                detail: stage.stderr().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
                log: Some(stage.log),
            });
        }
    }

    /// Reruns the typesetting engine until the log stops asking for another
    /// pass and at least `min_reruns` passes ran. Returns whether the log settled.
    async fn recompile_until_complete(
        &self,
        engines: &EngineRunner<'_>,
        request: &CompileRequest,
        min_reruns: u32,
        max_reruns: u32,
        session: &mut SessionState,
    ) -> Result<bool, BuildError> {
        let mut runs = 0;
        let mut needs_rerun = true;
        loop {
            if runs >= max_reruns {
                warn!("maximum number of runs ({max_reruns}) reached");
                return Ok(!needs_rerun);
            }

            progress!(request.quiet, "running {} - {}", request.engine.pdf_engine, runs + 2);
            let stage = engines.run_typeset_engine(session).await?;
            if !stage.succeeded() {
                return Err(compile_failed("Error compiling latex", &stage));
            }

            runs += 1;
            needs_rerun = needs_recompilation_file(&stage.log);
            if needs_rerun || runs < min_reruns {
                continue;
            }
            return Ok(true);
        }
    }
}

/// A compile failure carrying the error extracted from the stage's log.
fn compile_failed(title: &str, stage: &StageResult) -> BuildError {
    match read_log(&stage.log) {
        Ok(text) => BuildError::CompileFailed {
            title: title.to_string(),
            detail: find_latex_error(&text, stage.stderr()),
            log: Some(stage.log.clone()),
        },
        Err(_) => BuildError::CompileFailed {
            title: title.to_string(),
            detail: None,
            log: None,
        },
    }
}
