//! A scripted TeX installation for pipeline tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use texmend_build::{CompileRequest, ConvergenceController};
use texmend_core::package_manager::{InstallStatus, PackageBackend};
use texmend_core::{CommandResult, CommandRunner, CommandSpec, CoreError, PackageResolver, TexDistribution};

pub const CLEAN_LOG: &str = "This is pdfTeX, Version 3.141592653\n\
Output written on doc.pdf (1 page, 12000 bytes).\n\
Transcript written on doc.log.\n";

pub const RERUN_LOG: &str = "LaTeX Warning: Label(s) may have changed. Rerun to get cross-references right.\n\
Output written on doc.pdf (2 pages, 24000 bytes).\n";

pub const MISSING_FRAMED_LOG: &str = "(./doc.tex\n\
! LaTeX Error: File `framed.sty' not found.\n\
\n\
Type X to quit or <RETURN> to proceed,\n\
or enter new name. (Default extension: sty)\n\
\n\
Here is how much of TeX's memory you used:\n";

pub const MISSING_SPANISH_LOG: &str = "Package babel Warning: No hyphenation patterns were preloaded for\n\
(babel)                the language `Spanish' into the format.\n\
(babel)                Please, configure your TeX system to add them and\n\
(babel)                rebuild the format.\n\
Output written on doc.pdf (1 page, 12000 bytes).\n";

pub const TOOL_OUTDATED_LOG: &str = "(/usr/share/texmf/tex/luatex/luaotfload.lua) Loading 'luaotfload-main' aborted!\n";

/// One call seen by [`FakeTex`].
pub struct Invocation<'a> {
    pub spec: &'a CommandSpec,
    /// How many times this program ran before this call.
    pub nth: usize,
}

impl Invocation<'_> {
    pub fn program(&self) -> &str {
        &self.spec.program
    }

    pub fn cwd(&self) -> PathBuf {
        self.spec.cwd.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Where a typesetting engine writes, honouring `-output-directory=`.
    pub fn out_dir(&self) -> PathBuf {
        let cwd = self.cwd();
        match self
            .spec
            .args
            .iter()
            .find_map(|a| a.strip_prefix("-output-directory="))
        {
            Some(dir) => cwd.join(dir),
            None => cwd,
        }
    }

    /// Stem of the last argument, the input file.
    pub fn stem(&self) -> String {
        let input = self.spec.args.last().expect("input argument");
        Path::new(input).file_stem().unwrap().to_string_lossy().into_owned()
    }

    pub fn write(&self, ext: &str, contents: &str) {
        std::fs::write(self.out_dir().join(format!("{}.{ext}", self.stem())), contents).unwrap();
    }

    /// A successful typesetting pass writing `log` and a PDF.
    pub fn typeset(&self, log: &str) -> Result<CommandResult, CoreError> {
        self.write("log", log);
        self.write("pdf", "%PDF-1.5");
        Ok(CommandResult::exit(0))
    }

    /// A failed typesetting pass writing only `log`.
    pub fn typeset_fail(&self, log: &str) -> Result<CommandResult, CoreError> {
        self.write("log", log);
        Ok(CommandResult::exit(1).with_stderr("halted on error"))
    }

    pub fn not_found(&self) -> Result<CommandResult, CoreError> {
        Err(CoreError::ExecutableNotFound {
            program: self.spec.program.clone(),
        })
    }
}

type Handler = dyn Fn(&Invocation<'_>) -> Result<CommandResult, CoreError> + Send + Sync;

/// A [`CommandRunner`] whose programs are closures writing files into the temp dir.
pub struct FakeTex {
    calls: Mutex<Vec<CommandSpec>>,
    handler: Box<Handler>,
}

impl FakeTex {
    pub fn new(
        handler: impl Fn(&Invocation<'_>) -> Result<CommandResult, CoreError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        })
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Programs in call order, excluding distribution probes.
    pub fn programs(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|c| c.program)
            .filter(|p| p != "pdftex")
            .collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.calls().iter().filter(|c| c.program == program).count()
    }
}

impl std::fmt::Debug for FakeTex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeTex").finish_non_exhaustive()
    }
}

#[async_trait]
impl CommandRunner for FakeTex {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult, CoreError> {
        let nth = {
            let mut calls = self.calls.lock().unwrap();
            let nth = calls.iter().filter(|c| c.program == spec.program).count();
            calls.push(spec.clone());
            nth
        };
        (self.handler)(&Invocation { spec, nth })
    }
}

/// A package tool that knows a fixed file-to-package table.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    provides: Vec<(String, String)>,
    unavailable: bool,
    pub installs: Mutex<Vec<Vec<String>>>,
    pub updates: Mutex<Vec<(bool, bool)>>,
}

impl ScriptedBackend {
    pub fn new(provides: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            provides: provides
                .iter()
                .map(|(file, pkg)| (file.to_string(), pkg.to_string()))
                .collect(),
            ..Self::default()
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            unavailable: true,
            ..Self::default()
        })
    }

    pub fn installs(&self) -> Vec<Vec<String>> {
        self.installs.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(bool, bool)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageBackend for ScriptedBackend {
    async fn search(&self, terms: &[String]) -> Result<Vec<String>, CoreError> {
        let mut found: Vec<String> = Vec::new();
        for term in terms {
            for (file, pkg) in &self.provides {
                if file == term && !found.contains(pkg) {
                    found.push(pkg.clone());
                }
            }
        }
        Ok(found)
    }

    async fn install(&self, packages: &[String]) -> Result<Vec<InstallStatus>, CoreError> {
        self.installs.lock().unwrap().push(packages.to_vec());
        Ok(packages.iter().map(InstallStatus::complete).collect())
    }

    async fn update(&self, all: bool, self_update: bool) -> Result<CommandResult, CoreError> {
        self.updates.lock().unwrap().push((all, self_update));
        Ok(CommandResult::exit(0))
    }

    async fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn controller(tex: &Arc<FakeTex>, backend: &Arc<ScriptedBackend>) -> ConvergenceController {
    ConvergenceController::new(
        tex.clone(),
        PackageResolver::with_backend(backend.clone()),
        TexDistribution::global(),
    )
}

/// A temp dir holding `doc.tex` and a request for it.
pub fn document() -> (tempfile::TempDir, CompileRequest) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("doc.tex");
    std::fs::write(&input, "\\documentclass{article}\\begin{document}x\\end{document}").unwrap();
    let request = CompileRequest::new(input);
    (dir, request)
}
