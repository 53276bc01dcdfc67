//! Invocation of the typesetting, index and bibliography engines.
//!
//! All three go through one retry wrapper: when the engine binary cannot be
//! started, the runner checks that a TeX distribution exists at all, installs
//! the package providing the command (if auto-install is on) and tries once more.

use crate::artifacts::remove_if_exists;
use crate::error::BuildError;
use crate::request::{BibCommand, CompileRequest, DocumentPaths};
use crate::session::SessionState;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::path::{Path, PathBuf};
use texmend_core::command::{search_path_value, BSTINPUTS, TEXINPUTS};
use texmend_core::distribution::has_latex_distribution;
use texmend_core::{
    CommandResult, CommandRunner, CommandSpec, CoreError, InstallOutcome, PackageResolver,
    TexDistribution,
};

// Flags that already choose latexmk's output format.
const LATEXMK_FORMAT_FLAGS: &[&str] = &[
    "-pdf", "-pdfxe", "-pdflua", "-pdfdvi", "-pdfps", "-xelatex", "-lualatex", "-dvi", "-ps",
];

// Byte-oriented so aux files in legacy encodings survive the rewrite.
static BIBDATA_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m-u)^(\\bibdata\{.+)\.bib(.*\})$").unwrap());

/// One engine invocation: where its log went and what it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub log: PathBuf,
    /// The file the stage must produce, if it is checked.
    pub output: Option<PathBuf>,
    pub result: CommandResult,
}

impl StageResult {
    /// Exit code zero and the expected output on disk.
    pub fn succeeded(&self) -> bool {
        self.result.code == Some(0) && self.output.as_ref().is_none_or(|o| o.exists())
    }

    pub fn stderr(&self) -> Option<&str> {
        self.result.stderr.as_deref()
    }
}

/// Runs the engines of one compile request.
pub struct EngineRunner<'a> {
    runner: &'a dyn CommandRunner,
    resolver: &'a PackageResolver,
    distribution: &'a TexDistribution,
    request: &'a CompileRequest,
    paths: &'a DocumentPaths,
    auto_install: bool,
}

impl<'a> EngineRunner<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        resolver: &'a PackageResolver,
        distribution: &'a TexDistribution,
        request: &'a CompileRequest,
        paths: &'a DocumentPaths,
        auto_install: bool,
    ) -> Self {
        Self {
            runner,
            resolver,
            distribution,
            request,
            paths,
            auto_install,
        }
    }

    /// Runs the typesetting engine once, after deleting the previous log and PDF.
    pub async fn run_typeset_engine(&self, session: &mut SessionState) -> Result<StageResult, BuildError> {
        let log = self.paths.log();
        let output = self.paths.pdf();
        remove_if_exists(&log)?;
        remove_if_exists(&output)?;

        let args = typeset_args(&self.request.engine, self.paths.output_dir(), &self.paths.input_name);
        let spec = self.spec(&self.request.engine.pdf_engine, args, &self.paths.cwd, false);

        session.typeset_runs += 1;
        let result = self.run_with_recovery(spec, session).await?;
        Ok(StageResult {
            log,
            output: Some(output),
            result,
        })
    }

    /// Runs the index engine on `idx`, in the directory that holds it.
    pub async fn run_index_engine(&self, idx: &Path, session: &mut SessionState) -> Result<StageResult, BuildError> {
        let dir = match idx.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let log = idx.with_extension("ilg");
        remove_if_exists(&log)?;

        let engine = &self.request.engine;
        let mut args = engine.index_engine_opts.clone();
        if let Some(name) = idx.file_name() {
            args.push(name.to_string_lossy().into_owned());
        }
        let spec = self.spec(&engine.index_engine, args, &dir, false);

        let result = self.run_with_recovery(spec, session).await?;
        Ok(StageResult {
            log,
            output: None,
            result,
        })
    }

    /// Runs the bibliography engine on its intermediate file.
    pub async fn run_bib_engine(&self, command: BibCommand, session: &mut SessionState) -> Result<StageResult, BuildError> {
        let log = self.paths.working_file("blg");
        remove_if_exists(&log)?;

        let input = self
            .paths
            .relative_working_file(command.intermediate_extension())
            .to_string_lossy()
            .into_owned();
        let spec = self.spec(command.program(), vec![input], &self.paths.cwd, true);

        let result = self.run_with_recovery(spec, session).await?;
        Ok(StageResult {
            log,
            output: None,
            result,
        })
    }

    fn spec(&self, program: &str, args: Vec<String>, cwd: &Path, bibliography: bool) -> CommandSpec {
        let mut spec = CommandSpec::new(program)
            .args(args)
            .current_dir(cwd)
            .path_prefix(self.distribution.bin_dir.clone());
        if !self.request.tex_input_dirs.is_empty() {
            let dirs = search_path_value(&self.request.tex_input_dirs);
            spec = spec.env(TEXINPUTS, dirs.clone());
            if bibliography {
                spec = spec.env(BSTINPUTS, dirs);
            }
        }
        spec
    }

    async fn run_with_recovery(&self, spec: CommandSpec, session: &mut SessionState) -> Result<CommandResult, BuildError> {
        let program = match self.runner.run(&spec).await {
            Ok(result) => return Ok(self.echo(result)),
            Err(CoreError::ExecutableNotFound { program }) => program,
            Err(e) => return Err(e.into()),
        };

        if !has_latex_distribution(self.runner, self.distribution.bin_dir.as_deref()).await {
            return Err(BuildError::EnvironmentMissing);
        }
        if !self.auto_install {
            return Err(BuildError::ExecutableNotFound { program });
        }

        info!("command {program} not found, attempting install");
        let packages = packages_for_command(&program);
        match self.resolver.install_new(&mut session.memo, &packages).await? {
            InstallOutcome::Installed(installed) => session.record_installed(installed),
            InstallOutcome::NoNewPackages | InstallOutcome::Failed(_) => {
                warn!("could not install a package providing {program}")
            }
        }

        let result = self.runner.run(&spec).await?;
        Ok(self.echo(result))
    }

    fn echo(&self, result: CommandResult) -> CommandResult {
        if !self.request.quiet {
            if let Some(stderr) = result.stderr.as_deref().map(str::trim_end).filter(|s| !s.is_empty()) {
                info!("{stderr}");
            }
        }
        result
    }
}

/// Command line for the typesetting engine; the input file is always last.
pub fn typeset_args(
    engine: &crate::request::EngineDescriptor,
    output_dir: Option<&Path>,
    input_name: &str,
) -> Vec<String> {
    let mut args = vec!["-interaction=batchmode".to_string(), "-halt-on-error".to_string()];

    if engine.is_latexmk() {
        let has_format = engine
            .pdf_engine_opts
            .iter()
            .any(|opt| LATEXMK_FORMAT_FLAGS.contains(&opt.as_str()));
        if !has_format {
            args.push("-pdf".into());
        }
        args.push("-quiet".into());
    }

    if let Some(dir) = output_dir {
        args.push(format!("-output-directory={}", dir.display()));
    }
    args.extend(engine.pdf_engine_opts.iter().cloned());
    args.push(input_name.to_string());
    args
}

/// Packages to install when `command` is missing.
pub fn packages_for_command(command: &str) -> Vec<String> {
    match command {
        "texindy" => vec!["xindy".to_string()],
        other => vec![other.to_string()],
    }
}

/// Drops the `.bib` extension from `\bibdata` entries of an aux file.
///
/// Works on raw bytes: every byte outside the matched entries is kept as is.
pub fn strip_bibdata_extensions(aux: &[u8]) -> Vec<u8> {
    BIBDATA_EXTENSION.replace_all(aux, &b"${1}${2}"[..]).into_owned()
}

/// Rewrites the `\bibdata` entries of the aux file at `path` in place.
pub fn fix_aux_bibdata(path: &Path) -> std::io::Result<()> {
    let aux = std::fs::read(path)?;
    let fixed = strip_bibdata_extensions(&aux);
    if fixed != aux {
        std::fs::write(path, fixed)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::EngineDescriptor;

    fn args(engine: EngineDescriptor, output_dir: Option<&str>) -> Vec<String> {
        typeset_args(&engine, output_dir.map(Path::new), "doc.tex")
    }

    #[test]
    fn test_pdflatex_args() {
        let engine = EngineDescriptor::new("pdflatex").with_pdf_engine_opts(vec!["-shell-escape".into()]);
        assert_eq!(
            args(engine, Some("out")),
            vec![
                "-interaction=batchmode",
                "-halt-on-error",
                "-output-directory=out",
                "-shell-escape",
                "doc.tex"
            ]
        );
    }

    #[test]
    fn test_latexmk_defaults_to_pdf() {
        assert_eq!(
            args(EngineDescriptor::new("latexmk"), None),
            vec!["-interaction=batchmode", "-halt-on-error", "-pdf", "-quiet", "doc.tex"]
        );
    }

    #[test]
    fn test_latexmk_keeps_explicit_format() {
        let engine = EngineDescriptor::new("latexmk").with_pdf_engine_opts(vec!["-xelatex".into()]);
        assert_eq!(
            args(engine, None),
            vec!["-interaction=batchmode", "-halt-on-error", "-quiet", "-xelatex", "doc.tex"]
        );
    }

    #[test]
    fn test_packages_for_command() {
        assert_eq!(packages_for_command("texindy"), vec!["xindy"]);
        assert_eq!(packages_for_command("biber"), vec!["biber"]);
    }

    #[test]
    fn test_strip_bibdata_extensions() {
        let aux = b"\\relax\n\\bibdata{refs.bib,more.bib}\n\\citation{knuth}\n";
        assert_eq!(
            strip_bibdata_extensions(aux),
            b"\\relax\n\\bibdata{refs.bib,more}\n\\citation{knuth}\n"
        );
        assert_eq!(strip_bibdata_extensions(b"\\bibdata{refs}\n"), b"\\bibdata{refs}\n");
    }

    #[test]
    fn test_strip_bibdata_keeps_latin1_bytes() {
        let aux = b"\\citation{m\xfcller2020}\n\\bibdata{r\xe9fs.bib}\n";
        assert_eq!(
            strip_bibdata_extensions(aux),
            b"\\citation{m\xfcller2020}\n\\bibdata{r\xe9fs}\n"
        );
    }

    #[test]
    fn test_fix_aux_bibdata_rewrites_bytes_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let aux = dir.path().join("doc.aux");
        std::fs::write(&aux, b"\\citation{m\xfcller2020}\n\\bibdata{refs.bib}\n").unwrap();

        fix_aux_bibdata(&aux).unwrap();

        assert_eq!(
            std::fs::read(&aux).unwrap(),
            b"\\citation{m\xfcller2020}\n\\bibdata{refs}\n"
        );
    }

    #[test]
    fn test_stage_success_requires_output() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("doc.pdf");
        let mut stage = StageResult {
            log: dir.path().join("doc.log"),
            output: Some(pdf.clone()),
            result: CommandResult::exit(0),
        };
        assert!(!stage.succeeded());

        std::fs::write(&pdf, "%PDF").unwrap();
        assert!(stage.succeeded());

        stage.result = CommandResult::exit(1);
        assert!(!stage.succeeded());

        stage.output = None;
        stage.result = CommandResult::exit(0);
        assert!(stage.succeeded());
    }
}
