use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engines used for one compile session and their extra arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineDescriptor {
    pub pdf_engine: String,
    pub pdf_engine_opts: Vec<String>,
    pub index_engine: String,
    pub index_engine_opts: Vec<String>,
    /// `natbib` selects bibtex; anything else selects biber.
    pub bib_engine: String,
    pub tlmgr_opts: Vec<String>,
}

impl Default for EngineDescriptor {
    fn default() -> Self {
        Self {
            pdf_engine: "pdflatex".into(),
            pdf_engine_opts: Vec::new(),
            index_engine: "makeindex".into(),
            index_engine_opts: Vec::new(),
            bib_engine: "citeproc".into(),
            tlmgr_opts: Vec::new(),
        }
    }
}

impl EngineDescriptor {
    pub fn new(pdf_engine: impl Into<String>) -> Self {
        Self {
            pdf_engine: pdf_engine.into(),
            ..Self::default()
        }
    }

    pub fn with_pdf_engine_opts(mut self, opts: Vec<String>) -> Self {
        self.pdf_engine_opts = opts;
        self
    }

    pub fn with_index_engine(mut self, engine: impl Into<String>, opts: Vec<String>) -> Self {
        self.index_engine = engine.into();
        self.index_engine_opts = opts;
        self
    }

    pub fn with_bib_engine(mut self, engine: impl Into<String>) -> Self {
        self.bib_engine = engine.into();
        self
    }

    pub fn with_tlmgr_opts(mut self, opts: Vec<String>) -> Self {
        self.tlmgr_opts = opts;
        self
    }

    pub fn bib_command(&self) -> BibCommand {
        if self.bib_engine == "natbib" {
            BibCommand::Bibtex
        } else {
            BibCommand::Biber
        }
    }

    /// Whether the typesetting engine drives its own reruns.
    pub fn is_latexmk(&self) -> bool {
        Path::new(&self.pdf_engine)
            .file_stem()
            .is_some_and(|stem| stem == "latexmk")
    }
}

/// The program that processes citations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BibCommand {
    /// Works on `.aux` files; used by natbib.
    Bibtex,
    /// Works on `.bcf` files; used by biblatex.
    Biber,
}

impl BibCommand {
    pub fn program(self) -> &'static str {
        match self {
            BibCommand::Bibtex => "bibtex",
            BibCommand::Biber => "biber",
        }
    }

    /// Extension of the intermediate file the program reads.
    pub fn intermediate_extension(self) -> &'static str {
        match self {
            BibCommand::Bibtex => "aux",
            BibCommand::Biber => "bcf",
        }
    }
}

/// Everything needed to turn one LaTeX document into a PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileRequest {
    pub input: PathBuf,
    /// Directory for generated files, relative to the input's directory.
    pub output_dir: Option<PathBuf>,
    pub engine: EngineDescriptor,
    pub min_runs: u32,
    pub max_runs: u32,
    pub auto_install: bool,
    /// Remove auxiliary files after a successful build.
    pub clean: bool,
    pub quiet: bool,
    /// Look for a TinyTeX installation before the system distribution.
    pub prefer_tinytex: bool,
    /// Extra TeX search directories.
    pub tex_input_dirs: Vec<PathBuf>,
}

impl Default for CompileRequest {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output_dir: None,
            engine: EngineDescriptor::default(),
            min_runs: 1,
            max_runs: 10,
            auto_install: true,
            clean: false,
            quiet: false,
            prefer_tinytex: true,
            tex_input_dirs: Vec::new(),
        }
    }
}

impl CompileRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn with_engine(mut self, engine: EngineDescriptor) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_runs(mut self, min_runs: u32, max_runs: u32) -> Self {
        self.min_runs = min_runs;
        self.max_runs = max_runs;
        self
    }

    pub fn with_auto_install(mut self, auto_install: bool) -> Self {
        self.auto_install = auto_install;
        self
    }

    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_tex_input_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.tex_input_dirs = dirs;
        self
    }

    /// Resolves the file locations this request reads and writes.
    pub fn paths(&self) -> Result<DocumentPaths, BuildError> {
        DocumentPaths::new(&self.input, self.output_dir.as_deref())
    }
}

/// File locations derived from a [`CompileRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPaths {
    /// Directory holding the input; every engine runs here.
    pub cwd: PathBuf,
    /// Input file name, relative to `cwd`.
    pub input_name: String,
    pub stem: String,
    /// Directory receiving the log, PDF and auxiliary files.
    pub working_dir: PathBuf,
    output_dir: Option<PathBuf>,
}

impl DocumentPaths {
    pub fn new(input: &Path, output_dir: Option<&Path>) -> Result<Self, BuildError> {
        let invalid = || BuildError::InvalidInput {
            path: input.to_path_buf(),
        };
        let input_name = input.file_name().ok_or_else(invalid)?.to_string_lossy().into_owned();
        let stem = input.file_stem().ok_or_else(invalid)?.to_string_lossy().into_owned();
        let cwd = match input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let working_dir = match output_dir {
            Some(dir) => cwd.join(dir),
            None => cwd.clone(),
        };
        Ok(Self {
            cwd,
            input_name,
            stem,
            working_dir,
            output_dir: output_dir.map(Path::to_path_buf),
        })
    }

    /// `<working_dir>/<stem>.<ext>`
    pub fn working_file(&self, ext: &str) -> PathBuf {
        self.working_dir.join(format!("{}.{ext}", self.stem))
    }

    /// [`Self::working_file`] relative to `cwd`.
    pub fn relative_working_file(&self, ext: &str) -> PathBuf {
        let name = format!("{}.{ext}", self.stem);
        match &self.output_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn log(&self) -> PathBuf {
        self.working_file("log")
    }

    pub fn pdf(&self) -> PathBuf {
        self.working_file("pdf")
    }
}
