use std::path::{Path, PathBuf};
use texmend_core::CoreError;
use thiserror::Error;

/// Why a build stopped.
///
/// Every variant carries what the command line needs to report it: a
/// [`title`](Self::title), an optional extracted error [`detail`](Self::detail)
/// and the [`log_path`](Self::log_path) to inspect.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(
        "No TeX installation was detected. Install TinyTeX, TeX Live or another TeX distribution."
    )]
    EnvironmentMissing,

    #[error("command {program} not found")]
    ExecutableNotFound { program: String },

    #[error("compilation failed- {title}")]
    CompileFailed {
        title: String,
        detail: Option<String>,
        log: Option<PathBuf>,
    },

    #[error("tlmgr needs to be updated, but the update failed")]
    ToolOutdated {
        detail: Option<String>,
        log: Option<PathBuf>,
    },

    #[error("compilation failed- {title}")]
    IndexFailed {
        title: String,
        detail: Option<String>,
        log: Option<PathBuf>,
    },

    #[error("compilation failed- {title}")]
    BibliographyFailed {
        title: String,
        detail: Option<String>,
        log: Option<PathBuf>,
    },

    #[error("package installation failed: {0}")]
    InstallFailed(#[source] CoreError),

    #[error("cannot compile {path}: not a file name")]
    InvalidInput { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("compilation cancelled")]
    Cancelled,
}

impl BuildError {
    pub fn title(&self) -> String {
        match self {
            BuildError::CompileFailed { title, .. }
            | BuildError::IndexFailed { title, .. }
            | BuildError::BibliographyFailed { title, .. } => title.clone(),
            other => other.to_string(),
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            BuildError::CompileFailed { detail, .. }
            | BuildError::ToolOutdated { detail, .. }
            | BuildError::IndexFailed { detail, .. }
            | BuildError::BibliographyFailed { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        match self {
            BuildError::CompileFailed { log, .. }
            | BuildError::ToolOutdated { log, .. }
            | BuildError::IndexFailed { log, .. }
            | BuildError::BibliographyFailed { log, .. } => log.as_deref(),
            _ => None,
        }
    }
}

impl From<CoreError> for BuildError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ExecutableNotFound { program } => BuildError::ExecutableNotFound { program },
            CoreError::Spawn { source, .. } => BuildError::Io(source),
            other => BuildError::InstallFailed(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let err = BuildError::CompileFailed {
            title: "missing packages (automatic installation disabled)".into(),
            detail: Some("LaTeX Error: File `framed.sty' not found.".into()),
            log: Some(PathBuf::from("doc.log")),
        };
        assert_eq!(err.title(), "missing packages (automatic installation disabled)");
        assert!(err.detail().unwrap().contains("framed.sty"));
        assert_eq!(err.log_path(), Some(Path::new("doc.log")));
        assert_eq!(
            err.to_string(),
            "compilation failed- missing packages (automatic installation disabled)"
        );
    }

    #[test]
    fn test_core_error_mapping() {
        let err: BuildError = CoreError::ExecutableNotFound {
            program: "xelatex".into(),
        }
        .into();
        assert!(matches!(err, BuildError::ExecutableNotFound { ref program } if program == "xelatex"));
        assert_eq!(err.log_path(), None);

        let err: BuildError = CoreError::SelfUpdateFailed { tool: "tlmgr" }.into();
        assert!(matches!(err, BuildError::InstallFailed(_)));
        assert_eq!(err.title(), "package installation failed: tlmgr could not update itself");
    }
}
