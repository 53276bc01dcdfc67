use thiserror::Error;

/// Errors raised while running external programs or talking to the package tool.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The program could not be started because it does not exist.
    #[error("executable `{program}` was not found")]
    ExecutableNotFound { program: String },

    /// The program exists but spawning or waiting on it failed.
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The package tool returned a status other than success or "not installed".
    #[error("{tool} returned a non zero status code {code}\n{stderr}")]
    PackageTool {
        tool: &'static str,
        code: i32,
        stderr: String,
    },

    #[error("{tool} could not update itself")]
    SelfUpdateFailed { tool: &'static str },
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
