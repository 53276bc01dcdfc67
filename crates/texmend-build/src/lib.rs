//! # texmend build
//!
//! A self-healing LaTeX to PDF pipeline. The typesetting, index and
//! bibliography engines are treated as opaque programs: the only things
//! inspected are their exit codes, log files and stderr.
//!
//! When a pass fails, the log is analyzed for missing style files, fonts or
//! hyphenation patterns; the providing packages are installed and the pass is
//! retried. Successful builds are rerun until cross-references settle or the
//! run budget is spent.
//!
//! ```no_run
//! use texmend_build::{CompileRequest, ConvergenceController};
//! use texmend_core::command::system_runner;
//!
//! # async fn demo() -> Result<(), texmend_build::BuildError> {
//! let request = CompileRequest::new("paper.tex").with_runs(1, 5);
//! let controller = ConvergenceController::detect(system_runner(), &request).await;
//! let outcome = controller.generate_pdf(&request).await?;
//! println!("wrote {} in {} passes", outcome.output.display(), outcome.typeset_runs);
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod session;

pub use engine::{EngineRunner, StageResult};
pub use error::BuildError;
pub use pipeline::{CompileOutcome, ConvergenceController};
pub use request::{BibCommand, CompileRequest, DocumentPaths, EngineDescriptor};
pub use session::SessionState;
