//! # texmend core
//!
//! Services the texmend build pipeline uses to talk to the outside world.
//!
//! ## Modules
//!
//! - [`command`] - Running external programs behind the [`CommandRunner`] trait
//! - [`distribution`] - Detecting TinyTeX, TeX Live and a usable `pdftex`
//! - [`package_manager`] - Searching for and installing packages with `tlmgr`,
//!   guarded by a per-session install memo
//!
//! All process execution is injected through [`CommandRunner`], so callers
//! can script every external tool in tests.
//!
//! ## Examples
//!
//! ```no_run
//! use texmend_core::command::{system_runner, CommandSpec};
//!
//! # async fn demo() -> Result<(), texmend_core::CoreError> {
//! let runner = system_runner();
//! let result = runner.run(&CommandSpec::new("pdftex").arg("--version")).await?;
//! println!("pdftex exited with {:?}", result.code);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod distribution;
pub mod error;
pub mod package_manager;

pub use command::{CommandResult, CommandRunner, CommandSpec};
pub use distribution::TexDistribution;
pub use error::CoreError;
pub use package_manager::{InstallOutcome, PackageInstallMemo, PackageResolver};
