use texmend_core::PackageInstallMemo;

/// Mutable state of one compile session.
///
/// Created fresh for every document and threaded through the controller and
/// engine runner; nothing in it survives the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Packages already attempted, so the same set is never installed twice.
    pub memo: PackageInstallMemo,
    /// Installed packages were updated after the first failure.
    pub packages_updated: bool,
    /// The package tool updated itself.
    pub tool_updated: bool,
    /// A compile was retried because the package tool was outdated.
    pub tool_outdated_retried: bool,
    /// Typesetting engine invocations so far.
    pub typeset_runs: u32,
    /// Packages installed successfully, in order.
    pub installed: Vec<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_installed(&mut self, packages: Vec<String>) {
        self.installed.extend(packages);
    }
}
