use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use texmend_log::MISSING_FONT_LOG;

/// Extensions of the auxiliary files a build leaves next to its PDF.
pub const AUX_EXTENSIONS: &[&str] = &[
    "log", "idx", "aux", "bcf", "blg", "bbl", "fls", "out", "lof", "lot", "toc", "nav", "snm",
    "vrb", "ilg", "ind", "xwm", "brf", "run.xml",
];

/// The auxiliary files of document `stem` in `dir`, plus the missing font log.
pub fn aux_files(dir: &Path, stem: &str) -> Vec<PathBuf> {
    AUX_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .chain(std::iter::once(dir.join(MISSING_FONT_LOG)))
        .collect()
}

/// Deletes whichever auxiliary files exist and returns the removed paths.
pub fn cleanup(dir: &Path, stem: &str) -> io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for file in aux_files(dir, stem) {
        if remove_if_exists(&file)? {
            removed.push(file);
        }
    }
    debug!("removed {} auxiliary files from {}", removed.len(), dir.display());
    Ok(removed)
}

/// Deletes `path`, treating an absent file as success.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
