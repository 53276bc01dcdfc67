use crate::normalize_quotes;
use once_cell::sync::Lazy;
use regex::Regex;

static LATEX_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^!\s((?s:.*))Here is how much").unwrap());
static NO_OUTPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(No pages of output)\.").unwrap());
static INDEX_ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s\s\s--\s(.*)").unwrap());
static LOADING_ABORTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r".* Loading '([^']+)' aborted!").unwrap());
static STYLE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r".* open style file (\S+)").unwrap());
static BIBLIO_DATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\\(bibdata|citation|bibstyle)\{").unwrap());

// (signature, hint) pairs, first match wins.
static STDERR_HINTS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(?m)^!!! Error: Cannot open Ghostscript for piped input").unwrap(),
            "GhostScript is likely required to compile this document. Please be sure GhostScript (https://ghostscript.com) is installed and try again.",
        ),
        (
            Regex::new(r"(?m)^GPL Ghostscript .*: Can't find initialization file gs_init.ps").unwrap(),
            "GhostScript is likely required to compile this document. Please be sure GhostScript (https://ghostscript.com) is installed and configured properly and try again.",
        ),
    ]
});

static LOG_HINTS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"! Package inputenc Error: Unicode character").unwrap(),
            "Possible unsupported unicode character in this configuration. Perhaps try another LaTeX engine (e.g. XeLaTeX).",
        ),
        (
            Regex::new(r"Missing \$ inserted\.").unwrap(),
            "You may need to $ $ around an expression in this file.",
        ),
    ]
});

/// Extracts the fatal error block from a TeX log.
///
/// Returns the text between the first `! ` line and the memory-usage
/// trailer, or `No pages of output` when the engine produced nothing. A hint
/// is appended on a new line when stderr or the log match a known signature.
pub fn find_latex_error(log_text: &str, stderr: Option<&str>) -> Option<String> {
    let error = LATEX_ERROR
        .captures(log_text)
        .or_else(|| NO_OUTPUT.captures(log_text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end().to_string())?;

    match suggest_hint(log_text, stderr) {
        Some(hint) => Some(format!("{error}\n{hint}")),
        None => Some(error),
    }
}

/// Looks up a one-line hint. Stderr signatures win over log signatures.
pub fn suggest_hint(log_text: &str, stderr: Option<&str>) -> Option<&'static str> {
    if let Some(stderr) = stderr {
        if let Some((_, hint)) = STDERR_HINTS.iter().find(|(re, _)| re.is_match(stderr)) {
            return Some(*hint);
        }
    }
    LOG_HINTS
        .iter()
        .find(|(re, _)| re.is_match(log_text))
        .map(|(_, hint)| *hint)
}

/// Finds the first `   -- message` line of a makeindex `.ilg` log.
pub fn find_index_error(log_text: &str) -> Option<String> {
    INDEX_ERROR
        .captures(log_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end().to_string())
}

/// Returns the Lua module whose loading was aborted, a sign that the
/// package tool is older than the installed packages.
pub fn needs_tool_update(log_text: &str) -> Option<String> {
    LOADING_ABORTED
        .captures(&normalize_quotes(log_text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Returns the style file a bibliography engine could not open, read from its `.blg` log.
pub fn find_bib_style_file(blg_text: &str) -> Option<String> {
    STYLE_FILE
        .captures(blg_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end().to_string())
}

/// Whether an `.aux` file carries bibliography directives.
pub fn contains_biblio_data(aux_text: &str) -> bool {
    BIBLIO_DATA.is_match(aux_text)
}
