use crate::normalize_quotes;
use once_cell::sync::Lazy;
use regex::Regex;

static BABEL_WARNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^Package babel Warning:").unwrap());
static WARNING_LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\(babel\).* language [`']([^`'\s]+)'").unwrap());
static INFO_LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)Package babel Info: Hyphen rules for '([^']*)' set to \\l@nil").unwrap()
});

// Languages without a hyphenation package.
const NO_HYPHENATION: &[&str] = &["chinese", "chinese-hans"];

/// Detects missing hyphenation patterns reported by babel and returns the
/// package that provides them (`hyphen-<language>`).
///
/// Two message shapes are recognised: the `Package babel Warning` block that
/// names the language in quotes, and the `Package babel Info` line stating
/// that the hyphen rules for a locale were set to `\l@nil`. Returns `None`
/// when nothing is reported or the language has no hyphenation package.
pub fn find_missing_hyphenation_files(log_text: &str) -> Option<String> {
    let text = normalize_quotes(log_text);

    let from_warning = if BABEL_WARNING.is_match(&text) {
        WARNING_LANGUAGE
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    } else {
        None
    };

    let language = from_warning.or_else(|| {
        INFO_LANGUAGE
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    })?;

    hyphenation_language(language).map(|lang| format!("hyphen-{lang}"))
}

fn hyphenation_language(language: &str) -> Option<String> {
    let language = language.to_lowercase();
    if language.is_empty() || NO_HYPHENATION.contains(&language.as_str()) {
        return None;
    }
    // babel's ngerman ships in the german hyphenation package
    if language == "ngerman" {
        return Some("german".to_string());
    }
    Some(language)
}
