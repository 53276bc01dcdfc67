use crate::rules::{CompiledRules, RuleError, RuleSet};
use crate::{MISSING_FONT_LOG, normalize_quotes, read_log};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::Path;

static BUILTIN: Lazy<LogAnalyzer> = Lazy::new(LogAnalyzer::new);

/// Missing-dependency detection driven by a compiled [`RuleSet`].
///
/// Most callers can use the free functions ([`find_missing_packages`],
/// [`find_missing_fonts_and_packages`]) which share one builtin instance.
/// Construct an analyzer explicitly to scan with an extended rule table.
#[derive(Debug, Clone)]
pub struct LogAnalyzer {
    rules: CompiledRules,
}

impl Default for LogAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogAnalyzer {
    /// Creates an analyzer using the builtin rule table.
    pub fn new() -> Self {
        let rules = RuleSet::builtin()
            .compile()
            .expect("builtin package rules are valid regular expressions");
        Self { rules }
    }

    pub fn with_rules(rules: &RuleSet) -> Result<Self, RuleError> {
        Ok(Self {
            rules: rules.compile()?,
        })
    }

    /// Returns the package search terms suggested by `log_text`,
    /// deduplicated in first-seen order.
    pub fn find_missing_packages(&self, log_text: &str) -> Vec<String> {
        self.rules.scan(&normalize_quotes(log_text))
    }

    /// Combines [`Self::find_missing_packages`] with the fonts listed in
    /// `dir/missfont.log`, packages first.
    pub fn find_missing_fonts_and_packages(&self, log_text: &str, dir: &Path) -> Vec<String> {
        let packages = self.find_missing_packages(log_text);
        let fonts = find_missing_fonts(dir);
        uniq(packages.into_iter().chain(fonts))
    }

    /// Ids of the rules that fire on `log_text`.
    pub fn matching_rules(&self, log_text: &str) -> Vec<String> {
        self.rules
            .matching_rules(&normalize_quotes(log_text))
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

/// [`LogAnalyzer::find_missing_packages`] with the builtin rules.
pub fn find_missing_packages(log_text: &str) -> Vec<String> {
    BUILTIN.find_missing_packages(log_text)
}

/// [`LogAnalyzer::find_missing_fonts_and_packages`] with the builtin rules.
pub fn find_missing_fonts_and_packages(log_text: &str, dir: &Path) -> Vec<String> {
    BUILTIN.find_missing_fonts_and_packages(log_text, dir)
}

/// Reads `dir/missfont.log`, if present, and returns its candidates.
pub fn find_missing_fonts(dir: &Path) -> Vec<String> {
    match read_log(&dir.join(MISSING_FONT_LOG)) {
        Ok(text) => missing_fonts_in_log(&text),
        Err(_) => Vec::new(),
    }
}

/// Parses the contents of a `missfont.log`.
///
/// Each line looks like `mktextfm ecrm1000`: the trailing token is the font
/// and the leading token is the generator command. Both are candidates.
pub fn missing_fonts_in_log(text: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(font) = line.split_whitespace().last() {
            candidates.push(font.to_string());
        }
        if let Some(command) = line.split_whitespace().next() {
            candidates.push(command.to_string());
        }
    }
    uniq(candidates)
}

fn uniq(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
