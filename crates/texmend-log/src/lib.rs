//! # texmend Log Analysis
//!
//! Heuristics that turn the unstructured output of TeX engines, index
//! engines and bibliography engines into decisions the build pipeline can act on.
//!
//! ## Overview
//!
//! Every function in this crate is pure over text (or over a log file read
//! from disk). Nothing here spawns processes or keeps state between calls.
//! The crate answers five questions:
//!
//! - **Is another pass needed?** [`needs_recompilation`] looks for explicit
//!   "please rerun" requests and for markers that are only resolved by a later pass.
//! - **What went wrong?** [`find_latex_error`] extracts the fatal `!` block
//!   and attaches a one-line hint; [`find_index_error`] does the same for `.ilg` logs.
//! - **Which packages are missing?** [`LogAnalyzer::find_missing_packages`]
//!   runs an ordered, data-driven [`RuleSet`] over the log.
//! - **Which fonts are missing?** [`find_missing_fonts`] reads `missfont.log`.
//! - **Which hyphenation patterns are missing?** [`find_missing_hyphenation_files`].
//!
//! ## Rule tables
//!
//! Missing-package detection is driven by [`RuleSet`], an ordered list of
//! `{pattern, extractor}` records evaluated by a single scanner. The builtin
//! table is versioned ([`RULES_VERSION`]) and can be extended from JSON:
//!
//! ```
//! use texmend_log::{LogAnalyzer, RuleSet};
//!
//! let mut rules = RuleSet::builtin();
//! rules.extend(RuleSet::from_json(r#"{
//!     "version": 1,
//!     "rules": [{ "id": "custom", "pattern": "Missing widget ([a-z]+)", "extract": { "kind": "append_sty" } }]
//! }"#).unwrap());
//!
//! let analyzer = LogAnalyzer::with_rules(&rules).unwrap();
//! assert_eq!(analyzer.find_missing_packages("Missing widget gizmo"), vec!["gizmo.sty"]);
//! ```
//!
//! ## Quote handling
//!
//! TeX logs mix straight and typographic quotes depending on engine and
//! locale. All entry points normalise `‘ ’ ´ “ ”` to their ASCII
//! counterparts before matching, so rules only need to be written once.

mod analyzer;
mod errors;
mod hyphenation;
mod recompile;
/// Rule records and the generic scanner.
pub mod rules;

#[cfg(test)]
mod tests;

use std::borrow::Cow;
use std::path::Path;

pub use analyzer::{
    LogAnalyzer, find_missing_fonts, find_missing_fonts_and_packages, find_missing_packages,
    missing_fonts_in_log,
};
pub use errors::{
    contains_biblio_data, find_bib_style_file, find_index_error, find_latex_error,
    needs_tool_update, suggest_hint,
};
pub use hyphenation::find_missing_hyphenation_files;
pub use recompile::{needs_recompilation, needs_recompilation_file};
pub use rules::{Extractor, PackageRule, RULES_VERSION, RuleError, RuleSet};

/// The log the font generator writes when it cannot produce a font.
pub const MISSING_FONT_LOG: &str = "missfont.log";

/// Reads a log file, replacing any invalid UTF-8 (TeX logs are often Latin-1).
pub fn read_log(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Maps typographic quotes to ASCII so one pattern matches both styles.
pub(crate) fn normalize_quotes(text: &str) -> Cow<'_, str> {
    const CURLY: [char; 5] = ['\u{2018}', '\u{2019}', '\u{00B4}', '\u{201C}', '\u{201D}'];
    if !text.contains(CURLY) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| match c {
                '\u{2018}' => '`',
                '\u{2019}' | '\u{00B4}' => '\'',
                '\u{201C}' | '\u{201D}' => '"',
                other => other,
            })
            .collect(),
    )
}
