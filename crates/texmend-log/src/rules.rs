use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Version of the rule table format understood by this crate.
///
/// Rule files declaring a newer version are rejected rather than half-applied.
pub const RULES_VERSION: u32 = 1;

/// Errors raised while loading or compiling a [`RuleSet`].
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule '{id}' has an invalid pattern: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule file version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("failed to read rule file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse rule file: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a rule turns its captured text into a package search term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Extractor {
    /// Use the first capture group verbatim.
    #[default]
    Capture,
    /// Append `.sty` to the capture.
    AppendSty,
    /// Turn a font path into a pattern matching its metric/outline files.
    FontSearch,
    /// Lowercase the capture.
    Lowercase,
    /// Ignore the capture and always yield this package.
    Fixed(String),
    /// Use the capture only if the whole log also matches this pattern.
    CaptureIf(String),
}

/// One `{pattern, extractor}` record of the missing-package table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRule {
    /// Stable identifier, used in error messages and tests.
    pub id: String,
    /// Regular expression applied to the whole log. Group 1, if present, is the capture.
    pub pattern: String,
    #[serde(default)]
    pub extract: Extractor,
}

impl PackageRule {
    pub fn new(id: &str, pattern: &str, extract: Extractor) -> Self {
        Self {
            id: id.to_string(),
            pattern: pattern.to_string(),
            extract,
        }
    }
}

/// An ordered, versioned table of [`PackageRule`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: u32,
    pub rules: Vec<PackageRule>,
}

impl RuleSet {
    /// The rules shipped with texmend, in evaluation order.
    pub fn builtin() -> Self {
        use Extractor::*;
        let rules = vec![
            // Fonts
            PackageRule::new("font_not_loadable", r"! Font [^=]+=([^ ]+).+ not loadable", FontSearch),
            PackageRule::new("font_cannot_be_found", r#"! .*The font "([^"]+)" cannot be found"#, FontSearch),
            PackageRule::new("font_file_error", r"!.+ error:.+\(file ([^)]+)\): ", FontSearch),
            PackageRule::new("widetext", r"Package widetext error: Install the ([^ ]+) package", AppendSty),
            PackageRule::new("tfm_not_found", r#"Unable to find TFM file "([^"]+)""#, FontSearch),
            // Converters
            PackageRule::new("eps_converted", r"File `(.+eps-converted-to\.pdf)'", Fixed("epstopdf".into())),
            PackageRule::new("xdvipdfmx_ref", r"xdvipdfmx:fatal: pdf_ref_obj", Fixed("epstopdf".into())),
            PackageRule::new(
                "tikz_library",
                r" (tikzlibrary[^ ]+?\.code\.tex)",
                CaptureIf(r"! Package tikz Error:".into()),
            ),
            // Files
            PackageRule::new("latex_file_not_found", r"! LaTeX Error: File `([^']+)' not found", Capture),
            PackageRule::new("file_not_found", r" file ['`]?([^' ]+)'? not found", Capture),
            PackageRule::new("language_definition", r"the language definition file ([^ ]+) ", Capture),
            PackageRule::new("cannot_open", r" \(file ([^)]+)\): cannot open ", Capture),
            PackageRule::new("file_is_missing", r"file `([^']+)' .*is missing", Capture),
            PackageRule::new("ctex_fontset", r"! CTeX fontset `([^']+)' is unavailable", Capture),
            PackageRule::new("command_not_found", r": ([^:]+): command not found", Capture),
            PackageRule::new("cant_find_file", r"! I can't find file `([^']+)'", Capture),
            PackageRule::new(
                "fontenc_encoding",
                r"! Package fontenc Error: Encoding file `([^']+)' not found",
                Capture,
            ),
            PackageRule::new("font_definition", r"No file ([^`'. ]+\.fd)\.", Lowercase),
            // Lua modules
            PackageRule::new(
                "lua_uni_normalize",
                r"module 'lua-uni-normalize' not found",
                Fixed("lua-uni-algos".into()),
            ),
        ];
        Self {
            version: RULES_VERSION,
            rules,
        }
    }

    /// Parses a rule table from JSON.
    pub fn from_json(text: &str) -> Result<Self, RuleError> {
        let set: RuleSet = serde_json::from_str(text)?;
        if set.version > RULES_VERSION {
            return Err(RuleError::UnsupportedVersion {
                found: set.version,
                supported: RULES_VERSION,
            });
        }
        Ok(set)
    }

    /// Reads a JSON rule table from disk.
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Appends the rules of `other` after the current ones.
    pub fn extend(&mut self, other: RuleSet) {
        self.rules.extend(other.rules);
    }

    pub fn compile(&self) -> Result<CompiledRules, RuleError> {
        let rules = self
            .rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledRules { rules })
    }
}

#[derive(Debug, Clone)]
enum CompiledExtractor {
    Capture,
    AppendSty,
    FontSearch,
    Lowercase,
    Fixed(String),
    CaptureIf(Regex),
}

#[derive(Debug, Clone)]
struct CompiledRule {
    id: String,
    regex: Regex,
    extract: CompiledExtractor,
}

impl CompiledRule {
    fn compile(rule: &PackageRule) -> Result<Self, RuleError> {
        let build = |pattern: &str| {
            Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
                id: rule.id.clone(),
                source,
            })
        };
        let extract = match &rule.extract {
            Extractor::Capture => CompiledExtractor::Capture,
            Extractor::AppendSty => CompiledExtractor::AppendSty,
            Extractor::FontSearch => CompiledExtractor::FontSearch,
            Extractor::Lowercase => CompiledExtractor::Lowercase,
            Extractor::Fixed(name) => CompiledExtractor::Fixed(name.clone()),
            Extractor::CaptureIf(pattern) => CompiledExtractor::CaptureIf(build(pattern)?),
        };
        Ok(Self {
            id: rule.id.clone(),
            regex: build(&rule.pattern)?,
            extract,
        })
    }

    fn apply(&self, capture: Option<&str>, text: &str) -> Option<String> {
        let capture = capture.filter(|c| !c.is_empty());
        match &self.extract {
            CompiledExtractor::Capture => capture.map(str::to_string),
            CompiledExtractor::AppendSty => capture.map(|c| format!("{c}.sty")),
            CompiledExtractor::FontSearch => capture.map(font_search_term),
            CompiledExtractor::Lowercase => capture.map(str::to_lowercase),
            CompiledExtractor::Fixed(name) => Some(name.clone()),
            CompiledExtractor::CaptureIf(guard) => {
                if guard.is_match(text) {
                    capture.map(str::to_string)
                } else {
                    None
                }
            }
        }
    }
}

/// A [`RuleSet`] with every pattern compiled, ready to scan logs.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    rules: Vec<CompiledRule>,
}

impl CompiledRules {
    /// Runs every rule, in order, over `text` and returns the deduplicated
    /// search terms in first-seen order.
    pub fn scan(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for rule in &self.rules {
            for caps in rule.regex.captures_iter(text) {
                let capture = caps.get(1).map(|m| m.as_str());
                if let Some(term) = rule.apply(capture, text) {
                    if seen.insert(term.clone()) {
                        terms.push(term);
                    }
                }
            }
        }
        terms
    }

    /// Returns the ids of the rules that match `text` at least once.
    pub fn matching_rules(&self, text: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.regex.is_match(text))
            .map(|r| r.id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Builds the package-index search pattern for a font.
///
/// The font may be given as a path; only its file name is used.
pub fn font_search_term(font: &str) -> String {
    let base = Path::new(font)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| font.to_string());
    format!("{base}(-(Bold|Italic|Regular).*)?[.](tfm|afm|mf|otf|ttf)")
}
