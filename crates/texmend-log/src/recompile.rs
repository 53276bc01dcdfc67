use crate::read_log;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

// Explicit requests for another pass.
static EXPLICIT: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(Rerun to get |Please \(re\)run | Rerun LaTeX\.)").unwrap(),
        Regex::new(r"(?m)^No file .*?\.toc\.$").unwrap(),
    ]
});

/// A marker that is only settled by a later pass.
///
/// `unresolved` captures one value per occurrence; `resolved` builds, from
/// that (regex-escaped) value, the pattern of the line that settles it.
struct ResolvingRule {
    unresolved: Regex,
    resolved: fn(&str) -> String,
}

static RESOLVING: Lazy<Vec<ResolvingRule>> = Lazy::new(|| {
    vec![ResolvingRule {
        unresolved: Regex::new(
            r"(?m)^Package marginnote Info: xpos seems to be \\@mn@currxpos on input line (\d+)\.",
        )
        .unwrap(),
        resolved: |line| {
            format!(
                r"(?m)^Package marginnote Info: xpos seems to be -?[0-9.]+pt on input line {line}\."
            )
        },
    }]
});

/// Whether the log of a finished pass asks for another pass.
pub fn needs_recompilation(log_text: &str) -> bool {
    EXPLICIT.iter().any(|re| re.is_match(log_text))
        || RESOLVING.iter().any(|rule| has_unresolved(rule, log_text))
}

/// [`needs_recompilation`] over a log file. A missing log never asks for a rerun.
pub fn needs_recompilation_file(log: &Path) -> bool {
    match read_log(log) {
        Ok(text) => needs_recompilation(&text),
        Err(_) => false,
    }
}

fn has_unresolved(rule: &ResolvingRule, text: &str) -> bool {
    rule.unresolved
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .any(|value| {
            let pattern = (rule.resolved)(&regex::escape(value.as_str()));
            match Regex::new(&pattern) {
                Ok(resolved) => !resolved.is_match(text),
                Err(_) => true,
            }
        })
}
