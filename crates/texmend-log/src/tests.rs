use crate::*;

#[test]
fn test_missing_sty_file() {
    let log = r#"
(/usr/local/texlive/2023/texmf-dist/tex/latex/base/article.cls
Document Class: article 2023/05/17 v1.4n Standard LaTeX document class
)

! LaTeX Error: File `framed.sty' not found.

Type X to quit or <RETURN> to proceed,
or enter new name. (Default extension: sty)
"#;
    assert_eq!(find_missing_packages(log), vec!["framed.sty"]);
}

#[test]
fn test_missing_sty_file_with_curly_quotes() {
    let log = "! LaTeX Error: File \u{2018}framed.sty\u{2019} not found.";
    assert_eq!(find_missing_packages(log), vec!["framed.sty"]);
}

#[test]
fn test_font_not_loadable() {
    let log = "! Font \\T1/cmr/m/n/10=ecrm1000 at 10.0pt not loadable: Metric (TFM) file not found.";
    assert_eq!(
        find_missing_packages(log),
        vec!["ecrm1000(-(Bold|Italic|Regular).*)?[.](tfm|afm|mf|otf|ttf)"]
    );
}

#[test]
fn test_fontspec_font_cannot_be_found() {
    let log = r#"! Package fontspec Error: The font "Inconsolata" cannot be found."#;
    assert_eq!(
        find_missing_packages(log),
        vec!["Inconsolata(-(Bold|Italic|Regular).*)?[.](tfm|afm|mf|otf|ttf)"]
    );
}

#[test]
fn test_widetext_appends_sty() {
    let log = "! Package widetext error: Install the cuted package which is used by widetext.";
    assert_eq!(find_missing_packages(log), vec!["cuted.sty"]);
}

#[test]
fn test_eps_conversion_needs_epstopdf() {
    let log = "! LaTeX Error: File `figure-eps-converted-to.pdf' not found.";
    let found = find_missing_packages(log);
    assert_eq!(found[0], "epstopdf");
    assert!(found.contains(&"figure-eps-converted-to.pdf".to_string()));
}

#[test]
fn test_lua_module_maps_to_fixed_package() {
    let log = "...texmf-dist/tex/luatex/unicode-math/unicode-math.lua:12: module 'lua-uni-normalize' not found:";
    assert_eq!(find_missing_packages(log), vec!["lua-uni-algos"]);
}

#[test]
fn test_command_not_found() {
    let log = "sh: 1: epstopdf: command not found";
    assert_eq!(find_missing_packages(log), vec!["epstopdf"]);
}

#[test]
fn test_font_definition_lowercased() {
    let log = "LaTeX Font Warning: Font shape `T1/LMR/m/n' undefined\nNo file T1LMR.fd.";
    assert_eq!(find_missing_packages(log), vec!["t1lmr.fd"]);
}

#[test]
fn test_results_are_deduplicated_in_order() {
    let log = "! LaTeX Error: File `framed.sty' not found.\n\
               ! LaTeX Error: File `xcolor.sty' not found.\n\
               ! LaTeX Error: File `framed.sty' not found.\n";
    assert_eq!(find_missing_packages(log), vec!["framed.sty", "xcolor.sty"]);
}

#[test]
fn test_repeated_scans_are_stable() {
    let log = "! LaTeX Error: File `framed.sty' not found.";
    let first = find_missing_packages(log);
    let second = find_missing_packages(log);
    assert_eq!(first, second);
}

#[test]
fn test_clean_log_has_no_packages() {
    let log = "Output written on doc.pdf (1 page, 12000 bytes).";
    assert!(find_missing_packages(log).is_empty());
}

#[test]
fn test_matching_rules_reports_ids() {
    let analyzer = LogAnalyzer::new();
    let ids = analyzer.matching_rules("! LaTeX Error: File `framed.sty' not found.");
    assert_eq!(ids, vec!["latex_file_not_found"]);
}

#[test]
fn test_find_latex_error_block() {
    let log = r#"
! Undefined control sequence.
l.10 \unknowncommand

Here is how much of TeX's memory you used:
"#;
    let error = find_latex_error(log, None).unwrap();
    assert!(error.starts_with("Undefined control sequence."));
    assert!(error.contains("l.10 \\unknowncommand"));
    assert!(!error.contains("Here is how much"));
}

#[test]
fn test_find_latex_error_no_output() {
    let log = "No pages of output.\nTranscript written on doc.log.";
    assert_eq!(find_latex_error(log, None), Some("No pages of output".to_string()));
}

#[test]
fn test_find_latex_error_none() {
    assert_eq!(find_latex_error("Output written on doc.pdf", None), None);
}

#[test]
fn test_log_hint_is_attached() {
    let log = "! Missing $ inserted.\n<inserted text>\nHere is how much of TeX's memory you used:";
    let error = find_latex_error(log, None).unwrap();
    assert!(error.ends_with("You may need to $ $ around an expression in this file."));
}

#[test]
fn test_stderr_hint_wins_over_log_hint() {
    let log = "! Missing $ inserted.\nHere is how much";
    let stderr = "!!! Error: Cannot open Ghostscript for piped input";
    assert!(
        suggest_hint(log, Some(stderr))
            .unwrap()
            .starts_with("GhostScript is likely required")
    );
}

#[test]
fn test_index_error() {
    let ilg = "Scanning input file doc.idx...\n   -- Extra `!' at position 13 of first argument.\n";
    assert_eq!(
        find_index_error(ilg),
        Some("Extra `!' at position 13 of first argument.".to_string())
    );
    assert_eq!(find_index_error("Generating output file doc.ind....done"), None);
}

#[test]
fn test_tool_update_signature() {
    let log = "(/usr/share/texmf/tex/luatex/luaotfload.lua) Loading 'luaotfload-main' aborted!";
    assert_eq!(needs_tool_update(log), Some("luaotfload-main".to_string()));
    assert_eq!(needs_tool_update("Output written"), None);
}

#[test]
fn test_bib_style_file() {
    let blg = "The style file: plainnat.bst\nI couldn't open style file plainnat.bst\n";
    assert_eq!(find_bib_style_file(blg), Some("plainnat.bst".to_string()));
}

#[test]
fn test_contains_biblio_data() {
    assert!(contains_biblio_data("\\relax\n\\citation{knuth84}\n"));
    assert!(contains_biblio_data("\\bibdata{refs}\n"));
    assert!(!contains_biblio_data("\\relax\n\\@writefile{toc}{}\n"));
}

#[test]
fn test_each_builtin_rule_on_its_log_line() {
    let cases: &[(&str, &str, &[&str])] = &[
        (
            "font_file_error",
            "!pdfTeX error: pdflatex (file ptmr8r): Font ptmr8r at 600 not found",
            &["ptmr8r(-(Bold|Italic|Regular).*)?[.](tfm|afm|mf|otf|ttf)"],
        ),
        (
            "tfm_not_found",
            r#"xdvipdfmx:fatal: Unable to find TFM file "rsfs10"."#,
            &["rsfs10(-(Bold|Italic|Regular).*)?[.](tfm|afm|mf|otf|ttf)"],
        ),
        (
            "xdvipdfmx_ref",
            "xdvipdfmx:fatal: pdf_ref_obj(): passed invalid object.",
            &["epstopdf"],
        ),
        (
            "language_definition",
            "(babel)                or the language definition file ngerman.ldf was not found.",
            &["ngerman.ldf"],
        ),
        (
            "cannot_open",
            "mktexpk: (file pzdr.pfb): cannot open font file.",
            &["pzdr.pfb"],
        ),
        ("file_is_missing", "The file `ulem.sty' is missing.", &["ulem.sty"]),
        (
            "ctex_fontset",
            "! CTeX fontset `fandol' is unavailable in current mode.",
            &["fandol"],
        ),
        ("cant_find_file", "! I can't find file `mybook.cls'.", &["mybook.cls"]),
        (
            "fontenc_encoding",
            "! Package fontenc Error: Encoding file `t2aenc.def' not found.",
            &["t2aenc.def"],
        ),
    ];

    let analyzer = LogAnalyzer::new();
    for (id, line, expected) in cases {
        assert!(
            analyzer.matching_rules(line).iter().any(|m| m == id),
            "rule {id} did not fire on {line:?}"
        );
        assert_eq!(find_missing_packages(line), *expected, "unexpected terms for rule {id}");
    }
}

#[test]
fn test_cannot_open_requires_file_marker() {
    assert!(find_missing_packages("kpathsea: cannot open pzdr.pfb").is_empty());
}
