use std::path::Path;
use texmend_log::{
    find_latex_error, find_missing_packages, needs_recompilation, needs_recompilation_file, read_log,
};

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    read_log(&path).unwrap_or_else(|e| panic!("failed to read fixture {name}: {e}"))
}

#[test]
fn test_missing_package_fixtures() {
    let cases: &[(&str, &[&str])] = &[
        ("missing_sty.log", &["framed.sty"]),
        (
            "missing_font.log",
            &["Inconsolata(-(Bold|Italic|Regular).*)?[.](tfm|afm|mf|otf|ttf)"],
        ),
        ("tikz_library.log", &["tikzlibrarycd.code.tex"]),
        ("clean.log", &[]),
        ("rerun.log", &[]),
    ];

    for (name, expected) in cases {
        let found = find_missing_packages(&fixture(name));
        assert_eq!(found, *expected, "unexpected packages for {name}");
    }
}

#[test]
fn test_rerun_fixtures() {
    assert!(needs_recompilation(&fixture("rerun.log")));
    assert!(!needs_recompilation(&fixture("clean.log")));
    assert!(!needs_recompilation(&fixture("missing_sty.log")));

    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/rerun.log");
    assert!(needs_recompilation_file(&path));
}

#[test]
fn test_error_extraction_fixtures() {
    let error = find_latex_error(&fixture("missing_sty.log"), None).unwrap();
    assert!(error.starts_with("LaTeX Error: File `framed.sty' not found."));

    let error = find_latex_error(&fixture("missing_font.log"), None).unwrap();
    assert!(error.contains("The font \"Inconsolata\" cannot be found."));

    assert_eq!(find_latex_error(&fixture("clean.log"), None), None);
}
