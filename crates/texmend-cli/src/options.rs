use crate::Cli;
use anyhow::{Context, Result};
use std::path::Path;
use texmend_build::{CompileRequest, EngineDescriptor};

/// Reads an extra-options file: one argument per line, blank lines skipped.
/// A missing file yields no arguments.
pub fn read_options_file(path: &Path) -> Result<Vec<String>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("reading options file {}", path.display())),
    };
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn opts(path: Option<&Path>) -> Result<Vec<String>> {
    path.map_or_else(|| Ok(Vec::new()), read_options_file)
}

/// Turns the parsed command line into a compile request.
pub fn build_request(cli: &Cli) -> Result<CompileRequest> {
    let engine = EngineDescriptor::new(&cli.pdf_engine)
        .with_pdf_engine_opts(opts(cli.pdf_engine_opts_file.as_deref())?)
        .with_index_engine(&cli.index_engine, opts(cli.index_engine_opts_file.as_deref())?)
        .with_bib_engine(&cli.bib_engine)
        .with_tlmgr_opts(opts(cli.tlmgr_opts_file.as_deref())?);

    let max_runs = if cli.no_rerun { 1 } else { cli.max_runs };
    let mut request = CompileRequest::new(&cli.input)
        .with_engine(engine)
        .with_runs(cli.min_runs, max_runs)
        .with_auto_install(!cli.no_auto_install)
        .with_clean(cli.clean)
        .with_quiet(cli.quiet)
        .with_tex_input_dirs(cli.tex_input_dirs.clone());
    request.prefer_tinytex = !cli.no_tinytex;
    if let Some(dir) = &cli.output_dir {
        request = request.with_output_dir(dir);
    }
    Ok(request)
}
