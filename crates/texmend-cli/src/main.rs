use anyhow::Context;
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use texmend_build::{BuildError, CompileOutcome, ConvergenceController};
use texmend_core::command::system_runner;
use texmend_log::{LogAnalyzer, RuleSet};

mod options;

#[derive(Parser, Debug)]
#[command(name = "texmend")]
#[command(version, about = "Compile a LaTeX document to PDF, installing missing packages on the way", long_about = None)]
pub struct Cli {
    /// The LaTeX document to compile
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Typesetting engine
    #[arg(long, default_value = "pdflatex")]
    pdf_engine: String,

    /// File with extra typesetting engine arguments, one per line
    #[arg(long, value_name = "FILE")]
    pdf_engine_opts_file: Option<PathBuf>,

    /// Index engine
    #[arg(long, default_value = "makeindex")]
    index_engine: String,

    /// File with extra index engine arguments, one per line
    #[arg(long, value_name = "FILE")]
    index_engine_opts_file: Option<PathBuf>,

    /// Bibliography engine: natbib runs bibtex, biblatex runs biber
    #[arg(long, default_value = "citeproc")]
    bib_engine: String,

    /// File with extra tlmgr arguments, one per line
    #[arg(long, value_name = "FILE")]
    tlmgr_opts_file: Option<PathBuf>,

    /// Do not install missing packages
    #[arg(long)]
    no_auto_install: bool,

    /// Typeset once, without the rerun loop
    #[arg(long)]
    no_rerun: bool,

    #[arg(long, default_value_t = 1)]
    min_runs: u32,

    #[arg(long, default_value_t = 10)]
    max_runs: u32,

    /// Directory for generated files, relative to the document
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Remove auxiliary files after a successful build
    #[arg(long)]
    clean: bool,

    /// Only print warnings and errors
    #[arg(long)]
    quiet: bool,

    /// Extra TeX search directory (repeatable)
    #[arg(long = "tex-input-dir", value_name = "DIR")]
    tex_input_dirs: Vec<PathBuf>,

    /// Ignore a TinyTeX installation and use the TeX distribution on PATH
    #[arg(long)]
    no_tinytex: bool,

    /// JSON file with additional missing-package rules
    #[arg(long, value_name = "FILE")]
    rules_file: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let request = options::build_request(&cli)?;
    let mut controller = ConvergenceController::detect(system_runner(), &request).await;
    if let Some(path) = &cli.rules_file {
        let mut rules = RuleSet::builtin();
        rules.extend(RuleSet::load(path).with_context(|| format!("loading rules from {}", path.display()))?);
        controller = controller.with_analyzer(LogAnalyzer::with_rules(&rules)?);
    }

    match cancellable(controller.generate_pdf(&request)).await {
        Ok(outcome) => {
            print_outcome(&outcome, &cli)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            report(&err, cli.json)?;
            Ok(exit_code(&err))
        }
    }
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_target(false)
        .format_timestamp(None)
        .init();
}

/// Runs the build until it finishes or the process is asked to stop.
///
/// Dropping the build future kills the engine that is currently running.
async fn cancellable<F>(build: F) -> Result<CompileOutcome, BuildError>
where
    F: Future<Output = Result<CompileOutcome, BuildError>>,
{
    tokio::select! {
        result = build => result,
        _ = shutdown_signal() => Err(BuildError::Cancelled),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => ctrl_c.await,
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

fn print_outcome(outcome: &CompileOutcome, cli: &Cli) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else if !cli.quiet {
        println!("Output created: {}", outcome.output.display());
    }
    Ok(())
}

fn report(err: &BuildError, json: bool) -> anyhow::Result<()> {
    if json {
        let value = serde_json::json!({
            "error": err.title(),
            "detail": err.detail(),
            "log": err.log_path(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    eprintln!("\ncompilation failed- {}", err.title());
    if let Some(detail) = err.detail() {
        eprintln!("{detail}");
    }
    if let Some(log) = err.log_path() {
        eprintln!("see {} for more information.", log.display());
    }
    Ok(())
}

fn exit_code(err: &BuildError) -> ExitCode {
    match err {
        BuildError::Cancelled => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}
