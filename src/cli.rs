//! Command-line entry point shared by every runner binary.
//!
//! A runner binary builds a [`Catalog`] of the source units it embeds and
//! hands it to [`main_with`]. The same binary doubles as its own worker:
//! when [`WORKER_ENV`](crate::orchestrator::WORKER_ENV) is set it runs the
//! single file it was given and prints the result message on stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::load_config_or_default;
use crate::framework::Catalog;
use crate::orchestrator::{
    Orchestrator, ProcessLauncher, is_worker, run_file_in_process, send_message,
};
use crate::report::{ConsoleReporter, NullConsumer, print_summary, write_junit};

#[derive(Parser, Debug)]
#[command(name = "suitest")]
#[command(about = "Suite-based test runner", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Files or glob patterns to run (defaults to the configured include patterns)
    pub patterns: Vec<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "suitest.toml")]
    pub config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the maximum number of concurrent workers
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Run only the test declared at this line (single file only)
    #[arg(long)]
    pub line: Option<u32>,

    /// JUnit XML output path
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Only discover source units, don't run them
    #[arg(long)]
    pub list: bool,
}

/// Parses the command line, runs and returns the process exit code.
pub fn main_with(catalog: Catalog) -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let catalog = Arc::new(catalog);
    let outcome = if is_worker() {
        runtime.block_on(run_worker(&cli, &catalog))
    } else {
        runtime.block_on(run(cli, catalog))
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; a worker's stdout carries only its result message.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run_worker(cli: &Cli, catalog: &Catalog) -> Result<ExitCode> {
    let [file] = cli.patterns.as_slice() else {
        bail!(
            "A worker runs exactly one file, got {}",
            cli.patterns.len()
        );
    };
    let config = load_config_or_default(&cli.config)?;
    debug!("Worker running {}", file);

    let results = run_file_in_process(
        catalog,
        Path::new(file),
        Arc::new(NullConsumer),
        config.suitest.default_timeout(),
        cli.line,
    )
    .await?;

    send_message(std::io::stdout().lock(), &results).context("Failed to send result message")?;
    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli, catalog: Arc<Catalog>) -> Result<ExitCode> {
    let mut config = load_config_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if let Some(jobs) = cli.jobs {
        config.suitest.max_workers = Some(jobs);
    }
    let report = config.report.clone();

    let mut launcher = ProcessLauncher::current().context("Failed to locate runner executable")?;
    if cli.config.exists() {
        info!("Loaded configuration from {}", cli.config.display());
        launcher = launcher.with_config(&cli.config);
    }

    let orchestrator = Orchestrator::new(config, catalog, launcher)
        .with_consumer(Arc::new(ConsoleReporter::new(cli.verbose)))
        .with_progress(!cli.verbose);

    let files = orchestrator.discover(&cli.patterns)?;
    if cli.list {
        println!("Discovered {} source units:", files.len());
        for file in &files {
            println!("  {}", file.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let summary = orchestrator.run(&files, cli.line).await?;
    print_summary(&summary);

    let junit = cli
        .junit
        .or_else(|| report.junit.then(|| report.junit_path()));
    if let Some(path) = junit {
        write_junit(&path, &summary.results, summary.duration)?;
    }

    Ok(if summary.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "suitest",
            "-c",
            "ci.toml",
            "--jobs",
            "3",
            "--line",
            "12",
            "--junit",
            "out/junit.xml",
            "demos/arithmetic.rs",
        ])
        .unwrap();

        assert_eq!(cli.patterns, vec!["demos/arithmetic.rs"]);
        assert_eq!(cli.config, PathBuf::from("ci.toml"));
        assert_eq!(cli.jobs, Some(3));
        assert_eq!(cli.line, Some(12));
        assert_eq!(cli.junit, Some(PathBuf::from("out/junit.xml")));
        assert!(!cli.list);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["suitest"]).unwrap();
        assert!(cli.patterns.is_empty());
        assert_eq!(cli.config, PathBuf::from("suitest.toml"));
        assert!(!cli.verbose);
        assert_eq!(cli.jobs, None);
    }
}
