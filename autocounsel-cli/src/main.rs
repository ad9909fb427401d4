//! autocounsel CLI
//!
//! Enters counseling records from a CSV file into the advising portal.
//!
//! Usage from workspace root:
//!   cargo run --bin autocounsel -- run --csv records.csv      # Log in, then submit every row
//!   cargo run --bin autocounsel -- run --csv records.csv --dry-run
//!   cargo run --bin autocounsel -- check --csv records.csv    # Validate and show field actions
//!   cargo run --bin autocounsel -- config                     # Print effective configuration

use anyhow::{Context, Result};
use autocounsel::{
    load_records, map_record, session, BatchRunner, FieldAction, PipelineError, PortalConfig,
    RecordRow, ScriptedDriver, Timeouts, UiDriver,
};
use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

mod display;
mod logging;

#[derive(Parser)]
#[command(name = "autocounsel")]
#[command(about = "Batch entry of counseling records into the advising portal")]
struct Cli {
    /// Portal configuration file (.yaml, .yml or .json)
    #[clap(long, global = true, env = "AUTOCOUNSEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Record CSV; prompted for when omitted
    #[clap(long)]
    csv: Option<PathBuf>,

    /// Where the batch report is written
    #[clap(long)]
    report_dir: Option<PathBuf>,

    /// Run against the simulated portal instead of a browser
    #[clap(long)]
    dry_run: bool,

    /// Close the browser right after the report instead of waiting for Enter
    #[clap(long)]
    no_pause: bool,

    /// Start the browser without a window
    #[clap(long)]
    headless: bool,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    #[clap(long)]
    csv: PathBuf,

    /// Print the result as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and submit every record in a CSV file
    Run(RunArgs),
    /// Validate a CSV file and show what would be entered, without a browser
    Check(CheckArgs),
    /// Print the effective configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _log_guard = logging::init_logging()?;

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Check(args) => check(&config, &args),
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PortalConfig> {
    match path {
        Some(path) => PortalConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(PortalConfig::default()),
    }
}

fn strip_quotes(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '"' || c == '\'')
}

/// Ask until an existing file is named.
fn prompt_for_csv() -> Result<PathBuf> {
    let stdin = io::stdin();
    loop {
        print!("Path to the record CSV: ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            anyhow::bail!("No CSV path given");
        }
        let candidate = PathBuf::from(strip_quotes(&line));
        if candidate.is_file() {
            return Ok(candidate);
        }
        println!("{} {}", "Not a file:".red(), candidate.display());
    }
}

enum BatchEnd {
    Finished(Result<(), PipelineError>),
    Interrupted,
}

const INTERRUPTED: u8 = 130;

/// `None` when `interrupt` fires before `work` completes.
async fn interruptible<T>(work: impl Future<Output = T>, interrupt: impl Future) -> Option<T> {
    tokio::select! {
        output = work => Some(output),
        _ = interrupt => None,
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
}

fn apply_run_flags(config: &mut PortalConfig, args: &RunArgs) {
    if args.headless {
        config.browser.headless = true;
    }
    if let Some(dir) = &args.report_dir {
        config.output.report_dir = dir.clone();
    }
    if args.dry_run {
        config.timeouts = Timeouts::fast();
    }
}

async fn run(mut config: PortalConfig, args: RunArgs) -> Result<ExitCode> {
    apply_run_flags(&mut config, &args);

    let csv = match args.csv.clone() {
        Some(path) => path,
        None => tokio::task::spawn_blocking(prompt_for_csv).await??,
    };
    let rows = load_records(&csv)
        .with_context(|| format!("Failed to load records from {}", csv.display()))?;
    let invalid = rows.iter().filter(|r| r.record.is_err()).count();
    println!(
        "Loaded {} records from {} ({} invalid)",
        rows.len(),
        csv.display(),
        invalid
    );

    let driver = open_driver(&config, args.dry_run).await?;
    let result = drive(driver.clone(), &config, &rows, &args).await;
    session::teardown(driver.as_ref()).await;
    result
}

async fn open_driver(config: &PortalConfig, dry_run: bool) -> Result<Arc<dyn UiDriver>> {
    if dry_run {
        info!("Dry run: using the simulated portal");
        return Ok(Arc::new(ScriptedDriver::new(&config.selectors)));
    }
    launch_browser(config).await
}

#[cfg(feature = "browser")]
async fn launch_browser(config: &PortalConfig) -> Result<Arc<dyn UiDriver>> {
    use autocounsel::{BrowserSettings, CdpDriver};
    let driver = CdpDriver::launch(BrowserSettings::from(&config.browser))
        .await
        .context("Failed to start the browser")?;
    Ok(Arc::new(driver))
}

#[cfg(not(feature = "browser"))]
async fn launch_browser(_config: &PortalConfig) -> Result<Arc<dyn UiDriver>> {
    anyhow::bail!("This build has no browser support; use --dry-run")
}

/// Everything between driver start and teardown.
async fn drive(
    driver: Arc<dyn UiDriver>,
    config: &PortalConfig,
    rows: &[RecordRow],
    args: &RunArgs,
) -> Result<ExitCode> {
    if args.dry_run {
        driver.navigate(&config.login_url).await?;
    } else {
        match interruptible(session::login(driver.clone(), config), ctrl_c()).await {
            Some(result) => result.context("Login failed")?,
            None => {
                warn!("Interrupted while waiting for login");
                println!("{}", "Interrupted.".yellow().bold());
                return Ok(ExitCode::from(INTERRUPTED));
            }
        }
    }

    let mut runner = BatchRunner::new(driver, config.clone());
    let end = match interruptible(runner.run(rows), ctrl_c()).await {
        Some(result) => BatchEnd::Finished(result),
        None => BatchEnd::Interrupted,
    };

    display::print_summary(runner.outcomes());
    let report = runner
        .outcomes()
        .write_report(&config.output.report_dir, chrono::Local::now())
        .context("Failed to write the batch report")?;
    println!("Report: {}", report.display());

    let code = match end {
        BatchEnd::Finished(Ok(())) => ExitCode::SUCCESS,
        BatchEnd::Finished(Err(e)) => {
            error!(error = %e, "Batch aborted");
            println!("{} {e}", "Batch aborted:".red().bold());
            ExitCode::FAILURE
        }
        BatchEnd::Interrupted => {
            warn!("Interrupted; report covers completed records only");
            println!("{}", "Interrupted.".yellow().bold());
            return Ok(ExitCode::from(INTERRUPTED));
        }
    };

    if !args.no_pause {
        let pause = session::wait_for_enter("Press Enter to close the browser...");
        if let Some(result) = interruptible(pause, ctrl_c()).await {
            result?;
        }
    }
    Ok(code)
}

#[derive(Serialize)]
struct RowCheck<'a> {
    index: usize,
    student_id: &'a str,
    student_name: &'a str,
    problem: Option<String>,
    actions: Vec<FieldAction>,
}

fn check(config: &PortalConfig, args: &CheckArgs) -> Result<ExitCode> {
    let rows = load_records(&args.csv)
        .with_context(|| format!("Failed to load records from {}", args.csv.display()))?;

    let checks: Vec<RowCheck> = rows
        .iter()
        .map(|row| RowCheck {
            index: row.index,
            student_id: &row.student_id,
            student_name: &row.student_name,
            problem: row.record.as_ref().err().map(ToString::to_string),
            actions: row
                .record
                .as_ref()
                .map(|record| map_record(record, &config.codes))
                .unwrap_or_default(),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&checks)?);
    } else {
        for (row, check) in rows.iter().zip(&checks) {
            display::print_row_check(row, Some(check.actions.as_slice()));
        }
        let invalid = checks.iter().filter(|c| c.problem.is_some()).count();
        println!();
        println!("{} rows, {} with problems", rows.len(), invalid);
    }

    if checks.iter().any(|c| c.problem.is_some()) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
