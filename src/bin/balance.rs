//! Balance CLI - Command-line interface for balance-entropy
//!
//! Commands:
//! - extract: Aggregate analysis logs into the snapshot and plot distributions
//! - group-diff, trial-level, within-block, group-within-block: analyses
//!   over the snapshot
//! - classify-verify, classify: sort raw trial files into per-condition folders
//! - doctor: Diagnose configuration and inputs

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use balance_entropy::analysis::{
    group_diff, group_within_block, load_snapshot, trial_level, within_block,
};
use balance_entropy::analysis::individual::IndividualReport;
use balance_entropy::classifier::{classify_plain, classify_verify, ClassifySummary};
use balance_entropy::config::{AnalysisConfig, ClassifierOptions};
use balance_entropy::pipeline::{extract, ExtractOutcome};
use balance_entropy::snapshot::read_snapshot;
use balance_entropy::{AnalysisError, PRODUCER_NAME, VERSION};

/// Balance - gait/balance entropy aggregation and group statistics
#[derive(Parser)]
#[command(name = "balance")]
#[command(author = "Balance Lab")]
#[command(version = VERSION)]
#[command(about = "Aggregate entropy logs and run group analyses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Load configuration from a JSON file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the snapshot, charts and reports
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Glob selecting the analysis logs
    #[arg(long, global = true)]
    pattern: Option<String>,

    /// Print the report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate logs, write the snapshot and plot individual distributions
    Extract,

    /// Old vs young comparison (Mann-Whitney U, Cohen's d)
    GroupDiff,

    /// Mixed model across the trial sequence (1-9)
    TrialLevel,

    /// Mixed model across trial positions within blocks (T01-T03)
    WithinBlock,

    /// Within-block analysis separately for each age group
    GroupWithinBlock,

    /// Classify trial files, copying only missing or corrupted destinations
    ClassifyVerify {
        /// Root directory, e.g. gait_young_full
        root: PathBuf,
    },

    /// Classify trial files, always copying
    Classify {
        /// Root directory, e.g. gait_young_full
        root: PathBuf,
    },

    /// Diagnose configuration and inputs
    Doctor,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: Cli) -> Result<(), BalanceCliError> {
    match &cli.command {
        Commands::Extract => cmd_extract(&build_config(&cli)?, cli.json),
        Commands::GroupDiff => cmd_group_diff(&build_config(&cli)?, cli.json),
        Commands::TrialLevel => cmd_trial_level(&build_config(&cli)?, cli.json),
        Commands::WithinBlock => cmd_within_block(&build_config(&cli)?, cli.json),
        Commands::GroupWithinBlock => cmd_group_within_block(&build_config(&cli)?, cli.json),
        Commands::ClassifyVerify { root } => cmd_classify(root, true, cli.json),
        Commands::Classify { root } => cmd_classify(root, false, cli.json),
        Commands::Doctor => cmd_doctor(&cli),
    }
}

/// Configuration file (or defaults) with command-line overrides applied
fn build_config(cli: &Cli) -> Result<AnalysisConfig, BalanceCliError> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(pattern) = &cli.pattern {
        config.log_pattern = pattern.clone();
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), BalanceCliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_extract(config: &AnalysisConfig, json: bool) -> Result<(), BalanceCliError> {
    let summary = match extract(config)? {
        ExtractOutcome::Empty { files_scanned } => ExtractSummary {
            files_scanned,
            records: 0,
            snapshot: None,
            individual: None,
        },
        ExtractOutcome::Extracted {
            snapshot,
            files_scanned,
            report,
        } => ExtractSummary {
            files_scanned,
            records: report.n_records,
            snapshot: Some(snapshot),
            individual: Some(report),
        },
    };

    if json {
        return print_json(&summary);
    }
    let (Some(snapshot), Some(report)) = (&summary.snapshot, &summary.individual) else {
        println!("No individual entropy entries found in logs");
        println!("No data to plot. Exiting.");
        return Ok(());
    };
    println!(
        "Extracted {} entries from {} log files",
        summary.records, summary.files_scanned
    );
    println!("Saved individual entries to {}", snapshot.display());
    for (group, n) in &report.group_counts {
        println!("  {group}: {n}");
    }
    if let Some(test) = &report.overall {
        println!("Overall ranksum (old vs young): p={:.4}", test.p_value);
    }
    for day in &report.by_day {
        match &day.test {
            Some(t) => println!("  {}: p={:.4}", day.day, t.p_value),
            None => println!("  {}: n/a (old={}, young={})", day.day, day.n_old, day.n_young),
        }
    }
    for chart in &report.charts {
        println!("Saved {}", chart.display());
    }
    Ok(())
}

fn cmd_group_diff(config: &AnalysisConfig, json: bool) -> Result<(), BalanceCliError> {
    let snapshot = load_snapshot(config)?;
    let report = group_diff::run(&snapshot, config)?;
    if json {
        return print_json(&report);
    }
    print!("{}", group_diff::render_text(&report));
    println!("\nSaved figure to: {}", report.chart.display());
    println!("Saved summary to: {}", report.summary.display());
    Ok(())
}

fn cmd_trial_level(config: &AnalysisConfig, json: bool) -> Result<(), BalanceCliError> {
    let snapshot = load_snapshot(config)?;
    let report = trial_level::run(&snapshot, config)?;
    if json {
        return print_json(&report);
    }
    print!("{}", trial_level::render_text(&report, config));
    println!("\nSaved figure to: {}", report.chart.display());
    println!("Saved results to: {}", report.results.display());
    Ok(())
}

fn cmd_within_block(config: &AnalysisConfig, json: bool) -> Result<(), BalanceCliError> {
    let snapshot = load_snapshot(config)?;
    let report = within_block::run(&snapshot, config)?;
    if json {
        return print_json(&report);
    }
    print!("{}", within_block::render_text(&report, config));
    println!("\nSaved figure to: {}", report.chart.display());
    println!("Saved results to: {}", report.results.display());
    Ok(())
}

fn cmd_group_within_block(config: &AnalysisConfig, json: bool) -> Result<(), BalanceCliError> {
    let snapshot = load_snapshot(config)?;
    let report = group_within_block::run(&snapshot, config)?;
    if json {
        return print_json(&report);
    }
    print!("{}", group_within_block::render_text(&report, config));
    println!("\nSaved figure to: {}", report.chart.display());
    println!("Saved results to: {}", report.results.display());
    Ok(())
}

fn progress_bar(json: bool) -> ProgressBar {
    if json || !atty::is(atty::Stream::Stderr) {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} files ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn cmd_classify(root: &Path, verify: bool, json: bool) -> Result<(), BalanceCliError> {
    let options = ClassifierOptions::new(root);
    let summary = if verify {
        classify_verify(&options, &progress_bar(json))?
    } else {
        classify_plain(&options)?
    };

    if json {
        return print_json(&summary);
    }
    print_classify_summary(&summary, &options, verify);
    Ok(())
}

fn print_classify_summary(summary: &ClassifySummary, options: &ClassifierOptions, verify: bool) {
    if summary.found == 0 {
        println!("No trial files found under {}", options.root.display());
        return;
    }
    if verify {
        println!(
            "Checked {} files: {} copied, {} repaired, {} unchanged",
            summary.found, summary.copied, summary.repaired, summary.unchanged
        );
    } else {
        println!("Done! total copied: {}", summary.copied);
    }
    println!("All classified under: {}", options.output_dir().display());
}

fn cmd_doctor(cli: &Cli) -> Result<(), BalanceCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{PRODUCER_NAME} version {VERSION}"),
    });

    let config = match build_config(cli) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: match &cli.config {
                    Some(path) => format!("Loaded {}", path.display()),
                    None => "Using defaults".to_string(),
                },
            });
            Some(config)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
            None
        }
    };

    if let Some(config) = &config {
        checks.push(check_logs(&config.log_pattern));
        checks.push(if config.output_dir.is_dir() {
            DoctorCheck {
                name: "output_dir".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} exists", config.output_dir.display()),
            }
        } else {
            DoctorCheck {
                name: "output_dir".to_string(),
                status: CheckStatus::Warning,
                message: format!("{} will be created", config.output_dir.display()),
            }
        });
        checks.push(check_snapshot(&config.snapshot_path()));
    }

    let stdout_check = if atty::is(atty::Stream::Stdout) {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a TTY (human-readable reports)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a pipe (consider --json)".to_string(),
        }
    };
    checks.push(stdout_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if cli.json {
        print_json(&report)?;
    } else {
        println!("Balance Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(BalanceCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_logs(pattern: &str) -> DoctorCheck {
    match glob::glob(pattern) {
        Ok(paths) => {
            let count = paths.filter_map(Result::ok).count();
            DoctorCheck {
                name: "logs".to_string(),
                status: if count > 0 {
                    CheckStatus::Ok
                } else {
                    CheckStatus::Warning
                },
                message: format!("{count} log files match {pattern}"),
            }
        }
        Err(e) => DoctorCheck {
            name: "logs".to_string(),
            status: CheckStatus::Error,
            message: format!("Invalid log pattern {pattern}: {e}"),
        },
    }
}

fn check_snapshot(path: &Path) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: "snapshot".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist (run 'balance extract')", path.display()),
        };
    }
    match read_snapshot(path) {
        Ok(records) => DoctorCheck {
            name: "snapshot".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} records in {}", records.len(), path.display()),
        },
        Err(e) => DoctorCheck {
            name: "snapshot".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read snapshot: {e}"),
        },
    }
}

// Error types

#[derive(Debug)]
enum BalanceCliError {
    Analysis(AnalysisError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<AnalysisError> for BalanceCliError {
    fn from(e: AnalysisError) -> Self {
        BalanceCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for BalanceCliError {
    fn from(e: serde_json::Error) -> Self {
        BalanceCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<BalanceCliError> for CliError {
    fn from(e: BalanceCliError) -> Self {
        match e {
            BalanceCliError::Analysis(e) => analysis_error(e),
            BalanceCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            BalanceCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

fn analysis_error(e: AnalysisError) -> CliError {
    let (code, hint) = match &e {
        AnalysisError::MissingInput(path) if path.extension().is_some_and(|ext| ext == "csv") => (
            "MISSING_INPUT",
            Some("Run 'balance extract' first to create the snapshot"),
        ),
        AnalysisError::MissingInput(_) => ("MISSING_INPUT", Some("Check the directory path")),
        AnalysisError::Io(_) | AnalysisError::Walk(_) => {
            ("IO_ERROR", Some("Check file paths and permissions"))
        }
        AnalysisError::Csv(_) => ("SNAPSHOT_ERROR", Some("Re-run 'balance extract'")),
        AnalysisError::Json(_) | AnalysisError::Config(_) => {
            ("CONFIG_ERROR", Some("Check the --config file"))
        }
        AnalysisError::Pattern(_) | AnalysisError::Glob(_) => {
            ("PATTERN_ERROR", Some("Check the --pattern glob"))
        }
        AnalysisError::InsufficientData(_) | AnalysisError::SingularMatrix(_) => {
            ("INSUFFICIENT_DATA", Some("Check that the snapshot covers both groups"))
        }
        AnalysisError::Chart(_) => ("CHART_ERROR", Some("Check the output directory")),
    };
    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: hint.map(str::to_string),
    }
}

// Report types

#[derive(Serialize)]
struct ExtractSummary {
    files_scanned: usize,
    records: usize,
    snapshot: Option<PathBuf>,
    individual: Option<IndividualReport>,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
