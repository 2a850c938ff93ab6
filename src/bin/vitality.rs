//! Vitality CLI - Command-line interface for the Miya vitality engine
//!
//! Commands:
//! - score: Adapt and score a provider payload
//! - trends: Compute family trend insights from a trend request
//! - badges: Compute daily and weekly badges from a badge request
//! - benchmarks: Print or validate benchmark tables
//! - doctor: Diagnose configuration and benchmark health

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use miya_vitality::adapters::Provider;
use miya_vitality::benchmarks::{BenchmarkTable, ProgressMatrix};
use miya_vitality::config::VitalityConfig;
use miya_vitality::pipeline::{BadgeRequest, TrendRequest, VitalityProcessor};
use miya_vitality::types::RiskBand;
use miya_vitality::{VitalityError, ENGINE_NAME, VITALITY_VERSION};

/// Vitality - family wearable scoring and trend engine
#[derive(Parser)]
#[command(name = "vitality")]
#[command(author = "Miya Health")]
#[command(version = VITALITY_VERSION)]
#[command(about = "Score wearable data and compute family trends", long_about = None)]
struct Cli {
    /// Engine configuration JSON file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Adapt and score a provider payload
    Score {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Payload provider
        #[arg(long, default_value = "summary")]
        provider: ProviderArg,

        /// Member age in years
        #[arg(long)]
        age: u32,

        /// Risk band for the progress score
        #[arg(long)]
        risk: Option<RiskArg>,

        /// Custom benchmark table JSON file
        #[arg(long)]
        benchmarks: Option<PathBuf>,

        /// Custom progress matrix JSON file (requires --benchmarks)
        #[arg(long, requires = "benchmarks")]
        progress_matrix: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Compute family trend insights
    Trends {
        /// Trend request JSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Compute daily and weekly badges
    Badges {
        /// Badge request JSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Print the built-in benchmark table, or validate a custom one
    Benchmarks {
        /// Benchmark table JSON file to validate instead of printing
        #[arg(long)]
        validate: Option<PathBuf>,

        /// Print the progress matrix instead of the benchmark table
        #[arg(long)]
        progress: bool,
    },

    /// Diagnose configuration and benchmark health
    Doctor {
        /// Benchmark table JSON file to check
        #[arg(long)]
        benchmarks: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    /// Single-day or array summary JSON
    Summary,
    /// WHOOP API export
    Whoop,
    /// Garmin Health API export
    Garmin,
    /// Daily CSV (Apple Health export)
    Csv,
}

impl From<ProviderArg> for Provider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Summary => Provider::Summary,
            ProviderArg::Whoop => Provider::Whoop,
            ProviderArg::Garmin => Provider::Garmin,
            ProviderArg::Csv => Provider::Csv,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RiskArg {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl From<RiskArg> for RiskBand {
    fn from(arg: RiskArg) -> Self {
        match arg {
            RiskArg::Low => RiskBand::Low,
            RiskArg::Moderate => RiskBand::Moderate,
            RiskArg::High => RiskBand::High,
            RiskArg::VeryHigh => RiskBand::VeryHigh,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), VitalityCliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Score {
            input,
            output,
            provider,
            age,
            risk,
            benchmarks,
            progress_matrix,
            output_format,
        } => {
            let mut processor = load_processor(config_path)?;
            if let Some(path) = benchmarks.as_deref() {
                let table = BenchmarkTable::from_json(&fs::read_to_string(path)?)?;
                let matrix = match progress_matrix.as_deref() {
                    Some(path) => ProgressMatrix::from_json(&fs::read_to_string(path)?)?,
                    None => ProgressMatrix::builtin(),
                };
                processor = processor.with_benchmarks(table, matrix);
            }

            let raw = read_input(&input)?;
            if raw.trim().is_empty() {
                return Err(VitalityCliError::EmptyInput);
            }
            let days =
                processor.process_provider(provider.into(), &raw, age, risk.map(RiskBand::from))?;
            info!(days = days.len(), "scored payload");
            write_output(&output, &format_output(&days, &output_format)?)
        }

        Commands::Trends {
            input,
            output,
            output_format,
        } => {
            let processor = load_processor(config_path)?;
            let request: TrendRequest = serde_json::from_str(&read_input(&input)?)?;
            let response = processor.compute_trends(&request);
            write_output(
                &output,
                &format_output(std::slice::from_ref(&response), &output_format)?,
            )
        }

        Commands::Badges {
            input,
            output,
            output_format,
        } => {
            let processor = load_processor(config_path)?;
            let request: BadgeRequest = serde_json::from_str(&read_input(&input)?)?;
            let response = processor.compute_badges(&request);
            write_output(
                &output,
                &format_output(std::slice::from_ref(&response), &output_format)?,
            )
        }

        Commands::Benchmarks { validate, progress } => cmd_benchmarks(validate.as_deref(), progress),

        Commands::Doctor { benchmarks, json } => {
            cmd_doctor(config_path, benchmarks.as_deref(), json)
        }
    }
}

fn load_processor(config: Option<&Path>) -> Result<VitalityProcessor, VitalityCliError> {
    match config {
        Some(path) => {
            let config = VitalityConfig::from_json(&fs::read_to_string(path)?)?;
            Ok(VitalityProcessor::with_config(config)?)
        }
        None => Ok(VitalityProcessor::new()),
    }
}

fn cmd_benchmarks(validate: Option<&Path>, progress: bool) -> Result<(), VitalityCliError> {
    match validate {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            if progress {
                let matrix = ProgressMatrix::from_json(&content)?;
                println!("Progress matrix valid ({} cells)", matrix.cells.len());
            } else {
                let table = BenchmarkTable::from_json(&content)?;
                println!("Benchmark table valid ({} rows)", table.benchmarks.len());
            }
        }
        None => {
            if progress {
                println!("{}", serde_json::to_string_pretty(&ProgressMatrix::builtin())?);
            } else {
                println!("{}", BenchmarkTable::builtin().to_json()?);
            }
        }
    }
    Ok(())
}

fn cmd_doctor(
    config: Option<&Path>,
    benchmarks: Option<&Path>,
    json: bool,
) -> Result<(), VitalityCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", ENGINE_NAME, VITALITY_VERSION),
    });

    let builtin = BenchmarkTable::builtin();
    checks.push(match builtin.validate() {
        Ok(()) => DoctorCheck {
            name: "builtin_benchmarks".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} benchmark rows", builtin.benchmarks.len()),
        },
        Err(e) => DoctorCheck {
            name: "builtin_benchmarks".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    if let Some(path) = config {
        checks.push(file_check("config", path, |content| {
            VitalityConfig::from_json(content).map(|c| {
                format!(
                    "Config valid (trend window {} days, minimum {} days)",
                    c.trends.window_days, c.trends.min_days
                )
            })
        }));
    }

    if let Some(path) = benchmarks {
        checks.push(file_check("benchmarks", path, |content| {
            BenchmarkTable::from_json(content)
                .map(|t| format!("Benchmark table valid ({} rows)", t.benchmarks.len()))
        }));
    }

    let report = DoctorReport {
        engine: ENGINE_NAME.to_string(),
        version: VITALITY_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Vitality Doctor Report");
        println!("======================");
        println!("Engine:  {}", report.engine);
        println!("Version: {}", report.version);
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(VitalityCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

/// Check that a file exists and passes `validate`
fn file_check<F>(name: &str, path: &Path, validate: F) -> DoctorCheck
where
    F: Fn(&str) -> Result<String, VitalityError>,
{
    if !path.exists() {
        return DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist", path.display()),
        };
    }
    let (status, message) = match fs::read_to_string(path) {
        Ok(content) => match validate(&content) {
            Ok(message) => (CheckStatus::Ok, message),
            Err(e) => (CheckStatus::Error, e.to_string()),
        },
        Err(e) => (CheckStatus::Error, format!("Cannot read file: {}", e)),
    };
    DoctorCheck {
        name: name.to_string(),
        status,
        message,
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, VitalityCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), VitalityCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_output<T: Serialize>(records: &[T], format: &OutputFormat) -> Result<String, VitalityCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::with_capacity(records.len());
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(single_or_array(records, false)?),
        OutputFormat::JsonPretty => Ok(single_or_array(records, true)?),
    }
}

/// A single record is written bare, several as an array
fn single_or_array<T: Serialize>(records: &[T], pretty: bool) -> Result<String, serde_json::Error> {
    match (records, pretty) {
        ([single], false) => serde_json::to_string(single),
        ([single], true) => serde_json::to_string_pretty(single),
        (_, false) => serde_json::to_string(records),
        (_, true) => serde_json::to_string_pretty(records),
    }
}

// Error types

#[derive(Debug)]
enum VitalityCliError {
    Io(io::Error),
    Engine(VitalityError),
    Json(serde_json::Error),
    EmptyInput,
    DoctorFailed,
}

impl From<io::Error> for VitalityCliError {
    fn from(e: io::Error) -> Self {
        VitalityCliError::Io(e)
    }
}

impl From<VitalityError> for VitalityCliError {
    fn from(e: VitalityError) -> Self {
        VitalityCliError::Engine(e)
    }
}

impl From<serde_json::Error> for VitalityCliError {
    fn from(e: serde_json::Error) -> Self {
        VitalityCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl From<VitalityCliError> for CliError {
    fn from(e: VitalityCliError) -> Self {
        match e {
            VitalityCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            VitalityCliError::Engine(e) => {
                let hint = match &e {
                    VitalityError::InvalidConfig(_) => "Run 'vitality doctor --config <file>'",
                    VitalityError::InvalidBenchmark(_) => "Run 'vitality benchmarks --validate <file>'",
                    VitalityError::UnsupportedProvider(_) => "Use summary, whoop, garmin or csv",
                    VitalityError::CsvError(_) => "Expected header: date,sleep_hours,steps,hrv_ms,resting_hr",
                    _ => "Check input format",
                };
                CliError {
                    code: "ENGINE_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            VitalityCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            VitalityCliError::EmptyInput => CliError {
                code: "EMPTY_INPUT".to_string(),
                message: "Input is empty".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            VitalityCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    engine: String,
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
