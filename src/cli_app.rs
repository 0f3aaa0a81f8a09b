//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use asr_harness::core::config::Config;
use asr_harness::core::errors::AsrhError;
use asr_harness::harness::cancel::CancelToken;
use asr_harness::harness::experiment::LatencyExperiment;
use asr_harness::harness::scenario::timed_call;
use asr_harness::logger::activity::{ActivityEvent, ActivityLogConfig, spawn_logger};
use asr_harness::report::io::{read_report, write_report};
use asr_harness::report::{ExperimentReport, RunStatus, ScenarioResult};
use asr_harness::stats::entry::SummaryEntry;
use asr_harness::target::api::PatientApi;
use asr_harness::target::http::HttpTransport;

/// ASR latency harness: measures a live service and judges it against latency requirements.
#[derive(Debug, Parser)]
#[command(
    name = "asrh",
    author,
    version,
    about = "ASR Latency Harness - percentile latency compliance runs",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Echo activity events to stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the full latency experiment and write the report.
    Run(RunArgs),
    /// Render a previously written report.
    Show(ShowArgs),
    /// Inspect configuration.
    Config(ConfigArgs),
    /// Check that the target answers its health endpoint.
    Ping(TargetArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct TargetArgs {
    /// Target host (and optional port); requests go to http://<IP>.
    #[arg(long, value_name = "IP")]
    server_ip: Option<String>,
    /// Full base URL; wins over --server-ip.
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
}

#[derive(Debug, Clone, Args, Default)]
struct RunArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Report output path.
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Concurrency levels for the load sweep, comma separated.
    #[arg(long, value_delimiter = ',', value_name = "N,N,...")]
    levels: Option<Vec<usize>>,
    /// Requests per scenario.
    #[arg(long, value_name = "N")]
    requests: Option<usize>,
    /// Skip the concurrent load sweep.
    #[arg(long)]
    no_load: bool,
    /// Abort the whole run after this many seconds (0 = no limit).
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct ShowArgs {
    /// Report file written by `asrh run`.
    #[arg(value_name = "REPORT")]
    report: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Print the built-in defaults.
    Default,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Run stopped before every scenario finished.
    #[error("{0}")]
    Partial(String),
    /// Run finished but at least one requirement was not met.
    #[error("{0}")]
    Noncompliant(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
            Self::Noncompliant(_) => 5,
        }
    }
}

impl From<AsrhError> for CliError {
    fn from(err: AsrhError) -> Self {
        match &err {
            AsrhError::InvalidConfig { .. }
            | AsrhError::MissingConfig { .. }
            | AsrhError::ConfigParse { .. }
            | AsrhError::ReportShape { .. } => Self::User(err.to_string()),
            AsrhError::Serialization { .. } | AsrhError::Runtime { .. } => {
                Self::Internal(err.to_string())
            }
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_experiment(cli, args),
        Command::Show(args) => show_report(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Ping(args) => ping_target(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            generate(args.shell, &mut command, name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

fn apply_target_overrides(config: &mut Config, args: &TargetArgs) {
    if let Some(ip) = &args.server_ip {
        config.target.server_ip.clone_from(ip);
    }
    if let Some(url) = &args.base_url {
        config.target.base_url.clone_from(url);
    }
}

fn apply_run_overrides(config: &mut Config, args: &RunArgs) {
    apply_target_overrides(config, &args.target);
    if let Some(path) = &args.output {
        config.paths.report.clone_from(path);
    }
    if let Some(levels) = &args.levels {
        config.load.levels.clone_from(levels);
    }
    if let Some(requests) = args.requests {
        config.harness.test_requests = requests;
    }
    if args.no_load {
        config.load.enabled = false;
    }
    if let Some(secs) = args.timeout_secs {
        config.harness.run_timeout_secs = secs;
    }
}

fn run_experiment(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let mut config = load_config(cli)?;
    apply_run_overrides(&mut config, args);
    config.validate()?;

    let base_url = config.target.resolved_base_url()?;
    let transport = HttpTransport::new(
        &base_url,
        &config.target.user_agent,
        Duration::from_millis(config.harness.call_timeout_ms),
    );
    let cancel = CancelToken::with_timeout(Duration::from_secs(config.harness.run_timeout_secs));
    cancel.register_signals();

    let (logger, logger_join) = spawn_logger(ActivityLogConfig::for_path(
        config.paths.activity_log.clone(),
        cli.verbose,
    ))?;

    if !cli.quiet && output_mode(cli) == OutputMode::Human {
        eprintln!(
            "asrh: running {:?} against {base_url}",
            config.harness.experiment_name
        );
    }

    let experiment = LatencyExperiment::new(&config, &transport, cancel, logger.clone());
    let report = experiment.execute();

    let written = write_report(&config.paths.report, &report);
    match &written {
        Ok(()) => logger.send(ActivityEvent::ReportWritten {
            path: config.paths.report.display().to_string(),
        }),
        Err(e) => logger.send(ActivityEvent::Error {
            code: e.code().to_string(),
            message: e.to_string(),
        }),
    }
    logger.shutdown();
    if logger_join.join().is_err() {
        eprintln!("[ASRH-LOGGER] activity logger thread panicked");
    }
    written?;

    match output_mode(cli) {
        OutputMode::Json => write_json_line(&serde_json::to_value(&report)?)?,
        OutputMode::Human => {
            if !cli.quiet {
                print_report_human(&report);
                println!("Report written to {}", config.paths.report.display());
            }
        }
    }

    verdict(&report)
}

/// Exit status for a finished run: aborted beats noncompliant.
fn verdict(report: &ExperimentReport) -> Result<(), CliError> {
    if report.run_status == RunStatus::Aborted {
        let reason = report.abort_reason.as_deref().unwrap_or("unknown reason");
        return Err(CliError::Partial(format!("run aborted: {reason}")));
    }
    if !report.passed() {
        return Err(CliError::Noncompliant(format!(
            "{}/{} requirements met",
            report.summary.compliant_asrs, report.summary.total_asrs_evaluated
        )));
    }
    Ok(())
}

fn show_report(cli: &Cli, args: &ShowArgs) -> Result<(), CliError> {
    let report = read_report(&args.report)?;
    match output_mode(cli) {
        OutputMode::Json => write_json_line(&serde_json::to_value(&report)?)?,
        OutputMode::Human => print_report_human(&report),
    }
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    match args.command.as_ref().unwrap_or(&ConfigCommand::Show) {
        ConfigCommand::Path => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            match mode {
                OutputMode::Human => println!("{}", path.display()),
                OutputMode::Json => write_json_line(&json!({
                    "command": "config path",
                    "path": path.to_string_lossy(),
                    "exists": path.exists(),
                }))?,
            }
        }
        ConfigCommand::Show => {
            let config = load_config(cli)?;
            print_config(mode, "config show", &config)?;
        }
        ConfigCommand::Default => {
            print_config(mode, "config default", &Config::default())?;
        }
        ConfigCommand::Validate => {
            let config = load_config(cli)?;
            match mode {
                OutputMode::Human => println!(
                    "configuration OK ({} requirements, hash {})",
                    config.requirements.len(),
                    config.stable_hash()?
                ),
                OutputMode::Json => write_json_line(&json!({
                    "command": "config validate",
                    "valid": true,
                    "path": config.paths.config_file.to_string_lossy(),
                    "requirements": config.requirements.len(),
                    "config_hash": config.stable_hash()?,
                }))?,
            }
        }
    }
    Ok(())
}

fn print_config(mode: OutputMode, command: &str, config: &Config) -> Result<(), CliError> {
    match mode {
        OutputMode::Human => print!("{}", config.to_toml()?),
        OutputMode::Json => write_json_line(&json!({
            "command": command,
            "config_hash": config.stable_hash()?,
            "config": serde_json::to_value(config)?,
        }))?,
    }
    Ok(())
}

fn ping_target(cli: &Cli, args: &TargetArgs) -> Result<(), CliError> {
    let mut config = load_config(cli)?;
    apply_target_overrides(&mut config, args);
    let base_url = config.target.resolved_base_url()?;
    let timeout = Duration::from_millis(config.harness.call_timeout_ms);
    let transport = HttpTransport::new(&base_url, &config.target.user_agent, timeout);
    let api = PatientApi::new(config.target.endpoints.clone());

    let call = timed_call(&transport, &api.health(timeout));
    let latency_ms = call.elapsed_ms();
    let error = call.result.err();

    match output_mode(cli) {
        OutputMode::Json => write_json_line(&json!({
            "command": "ping",
            "target": base_url,
            "ok": error.is_none(),
            "latency_ms": latency_ms,
            "error": error.as_ref().map(ToString::to_string),
        }))?,
        OutputMode::Human => {
            if error.is_none() && !cli.quiet {
                println!("{} {base_url} answered in {latency_ms:.2}ms", "OK".green());
            }
        }
    }

    match error {
        None => Ok(()),
        Some(err) => Err(err.into_error(&base_url, timeout).into()),
    }
}

fn print_report_human(report: &ExperimentReport) {
    println!("{}", report.experiment.bold());
    println!("  target:    {}", report.server_ip);
    println!("  timestamp: {}", report.timestamp);
    println!("  duration:  {:.1}s", report.duration_seconds);
    match report.run_status {
        RunStatus::Completed => println!("  run:       {}", "completed".green()),
        RunStatus::Aborted => println!(
            "  run:       {} ({})",
            "aborted".yellow(),
            report.abort_reason.as_deref().unwrap_or("unknown reason")
        ),
    }

    println!();
    println!("{}", "Scenarios".bold());
    for (name, result) in report.test_results.iter() {
        match result {
            ScenarioResult::Flat(entry) => println!("  {name:<28} {}", entry_line(entry)),
            ScenarioResult::Components(components) => {
                println!("  {name}");
                for (component, entry) in components.iter() {
                    println!("    {component:<26} {}", entry_line(entry));
                }
            }
            ScenarioResult::LoadLevels(levels) => {
                println!("  {name}");
                for (key, level) in levels.iter() {
                    println!(
                        "    {key:<26} {}  success {:.1}%",
                        entry_line(&level.entry),
                        level.success_rate
                    );
                }
            }
        }
    }

    if !report.load_analysis.is_empty() {
        println!();
        println!("{}", "Load analysis".bold());
        for (key, level) in report.load_analysis.iter() {
            let p95 = level
                .p95_latency
                .map_or_else(|| "-".to_string(), |p95| format!("{p95:.2}ms"));
            let verdict = if level.acceptable_performance {
                "acceptable".green()
            } else {
                "degraded".red()
            };
            println!(
                "  {key:<28} p95 {p95:>10}  success {:>5.1}%  {verdict}",
                level.success_rate
            );
        }
    }

    println!();
    println!("{}", "Requirements".bold());
    for (key, result) in report.asr_compliance.iter() {
        let mark = if result.compliant {
            "PASS".green()
        } else {
            "FAIL".red()
        };
        println!(
            "  [{mark}] {key:<24} {:<10} actual {}",
            result.requirement, result.actual
        );
    }

    let summary = &report.summary;
    let status = if report.passed() {
        summary.overall_performance_status.as_str().green().bold()
    } else {
        summary.overall_performance_status.as_str().red().bold()
    };
    println!();
    println!(
        "{}/{} requirements met ({:.1}%): {status}",
        summary.compliant_asrs, summary.total_asrs_evaluated, summary.compliance_percentage
    );
}

fn entry_line(entry: &SummaryEntry) -> String {
    match entry.summary() {
        Some(summary) => format!(
            "n={:<5} mean {:>9.2}ms  p95 {:>9.2}ms  p99 {:>9.2}ms",
            summary.count, summary.mean, summary.p95, summary.p99
        ),
        None => {
            let (attempted, errors) = entry.counts().unwrap_or((0, 0));
            format!(
                "{} ({errors}/{attempted} calls failed)",
                entry.status().yellow()
            )
        }
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("ASRH_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
