//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use queue_growth_monitor::core::config::Config;
use queue_growth_monitor::core::errors::QgmError;
use queue_growth_monitor::daemon::loop_main::MonitorDaemon;
use queue_growth_monitor::daemon::state::{HealthState, read_state};
use queue_growth_monitor::monitor::growth::MonitorResult;
use queue_growth_monitor::monitor::replay::{ReplayReport, read_sample_log, replay};

/// Queue growth monitor: flags queues whose backlog keeps trending upward.
#[derive(Debug, Parser)]
#[command(
    name = "qgm",
    author,
    version,
    about = "Queue Growth Monitor - backlog trend health check",
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
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the monitoring daemon in the foreground.
    Daemon,
    /// Show the daemon's latest health result (exit 1 when unhealthy).
    Status,
    /// Turn the growth check on in the running daemon.
    Activate,
    /// Turn the growth check off in the running daemon.
    Deactivate,
    /// Evaluate a recorded JSONL sample log offline.
    Replay(ReplayArgs),
    /// Inspect configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct ReplayArgs {
    /// Sample log, one `{"queue","timestamp_millis","ready_entries"}` object per line.
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Evaluate with the growth check active regardless of `start_active`.
    #[arg(long)]
    active: bool,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
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
    /// Invalid user input.
    #[error("{0}")]
    User(String),
    /// The monitor reports unhealthy, or no daemon state exists.
    #[error("unhealthy: {0}")]
    Unhealthy(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) | Self::Unhealthy(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

impl From<QgmError> for CliError {
    fn from(err: QgmError) -> Self {
        match err {
            QgmError::InvalidConfig { .. }
            | QgmError::MissingConfig { .. }
            | QgmError::ConfigParse { .. }
            | QgmError::SampleParse { .. } => Self::User(err.to_string()),
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
        Command::Daemon => run_daemon(cli),
        Command::Status => run_status(cli),
        Command::Activate => run_toggle(cli, true),
        Command::Deactivate => run_toggle(cli, false),
        Command::Replay(args) => run_replay(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn run_daemon(cli: &Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let mut daemon = MonitorDaemon::new(config)?;
    daemon.run()?;
    Ok(())
}

fn run_status(cli: &Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let state = read_state(&config.paths.state_file, config.monitor.poll_interval_ms)
        .map_err(|e| CliError::Unhealthy(e.to_string()))?;
    let stale = state.is_stale(config.monitor.poll_interval_ms);

    match output_mode(cli) {
        OutputMode::Human => print_status(&state, stale, config.monitor.growth_threshold),
        OutputMode::Json => {
            let payload = json!({
                "command": "status",
                "stale": stale,
                "state": serde_json::to_value(&state)?,
            });
            write_json_line(&payload)?;
        }
    }

    if stale {
        return Err(CliError::Unhealthy(format!(
            "state file stale since {}; daemon may have stopped",
            state.last_updated
        )));
    }
    if state.result.healthy {
        Ok(())
    } else {
        Err(CliError::Unhealthy(state.result.message))
    }
}

fn print_status(state: &HealthState, stale: bool, threshold: f64) {
    let verdict = if state.result.healthy {
        "HEALTHY".green().bold()
    } else {
        "UNHEALTHY".red().bold()
    };
    println!("Queue Growth Monitor v{}", state.version);
    println!("  Daemon: pid {} since {}", state.pid, state.started_at);
    println!(
        "  Updated: {}{}",
        state.last_updated,
        if stale { " (stale)" } else { "" }
    );
    println!("  Check: {}  Ticks: {}", state.status.as_str(), state.ticks);
    println!("  Health: {verdict}  {}", state.result.message);
    print_result_table(&state.result, threshold);
}

fn print_result_table(result: &MonitorResult, threshold: f64) {
    if result.details.is_empty() && result.skipped.is_empty() {
        return;
    }
    println!(
        "\n  {:<24}  {:>10}  {:>12}  {:>12}  {:<8}",
        "Queue", "Ready", "Smoothed", "Slope", "State"
    );
    println!("  {}", "-".repeat(74));
    for (queue, detail) in &result.details {
        let label = if detail.slope_percent > threshold {
            "GROWING".red()
        } else {
            "ok".green()
        };
        println!(
            "  {:<24}  {:>10}  {:>12.2}  {:>12.2}  {label}",
            queue, detail.last_raw, detail.last_smoothed, detail.slope_percent
        );
    }
    for (queue, reason) in &result.skipped {
        println!("  {:<24}  {:>10}  {:>12}  {:>12}  {}", queue, "-", "-", "-", reason.yellow());
    }
}

#[cfg(unix)]
fn signal_daemon(pid: u32, activate: bool) -> Result<(), QgmError> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| QgmError::Signal {
        pid,
        details: "pid out of range".to_string(),
    })?;
    let signal = if activate {
        Signal::SIGUSR1
    } else {
        Signal::SIGUSR2
    };
    kill(Pid::from_raw(raw), signal).map_err(|e| QgmError::Signal {
        pid,
        details: e.to_string(),
    })
}

#[cfg(not(unix))]
fn signal_daemon(pid: u32, _activate: bool) -> Result<(), QgmError> {
    Err(QgmError::Signal {
        pid,
        details: "signalling the daemon requires a Unix platform".to_string(),
    })
}

fn run_toggle(cli: &Cli, activate: bool) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let state = read_state(&config.paths.state_file, config.monitor.poll_interval_ms)?;
    let pid = state.signal_target(config.monitor.poll_interval_ms)?;
    signal_daemon(pid, activate)?;

    let command = if activate { "activate" } else { "deactivate" };
    match output_mode(cli) {
        OutputMode::Human => println!("Requested {command} from daemon pid {pid}."),
        OutputMode::Json => write_json_line(&json!({
            "command": command,
            "pid": pid,
            "sent": true,
        }))?,
    }
    Ok(())
}

fn run_replay(cli: &Cli, args: &ReplayArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let records = read_sample_log(&args.file)?;
    let active = args.active || config.monitor.start_active;
    let threshold = config.monitor.growth_threshold;
    let report = replay(config.monitor, &records, active)?;

    match output_mode(cli) {
        OutputMode::Human => print_replay(&report, threshold),
        OutputMode::Json => write_json_line(&json!({
            "command": "replay",
            "file": args.file.to_string_lossy(),
            "report": serde_json::to_value(&report)?,
        }))?,
    }
    Ok(())
}

fn print_replay(report: &ReplayReport, threshold: f64) {
    println!(
        "Replayed {} sample(s) in {} round(s); {} unhealthy round(s).",
        report.samples, report.rounds, report.unhealthy_rounds
    );
    if let Some(ts) = report.first_unhealthy_at {
        println!("  First unhealthy at timestamp {ts}");
    }
    let verdict = if report.result.healthy {
        "HEALTHY".green().bold()
    } else {
        "UNHEALTHY".red().bold()
    };
    println!("  Final: {verdict}  {}", report.result.message);
    print_result_table(&report.result, threshold);
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config path",
                    "path": path.to_string_lossy(),
                    "exists": exists,
                }))?,
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;
            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml()?),
                OutputMode::Json => write_json_line(&json!({
                    "command": "config show",
                    "config": serde_json::to_value(&config)?,
                }))?,
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;
                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => write_json_line(&json!({
                        "command": "config validate",
                        "valid": true,
                        "path": config.paths.config_file.to_string_lossy(),
                        "hash": hash,
                    }))?,
                }
                Ok(())
            }
            Err(e) => {
                if output_mode(cli) == OutputMode::Json {
                    write_json_line(&json!({
                        "command": "config validate",
                        "valid": false,
                        "code": e.code(),
                        "error": e.to_string(),
                    }))?;
                }
                Err(e.into())
            }
        },
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("QGM_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    match env_mode.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ if stdout_is_tty => OutputMode::Human,
        _ => OutputMode::Json,
    }
}
