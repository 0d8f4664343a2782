// crates/dcp-cli/src/main.rs
// ============================================================================
// Module: Decision Control Plane CLI Entry Point
// Description: Command dispatcher for serving and offline policy tooling.
// Purpose: Run the HTTP service and check or evaluate rulesets locally.
// Dependencies: clap, dcp-config, dcp-core, dcp-server, serde_json, thiserror, tokio.
// ============================================================================

//! ## Overview
//! The `dcp` binary starts the decision control plane service and offers
//! offline helpers for configuration and policy authors. Policy commands
//! never touch a store: `policy check` validates a ruleset document and
//! `policy eval` runs it against a set of inputs, printing the full trace.
//! Security posture: files and inline JSON are untrusted and size-limited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use dcp_config::DcpConfig;
use dcp_core::PolicyEvaluation;
use dcp_core::PolicyInputs;
use dcp_core::Ruleset;
use dcp_server::DcpServer;
use dcp_server::init_tracing;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a policy inputs document.
const MAX_INPUTS_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "dcp", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the decision control plane HTTP service.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Offline ruleset utilities.
    Policy {
        /// Selected policy subcommand.
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Config file path (defaults to `DCP_CONFIG` or `dcp.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a config file, including its policy files.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Config file path (defaults to `DCP_CONFIG` or `dcp.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Policy subcommands.
#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Validate a ruleset file and print its version, hash, and default outcome.
    Check(PolicyCheckCommand),
    /// Evaluate a ruleset against inputs and print the result and trace.
    Eval(PolicyEvalCommand),
}

/// Arguments for `policy check`.
#[derive(Args, Debug)]
struct PolicyCheckCommand {
    /// Ruleset JSON file.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

/// Arguments for `policy eval`.
#[derive(Args, Debug)]
struct PolicyEvalCommand {
    /// Ruleset JSON file; the built-in ruleset is used when omitted.
    #[arg(long, value_name = "FILE")]
    policy: Option<PathBuf>,
    /// Inline JSON object of inputs.
    #[arg(long, value_name = "JSON", conflicts_with = "inputs_file")]
    inputs: Option<String>,
    /// JSON file holding the inputs object.
    #[arg(long, value_name = "FILE")]
    inputs_file: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a printable message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(command) => command_config_validate(&command),
        },
        Commands::Policy {
            command,
        } => match command {
            PolicyCommand::Check(command) => command_policy_check(&command),
            PolicyCommand::Eval(command) => command_policy_eval(&command),
        },
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = DcpConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    init_tracing(&config.logging)
        .map_err(|err| CliError::new(format!("failed to initialize logging: {err}")))?;

    let server = tokio::task::spawn_blocking(move || DcpServer::from_config(config))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Executes `config validate`.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let config = DcpConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let catalog = config
        .policy_catalog()
        .map_err(|err| CliError::new(format!("failed to load policies: {err}")))?;
    write_stdout_line(&format!("config ok ({} rulesets)", catalog.len()))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Policy Commands
// ============================================================================

/// Executes `policy check`.
fn command_policy_check(command: &PolicyCheckCommand) -> CliResult<ExitCode> {
    let ruleset = Ruleset::load(&command.file)
        .map_err(|err| CliError::new(format!("invalid ruleset: {err}")))?;
    write_stdout_line(&format!(
        "policy ok: version {} hash {} rules {} default {}",
        ruleset.version(),
        ruleset.hash(),
        ruleset.rules().len(),
        ruleset.default_outcome().result
    ))?;
    if let Some(description) = ruleset.description() {
        write_stdout_line(&format!("description: {description}"))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `policy eval`.
fn command_policy_eval(command: &PolicyEvalCommand) -> CliResult<ExitCode> {
    let ruleset = match &command.policy {
        Some(path) => Ruleset::load(path),
        None => Ruleset::builtin(),
    }
    .map_err(|err| CliError::new(format!("invalid ruleset: {err}")))?;
    let inputs = read_inputs(command)?;
    let evaluation = ruleset.evaluate(&inputs);
    write_evaluation(&evaluation)?;
    Ok(ExitCode::SUCCESS)
}

/// Resolves policy inputs from inline JSON or a file.
fn read_inputs(command: &PolicyEvalCommand) -> CliResult<PolicyInputs> {
    let text = match (&command.inputs, &command.inputs_file) {
        (Some(inline), _) => {
            if inline.len() > MAX_INPUTS_BYTES {
                return Err(CliError::new(format!(
                    "inputs exceed size limit ({} > {MAX_INPUTS_BYTES})",
                    inline.len()
                )));
            }
            inline.clone()
        }
        (None, Some(path)) => {
            let bytes = read_bytes_with_limit(path, MAX_INPUTS_BYTES)?;
            String::from_utf8(bytes).map_err(|_| {
                CliError::new(format!("inputs file is not utf-8: {}", path.display()))
            })?
        }
        (None, None) => return Ok(PolicyInputs::new()),
    };
    serde_json::from_str(&text)
        .map_err(|err| CliError::new(format!("inputs must be a JSON object: {err}")))
}

/// Writes an evaluation as pretty JSON.
fn write_evaluation(evaluation: &PolicyEvaluation) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(evaluation)
        .map_err(|err| CliError::new(format!("failed to serialize evaluation: {err}")))?;
    write_stdout_line(&rendered)
}

// ============================================================================
// SECTION: I/O Helpers
// ============================================================================

/// Reads a file, refusing anything larger than `max_bytes`.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> CliResult<Vec<u8>> {
    let io_error = |err: std::io::Error| CliError::new(format!("{}: {err}", path.display()));
    let file = File::open(path).map_err(io_error)?;
    let size = file.metadata().map_err(io_error)?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(CliError::new(format!(
            "{}: file exceeds size limit ({size} > {max_bytes})",
            path.display()
        )));
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(io_error)?;
    if bytes.len() > max_bytes {
        return Err(CliError::new(format!(
            "{}: file exceeds size limit (> {max_bytes})",
            path.display()
        )));
    }
    Ok(bytes)
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
