// crates/link-locker-cli/src/main.rs
// ============================================================================
// Module: Link Locker CLI Entry Point
// Description: Command dispatcher for the link locker server and tooling.
// Purpose: Run the HTTP server and inspect configuration, tokens, and ledgers.
// Dependencies: clap, link-locker-config, link-locker-core, link-locker-server, tokio
// ============================================================================

//! ## Overview
//! The `link-locker` binary starts the HTTP server, validates configuration
//! files, mints per-publisher webhook URLs, and summarizes a publisher's
//! revenue ledger from the configured store. Output goes to stdout; errors go
//! to stderr with a failing exit code.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use link_locker_config::LinkLockerConfig;
use link_locker_config::StoreType;
use link_locker_core::LockerEngine;
use link_locker_core::PublisherId;
use link_locker_core::SystemClock;
use link_locker_core::TaskId;
use link_locker_core::WebhookToken;
use link_locker_server::LockerServer;
use link_locker_server::build_store;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "link-locker", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the link locker HTTP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print the webhook token and path for a task and publisher.
    WebhookToken(WebhookTokenCommand),
    /// Revenue ledger utilities.
    Ledger {
        /// Selected ledger subcommand.
        #[command(subcommand)]
        command: LedgerCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to link-locker.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a link locker configuration file.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `webhook-token`.
#[derive(Args, Debug)]
struct WebhookTokenCommand {
    /// Task the webhook converts.
    #[arg(long, value_name = "TASK_ID")]
    task: String,
    /// Publisher credited by the webhook.
    #[arg(long, value_name = "PUBLISHER_ID")]
    publisher: String,
}

/// Ledger subcommands.
#[derive(Subcommand, Debug)]
enum LedgerCommand {
    /// Print lifetime revenue, balance, and per-source totals as JSON.
    Summary(LedgerSummaryCommand),
}

/// Arguments for `ledger summary`.
#[derive(Args, Debug)]
struct LedgerSummaryCommand {
    /// Publisher to summarize.
    #[arg(long, value_name = "PUBLISHER_ID")]
    publisher: String,
    /// Optional config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
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
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run(cli: Cli) -> CliResult<ExitCode> {
    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };
    match command {
        Commands::Serve(command) => command_serve(&command),
        Commands::Config {
            command,
        } => command_config(&command),
        Commands::WebhookToken(command) => command_webhook_token(&command),
        Commands::Ledger {
            command,
        } => command_ledger(&command),
    }
}

/// Emits the top-level help message for the CLI.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
///
/// The server is built before the runtime starts because the geolocation
/// client blocks.
fn command_serve(command: &ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let bind = config.server.bind.clone().unwrap_or_default();
    let server = LockerServer::from_config(config)
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(format!("runtime init failed: {err}")))?;
    write_stderr_line(&format!("link-locker listening on {bind}"))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    runtime
        .block_on(server.serve())
        .map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(command),
    }
}

/// Executes the config validation command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let _config = load_config(command.config.as_deref())?;
    write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Loads and validates configuration.
fn load_config(path: Option<&Path>) -> CliResult<LinkLockerConfig> {
    LinkLockerConfig::load(path).map_err(|err| CliError::new(format!("config load failed: {err}")))
}

// ============================================================================
// SECTION: Webhook Token Command
// ============================================================================

/// Executes the `webhook-token` command.
fn command_webhook_token(command: &WebhookTokenCommand) -> CliResult<ExitCode> {
    for line in webhook_token_lines(&command.task, &command.publisher)? {
        write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Renders the token and its webhook path.
fn webhook_token_lines(task: &str, publisher: &str) -> CliResult<[String; 2]> {
    let token = WebhookToken::new(TaskId::new(task), PublisherId::new(publisher))
        .map_err(|err| CliError::new(err.to_string()))?;
    Ok([token.encode(), token.path()])
}

// ============================================================================
// SECTION: Ledger Commands
// ============================================================================

/// Dispatches ledger subcommands.
fn command_ledger(command: &LedgerCommand) -> CliResult<ExitCode> {
    match command {
        LedgerCommand::Summary(command) => command_ledger_summary(command),
    }
}

/// Executes the `ledger summary` command.
fn command_ledger_summary(command: &LedgerSummaryCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let json = ledger_summary_json(&config, &command.publisher)?;
    write_stdout_line(&json).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Summarizes a publisher's ledger from the configured store as pretty JSON.
fn ledger_summary_json(config: &LinkLockerConfig, publisher: &str) -> CliResult<String> {
    if config.store.store_type == StoreType::Memory {
        return Err(CliError::new("ledger summary requires a sqlite store".to_string()));
    }
    let store = build_store(config).map_err(|err| CliError::new(err.to_string()))?;
    let engine = LockerEngine::new(store, Arc::new(SystemClock), config.engine_config());
    let summary = engine
        .ledger_summary(&PublisherId::new(publisher))
        .map_err(|err| CliError::new(format!("ledger summary failed: {err}")))?;
    serde_json::to_string_pretty(&summary)
        .map_err(|err| CliError::new(format!("ledger summary encoding failed: {err}")))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output failure message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message and returns a failing exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
