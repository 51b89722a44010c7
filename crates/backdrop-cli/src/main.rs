// crates/backdrop-cli/src/main.rs
// ============================================================================
// Module: Backdrop CLI Entry Point
// Description: Command dispatcher for the relay server and offline tooling.
// Purpose: Provide a safe CLI for serving, sanitizing, and catalog building.
// Dependencies: backdrop-config, backdrop-core, backdrop-server, clap, tokio
// ============================================================================

//! ## Overview
//! `backdrop serve` runs the relay under the loopback-only bind policy.
//! `backdrop sanitize` runs the sanitizer and assembler on a local file.
//! `backdrop catalog build` turns scraper output into a validated catalog,
//! and `backdrop config validate` checks a configuration file.
//! Security posture: file inputs are untrusted and read with hard limits.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use backdrop_cli::serve_policy::ALLOW_NON_LOOPBACK_ENV;
use backdrop_cli::serve_policy::enforce_local_only;
use backdrop_cli::serve_policy::resolve_allow_non_loopback;
use backdrop_config::BackdropConfig;
use backdrop_core::OriginGuard;
use backdrop_core::RawDocument;
use backdrop_core::SanitizationPolicy;
use backdrop_core::assemble;
use backdrop_core::sanitize;
use backdrop_server::BackgroundCatalog;
use backdrop_server::RelayServer;
use backdrop_server::audit_sink_from_config;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a document passed to `sanitize`.
const MAX_SANITIZE_INPUT_BYTES: usize = 32 * 1024 * 1024;
/// Maximum size of scraper output passed to `catalog build`.
const MAX_CATALOG_INPUT_BYTES: usize = 16 * 1024 * 1024;
/// Origin used by `sanitize` when none is given.
const DEFAULT_SANITIZE_ORIGIN: &str = "https://steamcommunity.com/";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "backdrop", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay server.
    Serve(ServeCommand),
    /// Sanitize a local HTML file and write the embeddable document to stdout.
    Sanitize(SanitizeCommand),
    /// Background catalog utilities.
    Catalog {
        /// Selected catalog subcommand.
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to backdrop.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Allow binding to non-loopback addresses.
    #[arg(long)]
    allow_non_loopback: bool,
}

/// Configuration for the `sanitize` command.
#[derive(Args, Debug)]
struct SanitizeCommand {
    /// HTML file to sanitize.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Origin written into the base directive.
    #[arg(long, value_name = "URL", default_value = DEFAULT_SANITIZE_ORIGIN)]
    origin: String,
}

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Build a catalog from scraper output.
    Build(CatalogBuildCommand),
}

/// Configuration for the `catalog build` command.
#[derive(Args, Debug)]
struct CatalogBuildCommand {
    /// Scraper output: a JSON array or one URL per line.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Catalog file to write.
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a configuration file.
    Validate(ConfigValidateCommand),
}

/// Configuration for the `config validate` command.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to backdrop.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
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

/// Bounded read failures.
#[derive(Debug)]
enum ReadLimitError {
    /// File I/O failure.
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

impl std::fmt::Display for ReadLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::TooLarge {
                size,
                limit,
            } => write!(f, "file is {size} bytes; limit is {limit}"),
        }
    }
}

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
        Commands::Sanitize(command) => command_sanitize(&command),
        Commands::Catalog {
            command,
        } => match command {
            CatalogCommand::Build(command) => command_catalog_build(&command),
        },
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(command) => command_config_validate(&command),
        },
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = BackdropConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let allow_non_loopback = resolve_allow_non_loopback(command.allow_non_loopback)
        .map_err(|err| CliError::new(err.to_string()))?;
    let outcome = enforce_local_only(&config, allow_non_loopback)
        .map_err(|err| CliError::new(err.to_string()))?;
    if outcome.network_exposed {
        write_stderr_line(&format!(
            "backdrop: WARNING: relay bound to {} is reachable from the network \
             ({ALLOW_NON_LOOPBACK_ENV} or --allow-non-loopback set)",
            outcome.bind_addr
        ))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let audit = audit_sink_from_config(&config.audit)
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    let server = RelayServer::from_config(config, audit)
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Sanitize Command
// ============================================================================

/// Executes the `sanitize` command.
fn command_sanitize(command: &SanitizeCommand) -> CliResult<ExitCode> {
    let origin = Url::parse(command.origin.trim())
        .map_err(|err| CliError::new(format!("invalid origin {}: {err}", command.origin)))?;
    let guard = OriginGuard::new(&origin)
        .map_err(|err| CliError::new(format!("invalid origin {}: {err}", command.origin)))?;
    let bytes = read_bytes_with_limit(&command.input, MAX_SANITIZE_INPUT_BYTES).map_err(|err| {
        CliError::new(format!("failed to read {}: {err}", command.input.display()))
    })?;
    let policy = SanitizationPolicy::steam_profile();
    let assembled = assemble(sanitize(&RawDocument::new(bytes, None), &policy), guard.origin());
    write_stdout_bytes(assembled.document.as_str().as_bytes())
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Catalog Command
// ============================================================================

/// Executes the `catalog build` command.
fn command_catalog_build(command: &CatalogBuildCommand) -> CliResult<ExitCode> {
    let bytes = read_bytes_with_limit(&command.input, MAX_CATALOG_INPUT_BYTES).map_err(|err| {
        CliError::new(format!("failed to read {}: {err}", command.input.display()))
    })?;
    let text = String::from_utf8(bytes)
        .map_err(|_| CliError::new(format!("{} must be utf-8", command.input.display())))?;
    let catalog = BackgroundCatalog::from_scraped(&text)
        .map_err(|err| CliError::new(format!("catalog build failed: {err}")))?;
    let json = catalog
        .to_json()
        .map_err(|err| CliError::new(format!("catalog build failed: {err}")))?;
    fs::write(&command.output, format!("{json}\n")).map_err(|err| {
        CliError::new(format!("failed to write {}: {err}", command.output.display()))
    })?;
    write_stdout_line(&format!(
        "wrote {} backgrounds to {}",
        catalog.len(),
        command.output.display()
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Executes the `config validate` command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    BackdropConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)?;
    stdout.flush()
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream failure.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
