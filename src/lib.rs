//! smartops: guard rails for agents that touch the filesystem.
//!
//! A local tool-dispatch server. Instead of raw `rm`, overwrite or forced shell
//! commands, a calling agent gets five tools with recoverability built in:
//!
//! - `safe_delete`: quarantine into a timestamped trash directory
//! - `versioned_backup`: fingerprinted copies recorded in a bounded manifest
//! - `detect_api_changes`: lexical breaking-change check between two sources
//! - `force_operation`: allow-listed commands with force flags injected
//! - `create_snapshot`: gzip tarball of a project plus a JSON manifest
//!
//! # Architecture
//!
//! - [`core`]: errors, time, config, record stores, wire envelopes, the tool
//!   catalogue, the external command broker and the dispatch server
//! - [`plugins`]: one module per tool
//!
//! All persisted state lives on disk (trash, backups, manifest, operation log,
//! snapshots). The server keeps none between requests.
//!
//! # Examples
//!
//! ```bash
//! # Serve over MCP stdio
//! smartops serve
//!
//! # One-shot call
//! smartops call versioned_backup --args '{"filepath": "src/api.js", "reason": "pre-refactor"}'
//! ```

pub mod core;
pub mod plugins;

use crate::core::config::{Config, ConfigOverrides};
use crate::core::error::SmartOpsError;
use crate::core::server::{Dispatcher, McpServer};
use crate::core::store::OperationLog;
use crate::core::tools;
use crate::plugins::{backup, snapshot};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive for diagnostics.
pub const LOG_ENV: &str = "SMARTOPS_LOG";

#[derive(Parser, Debug)]
#[clap(
    name = "smartops",
    version = env!("CARGO_PKG_VERSION"),
    about = "Guard-railed delete, backup, API-diff, command and snapshot tools for coding agents"
)]
struct Cli {
    /// Workspace root (defaults to the current directory).
    #[clap(long, global = true)]
    workspace: Option<PathBuf>,
    /// Config file (defaults to `<workspace>/.smartops/config.toml` if present).
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    /// Override the quarantine directory.
    #[clap(long, global = true)]
    trash_dir: Option<PathBuf>,
    /// Override the backup directory.
    #[clap(long, global = true)]
    backup_dir: Option<PathBuf>,
    /// Override where the breaking-change report is written.
    #[clap(long, global = true)]
    report_path: Option<PathBuf>,
    /// Log at info level on stderr.
    #[clap(short, long, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the tool catalogue over MCP stdio
    #[clap(name = "serve")]
    Serve,

    /// Invoke one tool and print its result envelope
    #[clap(name = "call")]
    Call {
        /// Tool name, e.g. `safe_delete`.
        tool: String,
        /// Arguments as a JSON object.
        #[clap(long, default_value = "{}")]
        args: String,
    },

    /// Print the tool catalogue
    #[clap(name = "tools")]
    Tools,

    /// Print the effective configuration
    #[clap(name = "config")]
    Config,

    /// Backup manifest
    #[clap(name = "manifest")]
    Manifest(backup::ManifestCli),

    /// Operation log
    #[clap(name = "log")]
    Log(LogCli),

    /// Project snapshots
    #[clap(name = "snapshots")]
    Snapshots(snapshot::SnapshotsCli),
}

#[derive(clap::Args, Debug)]
struct LogCli {
    #[clap(subcommand)]
    command: LogCommand,
}

#[derive(Subcommand, Debug)]
enum LogCommand {
    /// Show the most recent operation log entries.
    Tail {
        #[clap(long, default_value = "20")]
        limit: usize,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_log_cli(log: &OperationLog, cli: LogCli) -> Result<(), SmartOpsError> {
    match cli.command {
        LogCommand::Tail { limit } => {
            let entries = log.entries()?;
            let start = entries.len().saturating_sub(limit);
            for entry in &entries[start..] {
                println!("{}", serde_json::to_string(entry)?);
            }
            Ok(())
        }
    }
}

pub fn run() -> Result<(), SmartOpsError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let workspace = match cli.workspace {
        Some(w) => w,
        None => std::env::current_dir()?,
    };
    let overrides = ConfigOverrides {
        trash_dir: cli.trash_dir,
        backup_dir: cli.backup_dir,
        report_path: cli.report_path,
    };
    let config = Config::load(&workspace, cli.config.as_deref(), &overrides)?;
    tracing::debug!(?config, "effective config");

    match cli.command {
        Command::Serve => {
            let mut server = McpServer::new(Dispatcher::new(config));
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            server.serve(stdin.lock(), stdout.lock())
        }
        Command::Call { tool, args } => {
            let args: serde_json::Value = serde_json::from_str(&args)?;
            let dispatcher = Dispatcher::new(config);
            let result = dispatcher.dispatch(&tool, &args)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Tools => {
            println!("{}", serde_json::to_string_pretty(&tools::catalogue())?);
            Ok(())
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Manifest(manifest_cli) => {
            let dispatcher = Dispatcher::new(config);
            backup::run_manifest_cli(dispatcher.manifest(), manifest_cli)
        }
        Command::Log(log_cli) => {
            let dispatcher = Dispatcher::new(config);
            run_log_cli(dispatcher.operation_log(), log_cli)
        }
        Command::Snapshots(snapshots_cli) => {
            snapshot::run_snapshots_cli(&config.snapshot_dir(), snapshots_cli)
        }
    }
}
