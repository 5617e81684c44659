//! Versioned backups named `<base>_<YYYY-MM-DD>_<fingerprint>_<reason><ext>`.

use crate::core::error::SmartOpsError;
use crate::core::fingerprint::fingerprint;
use crate::core::rpc::ToolResult;
use crate::core::store::{BackupManifest, BackupManifestEntry};
use crate::core::time;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::Path;

pub const DEFAULT_REASON: &str = "checkpoint";

/// Split a file name into base and extension (extension keeps its dot).
/// `a.tar.gz` -> (`a.tar`, `.gz`); `.bashrc` -> (`.bashrc`, ``).
pub fn split_name(file_name: &str) -> (&str, &str) {
    let path = Path::new(file_name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(_)) => {
            let base_len = stem.len();
            (&file_name[..base_len], &file_name[base_len..])
        }
        _ => (file_name, ""),
    }
}

fn sanitize_reason(reason: &str) -> String {
    reason.replace(['/', '\\'], "-")
}

pub fn backup_file_name(file_name: &str, day: &str, hash: &str, reason: &str) -> String {
    let (base, ext) = split_name(file_name);
    format!("{}_{}_{}_{}{}", base, day, hash, sanitize_reason(reason), ext)
}

pub fn versioned_backup(
    filepath: &str,
    reason: Option<&str>,
    backup_dir: &Path,
    manifest: &BackupManifest,
) -> Result<ToolResult, SmartOpsError> {
    let reason = reason.unwrap_or(DEFAULT_REASON);
    let source = Path::new(filepath);
    let content = fs::read_to_string(source).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            SmartOpsError::NotFound(format!("'{}' does not exist", filepath))
        }
        _ => SmartOpsError::IoError(e),
    })?;
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| SmartOpsError::PathError(format!("'{}' has no file name", filepath)))?;

    let now = time::now();
    let hash = fingerprint(&content);
    let backup_path =
        backup_dir.join(backup_file_name(&file_name, &time::day(&now), &hash, reason));

    fs::create_dir_all(backup_dir)?;
    fs::write(&backup_path, &content)?;

    let backup_str = backup_path.to_string_lossy().to_string();
    manifest.record(BackupManifestEntry {
        timestamp: time::iso(&now),
        original: filepath.to_string(),
        backup: backup_str.clone(),
        reason: reason.to_string(),
    })?;
    tracing::info!(filepath, backup = %backup_str, hash = %hash, "backed up");

    Ok(ToolResult::ok(format!("Backed up to: {}", backup_str))
        .with("hash", hash)
        .with("backupPath", backup_str))
}

#[derive(Parser, Debug)]
#[clap(name = "manifest", about = "Inspect the backup manifest")]
pub struct ManifestCli {
    #[clap(subcommand)]
    pub command: ManifestCommand,
}

#[derive(Subcommand, Debug)]
pub enum ManifestCommand {
    /// Show the most recent manifest entries, newest last.
    List {
        #[clap(long, default_value = "20")]
        limit: usize,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
}

pub fn run_manifest_cli(manifest: &BackupManifest, cli: ManifestCli) -> Result<(), SmartOpsError> {
    use colored::Colorize;

    match cli.command {
        ManifestCommand::List { limit, format } => {
            let entries = manifest.entries()?;
            let start = entries.len().saturating_sub(limit);
            let recent = &entries[start..];
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(recent)?);
                return Ok(());
            }
            println!(
                "{} of {} entries (cap {})",
                recent.len(),
                entries.len(),
                manifest.cap()
            );
            for e in recent {
                println!(
                    "{} {} {} {}",
                    e.timestamp.bright_black(),
                    format!("[{}]", e.reason).bright_cyan(),
                    e.original.bright_white(),
                    format!("-> {}", e.backup).bright_black()
                );
            }
            Ok(())
        }
    }
}
