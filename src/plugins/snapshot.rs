//! Project snapshots: a gzip tarball plus a JSON manifest beside it.

use crate::core::error::SmartOpsError;
use crate::core::external_action::{self, ProcessRunner};
use crate::core::rpc::ToolResult;
use crate::core::time;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const DEFAULT_MESSAGE: &str = "snapshot";
pub const ARCHIVE_EXT: &str = "tar.gz";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotManifest {
    pub timestamp: String,
    pub message: String,
    pub project_path: String,
    pub snapshot_file: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

static WHITESPACE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\s+").unwrap());

/// `snapshot_<stamp>_<message>`, with whitespace runs and path separators in
/// the message folded to `-`.
pub fn snapshot_name(stamp: &str, message: &str) -> String {
    let slug = WHITESPACE_RE.replace_all(message, "-").replace(['/', '\\'], "-");
    format!("snapshot_{}_{}", stamp, slug)
}

pub fn hash_file(path: &Path) -> Result<String, SmartOpsError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// `--exclude` arguments for every state directory that lies inside the
/// project, so an archive never contains earlier snapshots, the trash or the
/// backups, nor the archive being written. Directories that do not exist yet
/// hold nothing to exclude.
pub fn archive_excludes(
    project: &Path,
    base: &str,
    state_dirs: &[&Path],
) -> Result<Vec<String>, SmartOpsError> {
    let mut excludes = Vec::new();
    for dir in state_dirs {
        let Ok(dir) = fs::canonicalize(dir) else {
            continue;
        };
        let Ok(rel) = dir.strip_prefix(project) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            return Err(SmartOpsError::ValidationError(format!(
                "cannot snapshot '{}': it is a smartops state directory",
                project.display()
            )));
        }
        let member = std::iter::once(base.to_string())
            .chain(rel.components().map(|c| c.as_os_str().to_string_lossy().to_string()))
            .collect::<Vec<_>>()
            .join("/");
        let arg = format!("--exclude={}", member);
        if !excludes.contains(&arg) {
            excludes.push(arg);
        }
    }
    Ok(excludes)
}

/// Archive `project_path` into `snapshot_dir`. `state_dirs` are the other
/// smartops directories (trash, backups) to keep out of the archive.
pub fn create_snapshot(
    runner: &dyn ProcessRunner,
    snapshot_dir: &Path,
    state_dirs: &[&Path],
    project_path: &str,
    message: Option<&str>,
) -> Result<ToolResult, SmartOpsError> {
    let message = message.unwrap_or(DEFAULT_MESSAGE);
    let project = fs::canonicalize(project_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            SmartOpsError::NotFound(format!("project path '{}' does not exist", project_path))
        }
        _ => SmartOpsError::IoError(e),
    })?;
    let parent = project.parent().unwrap_or(Path::new("/"));
    let base = project.file_name().ok_or_else(|| {
        SmartOpsError::PathError(format!(
            "cannot snapshot '{}': it has no directory name",
            project.display()
        ))
    })?;

    let stamp = time::file_stamp(&time::now());
    let name = snapshot_name(&stamp, message);
    fs::create_dir_all(snapshot_dir)?;
    let archive_path = snapshot_dir.join(format!("{}.{}", name, ARCHIVE_EXT));
    let manifest_path = snapshot_dir.join(format!("{}.json", name));

    let base = base.to_string_lossy().to_string();
    let mut excluded: Vec<&Path> = vec![snapshot_dir];
    excluded.extend_from_slice(state_dirs);
    let excludes = archive_excludes(&project, &base, &excluded)?;

    let mut args = vec!["-czf".to_string(), external_action::path_arg(&archive_path)];
    args.extend(excludes);
    args.extend([
        "-C".to_string(),
        external_action::path_arg(parent),
        base,
    ]);
    if let Err(e) = external_action::run_internal(runner, "tar", &args) {
        if let Err(rm) = fs::remove_file(&archive_path) {
            if rm.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    archive = %archive_path.display(),
                    error = %rm,
                    "could not remove partial archive"
                );
            }
        }
        return Err(e);
    }

    let size = fs::metadata(&archive_path)
        .map_err(|e| {
            SmartOpsError::IoError(io::Error::new(
                e.kind(),
                format!("archive '{}' is missing: {}", archive_path.display(), e),
            ))
        })?
        .len();

    let manifest = SnapshotManifest {
        timestamp: stamp,
        message: message.to_string(),
        project_path: project_path.to_string(),
        snapshot_file: archive_path.to_string_lossy().to_string(),
        size,
        sha256: Some(hash_file(&archive_path)?),
    };
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
    tracing::info!(archive = %manifest.snapshot_file, size, "snapshot created");

    Ok(
        ToolResult::ok(format!("Snapshot created: {}", manifest.snapshot_file))
            .with("manifest", &manifest)
            .with("manifestPath", manifest_path.to_string_lossy()),
    )
}

/// Every snapshot manifest in `snapshot_dir`, oldest first.
pub fn list_snapshots(snapshot_dir: &Path) -> Result<Vec<SnapshotManifest>, SmartOpsError> {
    let entries = match fs::read_dir(snapshot_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut out = Vec::new();
    for path in paths {
        let content = fs::read_to_string(&path)?;
        match serde_json::from_str::<SnapshotManifest>(&content) {
            Ok(m) => out.push(m),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "skipping unreadable snapshot manifest"
            ),
        }
    }
    Ok(out)
}

/// Check presence, size and (when recorded) hash of every archive.
pub fn verify_snapshots(snapshot_dir: &Path) -> Result<Vec<String>, SmartOpsError> {
    let mut failures = Vec::new();
    for manifest in list_snapshots(snapshot_dir)? {
        let archive = Path::new(&manifest.snapshot_file);
        let meta = match fs::metadata(archive) {
            Ok(m) => m,
            Err(_) => {
                failures.push(format!("{}: archive missing", manifest.snapshot_file));
                continue;
            }
        };
        if meta.len() != manifest.size {
            failures.push(format!(
                "{}: size {} does not match manifest size {}",
                manifest.snapshot_file,
                meta.len(),
                manifest.size
            ));
            continue;
        }
        if let Some(expected) = &manifest.sha256 {
            if &hash_file(archive)? != expected {
                failures.push(format!("{}: content hash mismatch", manifest.snapshot_file));
            }
        }
    }
    Ok(failures)
}

#[derive(Parser, Debug)]
#[clap(name = "snapshots", about = "Inspect project snapshots")]
pub struct SnapshotsCli {
    #[clap(subcommand)]
    pub command: SnapshotsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotsCommand {
    /// List snapshot manifests.
    List,
    /// Check every archive against its manifest.
    Verify,
}

pub fn run_snapshots_cli(snapshot_dir: &Path, cli: SnapshotsCli) -> Result<(), SmartOpsError> {
    use colored::Colorize;

    match cli.command {
        SnapshotsCommand::List => {
            let manifests = list_snapshots(snapshot_dir)?;
            if manifests.is_empty() {
                println!("No snapshots in {}", snapshot_dir.display());
            }
            for m in manifests {
                println!(
                    "{} {} {} ({} bytes)",
                    m.timestamp.bright_black(),
                    m.message.bright_white().bold(),
                    m.snapshot_file,
                    m.size
                );
            }
            Ok(())
        }
        SnapshotsCommand::Verify => {
            let failures = verify_snapshots(snapshot_dir)?;
            if failures.is_empty() {
                println!("{} all snapshots verified", "✓".bright_green());
                Ok(())
            } else {
                for f in &failures {
                    println!("{} {}", "✗".bright_red(), f);
                }
                Err(SmartOpsError::ValidationError(format!(
                    "{} snapshot(s) failed verification",
                    failures.len()
                )))
            }
        }
    }
}
