//! Runtime configuration for the guard-rail tools.
//!
//! Every directory a tool touches comes from here and is injected into the
//! dispatcher. Defaults hang off the workspace's `.smartops/` state root; an
//! optional `config.toml` overlays them and CLI flags override the file.

use crate::core::error::SmartOpsError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".smartops";
pub const CONFIG_FILE: &str = "config.toml";
pub const REPORT_FILE: &str = "BREAKING_CHANGES.md";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const OPERATION_LOG_FILE: &str = "operations.log";

/// Executables `force_operation` may spawn unless the config says otherwise.
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    "mv", "cp", "git", "npm", "node", "yarn", "pnpm", "prettier", "eslint", "jest", "pytest",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub trash_dir: PathBuf,
    pub backup_dir: PathBuf,
    /// Defaults to `<backup_dir>/snapshots` when unset.
    pub snapshot_dir: Option<PathBuf>,
    pub report_path: PathBuf,
    pub allowed_commands: Vec<String>,
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    trash_dir: Option<PathBuf>,
    backup_dir: Option<PathBuf>,
    snapshot_dir: Option<PathBuf>,
    report_path: Option<PathBuf>,
    allowed_commands: Option<Vec<String>>,
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub trash_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

impl Config {
    /// Defaults for a workspace: state under `<workspace>/.smartops/`, report
    /// beside the workspace sources.
    pub fn for_workspace(workspace: &Path) -> Self {
        let state = workspace.join(STATE_DIR);
        Self {
            trash_dir: state.join("trash"),
            backup_dir: state.join("backups"),
            snapshot_dir: None,
            report_path: workspace.join(REPORT_FILE),
            allowed_commands: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }

    /// Resolve the effective config. An explicit `config_path` must exist;
    /// otherwise `<workspace>/.smartops/config.toml` is used when present.
    pub fn load(
        workspace: &Path,
        config_path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, SmartOpsError> {
        let mut config = Self::for_workspace(workspace);

        let file_path = match config_path {
            Some(p) => {
                if !p.exists() {
                    return Err(SmartOpsError::ConfigError(format!(
                        "config file '{}' does not exist",
                        p.display()
                    )));
                }
                Some(p.to_path_buf())
            }
            None => {
                let default_path = workspace.join(STATE_DIR).join(CONFIG_FILE);
                default_path.exists().then_some(default_path)
            }
        };

        if let Some(path) = file_path {
            let content = std::fs::read_to_string(&path)?;
            let file: ConfigFile = toml::from_str(&content)?;
            config.apply_file(workspace, file)?;
            tracing::debug!(path = %path.display(), "loaded config file");
        }

        let resolve = |p: &PathBuf| resolve_against(workspace, p);
        if let Some(p) = &overrides.trash_dir {
            config.trash_dir = resolve(p);
        }
        if let Some(p) = &overrides.backup_dir {
            config.backup_dir = resolve(p);
        }
        if let Some(p) = &overrides.report_path {
            config.report_path = resolve(p);
        }

        Ok(config)
    }

    fn apply_file(&mut self, workspace: &Path, file: ConfigFile) -> Result<(), SmartOpsError> {
        if let Some(p) = file.trash_dir {
            self.trash_dir = resolve_against(workspace, &p);
        }
        if let Some(p) = file.backup_dir {
            self.backup_dir = resolve_against(workspace, &p);
        }
        if let Some(p) = file.snapshot_dir {
            self.snapshot_dir = Some(resolve_against(workspace, &p));
        }
        if let Some(p) = file.report_path {
            self.report_path = resolve_against(workspace, &p);
        }
        if let Some(commands) = file.allowed_commands {
            if let Some(bad) = commands.iter().find(|c| c.trim().is_empty()) {
                return Err(SmartOpsError::ConfigError(format!(
                    "allowed_commands contains an empty entry: {:?}",
                    bad
                )));
            }
            self.allowed_commands = commands;
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.backup_dir.join(MANIFEST_FILE)
    }

    pub fn operation_log_path(&self) -> PathBuf {
        self.backup_dir.join(OPERATION_LOG_FILE)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(|| self.backup_dir.join("snapshots"))
    }
}

fn resolve_against(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
