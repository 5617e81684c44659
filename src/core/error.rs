use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmartOpsError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Failed to parse config: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Path error: {0}")]
    PathError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    ProcessError(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl SmartOpsError {
    /// Whether this error must surface at the protocol level instead of being
    /// folded into a failure envelope.
    pub fn is_protocol_fatal(&self) -> bool {
        matches!(self, SmartOpsError::UnknownTool(_))
    }
}
