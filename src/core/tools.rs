//! The closed tool catalogue.
//!
//! Tool names on the wire map onto [`ToolName`]; arguments are deserialized
//! into one typed struct per tool, producing a [`ToolCall`] the dispatcher
//! matches exhaustively.

use crate::core::error::SmartOpsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SafeDelete,
    VersionedBackup,
    DetectApiChanges,
    ForceOperation,
    CreateSnapshot,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::SafeDelete,
        ToolName::VersionedBackup,
        ToolName::DetectApiChanges,
        ToolName::ForceOperation,
        ToolName::CreateSnapshot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::SafeDelete => "safe_delete",
            ToolName::VersionedBackup => "versioned_backup",
            ToolName::DetectApiChanges => "detect_api_changes",
            ToolName::ForceOperation => "force_operation",
            ToolName::CreateSnapshot => "create_snapshot",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolName::SafeDelete => "Move to trash instead of permanent delete",
            ToolName::VersionedBackup => "Create versioned backup with git-like naming",
            ToolName::DetectApiChanges => "Detect breaking changes in APIs/functions",
            ToolName::ForceOperation => "Execute an allow-listed command without prompts",
            ToolName::CreateSnapshot => "Create full project snapshot",
        }
    }

    pub fn input_schema(self) -> Value {
        let string = serde_json::json!({ "type": "string" });
        let (properties, required) = match self {
            ToolName::SafeDelete => (serde_json::json!({ "filepath": string }), vec!["filepath"]),
            ToolName::VersionedBackup => (
                serde_json::json!({ "filepath": string, "reason": string }),
                vec!["filepath"],
            ),
            ToolName::DetectApiChanges => (
                serde_json::json!({ "oldFile": string, "newFile": string }),
                vec!["oldFile", "newFile"],
            ),
            ToolName::ForceOperation => (
                serde_json::json!({
                    "command": string,
                    "args": { "type": "array", "items": { "type": "string" } }
                }),
                vec!["command"],
            ),
            ToolName::CreateSnapshot => (
                serde_json::json!({ "projectPath": string, "message": string }),
                vec!["projectPath"],
            ),
        };
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn descriptor(self) -> Value {
        serde_json::json!({
            "name": self.as_str(),
            "description": self.description(),
            "inputSchema": self.input_schema(),
        })
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = SmartOpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SmartOpsError::UnknownTool(s.to_string()))
    }
}

/// `tools/list` payload.
pub fn catalogue() -> Value {
    let tools: Vec<Value> = ToolName::ALL.iter().map(|t| t.descriptor()).collect();
    serde_json::json!({ "tools": tools })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeDeleteArgs {
    pub filepath: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedBackupArgs {
    pub filepath: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectApiChangesArgs {
    pub old_file: String,
    pub new_file: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceOperationArgs {
    pub command: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotArgs {
    pub project_path: String,
    #[serde(default)]
    pub message: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    SafeDelete(SafeDeleteArgs),
    VersionedBackup(VersionedBackupArgs),
    DetectApiChanges(DetectApiChangesArgs),
    ForceOperation(ForceOperationArgs),
    CreateSnapshot(CreateSnapshotArgs),
}

impl ToolCall {
    /// Validate `args` against the tool's argument shape. A missing or
    /// ill-typed argument is a `ValidationError`.
    pub fn from_args(tool: ToolName, args: &Value) -> Result<Self, SmartOpsError> {
        let args = match args {
            Value::Null => Value::Object(Default::default()),
            Value::Object(_) => args.clone(),
            other => {
                return Err(SmartOpsError::ValidationError(format!(
                    "arguments for '{}' must be an object, got {}",
                    tool,
                    json_kind(other)
                )));
            }
        };
        let invalid = |e: serde_json::Error| {
            SmartOpsError::ValidationError(format!("invalid arguments for '{}': {}", tool, e))
        };
        Ok(match tool {
            ToolName::SafeDelete => {
                ToolCall::SafeDelete(serde_json::from_value(args).map_err(invalid)?)
            }
            ToolName::VersionedBackup => {
                ToolCall::VersionedBackup(serde_json::from_value(args).map_err(invalid)?)
            }
            ToolName::DetectApiChanges => {
                ToolCall::DetectApiChanges(serde_json::from_value(args).map_err(invalid)?)
            }
            ToolName::ForceOperation => {
                ToolCall::ForceOperation(serde_json::from_value(args).map_err(invalid)?)
            }
            ToolName::CreateSnapshot => {
                ToolCall::CreateSnapshot(serde_json::from_value(args).map_err(invalid)?)
            }
        })
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolCall::SafeDelete(_) => ToolName::SafeDelete,
            ToolCall::VersionedBackup(_) => ToolName::VersionedBackup,
            ToolCall::DetectApiChanges(_) => ToolName::DetectApiChanges,
            ToolCall::ForceOperation(_) => ToolName::ForceOperation,
            ToolCall::CreateSnapshot(_) => ToolName::CreateSnapshot,
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
