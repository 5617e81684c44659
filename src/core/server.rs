//! Tool dispatch and the MCP stdio server.
//!
//! [`Dispatcher`] owns the injected collaborators (config, record stores,
//! subprocess runner, API analyzer) and routes one [`ToolCall`] to its tool.
//! Tool failures come back as `success: false` envelopes; only an unknown tool
//! name escapes as an error.
//!
//! [`McpServer`] frames the dispatcher as JSON-RPC 2.0, one message per line.
//! It handles one request at a time in arrival order.

use crate::core::config::Config;
use crate::core::error::SmartOpsError;
use crate::core::external_action::{self, ProcessRunner, SystemRunner};
use crate::core::rpc::{
    self, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, RpcError, RpcRequest,
    RpcResponse, ToolResult,
};
use crate::core::store::{BackupManifest, OperationLog};
use crate::core::tools::{self, ToolCall, ToolName};
use crate::plugins::api_changes::{self, ApiAnalyzer, LexicalAnalyzer};
use crate::plugins::{backup, quarantine, snapshot};
use serde_json::Value;
use std::io::{BufRead, Write};

pub const SERVER_NAME: &str = "smart-operations";
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub struct Dispatcher {
    config: Config,
    manifest: BackupManifest,
    oplog: OperationLog,
    runner: Box<dyn ProcessRunner>,
    analyzer: Box<dyn ApiAnalyzer>,
}

impl Dispatcher {
    /// File-backed stores under the configured backup directory, real
    /// subprocesses and the lexical analyzer.
    pub fn new(config: Config) -> Self {
        let manifest = BackupManifest::open(config.manifest_path());
        let oplog = OperationLog::open(config.operation_log_path());
        Self {
            config,
            manifest,
            oplog,
            runner: Box::new(SystemRunner),
            analyzer: Box::new(LexicalAnalyzer),
        }
    }

    pub fn with_runner(mut self, runner: Box<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Box<dyn ApiAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_manifest(mut self, manifest: BackupManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_operation_log(mut self, oplog: OperationLog) -> Self {
        self.oplog = oplog;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manifest(&self) -> &BackupManifest {
        &self.manifest
    }

    pub fn operation_log(&self) -> &OperationLog {
        &self.oplog
    }

    /// Resolve `name` and run it. `Err` only for an unknown tool name.
    pub fn dispatch(&self, name: &str, args: &Value) -> Result<ToolResult, SmartOpsError> {
        let tool: ToolName = name.parse()?;
        Ok(self.dispatch_tool(tool, args))
    }

    pub fn dispatch_tool(&self, tool: ToolName, args: &Value) -> ToolResult {
        match ToolCall::from_args(tool, args) {
            Ok(call) => self.execute(call),
            Err(e) => {
                tracing::debug!(tool = %tool, error = %e, "rejected tool arguments");
                e.into()
            }
        }
    }

    pub fn execute(&self, call: ToolCall) -> ToolResult {
        let tool = call.tool();
        let outcome = match call {
            ToolCall::SafeDelete(a) => {
                quarantine::safe_delete(&a.filepath, &self.config.trash_dir, &self.oplog)
            }
            ToolCall::VersionedBackup(a) => backup::versioned_backup(
                &a.filepath,
                a.reason.as_deref(),
                &self.config.backup_dir,
                &self.manifest,
            ),
            ToolCall::DetectApiChanges(a) => api_changes::detect_api_changes(
                self.analyzer.as_ref(),
                &a.old_file,
                &a.new_file,
                &self.config.report_path,
            ),
            ToolCall::ForceOperation(a) => external_action::force_operation(
                self.runner.as_ref(),
                &self.config.allowed_commands,
                &a.command,
                &a.args,
            ),
            ToolCall::CreateSnapshot(a) => snapshot::create_snapshot(
                self.runner.as_ref(),
                &self.config.snapshot_dir(),
                &[self.config.trash_dir.as_path(), self.config.backup_dir.as_path()],
                &a.project_path,
                a.message.as_deref(),
            ),
        };
        outcome.unwrap_or_else(|e| {
            tracing::debug!(tool = %tool, error = %e, "tool failed");
            e.into()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Handling(ToolName),
}

pub struct McpServer {
    dispatcher: Dispatcher,
    state: ServerState,
}

fn rpc_error(code: i64, message: impl Into<String>) -> RpcError {
    RpcError {
        code,
        message: message.into(),
        data: None,
    }
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            state: ServerState::Idle,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one raw line. `None` when nothing should be written back.
    pub fn handle_line(&mut self, line: &str) -> Option<RpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                return Some(rpc::error_response(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };
        let id_hint = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<RpcRequest>(value) {
            Ok(request) => self.handle_request(request),
            Err(e) => Some(rpc::error_response(
                id_hint,
                INVALID_REQUEST,
                format!("Invalid request: {}", e),
            )),
        }
    }

    pub fn handle_request(&mut self, request: RpcRequest) -> Option<RpcResponse> {
        let Some(id) = request.id.clone() else {
            tracing::debug!(method = %request.method, "notification");
            return None;
        };
        let outcome = match request.method.as_str() {
            "initialize" => Ok(initialize_result(&request.params)),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => Ok(tools::catalogue()),
            "tools/call" => self.call_tool(&request.params),
            other => Err(rpc_error(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        };
        Some(match outcome {
            Ok(result) => rpc::success_response(id, result),
            Err(error) => RpcResponse {
                jsonrpc: rpc::JSONRPC_VERSION.to_string(),
                id,
                result: None,
                error: Some(error),
            },
        })
    }

    fn call_tool(&mut self, params: &Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| rpc_error(INVALID_PARAMS, "tools/call requires a string 'name'"))?;
        let tool: ToolName = name.parse().map_err(|e: SmartOpsError| {
            tracing::warn!(name, "unknown tool requested");
            rpc_error(INVALID_PARAMS, e.to_string())
        })?;
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);

        self.state = ServerState::Handling(tool);
        let result = self.dispatcher.dispatch_tool(tool, &args);
        self.state = ServerState::Idle;

        tracing::info!(tool = %tool, success = result.success, "tool call finished");
        Ok(rpc::tool_call_result(&result))
    }

    /// Read requests until EOF, writing one response line per request.
    pub fn serve<R: BufRead, W: Write>(
        &mut self,
        reader: R,
        mut writer: W,
    ) -> Result<(), SmartOpsError> {
        tracing::info!(server = SERVER_NAME, "serving on stdio");
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(line) {
                serde_json::to_writer(&mut writer, &response)?;
                writer.write_all(b"\n")?;
                writer.flush()?;
            }
        }
        tracing::info!("stdin closed, shutting down");
        Ok(())
    }
}

fn initialize_result(params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);
    serde_json::json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": {} },
        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
    })
}
