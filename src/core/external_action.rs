//! Allow-listed broker for external commands.
//!
//! The allow-list is advisory: it limits which executables an agent can name,
//! it is not a sandbox. Commands run without a shell, with stdin closed, and
//! the caller is suspended until the child exits. There is no timeout, so a
//! child that never exits blocks the request.

use crate::core::error::SmartOpsError;
use crate::core::rpc::ToolResult;
use std::io;
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Subprocess collaborator. Swapped out in tests to observe spawns.
pub trait ProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<Output>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<Output> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
    }
}

/// Flag prepended for commands that would otherwise prompt before clobbering.
pub fn force_flag(command: &str) -> Option<&'static str> {
    match command {
        "mv" | "cp" => Some("-f"),
        _ => None,
    }
}

pub fn is_allowed(allowed: &[String], command: &str) -> bool {
    allowed.iter().any(|c| c == command)
}

/// Final argument vector: force flag (if any) followed by the caller's args.
pub fn forced_args(command: &str, args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len() + 1);
    if let Some(flag) = force_flag(command) {
        out.push(flag.to_string());
    }
    out.extend(args.iter().cloned());
    out
}

pub fn render_command_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `command` if it is allow-listed and report its captured output.
pub fn force_operation(
    runner: &dyn ProcessRunner,
    allowed: &[String],
    command: &str,
    args: &[String],
) -> Result<ToolResult, SmartOpsError> {
    if !is_allowed(allowed, command) {
        tracing::warn!(command, "external action denied");
        return Err(SmartOpsError::ValidationError(format!(
            "Command '{}' not in whitelist",
            command
        )));
    }

    let argv = forced_args(command, args);
    let line = render_command_line(command, &argv);
    tracing::info!(command = %line, "running external action");

    let output = run_internal(runner, command, &argv)?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    Ok(ToolResult::ok(format!("Executed: {}", line))
        .with("stdout", stdout)
        .with("stderr", stderr)
        .with("command", line))
}

/// Spawn `program` and fail on a spawn error or non-zero exit. No allow-list
/// check; helpers such as `tar` go through here directly.
pub fn run_internal(
    runner: &dyn ProcessRunner,
    program: &str,
    args: &[String],
) -> Result<Output, SmartOpsError> {
    let output = runner.run(program, args).map_err(|e| {
        SmartOpsError::ProcessError(format!("Failed to spawn '{}': {}", program, e))
    })?;
    if !output.status.success() {
        return Err(SmartOpsError::ProcessError(format!(
            "Command failed: {} (exit code {}): {}",
            render_command_line(program, args),
            output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}

pub fn path_arg(p: &Path) -> String {
    p.to_string_lossy().to_string()
}
