//! One external-process invocation per tool call.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;

use tg_domain::config::{CliConfig, CliTimeouts};
use tg_domain::trace::TraceEvent;

use crate::catalog::{TimeoutClass, ToolSpec, INIT_TOOL};
use crate::error::CommandError;

/// Captured output of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Builds and runs `<program> <subcommand> <args...>` through `sh -c`.
#[derive(Debug, Clone)]
pub struct CommandAdapter {
    program: String,
    marker_dir: String,
    timeouts: CliTimeouts,
}

impl CommandAdapter {
    pub fn new(program: impl Into<String>, marker_dir: impl Into<String>, timeouts: CliTimeouts) -> Self {
        Self {
            program: program.into(),
            marker_dir: marker_dir.into(),
            timeouts,
        }
    }

    pub fn from_config(cfg: &CliConfig) -> Self {
        Self::new(cfg.program.clone(), cfg.marker_dir.clone(), cfg.timeouts.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout_for(&self, class: TimeoutClass) -> Duration {
        let secs = match class {
            TimeoutClass::Read => self.timeouts.read_secs,
            TimeoutClass::Write => self.timeouts.write_secs,
            TimeoutClass::Init => self.timeouts.init_secs,
        };
        Duration::from_secs(secs)
    }

    /// The full line handed to `sh -c`. The program is inserted verbatim.
    pub fn command_line(&self, tool: &ToolSpec, args: &Value) -> Result<String, CommandError> {
        let mut line = format!("{} {}", self.program, tool.subcommand);
        for word in tool.render_args(args)? {
            line.push(' ');
            line.push_str(&word);
        }
        Ok(line)
    }

    /// Fail fast when the working directory is missing, or when the project
    /// marker is absent for anything but the init tool.
    pub async fn check_ready(&self, cwd: &Path, tool: &ToolSpec) -> Result<(), CommandError> {
        if !is_dir(cwd).await {
            return Err(CommandError::MissingWorkdir(cwd.display().to_string()));
        }
        if tool.requires_marker() && !is_dir(&cwd.join(&self.marker_dir)).await {
            return Err(CommandError::NotInitialized {
                cwd: cwd.display().to_string(),
                marker: self.marker_dir.clone(),
                init_tool: INIT_TOOL.into(),
            });
        }
        Ok(())
    }

    /// Run one tool invocation in `cwd`.
    ///
    /// The child is killed if the class timeout elapses. stderr is logged
    /// but only a non-zero exit counts as failure.
    pub async fn invoke(
        &self,
        cwd: &Path,
        tool: &ToolSpec,
        args: &Value,
    ) -> Result<CommandOutput, CommandError> {
        self.check_ready(cwd, tool).await?;
        let line = self.command_line(tool, args)?;
        let limit = self.timeout_for(tool.class);

        tracing::debug!(tool = tool.name, cwd = %cwd.display(), command = %line, "invoking CLI");
        let started = Instant::now();

        let child = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::Spawn(e.to_string()))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| CommandError::Spawn(e.to_string()))?,
            Err(_) => {
                tracing::warn!(tool = tool.name, timeout_secs = limit.as_secs(), "CLI invocation timed out");
                emit_invoked(tool, None, started);
                return Err(CommandError::Timeout(limit.as_secs()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.trim().is_empty() {
            tracing::debug!(tool = tool.name, stderr = %stderr.trim(), "CLI stderr");
        }
        emit_invoked(tool, output.status.code(), started);

        if !output.status.success() {
            return Err(CommandError::Exit {
                code: output.status.code(),
                stderr,
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

fn emit_invoked(tool: &ToolSpec, exit_code: Option<i32>, started: Instant) {
    TraceEvent::CommandInvoked {
        tool: tool.name.to_owned(),
        exit_code,
        duration_ms: started.elapsed().as_millis() as u64,
    }
    .emit();
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
