//! Shell command execution tool.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{NanoError, Result};

use super::types::str_arg;
use super::{Tool, ToolContext};

/// Executes non-interactive shell commands with a configured timeout.
///
/// Stdin is closed so commands never block on interactive input. A
/// non-zero exit is reported as an `[exit code N]` line, which the LLM can
/// react to; a timeout kills the process hard.
pub struct ShellTool {
    timeout: Duration,
}

impl ShellTool {
    /// Create a shell tool with a timeout in seconds.
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output. Commands run non-interactively; \
         anything requiring passwords or confirmations will not work."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute",
                },
            },
            "required": ["command"],
        })
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<String> {
        let command = str_arg(&args, "command")
            .ok_or_else(|| NanoError::Tool("missing or invalid command parameter".into()))?;

        let mut cmd = tokio::process::Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(workspace) = &ctx.workspace {
            cmd.current_dir(workspace);
        }

        let mut child = cmd.spawn()?;

        // Drain the pipes concurrently so a chatty command can't fill its
        // pipe buffer and deadlock against wait().
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(drain(stdout_pipe));
        let stderr_task = tokio::spawn(drain(stderr_pipe));

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(NanoError::Cancelled);
            }
            _ = tokio::time::sleep(self.timeout) => {
                let _ = child.kill().await;
                return Err(NanoError::Tool(format!(
                    "command timed out after {:?}", self.timeout
                )));
            }
            status = child.wait() => status?,
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            if !stderr.is_empty() {
                return Ok(format!("[exit code {}] {}", code, stderr));
            }
            if stdout.is_empty() {
                return Ok(format!("[exit code {}] command failed with no output", code));
            }
            return Ok(format!("[exit code {}] {}", code, stdout));
        }

        if stdout.is_empty() {
            return Ok("(command completed successfully with no output)".to_string());
        }
        Ok(stdout)
    }
}

/// Read a child pipe to the end, lossily decoding to UTF-8.
async fn drain<R: tokio::io::AsyncRead + Unpin>(pipe: Option<R>) -> String {
    use tokio::io::AsyncReadExt;

    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).to_string()
}
