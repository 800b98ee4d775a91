//! cmd_run — foreground shell command execution.
//!
//! Runs `sh -c <command>` in the session workspace, captures combined
//! stdout/stderr, and honors both the per-call timeout and the session's
//! cooperative cancel signal. A non-zero exit is reported as a tool error
//! so the agent sees the failure and can adjust.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;

use axon_domain::tool::ToolOutput;
use axon_domain::{Error, Result};

use crate::spec::{Tool, ToolContext};

/// Default per-call timeout; callers may lower it via `timeout_sec`.
const DEFAULT_TIMEOUT_SEC: u64 = 120;
/// Interval at which the cancel flag is polled while the child runs.
const CANCEL_POLL_MS: u64 = 50;

pub struct CmdRunTool;

#[async_trait::async_trait]
impl Tool for CmdRunTool {
    fn name(&self) -> &str {
        "cmd_run"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace and return its combined output. \
         Fails when the command exits non-zero."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to execute" },
                "timeout_sec": { "type": "integer", "description": "Hard timeout in seconds" }
            },
            "required": ["command"]
        })
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(DEFAULT_TIMEOUT_SEC))
    }

    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let command = input["command"].as_str().unwrap_or_default();
        let timeout = Duration::from_secs(
            input["timeout_sec"]
                .as_u64()
                .unwrap_or(DEFAULT_TIMEOUT_SEC),
        );

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.workspace_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ToolExecution(format!("failed to spawn '{command}': {e}")))?;

        // Drain the pipes concurrently so a chatty child never fills one
        // and deadlocks against our wait().
        let stdout_task = spawn_reader(child.stdout.take());
        let stderr_task = spawn_reader(child.stderr.take());

        let deadline = tokio::time::Instant::now() + timeout;
        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|e| {
                        Error::ToolExecution(format!("failed to wait for '{command}': {e}"))
                    })?;
                }
                _ = tokio::time::sleep(Duration::from_millis(CANCEL_POLL_MS)) => {
                    if ctx.cancel.is_cancelled() {
                        let _ = child.kill().await;
                        return Err(Error::Cancelled(format!("command '{command}' aborted")));
                    }
                    if tokio::time::Instant::now() >= deadline {
                        let _ = child.kill().await;
                        return Err(Error::Timeout(format!(
                            "command '{command}' exceeded {}s", timeout.as_secs()
                        )));
                    }
                }
            }
        };

        let mut output = String::new();
        output.push_str(&String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()));
        output.push_str(&String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()));

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            return Err(Error::ToolExecution(format!(
                "command exited with code {code}: {}",
                output.trim_end()
            )));
        }

        Ok(ToolOutput::Text(output))
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> tokio::task::JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        use tokio::io::AsyncReadExt;
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use tempfile::TempDir;

    fn ctx(ws: &TempDir) -> ToolContext {
        ToolContext::new("s1", ws.path())
    }

    #[tokio::test]
    async fn captures_stdout() {
        let ws = TempDir::new().unwrap();
        let out = CmdRunTool
            .run(serde_json::json!({ "command": "echo hello" }), &ctx(&ws))
            .await
            .unwrap();
        assert_eq!(out.into_text().trim(), "hello");
    }

    #[tokio::test]
    async fn runs_in_the_workspace() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("marker.txt"), "here").unwrap();
        let out = CmdRunTool
            .run(serde_json::json!({ "command": "cat marker.txt" }), &ctx(&ws))
            .await
            .unwrap();
        assert_eq!(out.into_text(), "here");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let ws = TempDir::new().unwrap();
        let err = CmdRunTool
            .run(
                serde_json::json!({ "command": "echo boom >&2; exit 3" }),
                &ctx(&ws),
            )
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("code 3"), "{msg}");
        assert!(msg.contains("boom"), "{msg}");
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let ws = TempDir::new().unwrap();
        let err = CmdRunTool
            .run(
                serde_json::json!({ "command": "sleep 30", "timeout_sec": 1 }),
                &ctx(&ws),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn cancellation_aborts_a_running_command() {
        let ws = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        let ctx = ToolContext::new("s1", ws.path()).with_cancel(cancel.clone());

        let handle = tokio::spawn(async move {
            CmdRunTool
                .run(serde_json::json!({ "command": "sleep 30" }), &ctx)
                .await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }
}
