//! Shell execution with a safety blocklist, output capture, and a timeout
//! that kills the whole process group.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{info, warn};

use robun_core::Result;

use super::fs::FsPolicy;
use super::{Tool, ToolContext};

const OUTPUT_LIMIT: usize = 10_000;

/// Patterns rejected before the shell is ever invoked.
static BLOCKLIST: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"rm\s+-[rf]{1,2}\b",
        r"(?i)del\s+/[fq]",
        r"(?i)rmdir\s+/s",
        r"(?i)\b(format|mkfs|diskpart)\b",
        r"dd\s+if=",
        r">\s*/dev/sd",
        r"(?i)\b(shutdown|reboot|poweroff)\b",
        r":\(\)\s*\{\s*:\|:&\s*\}\s*;\s*:",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("blocklist pattern"))
    .collect()
});

pub struct ExecTool {
    policy: Arc<FsPolicy>,
    timeout_secs: u64,
}

impl ExecTool {
    pub fn new(policy: Arc<FsPolicy>, timeout_secs: u64) -> Self {
        Self {
            policy,
            timeout_secs,
        }
    }

    fn guard(&self, command: &str) -> Option<String> {
        if BLOCKLIST.iter().any(|re| re.is_match(command)) {
            warn!(command, "blocked dangerous shell command");
            return Some(
                "Error: Command blocked by safety guard (dangerous pattern detected)".into(),
            );
        }
        if self.policy.restricted() && (command.contains("../") || command.contains("..\\")) {
            return Some(
                "Error: Command blocked by safety guard (path traversal outside workspace)".into(),
            );
        }
        None
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Run a non-interactive shell command and return its output"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to execute" },
                "working_dir": { "type": "string", "description": "Working directory (defaults to the workspace)" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Value) -> Result<String> {
        let command = args["command"].as_str().unwrap_or_default();
        if let Some(blocked) = self.guard(command) {
            return Ok(blocked);
        }

        let working_dir = match args["working_dir"].as_str() {
            Some(dir) => match self.policy.resolve(dir) {
                Ok(p) => p,
                Err(e) => return Ok(e),
            },
            None => self.policy.workspace().to_path_buf(),
        };

        info!(command, timeout_secs = self.timeout_secs, "exec");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&working_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return Ok(format!("Error: Failed to start command: {e}")),
        };
        let pid = child.id().unwrap_or(0);

        let output =
            match tokio::time::timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
                .await
            {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Ok(format!("Error: Command failed: {e}")),
                Err(_) => {
                    kill_process_group(pid).await;
                    return Ok(format!(
                        "Error: Command timed out after {}s",
                        self.timeout_secs
                    ));
                }
            };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);

        let mut content = stdout.trim_end().to_string();
        if !stderr.trim().is_empty() {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str("STDERR: ");
            content.push_str(stderr.trim_end());
        }
        if exit_code != 0 {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&format!("Exit code: {exit_code}"));
        }
        if content.is_empty() {
            content = "(no output)".into();
        }
        if content.chars().count() > OUTPUT_LIMIT {
            content = content.chars().take(OUTPUT_LIMIT).collect();
            content.push_str("\n... (output truncated)");
        }
        Ok(content)
    }
}

/// Best-effort kill of the whole process group after a timeout.
async fn kill_process_group(pid: u32) {
    if pid == 0 {
        return;
    }
    #[cfg(unix)]
    {
        let _ = tokio::process::Command::new("kill")
            .args(["-9", &format!("-{pid}")])
            .output()
            .await;
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .output()
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(dir: &std::path::Path, timeout: u64) -> ExecTool {
        ExecTool::new(Arc::new(FsPolicy::new(dir.to_path_buf(), true)), timeout)
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let exec = tool(dir.path(), 10);
        let ctx = ToolContext::default();

        let result = exec
            .execute(&ctx, &json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert_eq!(result, "hello");

        let result = exec
            .execute(&ctx, &json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert!(result.contains("STDERR: oops"));
        assert!(result.contains("Exit code: 3"));
    }

    #[tokio::test]
    async fn blocklist_rejects_without_running() {
        let dir = tempfile::tempdir().unwrap();
        let exec = tool(dir.path(), 10);
        let ctx = ToolContext::default();

        for command in [
            "rm -rf /",
            "rm -r /tmp/x",
            "sudo shutdown now",
            "dd if=/dev/zero of=/dev/sda",
            "mkfs.ext4 /dev/sda1",
            ":(){ :|:& };:",
            "echo hi > /dev/sda",
        ] {
            let result = exec
                .execute(&ctx, &json!({"command": command}))
                .await
                .unwrap();
            assert!(
                result.contains("Error: Command blocked by safety guard"),
                "expected block for {command:?}, got {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn traversal_rejected_when_restricted() {
        let dir = tempfile::tempdir().unwrap();
        let exec = tool(dir.path(), 10);
        let result = exec
            .execute(
                &ToolContext::default(),
                &json!({"command": "cat ../secret.txt"}),
            )
            .await
            .unwrap();
        assert!(result.contains("Error: Command blocked by safety guard"));
    }

    #[tokio::test]
    async fn timeout_surfaces_as_error_string() {
        let dir = tempfile::tempdir().unwrap();
        let exec = tool(dir.path(), 1);
        let result = exec
            .execute(&ToolContext::default(), &json!({"command": "sleep 5"}))
            .await
            .unwrap();
        assert!(result.contains("timed out after 1s"));
    }

    #[tokio::test]
    async fn runs_in_workspace_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let exec = tool(dir.path(), 10);
        let result = exec
            .execute(&ToolContext::default(), &json!({"command": "ls"}))
            .await
            .unwrap();
        assert!(result.contains("marker.txt"));
    }
}
