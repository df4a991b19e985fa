//! External command execution shared by the deploy and test invokers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

use crate::error::{PromoteError, Result};
use crate::profile::EnvironmentProfile;

/// Maximum number of bytes of stdout/stderr kept per invocation.
pub const OUTPUT_TAIL_BYTES: usize = 16 * 1024;

/// An external command and how to run it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    /// Command to execute (first element is executable).
    ///
    /// Arguments may contain `{env}`, `{catalog}`, `{schema}` and
    /// `{test_path}` placeholders, filled from the active profile.
    pub command: Vec<String>,

    /// Timeout in seconds; 0 leaves timing out to the command itself.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Working directory (default: current directory).
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            timeout_secs: 0,
            working_dir: None,
        }
    }

    /// Arguments with profile placeholders substituted.
    pub fn render(&self, profile: &EnvironmentProfile) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{env}", profile.name.as_str())
                    .replace("{catalog}", &profile.catalog)
                    .replace("{schema}", &profile.schema)
                    .replace("{test_path}", &profile.test_path)
            })
            .collect()
    }
}

/// Captured result of one external command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvocationOutput {
    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Tail of captured stdout.
    pub stdout: String,

    /// Tail of captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl InvocationOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `args` with `envs` added to the inherited environment.
pub async fn run_command(
    spec: &CommandSpec,
    args: &[String],
    envs: &[(&str, String)],
) -> Result<InvocationOutput> {
    let start = Instant::now();

    let (exe, rest) = args
        .split_first()
        .ok_or_else(|| PromoteError::Invocation("empty command".to_string()))?;

    let mut cmd = Command::new(exe);
    cmd.args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    let child = cmd
        .spawn()
        .map_err(|e| PromoteError::Invocation(format!("failed to spawn '{}': {}", exe, e)))?;

    let output = if spec.timeout_secs > 0 {
        tokio::time::timeout(
            std::time::Duration::from_secs(spec.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| {
            PromoteError::Invocation(format!(
                "'{}' timed out after {} seconds",
                exe, spec.timeout_secs
            ))
        })??
    } else {
        child.wait_with_output().await?
    };

    Ok(InvocationOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: tail(&String::from_utf8_lossy(&output.stdout)),
        stderr: tail(&String::from_utf8_lossy(&output.stderr)),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Keep the last [`OUTPUT_TAIL_BYTES`] of `text`, on a char boundary.
fn tail(text: &str) -> String {
    if text.len() <= OUTPUT_TAIL_BYTES {
        return text.to_string();
    }
    let mut cut = text.len() - OUTPUT_TAIL_BYTES;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text[cut..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::EnvironmentName;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let spec = CommandSpec::new(vec![
            "databricks".to_string(),
            "bundle".to_string(),
            "deploy".to_string(),
            "--target".to_string(),
            "{env}".to_string(),
            "--var=catalog={catalog}".to_string(),
        ]);
        let profile = EnvironmentProfile::builtin(EnvironmentName::Stage);
        let args = spec.render(&profile);
        assert_eq!(args[4], "stage");
        assert_eq!(args[5], "--var=catalog=stage_catalog");
    }

    #[test]
    fn test_tail_keeps_short_text() {
        assert_eq!(tail("hello"), "hello");
    }

    #[test]
    fn test_tail_truncates_long_text() {
        let long = "x".repeat(OUTPUT_TAIL_BYTES + 10);
        assert_eq!(tail(&long).len(), OUTPUT_TAIL_BYTES);
    }

    #[tokio::test]
    async fn test_run_command_captures_output_and_env() {
        let spec = CommandSpec::new(Vec::new());
        let out = run_command(&spec, &sh("echo \"$GREETING\""), &[("GREETING", "hello".to_string())])
            .await
            .expect("run");
        assert!(out.succeeded());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_command_reports_exit_code() {
        let spec = CommandSpec::new(Vec::new());
        let out = run_command(&spec, &sh("echo boom >&2; exit 3"), &[])
            .await
            .expect("run");
        assert_eq!(out.exit_code, 3);
        assert!(out.stderr.contains("boom"));
    }

    #[tokio::test]
    async fn test_run_command_empty_command() {
        let spec = CommandSpec::new(Vec::new());
        let err = run_command(&spec, &[], &[]).await.unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let spec = CommandSpec {
            timeout_secs: 1,
            ..CommandSpec::new(Vec::new())
        };
        let err = run_command(&spec, &sh("sleep 5"), &[]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_command_uses_working_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("marker.txt"), b"here").expect("write");
        let spec = CommandSpec {
            working_dir: Some(dir.path().to_path_buf()),
            ..CommandSpec::new(Vec::new())
        };
        let out = run_command(&spec, &sh("cat marker.txt"), &[])
            .await
            .expect("run");
        assert_eq!(out.stdout, "here");
    }

    #[tokio::test]
    async fn test_run_command_missing_executable() {
        let spec = CommandSpec::new(Vec::new());
        let args = vec!["mlpromote-no-such-binary".to_string()];
        let err = run_command(&spec, &args, &[]).await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
