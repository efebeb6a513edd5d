//! Thin wrapper around `tokio::process::Command` with captured output and
//! uniform error mapping.

use std::process::Output;

use tokio::process::Command;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a command and return trimmed stdout; non-zero exit is an error
    /// carrying stderr.
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = self.output(program, args, &[]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(
                program = program,
                args = ?args,
                code = output.status.code(),
                stderr = %stderr,
                "Command failed"
            );
            return Err(Error::internal(format!("{} failed: {}", program, stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a command with extra environment variables
    pub async fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<String> {
        let output = self.output(program, args, env).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(program = program, stderr = %stderr, "Command failed");
            return Err(Error::internal(format!("{} failed: {}", program, stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a command and return its exit code along with combined output.
    /// Used where specific exit codes carry meaning (pg_ctl status).
    pub async fn run_status(&self, program: &str, args: &[&str]) -> Result<(i32, String)> {
        let output = self.output(program, args, &[]).await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok((output.status.code().unwrap_or(-1), combined))
    }

    async fn output(&self, program: &str, args: &[&str], env: &[(&str, &str)]) -> Result<Output> {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        for (key, value) in env {
            command.env(key, value);
        }

        tracing::debug!(program = program, args = ?args, "Running command");

        command
            .output()
            .await
            .map_err(|e| Error::io(e, format!("Failed to execute '{}'", program)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_stdout() {
        let runner = CommandRunner::new();
        let out = runner.run("echo", &["hello"]).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn run_fails_on_nonzero_exit() {
        let runner = CommandRunner::new();
        assert!(runner.run("false", &[]).await.is_err());
    }

    #[tokio::test]
    async fn run_status_reports_exit_code() {
        let runner = CommandRunner::new();
        let (code, _) = runner.run_status("false", &[]).await.unwrap();
        assert_ne!(code, 0);
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let runner = CommandRunner::new();
        let err = runner.run("definitely-not-a-real-binary", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
