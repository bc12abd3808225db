//! Local execution on the control node.
//!
//! Used for the recipe's local steps (extracting downloaded backups,
//! running the local restore) and whenever a host resolves to the control
//! node itself.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use super::{CommandResult, Connection, ConnectionError, ConnectionResult, ExecuteOptions};

/// Connection that runs commands on the current host.
#[derive(Debug, Clone)]
pub struct LocalConnection {
    identifier: String,
}

impl LocalConnection {
    /// Create a new local connection.
    pub fn new() -> Self {
        let identifier = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        Self { identifier }
    }
}

impl Default for LocalConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn is_alive(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        command: &str,
        options: ExecuteOptions,
    ) -> ConnectionResult<CommandResult> {
        trace!(command = %command, "executing local command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let run = async {
            let output = cmd.output().await.map_err(|e| {
                ConnectionError::ExecutionFailed(format!("failed to spawn shell: {}", e))
            })?;

            let exit_code = output.status.code().unwrap_or(-1);
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();

            if exit_code == 0 {
                Ok(CommandResult::success(stdout, stderr))
            } else {
                Ok(CommandResult::failure(exit_code, stdout, stderr))
            }
        };

        match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .map_err(|_| ConnectionError::Timeout(timeout.as_secs()))?,
            None => run.await,
        }
    }

    async fn upload(&self, local_path: &Path, remote_path: &Path) -> ConnectionResult<()> {
        if let Some(parent) = remote_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ConnectionError::TransferFailed(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        tokio::fs::copy(local_path, remote_path).await.map_err(|e| {
            ConnectionError::TransferFailed(format!(
                "failed to copy {} to {}: {}",
                local_path.display(),
                remote_path.display(),
                e
            ))
        })?;
        Ok(())
    }

    async fn download(&self, remote_path: &Path, local_path: &Path) -> ConnectionResult<()> {
        // Transfer directions collapse for a local target.
        self.upload(remote_path, local_path).await
    }

    async fn close(&self) -> ConnectionResult<()> {
        Ok(())
    }
}
