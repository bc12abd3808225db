//! Connection layer for remote host communication.
//!
//! A [`Connection`] executes commands and transfers files on one host.
//! Two transports exist: SSH via russh (the `russh` feature, default) and
//! local execution on the control node. The [`ConnectionFactory`] pools
//! one connection per host within an invocation and retries the initial
//! connect a bounded number of times with exponential backoff. Command
//! failures are never retried; only establishing the session is.

pub mod local;

#[cfg(feature = "russh")]
pub mod russh;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

pub use crate::config::SshSettings;
use crate::inventory::Host;

/// Errors that can occur during connection operations.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to establish the initial connection to the host.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication was rejected by the remote host.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command execution failed at the transport level (distinct from a
    /// nonzero exit code, which is a successful execution).
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// File upload or download failed.
    #[error("File transfer failed: {0}")]
    TransferFailed(String),

    /// Connection or command timed out.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// Connection was closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Configuration is invalid or incomplete.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// SSH-specific error from the underlying implementation.
    #[error("SSH error: {0}")]
    SshError(String),

    /// I/O error during connection operations.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// The result of executing a command on a connection.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code of the command.
    pub exit_code: i32,
    /// Content written to standard output.
    pub stdout: String,
    /// Content written to standard error.
    pub stderr: String,
    /// Convenience flag: `true` if `exit_code == 0`.
    pub success: bool,
}

impl CommandResult {
    /// Create a successful command result.
    pub fn success(stdout: String, stderr: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            stderr,
            success: true,
        }
    }

    /// Create a failed command result.
    pub fn failure(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: false,
        }
    }
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Timeout for the command. Expiry surfaces as
    /// [`ConnectionError::Timeout`].
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    /// Create empty execute options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A transport capable of running commands and moving files on one host.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Connection identifier (user@host:port or the local hostname).
    fn identifier(&self) -> &str;

    /// Whether the connection is still usable.
    async fn is_alive(&self) -> bool;

    /// Execute a shell command line, waiting for completion.
    async fn execute(
        &self,
        command: &str,
        options: ExecuteOptions,
    ) -> ConnectionResult<CommandResult>;

    /// Upload a local file to a remote path.
    async fn upload(&self, local_path: &Path, remote_path: &Path) -> ConnectionResult<()>;

    /// Download a remote file to a local path.
    async fn download(&self, remote_path: &Path, local_path: &Path) -> ConnectionResult<()>;

    /// Close the connection.
    async fn close(&self) -> ConnectionResult<()>;
}

/// Retry policy for establishing connections.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Initial delay between retries.
    pub retry_delay: Duration,
    /// Cap applied to the exponential backoff.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_RETRIES,
            retry_delay: Duration::from_secs(crate::config::DEFAULT_RETRY_DELAY),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Build a retry policy from the SSH settings.
    pub fn from_settings(ssh: &SshSettings) -> Self {
        Self {
            max_retries: ssh.retries,
            retry_delay: Duration::from_secs(ssh.retry_delay),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Exponential backoff delay for a given retry attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.retry_delay * 2u32.pow(attempt.min(10));
        delay.min(self.max_delay)
    }
}

/// Factory pooling one connection per host within an invocation.
pub struct ConnectionFactory {
    ssh: SshSettings,
    pool: RwLock<HashMap<String, Arc<dyn Connection>>>,
}

impl ConnectionFactory {
    /// Create a factory with the given SSH defaults.
    pub fn new(ssh: SshSettings) -> Self {
        Self {
            ssh,
            pool: RwLock::new(HashMap::new()),
        }
    }

    /// Get a pooled connection for a host, establishing one if needed.
    pub async fn connect(&self, host: &Host) -> ConnectionResult<Arc<dyn Connection>> {
        let key = Self::pool_key(host, &self.ssh);

        let pooled = self.pool.read().get(&key).cloned();
        if let Some(conn) = pooled {
            if conn.is_alive().await {
                return Ok(conn);
            }
            self.pool.write().remove(&key);
        }

        let conn = self.create(host).await?;
        self.pool.write().insert(key, conn.clone());
        Ok(conn)
    }

    /// Close every pooled connection.
    pub async fn close_all(&self) {
        let connections: Vec<_> = {
            let mut pool = self.pool.write();
            pool.drain().map(|(_, conn)| conn).collect()
        };
        for conn in connections {
            let _ = conn.close().await;
        }
    }

    fn pool_key(host: &Host, ssh: &SshSettings) -> String {
        if host.is_local() {
            "local".to_string()
        } else {
            let user = host.user.as_deref().unwrap_or(&ssh.user);
            let port = host.port.unwrap_or(ssh.port);
            format!("ssh://{}@{}:{}", user, host.target_address(), port)
        }
    }

    async fn create(&self, host: &Host) -> ConnectionResult<Arc<dyn Connection>> {
        if host.is_local() {
            debug!(host = %host.name, "using local connection");
            return Ok(Arc::new(local::LocalConnection::new()));
        }

        #[cfg(feature = "russh")]
        {
            let conn = russh::RusshConnection::connect(host, &self.ssh).await?;
            Ok(Arc::new(conn))
        }
        #[cfg(not(feature = "russh"))]
        {
            Err(ConnectionError::InvalidConfig(format!(
                "no SSH backend available for '{}': enable the 'russh' feature",
                host.name
            )))
        }
    }
}
