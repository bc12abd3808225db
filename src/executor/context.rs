//! Execution context handed to task bodies.
//!
//! A [`TaskContext`] carries the resolved settings, the hosts the task was
//! bound to, and the executor that talks to them. Remote steps fan out to
//! every bound host in parallel; capture and download address the first
//! host only; local steps run on the control node through the same
//! connector seam so tests can intercept them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info};

use crate::command::CommandLine;
use crate::config::Settings;
use crate::connection::{
    CommandResult, Connection, ConnectionError, ConnectionFactory, ConnectionResult,
    ExecuteOptions,
};
use crate::error::{Error, Result};
use crate::inventory::Host;

/// Seam between the executor and the transport layer.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Obtain a connection to a host.
    async fn connect(&self, host: &Host) -> ConnectionResult<Arc<dyn Connection>>;
}

/// Production connector: pooled russh/local connections.
pub struct PooledConnector {
    factory: ConnectionFactory,
}

impl PooledConnector {
    /// Wrap a connection factory.
    pub fn new(factory: ConnectionFactory) -> Self {
        Self { factory }
    }

    /// Close every pooled connection.
    pub async fn close_all(&self) {
        self.factory.close_all().await;
    }
}

#[async_trait]
impl Connector for PooledConnector {
    async fn connect(&self, host: &Host) -> ConnectionResult<Arc<dyn Connection>> {
        self.factory.connect(host).await
    }
}

/// Runs command lines and file transfers against hosts.
pub struct Executor {
    connector: Arc<dyn Connector>,
    command_timeout: Duration,
}

impl Executor {
    /// Create an executor over a connector.
    pub fn new(connector: Arc<dyn Connector>, command_timeout: Duration) -> Self {
        Self {
            connector,
            command_timeout,
        }
    }

    /// Run a command line on one host, mapping transport outcomes onto the
    /// error taxonomy. A nonzero exit or a timeout aborts the chain and is
    /// never retried.
    pub async fn run_on(&self, host: &Host, command: &CommandLine) -> Result<CommandResult> {
        let rendered = command.to_shell();
        debug!(host = %host.name, command = %rendered, "running command");

        let conn = self
            .connector
            .connect(host)
            .await
            .map_err(|e| Error::connection_failed(&host.name, e))?;

        let options = ExecuteOptions::new().with_timeout(self.command_timeout);
        let result = conn.execute(&rendered, options).await.map_err(|e| match e {
            ConnectionError::Timeout(timeout_secs) => Error::CommandTimeout {
                host: host.name.clone(),
                command: rendered.clone(),
                timeout_secs,
            },
            other => Error::connection_failed(&host.name, other),
        })?;

        if result.success {
            Ok(result)
        } else {
            Err(Error::command_exit(
                &host.name,
                rendered,
                result.exit_code,
                result.stderr.trim(),
            ))
        }
    }

    /// Upload a local file to one host.
    pub async fn upload_to(&self, host: &Host, local: &Path, remote: &Path) -> Result<()> {
        debug!(host = %host.name, local = %local.display(), remote = %remote.display(), "uploading");
        let conn = self
            .connector
            .connect(host)
            .await
            .map_err(|e| Error::connection_failed(&host.name, e))?;
        conn.upload(local, remote)
            .await
            .map_err(|e| Error::connection_failed(&host.name, e))
    }

    /// Download a remote file from one host.
    pub async fn download_from(&self, host: &Host, remote: &Path, local: &Path) -> Result<()> {
        debug!(host = %host.name, remote = %remote.display(), local = %local.display(), "downloading");
        let conn = self
            .connector
            .connect(host)
            .await
            .map_err(|e| Error::connection_failed(&host.name, e))?;
        conn.download(remote, local)
            .await
            .map_err(|e| Error::connection_failed(&host.name, e))
    }
}

/// Everything a task body needs: settings, bound hosts, and the executor.
#[derive(Clone)]
pub struct TaskContext {
    settings: Arc<Settings>,
    hosts: Arc<Vec<Host>>,
    executor: Arc<Executor>,
    task: String,
}

impl TaskContext {
    /// Build a context for one task invocation.
    pub fn new(
        settings: Arc<Settings>,
        hosts: Arc<Vec<Host>>,
        executor: Arc<Executor>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            hosts,
            executor,
            task: task.into(),
        }
    }

    /// Resolved deployment settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Hosts this task is bound to.
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Dotted name of the running task.
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Run a command on every bound host in parallel. All hosts run to
    /// completion even when one fails; the first failure in host order is
    /// then propagated.
    pub async fn run(&self, command: &CommandLine) -> Result<()> {
        info!(task = %self.task, hosts = %self.hosts.len(), command = %command, "run");
        let futures = self
            .hosts
            .iter()
            .map(|host| self.executor.run_on(host, command));
        let results = join_all(futures).await;
        for result in results {
            result?;
        }
        Ok(())
    }

    /// Run a command on one specific host.
    pub async fn run_on(&self, host: &Host, command: &CommandLine) -> Result<CommandResult> {
        self.executor.run_on(host, command).await
    }

    /// Run a command on the first bound host and return trimmed stdout.
    pub async fn capture(&self, command: &CommandLine) -> Result<String> {
        let host = self.first_host()?;
        self.capture_on(host, command).await
    }

    /// Run a command on one specific host and return trimmed stdout.
    pub async fn capture_on(&self, host: &Host, command: &CommandLine) -> Result<String> {
        let result = self.executor.run_on(host, command).await?;
        Ok(result.stdout.trim().to_string())
    }

    /// Upload a local file to every bound host in parallel.
    pub async fn upload(&self, local: impl AsRef<Path>, remote: impl AsRef<Path>) -> Result<()> {
        let local = local.as_ref();
        let remote = remote.as_ref();
        info!(task = %self.task, local = %local.display(), remote = %remote.display(), "upload");
        let futures = self
            .hosts
            .iter()
            .map(|host| self.executor.upload_to(host, local, remote));
        let results = join_all(futures).await;
        for result in results {
            result?;
        }
        Ok(())
    }

    /// Download a remote file from the first bound host.
    pub async fn download(&self, remote: impl AsRef<Path>, local: impl AsRef<Path>) -> Result<()> {
        let host = self.first_host()?;
        self.executor
            .download_from(host, remote.as_ref(), local.as_ref())
            .await
    }

    /// Run a command on the control node. Routed through the connector so
    /// local steps are observable in tests.
    pub async fn run_local(&self, command: &CommandLine) -> Result<CommandResult> {
        info!(task = %self.task, command = %command, "run local");
        self.executor.run_on(&Host::local(), command).await
    }

    /// Local path under the staging directory.
    pub fn staging_path(&self, name: &str) -> PathBuf {
        self.settings.staging_dir.join(name)
    }

    fn first_host(&self) -> Result<&Host> {
        self.hosts.first().ok_or_else(|| {
            Error::config(format!("task '{}' resolved to an empty host list", self.task))
        })
    }
}
