//! Scripted transport for integration tests.
//!
//! A [`Script`] records every command, upload, and download the runner
//! issues, and answers commands from substring-matched rules. Local steps
//! route through the same connector, so an entire task chain is observable
//! without touching a real host or shell.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use deckhand::config::{DeployFile, Settings};
use deckhand::connection::{
    CommandResult, Connection, ConnectionError, ConnectionResult, ExecuteOptions,
};
use deckhand::executor::{Connector, Executor, Runner};
use deckhand::inventory::Host;
use deckhand::recipe;

/// One observed transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Exec { host: String, command: String },
    Upload { host: String, local: PathBuf, remote: PathBuf },
    Download { host: String, remote: PathBuf, local: PathBuf },
}

#[derive(Debug, Clone)]
enum Response {
    Stdout(String),
    Fail { exit_code: i32, stderr: String },
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    response: Response,
}

/// Shared rule table plus operation log.
#[derive(Clone, Default)]
pub struct Script {
    rules: Arc<Mutex<Vec<Rule>>>,
    log: Arc<Mutex<Vec<LogEntry>>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` succeed with `stdout`.
    pub fn on(&self, pattern: &str, stdout: &str) {
        self.rules.lock().push(Rule {
            pattern: pattern.to_string(),
            response: Response::Stdout(stdout.to_string()),
        });
    }

    /// Commands containing `pattern` fail with the given exit code.
    pub fn fail_on(&self, pattern: &str, exit_code: i32, stderr: &str) {
        self.rules.lock().push(Rule {
            pattern: pattern.to_string(),
            response: Response::Fail {
                exit_code,
                stderr: stderr.to_string(),
            },
        });
    }

    /// Everything observed so far, in order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.log.lock().clone()
    }

    /// Observed commands as `(host, command)` pairs, in order.
    pub fn commands(&self) -> Vec<(String, String)> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                LogEntry::Exec { host, command } => Some((host, command)),
                _ => None,
            })
            .collect()
    }

    /// Whether any observed command contains `pattern`.
    pub fn ran(&self, pattern: &str) -> bool {
        self.commands().iter().any(|(_, c)| c.contains(pattern))
    }

    fn respond(&self, host: &str, command: &str) -> CommandResult {
        self.log.lock().push(LogEntry::Exec {
            host: host.to_string(),
            command: command.to_string(),
        });
        let rules = self.rules.lock();
        match rules.iter().find(|r| command.contains(&r.pattern)) {
            Some(rule) => match &rule.response {
                Response::Stdout(out) => CommandResult::success(out.clone(), String::new()),
                Response::Fail { exit_code, stderr } => {
                    CommandResult::failure(*exit_code, String::new(), stderr.clone())
                }
            },
            None => CommandResult::success(String::new(), String::new()),
        }
    }
}

struct ScriptedConnection {
    host: String,
    script: Script,
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn identifier(&self) -> &str {
        &self.host
    }

    async fn is_alive(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        command: &str,
        _options: ExecuteOptions,
    ) -> ConnectionResult<CommandResult> {
        Ok(self.script.respond(&self.host, command))
    }

    async fn upload(&self, local_path: &Path, remote_path: &Path) -> ConnectionResult<()> {
        self.script.log.lock().push(LogEntry::Upload {
            host: self.host.clone(),
            local: local_path.to_path_buf(),
            remote: remote_path.to_path_buf(),
        });
        Ok(())
    }

    async fn download(&self, remote_path: &Path, local_path: &Path) -> ConnectionResult<()> {
        self.script.log.lock().push(LogEntry::Download {
            host: self.host.clone(),
            remote: remote_path.to_path_buf(),
            local: local_path.to_path_buf(),
        });
        Ok(())
    }

    async fn close(&self) -> ConnectionResult<()> {
        Ok(())
    }
}

/// Connector handing out scripted connections for every host, the control
/// node included.
pub struct ScriptedConnector {
    script: Script,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> Self {
        Self { script }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, host: &Host) -> ConnectionResult<Arc<dyn Connection>> {
        Ok(Arc::new(ScriptedConnection {
            host: host.name.clone(),
            script: self.script.clone(),
        }))
    }
}

/// A connector that refuses every connection.
pub struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self, _host: &Host) -> ConnectionResult<Arc<dyn Connection>> {
        Err(ConnectionError::ConnectionFailed(
            "connection refused".to_string(),
        ))
    }
}

/// Deploy file used across the recipe tests: two app hosts, one primary
/// db host and a secondary.
pub const DEPLOY_YAML: &str = "\
application: shelr
deploy_to: /var/www/shelr
roles:
  web: [web1]
  app: [app1, app2]
  db:
    - host: db1
      primary: true
    - db2
";

/// Runner over the built-in recipe and a scripted transport.
pub fn harness() -> (Runner, Script) {
    harness_with(|_| {})
}

/// Like [`harness`], with a settings tweak applied before the runner is
/// built.
pub fn harness_with(tweak: impl FnOnce(&mut Settings)) -> (Runner, Script) {
    let (mut settings, inventory, _ssh) = DeployFile::from_yaml(DEPLOY_YAML)
        .unwrap()
        .resolve()
        .unwrap();
    tweak(&mut settings);

    let script = Script::new();
    let connector = Arc::new(ScriptedConnector::new(script.clone()));
    let executor = Arc::new(Executor::new(connector, Duration::from_secs(5)));
    let registry = recipe::build_registry().unwrap();
    let runner = Runner::new(registry, inventory, settings, executor).unwrap();
    (runner, script)
}
