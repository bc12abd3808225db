//! Deploy file loading and settings resolution.
//!
//! A deployment run is configured by a single YAML file describing the
//! application, its target paths, the role inventory, and SSH defaults.
//! The file is resolved exactly once, at invocation start, into an
//! immutable [`Settings`] struct plus an [`Inventory`]; nothing mutates
//! either afterwards. `--set key=value` overrides are applied to the file
//! representation before resolution so that derived defaults (shared
//! path, backup path, config file name) stay consistent.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::inventory::{Host, Inventory};

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 30;

/// Default per-command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT: u64 = 600;

/// Default number of connection retries.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay between connection retries in seconds.
pub const DEFAULT_RETRY_DELAY: u64 = 1;

/// The raw deploy file as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployFile {
    /// Application name, used in log output and template variables.
    pub application: String,

    /// Deployment stage (production, staging, ...).
    #[serde(default = "default_stage")]
    pub stage: String,

    /// Base deployment directory on the targets.
    pub deploy_to: String,

    /// Rails environment exported to remote commands.
    #[serde(default)]
    pub rails_env: Option<String>,

    /// Tables excluded from database backups.
    #[serde(default)]
    pub skip_backup_tables: Option<Vec<String>>,

    /// Remote directory holding backups. Defaults to `{shared}/backups`.
    #[serde(default)]
    pub backup_path: Option<String>,

    /// Explicit backup version to download instead of the latest.
    #[serde(default)]
    pub backup_version: Option<String>,

    /// Release path overrides supplied by the external deploy tool.
    #[serde(default)]
    pub releases: Option<ReleaseOverrides>,

    /// App-server specifics (pid file, config template).
    #[serde(default)]
    pub unicorn: Option<UnicornSection>,

    /// Role name to host list.
    #[serde(default)]
    pub roles: IndexMap<String, Vec<RoleEntry>>,

    /// SSH connection defaults.
    #[serde(default)]
    pub ssh: SshSettings,
}

fn default_stage() -> String {
    "production".to_string()
}

/// Release path overrides. When absent, all three default to the
/// `current` symlink path; the external deploy tool owns the real values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseOverrides {
    /// The release currently being rolled out.
    #[serde(default)]
    pub current: Option<String>,
    /// The release deployed before the current one.
    #[serde(default)]
    pub previous: Option<String>,
    /// The most recent release directory.
    #[serde(default)]
    pub latest: Option<String>,
}

/// App-server section of the deploy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnicornSection {
    /// Path to the server pid file. Defaults to
    /// `{shared}/pids/unicorn.pid`.
    #[serde(default)]
    pub pid_file: Option<String>,
    /// Local template the server config is rendered from.
    #[serde(default)]
    pub template: Option<PathBuf>,
}

/// A role member: either a bare host name or a host with attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleEntry {
    /// Bare hostname.
    Name(String),
    /// Host with attributes.
    Detailed {
        /// Logical host name.
        host: String,
        /// Connect address override.
        #[serde(default)]
        address: Option<String>,
        /// SSH port override.
        #[serde(default)]
        port: Option<u16>,
        /// SSH user override.
        #[serde(default)]
        user: Option<String>,
        /// Primary flag.
        #[serde(default)]
        primary: bool,
    },
}

impl RoleEntry {
    fn into_host(self) -> Host {
        match self {
            RoleEntry::Name(name) => Host::new(name),
            RoleEntry::Detailed {
                host,
                address,
                port,
                user,
                primary,
            } => Host {
                name: host,
                address,
                port,
                user,
                primary,
            },
        }
    }
}

/// SSH connection defaults shared by every host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Username for remote sessions.
    #[serde(default = "default_user")]
    pub user: String,

    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Private key to try before the default identity files.
    #[serde(default)]
    pub identity_file: Option<String>,

    /// Password, used for key passphrases and password auth.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Per-command timeout in seconds. Expiry aborts the task chain the
    /// same way a nonzero exit does.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,

    /// Connection retry attempts (connect only, never commands).
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Initial delay between connection retries in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Try SSH agent authentication first.
    #[serde(default = "default_true")]
    pub use_agent: bool,
}

fn default_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY
}

fn default_true() -> bool {
    true
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: default_user(),
            port: 22,
            identity_file: None,
            password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            use_agent: true,
        }
    }
}

impl DeployFile {
    /// Load a deploy file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a deploy file from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply a `--set key=value` override. Unknown keys fail fast.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "rails_env" => self.rails_env = Some(value.to_string()),
            "stage" => self.stage = value.to_string(),
            "backup_version" => self.backup_version = Some(value.to_string()),
            "backup_path" => self.backup_path = Some(value.to_string()),
            "skip_backup_tables" => {
                self.skip_backup_tables = Some(
                    value
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect(),
                )
            }
            _ => return Err(Error::config(format!("unknown setting '{}'", key))),
        }
        Ok(())
    }

    /// Resolve the file into immutable settings plus the inventory.
    pub fn resolve(self) -> Result<(Settings, Inventory, SshSettings)> {
        if self.roles.is_empty() {
            return Err(Error::config("deploy file defines no roles"));
        }

        let mut inventory = Inventory::new();
        for (name, entries) in self.roles {
            let hosts = entries.into_iter().map(RoleEntry::into_host).collect();
            inventory.register_role(name, hosts);
        }

        let shared_path = format!("{}/shared", self.deploy_to);
        let current_path = format!("{}/current", self.deploy_to);
        let releases = self.releases.unwrap_or_default();
        let unicorn = self.unicorn.unwrap_or_default();

        let settings = Settings {
            application: self.application,
            rails_env: self.rails_env.unwrap_or_else(|| "production".to_string()),
            deploy_to: self.deploy_to,
            current_release: releases.current.unwrap_or_else(|| current_path.clone()),
            previous_release: releases.previous.unwrap_or_else(|| current_path.clone()),
            latest_release: releases.latest.unwrap_or_else(|| current_path.clone()),
            backup_path: self
                .backup_path
                .unwrap_or_else(|| format!("{}/backups", shared_path)),
            backup_version: self.backup_version,
            skip_backup_tables: self
                .skip_backup_tables
                .unwrap_or_else(|| vec!["sessions".to_string()]),
            local_backup_dir: PathBuf::from("backups"),
            staging_dir: PathBuf::from("tmp"),
            pid_file: unicorn
                .pid_file
                .unwrap_or_else(|| format!("{}/pids/unicorn.pid", shared_path)),
            unicorn_template: unicorn
                .template
                .unwrap_or_else(|| PathBuf::from("templates/unicorn.rb.j2")),
            unicorn_config_name: format!("unicorn.{}.rb", self.stage),
            stage: self.stage,
            shared_path,
            current_path,
        };

        Ok((settings, inventory, self.ssh))
    }
}

/// Resolved deployment settings, read-only after invocation start.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Application name.
    pub application: String,
    /// Deployment stage.
    pub stage: String,
    /// Rails environment for remote commands.
    pub rails_env: String,
    /// Base deployment directory.
    pub deploy_to: String,
    /// Shared directory surviving across releases.
    pub shared_path: String,
    /// The `current` symlink path.
    pub current_path: String,
    /// Release being rolled out.
    pub current_release: String,
    /// Release deployed before the current one.
    pub previous_release: String,
    /// Most recent release directory.
    pub latest_release: String,
    /// Remote backup directory.
    pub backup_path: String,
    /// Explicit backup version, skipping the latest lookup.
    pub backup_version: Option<String>,
    /// Tables excluded from backups.
    pub skip_backup_tables: Vec<String>,
    /// Local directory downloads are extracted into.
    pub local_backup_dir: PathBuf,
    /// Local directory rendered configs are staged in.
    pub staging_dir: PathBuf,
    /// Remote pid file of the app server.
    pub pid_file: String,
    /// Local template the server config is rendered from.
    pub unicorn_template: PathBuf,
    /// File name of the server config within the release.
    pub unicorn_config_name: String,
}

impl Settings {
    /// Local path the rendered server config is staged at.
    pub fn staged_config_path(&self) -> PathBuf {
        self.staging_dir.join(&self.unicorn_config_name)
    }

    /// Remote path the server config is uploaded to.
    pub fn remote_config_path(&self) -> String {
        format!("{}/config/{}", self.current_path, self.unicorn_config_name)
    }
}
