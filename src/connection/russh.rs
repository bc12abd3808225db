//! SSH transport using the pure Rust russh stack.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{Handle, Handler};
use russh::keys::key::PublicKey;
use russh::keys::load_secret_key;
use russh::ChannelMsg;
use russh_keys::agent::client::AgentClient;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use super::{
    CommandResult, Connection, ConnectionError, ConnectionResult, ExecuteOptions, RetryConfig,
    SshSettings,
};
use crate::inventory::Host;

/// Wraps russh::Error for compatibility with the Handler trait.
#[derive(Debug)]
pub struct RusshError(pub ::russh::Error);

impl From<::russh::Error> for RusshError {
    fn from(err: ::russh::Error) -> Self {
        RusshError(err)
    }
}

impl std::fmt::Display for RusshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Russh error: {}", self.0)
    }
}

impl std::error::Error for RusshError {}

impl From<::russh::Error> for ConnectionError {
    fn from(err: ::russh::Error) -> Self {
        ConnectionError::SshError(err.to_string())
    }
}

impl From<russh_sftp::client::error::Error> for ConnectionError {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        ConnectionError::TransferFailed(format!("SFTP error: {}", e))
    }
}

/// Outcome of checking a server key against known_hosts.
enum HostKeyStatus {
    Verified,
    Unknown,
    Mismatch,
}

struct ClientHandler {
    host: String,
    port: u16,
    known_hosts: Vec<KnownHostEntry>,
}

struct KnownHostEntry {
    patterns: Vec<String>,
    key: PublicKey,
}

impl ClientHandler {
    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            known_hosts: Self::load_known_hosts(),
        }
    }

    fn load_known_hosts() -> Vec<KnownHostEntry> {
        let path = match dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts")) {
            Some(p) if p.exists() => p,
            _ => return Vec::new(),
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "failed to read known_hosts");
                return Vec::new();
            }
        };
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(Self::parse_line)
            .collect()
    }

    fn parse_line(line: &str) -> Option<KnownHostEntry> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }
        let patterns = parts[0].split(',').map(str::to_string).collect();
        let key_bytes =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, parts[2]).ok()?;
        let key = russh::keys::key::parse_public_key(&key_bytes, None).ok()?;
        Some(KnownHostEntry { patterns, key })
    }

    fn pattern_matches(&self, pattern: &str) -> bool {
        if let Some(rest) = pattern.strip_prefix('[') {
            // [host]:port form used for nonstandard ports
            if let Some((host, port)) = rest.split_once("]:") {
                return host == self.host && port.parse() == Ok(self.port);
            }
        }
        self.port == 22 && pattern == self.host
    }

    fn verify_host_key(&self, server_key: &PublicKey) -> HostKeyStatus {
        for entry in &self.known_hosts {
            if entry.patterns.iter().any(|p| self.pattern_matches(p)) {
                if entry.key.fingerprint() == server_key.fingerprint() {
                    return HostKeyStatus::Verified;
                }
                return HostKeyStatus::Mismatch;
            }
        }
        HostKeyStatus::Unknown
    }
}

#[async_trait]
impl Handler for ClientHandler {
    type Error = RusshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.verify_host_key(server_public_key) {
            HostKeyStatus::Verified => {
                debug!(host = %self.host, "host key verified against known_hosts");
                Ok(true)
            }
            HostKeyStatus::Unknown => {
                // accept-new semantics
                warn!(host = %self.host, "host not found in known_hosts, accepting");
                Ok(true)
            }
            HostKeyStatus::Mismatch => {
                warn!(
                    host = %self.host,
                    "HOST KEY VERIFICATION FAILED! Server key does not match known_hosts entry."
                );
                Ok(false)
            }
        }
    }
}

/// Default private keys tried when none is configured.
fn default_identity_files() -> Vec<PathBuf> {
    let Some(ssh_dir) = dirs::home_dir().map(|h| h.join(".ssh")) else {
        return Vec::new();
    };
    ["id_ed25519", "id_rsa", "id_ecdsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .filter(|p| p.exists())
        .collect()
}

fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// SSH connection to one target host.
pub struct RusshConnection {
    identifier: String,
    /// Read lock for channel operations, write lock only for close.
    handle: RwLock<Option<Handle<ClientHandler>>>,
    connected: AtomicBool,
}

impl RusshConnection {
    /// Connect to a host, retrying with backoff on failure.
    pub async fn connect(host: &Host, ssh: &SshSettings) -> ConnectionResult<Self> {
        let address = host.target_address();
        let port = host.port.unwrap_or(ssh.port);
        let user = host.user.as_deref().unwrap_or(&ssh.user);
        let timeout = Duration::from_secs(ssh.connect_timeout);
        let retry = RetryConfig::from_settings(ssh);

        debug!(host = %address, port = %port, user = %user, "connecting via SSH");

        let mut last_error = None;
        for attempt in 0..=retry.max_retries {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt - 1);
                debug!(attempt = %attempt, delay = ?delay, "retrying SSH connection");
                tokio::time::sleep(delay).await;
            }
            match Self::do_connect(address, port, user, ssh, timeout).await {
                Ok(handle) => {
                    return Ok(Self {
                        identifier: format!("{}@{}:{}", user, address, port),
                        handle: RwLock::new(Some(handle)),
                        connected: AtomicBool::new(true),
                    });
                }
                Err(e) => {
                    warn!(attempt = %attempt, error = %e, "SSH connection attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            ConnectionError::ConnectionFailed("unknown connection error".to_string())
        }))
    }

    async fn do_connect(
        host: &str,
        port: u16,
        user: &str,
        ssh: &SshSettings,
        timeout: Duration,
    ) -> ConnectionResult<Handle<ClientHandler>> {
        let mut config = russh::client::Config::default();
        config.inactivity_timeout = Some(timeout);
        let config = Arc::new(config);

        let addr = format!("{}:{}", host, port);
        let socket = tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout.as_secs()))?
            .map_err(|e| {
                ConnectionError::ConnectionFailed(format!("failed to connect to {}: {}", addr, e))
            })?;
        socket.set_nodelay(true).map_err(|e| {
            ConnectionError::ConnectionFailed(format!("failed to set TCP_NODELAY: {}", e))
        })?;

        let handler = ClientHandler::new(host, port);
        let mut session = russh::client::connect_stream(config, socket, handler)
            .await
            .map_err(|e| {
                ConnectionError::ConnectionFailed(format!("SSH handshake failed: {}", e))
            })?;

        Self::authenticate(&mut session, user, ssh).await?;
        Ok(session)
    }

    async fn authenticate(
        session: &mut Handle<ClientHandler>,
        user: &str,
        ssh: &SshSettings,
    ) -> ConnectionResult<()> {
        if ssh.use_agent && Self::try_agent_auth(session, user).await.is_ok() {
            debug!("authenticated using SSH agent");
            return Ok(());
        }

        let mut key_paths: Vec<PathBuf> = Vec::new();
        if let Some(identity_file) = &ssh.identity_file {
            key_paths.push(expand_path(identity_file));
        }
        key_paths.extend(default_identity_files());

        for key_path in key_paths {
            if Self::try_key_auth(session, user, &key_path, ssh.password.as_deref())
                .await
                .is_ok()
            {
                debug!(key = %key_path.display(), "authenticated using key");
                return Ok(());
            }
        }

        if let Some(password) = &ssh.password {
            let authenticated =
                session
                    .authenticate_password(user, password)
                    .await
                    .map_err(|e| {
                        ConnectionError::AuthenticationFailed(format!(
                            "password authentication failed: {}",
                            e
                        ))
                    })?;
            if authenticated {
                debug!("authenticated using password");
                return Ok(());
            }
        }

        Err(ConnectionError::AuthenticationFailed(
            "all authentication methods failed".to_string(),
        ))
    }

    async fn try_agent_auth(
        session: &mut Handle<ClientHandler>,
        user: &str,
    ) -> ConnectionResult<()> {
        let mut agent = AgentClient::connect_env().await.map_err(|e| {
            ConnectionError::AuthenticationFailed(format!("failed to connect to SSH agent: {}", e))
        })?;
        let identities = agent.request_identities().await.map_err(|e| {
            ConnectionError::AuthenticationFailed(format!("failed to get agent identities: {}", e))
        })?;
        if identities.is_empty() {
            return Err(ConnectionError::AuthenticationFailed(
                "SSH agent has no identities".to_string(),
            ));
        }

        for identity in identities {
            let (returned_agent, result) = session
                .authenticate_future(user, identity.clone(), agent)
                .await;
            agent = returned_agent;
            match result {
                Ok(true) => return Ok(()),
                Ok(false) => trace!("agent identity rejected, trying next"),
                Err(e) => trace!(error = %e, "agent authentication attempt failed"),
            }
        }
        Err(ConnectionError::AuthenticationFailed(
            "all SSH agent identities rejected".to_string(),
        ))
    }

    async fn try_key_auth(
        session: &mut Handle<ClientHandler>,
        user: &str,
        key_path: &Path,
        passphrase: Option<&str>,
    ) -> ConnectionResult<()> {
        if !key_path.exists() {
            return Err(ConnectionError::AuthenticationFailed(format!(
                "key file not found: {}",
                key_path.display()
            )));
        }
        let key_pair = load_secret_key(key_path, passphrase).map_err(|e| {
            ConnectionError::AuthenticationFailed(format!(
                "failed to load key {}: {}",
                key_path.display(),
                e
            ))
        })?;
        let authenticated = session
            .authenticate_publickey(user, Arc::new(key_pair))
            .await
            .map_err(|e| {
                ConnectionError::AuthenticationFailed(format!(
                    "key authentication failed for {}: {}",
                    key_path.display(),
                    e
                ))
            })?;
        if authenticated {
            Ok(())
        } else {
            Err(ConnectionError::AuthenticationFailed(
                "key authentication failed".to_string(),
            ))
        }
    }

    async fn open_sftp(handle: &Handle<ClientHandler>) -> ConnectionResult<SftpSession> {
        let channel = handle.channel_open_session().await.map_err(|e| {
            ConnectionError::TransferFailed(format!("failed to open channel: {}", e))
        })?;
        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            ConnectionError::TransferFailed(format!("failed to request SFTP subsystem: {}", e))
        })?;
        SftpSession::new(channel.into_stream()).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("failed to create SFTP session: {}", e))
        })
    }
}

#[async_trait]
impl Connection for RusshConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn is_alive(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.handle.read().await.is_some()
    }

    async fn execute(
        &self,
        command: &str,
        options: ExecuteOptions,
    ) -> ConnectionResult<CommandResult> {
        trace!(command = %command, "executing remote command");

        let execute_future = async {
            let handle_guard = self.handle.read().await;
            let handle = handle_guard
                .as_ref()
                .ok_or(ConnectionError::ConnectionClosed)?;

            let mut channel = handle.channel_open_session().await.map_err(|e| {
                ConnectionError::ExecutionFailed(format!("failed to open channel: {}", e))
            })?;
            drop(handle_guard);

            channel.exec(true, command).await.map_err(|e| {
                ConnectionError::ExecutionFailed(format!("failed to execute command: {}", e))
            })?;

            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let mut exit_code = None;

            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                    ChannelMsg::ExtendedData { ref data, ext } => {
                        if ext == 1 {
                            stderr.extend_from_slice(data);
                        }
                    }
                    ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }
            let _ = channel.eof().await;

            // Missing exit status means the channel died under us.
            let exit_code: i32 = exit_code.map(|e| e as i32).unwrap_or(i32::MAX);
            let stdout = String::from_utf8_lossy(&stdout).to_string();
            let stderr = String::from_utf8_lossy(&stderr).to_string();

            trace!(exit_code = %exit_code, "command completed");
            if exit_code == 0 {
                Ok(CommandResult::success(stdout, stderr))
            } else {
                Ok(CommandResult::failure(exit_code, stdout, stderr))
            }
        };

        match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, execute_future)
                .await
                .map_err(|_| ConnectionError::Timeout(timeout.as_secs()))?,
            None => execute_future.await,
        }
    }

    async fn upload(&self, local_path: &Path, remote_path: &Path) -> ConnectionResult<()> {
        debug!(
            local = %local_path.display(),
            remote = %remote_path.display(),
            "uploading file via SFTP"
        );

        let handle_guard = self.handle.read().await;
        let handle = handle_guard
            .as_ref()
            .ok_or(ConnectionError::ConnectionClosed)?;
        let sftp = Self::open_sftp(handle).await?;
        drop(handle_guard);

        let content = tokio::fs::read(local_path).await.map_err(|e| {
            ConnectionError::TransferFailed(format!(
                "failed to read local file {}: {}",
                local_path.display(),
                e
            ))
        })?;

        let remote_path_str = remote_path.to_string_lossy().to_string();
        let mut remote_file = sftp.create(&remote_path_str).await.map_err(|e| {
            ConnectionError::TransferFailed(format!(
                "failed to create remote file {}: {}",
                remote_path.display(),
                e
            ))
        })?;
        remote_file.write_all(&content).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("failed to write remote file: {}", e))
        })?;
        Ok(())
    }

    async fn download(&self, remote_path: &Path, local_path: &Path) -> ConnectionResult<()> {
        debug!(
            remote = %remote_path.display(),
            local = %local_path.display(),
            "downloading file via SFTP"
        );

        let handle_guard = self.handle.read().await;
        let handle = handle_guard
            .as_ref()
            .ok_or(ConnectionError::ConnectionClosed)?;
        let sftp = Self::open_sftp(handle).await?;
        drop(handle_guard);

        let remote_path_str = remote_path.to_string_lossy().to_string();
        let mut remote_file = sftp.open(&remote_path_str).await.map_err(|e| {
            ConnectionError::TransferFailed(format!(
                "failed to open remote file {}: {}",
                remote_path.display(),
                e
            ))
        })?;
        let mut content = Vec::new();
        remote_file.read_to_end(&mut content).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("failed to read remote file: {}", e))
        })?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ConnectionError::TransferFailed(format!(
                    "failed to create local directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        tokio::fs::write(local_path, &content).await.map_err(|e| {
            ConnectionError::TransferFailed(format!(
                "failed to write local file {}: {}",
                local_path.display(),
                e
            ))
        })?;
        Ok(())
    }

    async fn close(&self) -> ConnectionResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        let handle = self.handle.write().await.take();
        if let Some(handle) = handle {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await;
        }
        Ok(())
    }
}
