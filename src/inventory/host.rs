//! Host definitions.

use serde::{Deserialize, Serialize};

/// A single target host within a role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Host {
    /// Logical host name, used for pooling and log output.
    pub name: String,
    /// Address to connect to, when it differs from the name.
    #[serde(default)]
    pub address: Option<String>,
    /// SSH port override.
    #[serde(default)]
    pub port: Option<u16>,
    /// SSH user override.
    #[serde(default)]
    pub user: Option<String>,
    /// Whether this host is the primary of its role.
    #[serde(default)]
    pub primary: bool,
}

impl Host {
    /// Create a host with the given name and no overrides.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            port: None,
            user: None,
            primary: false,
        }
    }

    /// The control node itself.
    pub fn local() -> Self {
        Self::new("localhost")
    }

    /// Set the connect address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the SSH port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the SSH user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Flag this host as primary within its role.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// The address commands should connect to.
    pub fn target_address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.name)
    }

    /// Whether this host resolves to the control node.
    pub fn is_local(&self) -> bool {
        matches!(self.target_address(), "localhost" | "127.0.0.1" | "local")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_address_prefers_explicit_address() {
        let host = Host::new("db1").address("10.0.0.5");
        assert_eq!(host.target_address(), "10.0.0.5");
        assert_eq!(Host::new("db1").target_address(), "db1");
    }

    #[test]
    fn local_detection() {
        assert!(Host::local().is_local());
        assert!(Host::new("app1").address("127.0.0.1").is_local());
        assert!(!Host::new("app1").is_local());
    }
}
