//! Role definitions.

use serde::{Deserialize, Serialize};

use super::host::Host;

/// A named group of hosts sharing a deployment responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Role name (web, app, db, ...).
    pub name: String,
    /// Hosts bound to this role, in registration order.
    pub hosts: Vec<Host>,
}

impl Role {
    /// Create a role with an initial set of hosts.
    pub fn new(name: impl Into<String>, hosts: Vec<Host>) -> Self {
        Self {
            name: name.into(),
            hosts,
        }
    }

    /// The primary hosts of this role.
    pub fn primary_hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter().filter(|h| h.primary)
    }
}
