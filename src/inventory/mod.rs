//! Static inventory of host roles.
//!
//! The inventory is loaded once from the deploy file and never mutated
//! afterwards. Roles keep their hosts in registration order; task execution
//! and `list-hosts` output both rely on that ordering being stable.

pub mod host;
pub mod role;

use std::fmt;

use indexmap::IndexMap;

use crate::error::{Error, Result};

pub use host::Host;
pub use role::Role;

/// Attribute filter applied when selecting hosts from a role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostFilter {
    /// Restrict to hosts flagged primary.
    pub primary_only: bool,
}

impl HostFilter {
    /// Match every host of the role.
    pub fn any() -> Self {
        Self::default()
    }

    /// Match only hosts flagged primary.
    pub fn primary_only() -> Self {
        Self { primary_only: true }
    }

    /// Whether the given host passes this filter.
    pub fn matches(&self, host: &Host) -> bool {
        !self.primary_only || host.primary
    }
}

impl fmt::Display for HostFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.primary_only {
            f.write_str("primary")
        } else {
            f.write_str("any")
        }
    }
}

/// Role registry mapping role names to host lists.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    roles: IndexMap<String, Role>,
}

impl Inventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register hosts under a role. Registering the same role again
    /// appends, matching repeated role declarations in a recipe.
    pub fn register_role(&mut self, name: impl Into<String>, hosts: Vec<Host>) {
        let name = name.into();
        match self.roles.get_mut(&name) {
            Some(role) => role.hosts.extend(hosts),
            None => {
                self.roles.insert(name.clone(), Role::new(name, hosts));
            }
        }
    }

    /// Hosts bound to `role` that pass `filter`, in registration order.
    ///
    /// An unknown role or a filter that matches nothing is an error: a
    /// task silently bound to zero hosts would "succeed" without doing
    /// anything.
    pub fn hosts_for(&self, role: &str, filter: HostFilter) -> Result<Vec<Host>> {
        let role_def = self
            .roles
            .get(role)
            .ok_or_else(|| Error::RoleNotFound(role.to_string()))?;

        let hosts: Vec<Host> = role_def
            .hosts
            .iter()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect();

        if hosts.is_empty() {
            return Err(Error::NoMatchingHosts {
                role: role.to_string(),
                filter: filter.to_string(),
            });
        }
        Ok(hosts)
    }

    /// Every host across all roles, deduplicated by name, in registration
    /// order.
    pub fn all_hosts(&self) -> Vec<Host> {
        let mut seen = indexmap::IndexSet::new();
        let mut hosts = Vec::new();
        for role in self.roles.values() {
            for host in &role.hosts {
                if seen.insert(host.name.clone()) {
                    hosts.push(host.clone());
                }
            }
        }
        hosts
    }

    /// Role names in registration order.
    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Look up a role by name.
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Number of registered roles.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether the inventory has no roles.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
