//! Task execution: host binding and ordered invocation.
//!
//! The [`Runner`] resolves an invoked task through the hook graph, binds
//! each task in the chain to its hosts, and runs the chain strictly in
//! order. Within one task every host runs in parallel and the chain only
//! advances once all of them finished; the first failure aborts the rest
//! of the chain.

mod context;

pub use context::{Connector, Executor, PooledConnector, TaskContext};

use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::inventory::{Host, HostFilter, Inventory};
use crate::registry::{TaskDef, TaskRegistry};

/// Drives task chains against the inventory.
pub struct Runner {
    registry: TaskRegistry,
    inventory: Inventory,
    settings: Arc<Settings>,
    executor: Arc<Executor>,
}

impl Runner {
    /// Build a runner. The registry is validated up front so hook mistakes
    /// fail before any connection is made.
    pub fn new(
        registry: TaskRegistry,
        inventory: Inventory,
        settings: Settings,
        executor: Arc<Executor>,
    ) -> Result<Self> {
        registry.validate()?;
        Ok(Self {
            registry,
            inventory,
            settings: Arc::new(settings),
            executor,
        })
    }

    /// The task registry.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// The resolved inventory.
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Invoke a task by dotted name, running its resolved hook chain in
    /// order. `role_override` narrows every task in the chain to one role.
    pub async fn invoke(&self, task: &str, role_override: Option<&str>) -> Result<()> {
        let order = self.registry.resolve_execution_order(task)?;
        info!(task = %task, chain = ?order, "invoking");

        for name in &order {
            let def = self.registry.get(name)?;
            let hosts = self.hosts_for_task(def, role_override)?;
            info!(task = %name, hosts = ?hosts.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(), "executing");

            let ctx = TaskContext::new(
                self.settings.clone(),
                Arc::new(hosts),
                self.executor.clone(),
                name.clone(),
            );
            (def.body())(ctx).await?;
        }
        Ok(())
    }

    /// Bind a task to hosts: the union of its roles in declaration order,
    /// deduplicated by name. A task without roles binds to every host.
    fn hosts_for_task(&self, def: &TaskDef, role_override: Option<&str>) -> Result<Vec<Host>> {
        let filter = if def.is_only_primary() {
            HostFilter::primary_only()
        } else {
            HostFilter::any()
        };

        if let Some(role) = role_override {
            return self.inventory.hosts_for(role, filter);
        }
        if def.roles().is_empty() {
            return Ok(self.inventory.all_hosts());
        }

        let mut hosts: Vec<Host> = Vec::new();
        for role in def.roles() {
            for host in self.inventory.hosts_for(role, filter)? {
                if !hosts.iter().any(|h| h.name == host.name) {
                    hosts.push(host);
                }
            }
        }
        if hosts.is_empty() {
            return Err(Error::NoMatchingHosts {
                role: def.roles().join(","),
                filter: filter.to_string(),
            });
        }
        Ok(hosts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployFile;
    use crate::registry::{TaskDef, TaskFuture};
    use std::time::Duration;

    fn noop(_ctx: TaskContext) -> TaskFuture {
        Box::pin(async { Ok(()) })
    }

    fn fixture() -> (Inventory, Settings) {
        let yaml = "\
application: shelr
deploy_to: /var/www/shelr
roles:
  web: [web1, web2]
  app: [web1, app1]
  db:
    - host: db1
      primary: true
    - db2
";
        let (settings, inventory, _) = DeployFile::from_yaml(yaml).unwrap().resolve().unwrap();
        (inventory, settings)
    }

    fn runner(registry: TaskRegistry) -> Runner {
        let (inventory, settings) = fixture();
        let factory = crate::connection::ConnectionFactory::new(Default::default());
        let executor = Arc::new(Executor::new(
            Arc::new(PooledConnector::new(factory)),
            Duration::from_secs(1),
        ));
        Runner::new(registry, inventory, settings, executor).unwrap()
    }

    #[test]
    fn role_union_dedupes_in_declaration_order() {
        let mut reg = TaskRegistry::new();
        reg.define(TaskDef::new("", "t", noop).role("web").role("app"))
            .unwrap();
        let r = runner(reg);
        let hosts = r.hosts_for_task(r.registry().get("t").unwrap(), None).unwrap();
        let names: Vec<_> = hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["web1", "web2", "app1"]);
    }

    #[test]
    fn only_primary_narrows_to_primary_hosts() {
        let mut reg = TaskRegistry::new();
        reg.define(TaskDef::new("", "t", noop).role("db").only_primary())
            .unwrap();
        let r = runner(reg);
        let hosts = r.hosts_for_task(r.registry().get("t").unwrap(), None).unwrap();
        let names: Vec<_> = hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["db1"]);
    }

    #[test]
    fn roleless_task_binds_to_every_host() {
        let mut reg = TaskRegistry::new();
        reg.define(TaskDef::new("", "t", noop)).unwrap();
        let r = runner(reg);
        let hosts = r.hosts_for_task(r.registry().get("t").unwrap(), None).unwrap();
        assert_eq!(hosts.len(), 5);
    }

    #[test]
    fn role_override_replaces_declared_roles() {
        let mut reg = TaskRegistry::new();
        reg.define(TaskDef::new("", "t", noop).role("web")).unwrap();
        let r = runner(reg);
        let hosts = r
            .hosts_for_task(r.registry().get("t").unwrap(), Some("db"))
            .unwrap();
        let names: Vec<_> = hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["db1", "db2"]);
    }

    #[test]
    fn runner_construction_validates_hooks() {
        let mut reg = TaskRegistry::new();
        reg.define(TaskDef::new("", "t", noop)).unwrap();
        reg.before("t", "missing");
        let (inventory, settings) = fixture();
        let factory = crate::connection::ConnectionFactory::new(Default::default());
        let executor = Arc::new(Executor::new(
            Arc::new(PooledConnector::new(factory)),
            Duration::from_secs(1),
        ));
        assert!(matches!(
            Runner::new(reg, inventory, settings, executor),
            Err(Error::UnknownTask(_))
        ));
    }
}
