//! Task registry and hook resolution.
//!
//! Tasks are registered under dotted namespace paths (`backup:create`,
//! `config:unicorn:apply`) into a static registry built at startup.
//! Hooks declare that one task runs before or after another; execution
//! order is resolved by walking the hook graph depth-first, prepending
//! before-hooks and appending after-hooks in registration order. The walk
//! keeps an in-progress stack so a cycle is reported as an error chain
//! rather than looping forever.

use std::future::Future;
use std::pin::Pin;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::executor::TaskContext;

/// The future returned by a task body.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A task body: an async fn over the task's execution context.
pub type TaskBody = fn(TaskContext) -> TaskFuture;

/// Whether a hook runs before or after its trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Target runs before the trigger.
    Before,
    /// Target runs after the trigger.
    After,
}

#[derive(Debug, Clone)]
struct Hook {
    kind: HookKind,
    trigger: String,
    target: String,
}

/// A registered task: dotted name, role bindings, and a body.
pub struct TaskDef {
    full_name: String,
    namespace: String,
    roles: Vec<String>,
    only_primary: bool,
    description: Option<String>,
    body: TaskBody,
}

impl TaskDef {
    /// Create a task under `namespace` (empty for top level).
    pub fn new(namespace: &str, name: &str, body: TaskBody) -> Self {
        let full_name = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}:{}", namespace, name)
        };
        Self {
            full_name,
            namespace: namespace.to_string(),
            roles: Vec::new(),
            only_primary: false,
            description: None,
            body,
        }
    }

    /// Bind the task to a role. May be called repeatedly.
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Restrict the task to primary hosts of its roles.
    pub fn only_primary(mut self) -> Self {
        self.only_primary = true;
        self
    }

    /// Attach a one-line description for `list-tasks`.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Full dotted invocation name.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Namespace path, empty for top-level tasks.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Roles the task is bound to; empty means every host.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Whether the task only runs on primary hosts.
    pub fn is_only_primary(&self) -> bool {
        self.only_primary
    }

    /// Description, when present.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The task body.
    pub fn body(&self) -> TaskBody {
        self.body
    }
}

impl std::fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.full_name)
            .field("roles", &self.roles)
            .field("only_primary", &self.only_primary)
            .finish()
    }
}

/// Static task registry with before/after hooks.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: IndexMap<String, TaskDef>,
    hooks: Vec<Hook>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Redefining an existing name is an error.
    pub fn define(&mut self, def: TaskDef) -> Result<()> {
        if self.tasks.contains_key(def.full_name()) {
            return Err(Error::config(format!(
                "task '{}' is already defined",
                def.full_name()
            )));
        }
        self.tasks.insert(def.full_name().to_string(), def);
        Ok(())
    }

    /// Register a hook: `target` runs before/after `trigger`.
    pub fn register_hook(
        &mut self,
        kind: HookKind,
        trigger: impl Into<String>,
        target: impl Into<String>,
    ) {
        self.hooks.push(Hook {
            kind,
            trigger: trigger.into(),
            target: target.into(),
        });
    }

    /// Shorthand: run `target` before `trigger`.
    pub fn before(&mut self, trigger: impl Into<String>, target: impl Into<String>) {
        self.register_hook(HookKind::Before, trigger, target);
    }

    /// Shorthand: run `target` after `trigger`.
    pub fn after(&mut self, trigger: impl Into<String>, target: impl Into<String>) {
        self.register_hook(HookKind::After, trigger, target);
    }

    /// Look up a task by dotted name.
    pub fn get(&self, name: &str) -> Result<&TaskDef> {
        self.tasks
            .get(name)
            .ok_or_else(|| Error::UnknownTask(name.to_string()))
    }

    /// Registered tasks in definition order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskDef> {
        self.tasks.values()
    }

    /// Resolve the full execution order for `task`: recursively resolved
    /// before-hooks, the task itself, then recursively resolved
    /// after-hooks, each group in hook registration order.
    pub fn resolve_execution_order(&self, task: &str) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut stack = Vec::new();
        self.visit(task, &mut order, &mut stack)?;
        Ok(order)
    }

    fn visit(&self, task: &str, order: &mut Vec<String>, stack: &mut Vec<String>) -> Result<()> {
        if let Some(pos) = stack.iter().position(|t| t == task) {
            let mut chain: Vec<String> = stack[pos..].to_vec();
            chain.push(task.to_string());
            return Err(Error::CyclicHooks { chain });
        }
        if !self.tasks.contains_key(task) {
            return Err(Error::UnknownTask(task.to_string()));
        }

        stack.push(task.to_string());

        for hook in self.hooks_for(task, HookKind::Before) {
            self.visit(&hook.target, order, stack)?;
        }
        order.push(task.to_string());
        for hook in self.hooks_for(task, HookKind::After) {
            self.visit(&hook.target, order, stack)?;
        }

        stack.pop();
        Ok(())
    }

    fn hooks_for<'a>(
        &'a self,
        trigger: &'a str,
        kind: HookKind,
    ) -> impl Iterator<Item = &'a Hook> + 'a {
        self.hooks
            .iter()
            .filter(move |h| h.kind == kind && h.trigger == trigger)
    }

    /// Validate the registry before execution begins: every hook endpoint
    /// must name a defined task and every task must resolve acyclically.
    pub fn validate(&self) -> Result<()> {
        for hook in &self.hooks {
            if !self.tasks.contains_key(&hook.trigger) {
                return Err(Error::UnknownTask(hook.trigger.clone()));
            }
            if !self.tasks.contains_key(&hook.target) {
                return Err(Error::UnknownTask(hook.target.clone()));
            }
        }
        for name in self.tasks.keys() {
            self.resolve_execution_order(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ctx: TaskContext) -> TaskFuture {
        Box::pin(async { Ok(()) })
    }

    fn registry_with(names: &[&str]) -> TaskRegistry {
        let mut reg = TaskRegistry::new();
        for name in names {
            reg.define(TaskDef::new("", name, noop)).unwrap();
        }
        reg
    }

    #[test]
    fn before_and_after_hooks_order_around_the_task() {
        let mut reg = registry_with(&["t", "b1", "b2", "a1"]);
        reg.before("t", "b1");
        reg.before("t", "b2");
        reg.after("t", "a1");

        let order = reg.resolve_execution_order("t").unwrap();
        assert_eq!(order, ["b1", "b2", "t", "a1"]);
    }

    #[test]
    fn hooks_resolve_recursively() {
        let mut reg = registry_with(&["t", "b", "bb", "a", "aa"]);
        reg.before("t", "b");
        reg.before("b", "bb");
        reg.after("t", "a");
        reg.after("a", "aa");

        let order = reg.resolve_execution_order("t").unwrap();
        assert_eq!(order, ["bb", "b", "t", "a", "aa"]);
    }

    #[test]
    fn cyclic_hooks_are_detected() {
        let mut reg = registry_with(&["a", "b"]);
        reg.before("a", "b");
        reg.before("b", "a");

        let err = reg.resolve_execution_order("a").unwrap_err();
        match err {
            Error::CyclicHooks { chain } => {
                assert_eq!(chain.first(), chain.last());
                assert!(chain.len() >= 3);
            }
            other => panic!("expected CyclicHooks, got {:?}", other),
        }
    }

    #[test]
    fn self_hook_is_a_cycle() {
        let mut reg = registry_with(&["a"]);
        reg.before("a", "a");
        assert!(matches!(
            reg.resolve_execution_order("a"),
            Err(Error::CyclicHooks { .. })
        ));
    }

    #[test]
    fn unknown_task_is_an_error() {
        let reg = registry_with(&["a"]);
        assert!(matches!(
            reg.resolve_execution_order("missing"),
            Err(Error::UnknownTask(name)) if name == "missing"
        ));
    }

    #[test]
    fn duplicate_definition_is_rejected() {
        let mut reg = registry_with(&["a"]);
        let err = reg.define(TaskDef::new("", "a", noop)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_rejects_hooks_on_unknown_tasks() {
        let mut reg = registry_with(&["a"]);
        reg.before("a", "missing");
        assert!(matches!(reg.validate(), Err(Error::UnknownTask(_))));
    }

    #[test]
    fn namespaced_names_are_dotted() {
        let def = TaskDef::new("config:unicorn", "apply", noop);
        assert_eq!(def.full_name(), "config:unicorn:apply");
        assert_eq!(def.namespace(), "config:unicorn");
    }
}
