//! Colored terminal output.

use colored::Colorize;

use crate::inventory::{Host, Inventory};
use crate::registry::TaskRegistry;

/// Output formatter for the CLI.
pub struct Output {
    use_color: bool,
}

impl Output {
    /// Create a formatter. Color is disabled when `no_color` is set or the
    /// NO_COLOR environment variable is present.
    pub fn new(no_color: bool) -> Self {
        let use_color = !no_color && std::env::var("NO_COLOR").is_err();
        Self { use_color }
    }

    /// Print an informational line.
    pub fn info(&self, message: &str) {
        println!("{}", message);
    }

    /// Print an error line to stderr.
    pub fn error(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "error:".red().bold(), message);
        } else {
            eprintln!("error: {}", message);
        }
    }

    /// Print the task table.
    pub fn task_list(&self, registry: &TaskRegistry) {
        let width = registry
            .tasks()
            .map(|t| t.full_name().len())
            .max()
            .unwrap_or(0);
        for task in registry.tasks() {
            // Pad before colorizing: ANSI escapes would skew the column.
            let pad = " ".repeat(width - task.full_name().len());
            let name = if self.use_color {
                task.full_name().cyan().to_string()
            } else {
                task.full_name().to_string()
            };
            match task.description() {
                Some(desc) => println!("{}{}  {}", name, pad, desc),
                None => println!("{}", name),
            }
        }
    }

    /// Print hosts grouped by role.
    pub fn host_list(&self, inventory: &Inventory, role_filter: Option<&str>, primary: bool) {
        for role_name in inventory.role_names() {
            if role_filter.is_some_and(|r| r != role_name) {
                continue;
            }
            let role = match inventory.role(role_name) {
                Some(r) => r,
                None => continue,
            };
            let header = if self.use_color {
                role_name.bold().to_string()
            } else {
                role_name.to_string()
            };
            println!("{}:", header);
            for host in &role.hosts {
                if primary && !host.primary {
                    continue;
                }
                println!("  {}", self.host_line(host));
            }
        }
    }

    fn host_line(&self, host: &Host) -> String {
        let mut line = host.name.clone();
        if let Some(address) = &host.address {
            line.push_str(&format!(" ({})", address));
        }
        if host.primary {
            let tag = if self.use_color {
                "primary".yellow().to_string()
            } else {
                "primary".to_string()
            };
            line.push_str(&format!(" [{}]", tag));
        }
        line
    }
}
