//! Error types for Deckhand.
//!
//! The taxonomy mirrors how failures propagate through a deployment run:
//! connection problems are transient and retried at connect time, remote
//! command failures abort the current task chain, and everything else is a
//! configuration or resolution problem caught before any command runs.

use thiserror::Error;

/// Result type alias for Deckhand operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Deckhand.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Failed to establish a session to a host after bounded retries.
    #[error("Failed to connect to '{host}': {message}")]
    ConnectionFailed {
        /// Target host
        host: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// A remote command returned a nonzero exit code.
    #[error("Command `{command}` failed on '{host}' with exit code {exit_code}: {stderr}")]
    CommandExit {
        /// Target host
        host: String,
        /// The command line as sent to the remote shell
        command: String,
        /// Exit code reported by the remote shell
        exit_code: i32,
        /// Captured standard error, trimmed
        stderr: String,
    },

    /// A command exceeded the per-command timeout. Treated like a nonzero
    /// exit: the chain aborts and the command is not retried.
    #[error("Command `{command}` timed out on '{host}' after {timeout_secs} seconds")]
    CommandTimeout {
        /// Target host
        host: String,
        /// The command line as sent to the remote shell
        command: String,
        /// Timeout in seconds
        timeout_secs: u64,
    },

    // ========================================================================
    // Inventory Errors
    // ========================================================================
    /// Role not present in the inventory.
    #[error("Role '{0}' not found in inventory")]
    RoleNotFound(String),

    /// A host filter matched nothing within an existing role.
    #[error("No hosts in role '{role}' match filter '{filter}'")]
    NoMatchingHosts {
        /// Role name
        role: String,
        /// Human readable filter description
        filter: String,
    },

    // ========================================================================
    // Task Registry Errors
    // ========================================================================
    /// Task lookup by dotted name failed.
    #[error("Task '{0}' is not defined")]
    UnknownTask(String),

    /// The hook graph contains a cycle.
    #[error("Cyclic hook chain: {}", .chain.join(" -> "))]
    CyclicHooks {
        /// The offending chain, ending on the repeated task
        chain: Vec<String>,
    },

    // ========================================================================
    // Template Errors
    // ========================================================================
    /// A template referenced a variable absent from the variable map.
    #[error("Template '{template}' references undefined variable '{variable}'")]
    TemplateUndefined {
        /// Template name or path
        template: String,
        /// The missing variable
        variable: String,
    },

    /// Template rendering failed for a reason other than a missing variable.
    #[error("Template '{template}' failed to render: {message}")]
    TemplateRender {
        /// Template name or path
        template: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Creates a new connection failure error.
    pub fn connection_failed(host: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ConnectionFailed {
            host: host.into(),
            message: message.to_string(),
        }
    }

    /// Creates a new command exit error.
    pub fn command_exit(
        host: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandExit {
            host: host.into(),
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CommandExit { .. } | Error::CommandTimeout { .. } => 2,
            Error::ConnectionFailed { .. } => 3,
            Error::UnknownTask(_) | Error::CyclicHooks { .. } => 4,
            Error::RoleNotFound(_) | Error::NoMatchingHosts { .. } | Error::Config(_) => 5,
            Error::TemplateUndefined { .. } | Error::TemplateRender { .. } => 6,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_exit_names_host_command_and_code() {
        let err = Error::command_exit("db1", "cd /app && rake db:backup:create", 1, "boom");
        let msg = err.to_string();
        assert!(msg.contains("db1"));
        assert!(msg.contains("rake db:backup:create"));
        assert!(msg.contains("exit code 1"));
    }

    #[test]
    fn cyclic_hooks_render_as_chain() {
        let err = Error::CyclicHooks {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic hook chain: a -> b -> a");
    }

    #[test]
    fn exit_codes_are_distinct_per_category() {
        assert_eq!(Error::command_exit("h", "c", 1, "").exit_code(), 2);
        assert_eq!(Error::connection_failed("h", "refused").exit_code(), 3);
        assert_eq!(Error::UnknownTask("x".into()).exit_code(), 4);
        assert_eq!(Error::RoleNotFound("db".into()).exit_code(), 5);
        assert_eq!(
            Error::TemplateUndefined {
                template: "t".into(),
                variable: "v".into()
            }
            .exit_code(),
            6
        );
    }
}
