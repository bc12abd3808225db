//! Command-line interface for Deckhand.

pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Deckhand - a deployment task runner
///
/// Runs hooked deployment tasks against role-grouped hosts over SSH.
#[derive(Parser, Debug, Clone)]
#[command(name = "deckhand")]
#[command(author = "Deckhand Contributors")]
#[command(version)]
#[command(about = "A deployment task runner", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the deploy file
    #[arg(
        short = 'c',
        long,
        global = true,
        env = "DECKHAND_CONFIG",
        default_value = "deploy.yml"
    )]
    pub config: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Invoke a task and its hook chain
    Run {
        /// Dotted task name, e.g. backup:mirror
        task: String,

        /// Narrow every task in the chain to one role
        #[arg(short = 'r', long)]
        role: Option<String>,

        /// Override a setting (key=value), repeatable
        #[arg(short = 's', long = "set", value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
        set: Vec<String>,
    },

    /// List every registered task
    ListTasks,

    /// List inventory hosts
    ListHosts {
        /// Only hosts of this role
        #[arg(short = 'r', long)]
        role: Option<String>,

        /// Only hosts flagged primary
        #[arg(long)]
        primary: bool,
    },
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_parses_task_and_overrides() {
        let cli = Cli::parse_from([
            "deckhand",
            "run",
            "backup:mirror",
            "--set",
            "backup_version=backup_7",
            "--role",
            "db",
        ]);
        match cli.command {
            Commands::Run { task, role, set } => {
                assert_eq!(task, "backup:mirror");
                assert_eq!(role.as_deref(), Some("db"));
                assert_eq!(set, ["backup_version=backup_7"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn config_defaults_to_deploy_yml() {
        let cli = Cli::parse_from(["deckhand", "list-tasks"]);
        assert_eq!(cli.config, PathBuf::from("deploy.yml"));
    }
}
