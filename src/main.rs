//! Deckhand - a deployment task runner
//!
//! Runs hooked deployment tasks (app server lifecycle, config rollout,
//! database backups) against role-grouped hosts over SSH.
//!
//! This is the main entry point for the Deckhand CLI.

use std::sync::Arc;
use std::time::Duration;

use deckhand::cli::output::Output;
use deckhand::cli::{Cli, Commands};
use deckhand::config::DeployFile;
use deckhand::connection::ConnectionFactory;
use deckhand::executor::{Executor, PooledConnector, Runner};
use deckhand::recipe;
use deckhand::{Error, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    let output = Output::new(cli.no_color);
    if let Err(e) = run(&cli, &output).await {
        output.error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: &Cli, output: &Output) -> Result<()> {
    match &cli.command {
        Commands::Run { task, role, set } => {
            let mut file = DeployFile::load(&cli.config)?;
            for pair in set {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    Error::config(format!("invalid --set '{}': expected key=value", pair))
                })?;
                file.apply_override(key, value)?;
            }
            let (settings, inventory, ssh) = file.resolve()?;

            let registry = recipe::build_registry()?;
            let connector = Arc::new(PooledConnector::new(ConnectionFactory::new(ssh.clone())));
            let executor = Arc::new(Executor::new(
                connector.clone(),
                Duration::from_secs(ssh.command_timeout),
            ));
            let runner = Runner::new(registry, inventory, settings, executor)?;

            let result = runner.invoke(task, role.as_deref()).await;
            connector.close_all().await;
            result?;

            output.info(&format!("{}: done", task));
            Ok(())
        }

        Commands::ListTasks => {
            let registry = recipe::build_registry()?;
            output.task_list(&registry);
            Ok(())
        }

        Commands::ListHosts { role, primary } => {
            let file = DeployFile::load(&cli.config)?;
            let (_, inventory, _) = file.resolve()?;
            output.host_list(&inventory, role.as_deref(), *primary);
            Ok(())
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}
