//! Deckhand - a deployment task runner.
//!
//! Deckhand runs hooked deployment tasks against role-grouped hosts over
//! SSH: app server lifecycle signals, rendered configuration rollout,
//! sitemap rollover, and database backup mirroring. A single YAML deploy
//! file describes the application, its paths, and the host inventory;
//! tasks are registered under dotted namespaces and chained through
//! before/after hooks.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use deckhand::config::DeployFile;
//! use deckhand::connection::ConnectionFactory;
//! use deckhand::executor::{Executor, PooledConnector, Runner};
//!
//! # async fn example() -> deckhand::Result<()> {
//! let (settings, inventory, ssh) = DeployFile::load("deploy.yml")?.resolve()?;
//! let registry = deckhand::recipe::build_registry()?;
//! let connector = Arc::new(PooledConnector::new(ConnectionFactory::new(ssh.clone())));
//! let executor = Arc::new(Executor::new(
//!     connector,
//!     Duration::from_secs(ssh.command_timeout),
//! ));
//! let runner = Runner::new(registry, inventory, settings, executor)?;
//! runner.invoke("backup:mirror", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod recipe;
pub mod registry;
pub mod template;

pub use command::CommandLine;
pub use config::{DeployFile, Settings};
pub use error::{Error, Result};
pub use executor::{Runner, TaskContext};
pub use inventory::{Host, HostFilter, Inventory, Role};
pub use registry::{TaskDef, TaskRegistry};
