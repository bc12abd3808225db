//! The built-in deployment recipe.
//!
//! Tasks are grouped in namespaces mirroring the deployment surface:
//! `deploy` for the app server lifecycle, `solr` for the search daemon,
//! `sitemap` for sitemap rollover, `config` for rendered configuration,
//! and `backup` for database backups.

mod app_config;
mod backup;
mod deploy;
mod sitemap;
mod solr;

pub use deploy::{signal_server, Signal};

use crate::error::Result;
use crate::registry::{TaskDef, TaskRegistry};

/// Build the registry with every built-in task and hook.
pub fn build_registry() -> Result<TaskRegistry> {
    let mut reg = TaskRegistry::new();

    reg.define(
        TaskDef::new("deploy", "start", deploy::start)
            .role("app")
            .describe("Start the app server"),
    )?;
    reg.define(
        TaskDef::new("deploy", "stop", deploy::stop)
            .role("app")
            .describe("Stop the app server immediately"),
    )?;
    reg.define(
        TaskDef::new("deploy", "restart", deploy::restart)
            .role("app")
            .describe("Restart the app server gracefully"),
    )?;

    reg.define(
        TaskDef::new("solr", "start", solr::start)
            .role("app")
            .describe("Start the search daemon"),
    )?;
    reg.define(
        TaskDef::new("solr", "stop", solr::stop)
            .role("app")
            .describe("Stop the search daemon"),
    )?;
    reg.define(
        TaskDef::new("solr", "restart", solr::restart)
            .role("app")
            .describe("Restart the search daemon"),
    )?;

    reg.define(
        TaskDef::new("sitemap", "copy_old", sitemap::copy_old)
            .role("app")
            .describe("Carry sitemaps from the previous release"),
    )?;
    reg.define(
        TaskDef::new("sitemap", "refresh", sitemap::refresh)
            .role("app")
            .describe("Regenerate and publish sitemaps"),
    )?;

    reg.define(
        TaskDef::new("config", "cp", app_config::cp)
            .role("app")
            .describe("Copy shared configs into the release"),
    )?;
    reg.define(
        TaskDef::new("config:unicorn", "generate", app_config::generate)
            .role("app")
            .describe("Render the app server config locally"),
    )?;
    reg.define(
        TaskDef::new("config:unicorn", "upload", app_config::upload)
            .role("app")
            .describe("Upload the staged app server config"),
    )?;
    reg.define(
        TaskDef::new("config:unicorn", "apply", app_config::apply)
            .role("app")
            .describe("Reload the app server config"),
    )?;

    reg.define(
        TaskDef::new("backup", "create", backup::create)
            .role("db")
            .only_primary()
            .describe("Create a database backup on the primary db host"),
    )?;
    reg.define(
        TaskDef::new("backup", "download", backup::download)
            .role("db")
            .only_primary()
            .describe("Download a backup to the control node"),
    )?;
    reg.define(
        TaskDef::new("backup", "mirror", backup::mirror)
            .role("db")
            .only_primary()
            .describe("Backup, download, and restore locally"),
    )?;

    // A stale staged config must never reach a host.
    reg.before("config:unicorn:upload", "config:unicorn:generate");
    reg.before("config:unicorn:apply", "config:unicorn:upload");

    Ok(reg)
}
