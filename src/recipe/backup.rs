//! Database backups: create remotely, download, mirror into the local
//! development database.
//!
//! All backup tasks run on the primary db host only. Versions are
//! directory names under the remote backup path; "latest" is whatever
//! `ls -t` puts first.

use tracing::info;

use crate::command::CommandLine;
use crate::error::{Error, Result};
use crate::executor::TaskContext;
use crate::registry::TaskFuture;

/// Most recent backup version on the remote, by mtime. An empty listing
/// is an error; downstream steps would otherwise pack a nameless archive.
async fn latest(ctx: &TaskContext) -> Result<String> {
    let cmd = CommandLine::script("ls -t | head -1").current_dir(&ctx.settings().backup_path);
    let version = ctx.capture(&cmd).await?;
    if version.is_empty() {
        return Err(Error::config(format!(
            "no backups found in '{}'",
            ctx.settings().backup_path
        )));
    }
    Ok(version)
}

/// The version to operate on: the explicit override when set, otherwise
/// the latest remote backup.
async fn resolve_version(ctx: &TaskContext) -> Result<String> {
    match &ctx.settings().backup_version {
        Some(version) => Ok(version.clone()),
        None => latest(ctx).await,
    }
}

async fn create_impl(ctx: &TaskContext) -> Result<()> {
    let settings = ctx.settings().clone();
    let cmd = CommandLine::new("bundle")
        .args(["exec", "rake", "db:backup:create"])
        .current_dir(&settings.current_path)
        .env("RAILS_ENV", &settings.rails_env)
        .env("BACKUP_DIR", &settings.backup_path)
        .env("SKIP_TABLES", settings.skip_backup_tables.join(","));
    ctx.run(&cmd).await
}

/// Pack a backup remotely, pull it down, unpack it locally. Returns the
/// version that was downloaded so mirror can restore from it.
async fn download_impl(ctx: &TaskContext) -> Result<String> {
    let settings = ctx.settings().clone();
    let version = resolve_version(ctx).await?;
    info!(version = %version, "downloading backup");

    let archive = format!("{}.tar.gz", version);
    let remote_archive = format!("{}/{}", settings.backup_path, archive);
    let local_dir = settings.local_backup_dir.display().to_string();

    let pack = CommandLine::new("tar")
        .args(["-czf", archive.as_str(), version.as_str()])
        .current_dir(&settings.backup_path);
    ctx.run(&pack).await?;

    ctx.run_local(&CommandLine::new("mkdir").args(["-p", local_dir.as_str()]))
        .await?;
    ctx.download(&remote_archive, settings.local_backup_dir.join(&archive))
        .await?;
    ctx.run(&CommandLine::new("rm").arg(&remote_archive)).await?;

    let unpack = CommandLine::new("tar")
        .args(["-zxf", archive.as_str()])
        .current_dir(&local_dir);
    ctx.run_local(&unpack).await?;
    ctx.run_local(
        &CommandLine::new("rm")
            .arg(&archive)
            .current_dir(&local_dir),
    )
    .await?;

    Ok(version)
}

pub(super) fn create(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move { create_impl(&ctx).await })
}

pub(super) fn download(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move {
        download_impl(&ctx).await?;
        Ok(())
    })
}

/// Take a fresh backup, pull it down, and restore it into the local
/// database. Aborts before touching anything local when the remote
/// create fails.
pub(super) fn mirror(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move {
        create_impl(&ctx).await?;
        let version = download_impl(&ctx).await?;

        let restore_dir = ctx.settings().local_backup_dir.join(&version);
        let restore = CommandLine::new("bundle")
            .args(["exec", "rake", "db:backup:restore"])
            .env("BACKUP_DIR", restore_dir.display().to_string());
        ctx.run_local(&restore).await?;
        Ok(())
    })
}
