//! App server lifecycle: start, stop, restart via unicorn signals.

use tracing::info;

use crate::command::CommandLine;
use crate::error::{Error, Result};
use crate::executor::TaskContext;
use crate::registry::TaskFuture;

/// Signals sent to the app server master process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Immediate termination.
    Kill,
    /// Graceful restart with a fresh master.
    Usr2,
    /// Reload configuration in place.
    Hup,
}

impl Signal {
    fn flag(self) -> &'static str {
        match self {
            Signal::Kill => "-9",
            Signal::Usr2 => "-USR2",
            Signal::Hup => "-HUP",
        }
    }
}

/// Read the server pid on one host and signal it. Each host signals its
/// own pid; the pid file is never shared across hosts.
async fn signal_host(
    ctx: &TaskContext,
    host: &crate::inventory::Host,
    signal: Signal,
) -> Result<()> {
    let pid_file = &ctx.settings().pid_file;
    let pid = ctx
        .capture_on(host, &CommandLine::new("cat").arg(pid_file))
        .await?;
    if pid.is_empty() || !pid.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::config(format!(
            "pid file '{}' on '{}' does not contain a pid: '{}'",
            pid_file, host.name, pid
        )));
    }
    info!(host = %host.name, pid = %pid, signal = %signal.flag(), "signaling app server");
    ctx.run_on(host, &CommandLine::new("kill").arg(signal.flag()).arg(pid))
        .await?;
    Ok(())
}

/// Signal the app server on every bound host in parallel.
pub async fn signal_server(ctx: &TaskContext, signal: Signal) -> Result<()> {
    let futures = ctx
        .hosts()
        .iter()
        .map(|host| signal_host(ctx, host, signal));
    let results = futures::future::join_all(futures).await;
    for result in results {
        result?;
    }
    Ok(())
}

pub(super) fn start(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move {
        let settings = ctx.settings().clone();
        let cmd = CommandLine::new("bundle")
            .args(["exec", "unicorn"])
            .args(["-E", settings.rails_env.as_str()])
            .arg("-D")
            .arg("-c")
            .arg(format!("config/{}", settings.unicorn_config_name))
            .current_dir(&settings.current_path);
        ctx.run(&cmd).await
    })
}

pub(super) fn stop(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move { signal_server(&ctx, Signal::Kill).await })
}

pub(super) fn restart(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move { signal_server(&ctx, Signal::Usr2).await })
}
