//! Search daemon control through the application's rake tasks.

use crate::command::CommandLine;
use crate::error::Result;
use crate::executor::TaskContext;
use crate::registry::TaskFuture;

fn rake(ctx: &TaskContext, task: &str) -> CommandLine {
    CommandLine::new("bundle")
        .args(["exec", "rake", task])
        .current_dir(&ctx.settings().current_path)
        .env("RAILS_ENV", &ctx.settings().rails_env)
}

async fn start_impl(ctx: &TaskContext) -> Result<()> {
    ctx.run(&rake(ctx, "sunspot:solr:start")).await
}

async fn stop_impl(ctx: &TaskContext) -> Result<()> {
    ctx.run(&rake(ctx, "sunspot:solr:stop")).await
}

pub(super) fn start(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move { start_impl(&ctx).await })
}

pub(super) fn stop(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move { stop_impl(&ctx).await })
}

pub(super) fn restart(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move {
        stop_impl(&ctx).await?;
        start_impl(&ctx).await
    })
}
