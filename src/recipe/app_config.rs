//! App server configuration: render, upload, apply.
//!
//! `config:unicorn:generate` renders the config template locally into the
//! staging directory, `upload` pushes the staged file to every app host,
//! and `apply` reloads the running server with HUP. The hook wiring in the
//! recipe guarantees a stale staged file is never uploaded.

use serde_json::json;

use crate::command::CommandLine;
use crate::error::Result;
use crate::executor::TaskContext;
use crate::registry::TaskFuture;
use crate::template::{self, Renderer, TemplateVars};

use super::deploy::{signal_server, Signal};

/// Variables every config template can reference.
fn template_vars(ctx: &TaskContext) -> TemplateVars {
    let settings = ctx.settings();
    let mut vars = TemplateVars::new();
    vars.insert("application".into(), json!(settings.application));
    vars.insert("stage".into(), json!(settings.stage));
    vars.insert("rails_env".into(), json!(settings.rails_env));
    vars.insert("deploy_to".into(), json!(settings.deploy_to));
    vars.insert("shared_path".into(), json!(settings.shared_path));
    vars.insert("current_path".into(), json!(settings.current_path));
    vars.insert("pid_file".into(), json!(settings.pid_file));
    vars
}

async fn generate_impl(ctx: &TaskContext) -> Result<()> {
    let settings = ctx.settings();
    let renderer = Renderer::new();
    let rendered = renderer.render_file(&settings.unicorn_template, &template_vars(ctx))?;
    template::write(&rendered, settings.staged_config_path())
}

pub(super) fn generate(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move { generate_impl(&ctx).await })
}

pub(super) fn upload(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move {
        let staged = ctx.settings().staged_config_path();
        let remote = ctx.settings().remote_config_path();
        ctx.upload(staged, remote).await
    })
}

pub(super) fn apply(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move { signal_server(&ctx, Signal::Hup).await })
}

/// Copy shared config files into the release being rolled out. Glob
/// expansion requires a script step.
pub(super) fn cp(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move {
        let settings = ctx.settings();
        let cmd = CommandLine::script(format!(
            "cp -Rf {}/configs/* {}/config",
            settings.shared_path, settings.latest_release
        ));
        ctx.run(&cmd).await
    })
}
