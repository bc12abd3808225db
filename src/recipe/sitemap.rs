//! Sitemap handling around a release rollout.

use crate::command::CommandLine;
use crate::executor::TaskContext;
use crate::registry::TaskFuture;

/// Carry sitemaps from the previous release into the new one, so search
/// engines see a sitemap while the refresh is still running. The previous
/// release may be gone (first deploy), hence the existence conditional.
pub(super) fn copy_old(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move {
        let settings = ctx.settings();
        let cmd = CommandLine::script(format!(
            "if [ -e {prev}/public/sitemap_index.xml.gz ]; then cp {prev}/public/sitemap* {cur}/public/; fi",
            prev = settings.previous_release,
            cur = settings.current_release,
        ));
        ctx.run(&cmd).await
    })
}

/// Regenerate sitemaps and move them where the web server serves them
/// from.
pub(super) fn refresh(ctx: TaskContext) -> TaskFuture {
    Box::pin(async move {
        let settings = ctx.settings().clone();
        let generate = CommandLine::new("bundle")
            .args(["exec", "rake", "sitemap:refresh"])
            .current_dir(&settings.latest_release)
            .env("RAILS_ENV", &settings.rails_env);
        ctx.run(&generate).await?;

        let publish = CommandLine::script("mv public/sitemap* public/assets/")
            .current_dir(&settings.latest_release);
        ctx.run(&publish).await
    })
}
