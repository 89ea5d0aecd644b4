use std::io::Write;

use anyhow::Result;
use futures::try_join;

use super::{stdout, Context};
use crate::render;

pub async fn run(ctx: &mut Context) -> Result<()> {
    let user = ctx.authenticate().await?;
    let api = &ctx.api;

    let (bundles, molecules, jobs) = try_join!(api.bundles(), api.molecules(), api.jobs())?;

    let mut out = stdout();
    render::user(&mut out, &user)?;
    writeln!(out)?;
    render::dashboard(&mut out, &bundles, &molecules, &jobs)?;
    Ok(())
}
