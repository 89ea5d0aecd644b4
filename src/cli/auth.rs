use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use tracing::info;

use super::validation::{validate_password, validate_path, validate_role, validate_username};
use super::{stdout, value_or_prompt, Context};
use crate::models::{UserCreate, UserUpdate};
use crate::{render, session};

#[derive(Args, Debug)]
pub struct RegisterArgs {
    pub username: String,
    /// Local directory the service stages input files in
    #[arg(long)]
    pub local_base_dir: String,
    /// Working directory on the compute server
    #[arg(long)]
    pub remote_base_dir: String,
    #[arg(long, default_value = "user")]
    pub role: String,
    /// Read from stdin when omitted
    #[arg(long, env = "QCJOB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    pub username: String,
    /// Read from stdin when omitted
    #[arg(long, env = "QCJOB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Show the logged-in user
    Show,
    /// Change the base directories
    Update {
        #[arg(long)]
        local_base_dir: Option<String>,
        #[arg(long)]
        remote_base_dir: Option<String>,
    },
    /// Delete the account and log out
    Delete,
}

pub async fn register(ctx: &mut Context, args: RegisterArgs) -> Result<()> {
    validate_username(&args.username)?;
    validate_role(&args.role)?;
    validate_path(&args.local_base_dir, "Local base directory")?;
    validate_path(&args.remote_base_dir, "Remote base directory")?;
    let password = value_or_prompt(args.password, "Password: ")?;
    validate_password(&password)?;

    let user = ctx
        .api
        .register(&UserCreate {
            username: args.username,
            password,
            role: args.role,
            local_base_dir: args.local_base_dir,
            remote_base_dir: args.remote_base_dir,
        })
        .await?;

    info!("Registered user {} with id {}", user.username, user.id);
    println!("Registration complete. Log in with `qcjob login {}`.", user.username);
    Ok(())
}

pub async fn login(ctx: &mut Context, args: LoginArgs) -> Result<()> {
    let password = value_or_prompt(args.password, "Password: ")?;
    let user = session::login(&mut ctx.api, &ctx.store, &args.username, &password).await?;
    println!("Logged in to {} as {}", ctx.api.base_url(), user.username);
    Ok(())
}

pub fn logout(ctx: &mut Context) -> Result<()> {
    session::logout(&mut ctx.api, &ctx.store)?;
    println!("Logged out");
    Ok(())
}

pub async fn whoami(ctx: &mut Context) -> Result<()> {
    let user = ctx.authenticate().await?;
    let me = ctx.api.me().await?;
    println!("{} ({}) at {}", me.username, user.role, ctx.api.base_url());
    Ok(())
}

pub async fn profile(ctx: &mut Context, cmd: ProfileCommand) -> Result<()> {
    let user = ctx.authenticate().await?;

    match cmd {
        ProfileCommand::Show => render::user(&mut stdout(), &user)?,
        ProfileCommand::Update {
            local_base_dir,
            remote_base_dir,
        } => {
            if local_base_dir.is_none() && remote_base_dir.is_none() {
                return Err(anyhow!("Nothing to update"));
            }
            if let Some(dir) = &local_base_dir {
                validate_path(dir, "Local base directory")?;
            }
            if let Some(dir) = &remote_base_dir {
                validate_path(dir, "Remote base directory")?;
            }
            let user = ctx
                .api
                .update_current_user(&UserUpdate {
                    local_base_dir,
                    remote_base_dir,
                })
                .await?;
            render::user(&mut stdout(), &user)?;
        }
        ProfileCommand::Delete => {
            if !ctx.confirm(&format!("Delete account {} and all its data?", user.username))? {
                println!("Aborted");
                return Ok(());
            }
            ctx.api.delete_current_user().await?;
            session::logout(&mut ctx.api, &ctx.store)?;
            println!("Account {} deleted", user.username);
        }
    }
    Ok(())
}
