mod api;
mod cli;
mod config;
mod models;
mod monitor;
mod render;
mod session;
#[cfg(test)]
mod testing;
mod utils;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use crate::api::ApiError;
use crate::cli::auth::{LoginArgs, ProfileCommand, RegisterArgs};
use crate::cli::bundles::BundleCommand;
use crate::cli::credentials::CredentialCommand;
use crate::cli::jobs::JobCommand;
use crate::cli::molecules::MoleculeCommand;
use crate::cli::settings::ConfigCommand;
use crate::cli::Context;
use crate::config::{load_config, API_URL_ENV};
use crate::session::SessionStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Manage quantum chemistry jobs on a qcjob service", long_about = None)]
struct Cli {
    /// Base URL of the job service
    #[arg(long, global = true, env = API_URL_ENV)]
    api_url: Option<String>,
    /// More log output on stderr, repeat for debug
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Do not ask before destructive actions
    #[arg(short = 'y', long, global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account
    Register(RegisterArgs),
    /// Log in and remember the session
    Login(LoginArgs),
    /// Forget the stored session
    Logout,
    /// Print the logged-in user
    Whoami,
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Overview of bundles, molecules and jobs
    Dashboard,
    #[command(subcommand)]
    Credentials(CredentialCommand),
    #[command(subcommand)]
    Bundles(BundleCommand),
    #[command(subcommand)]
    Molecules(MoleculeCommand),
    #[command(subcommand)]
    Jobs(JobCommand),
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(cli.api_url)?;
    debug!("Using API at {}", config.api_url);

    let command = match cli.command {
        Commands::Config(cmd) => return cli::settings::run(&config, cmd),
        command => command,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let needs_session = !matches!(command, Commands::Register(_) | Commands::Login(_));
    let mut ctx = Context::new(config, SessionStore::open_default()?, cli.yes)?;
    let result = runtime.block_on(dispatch(&mut ctx, command));

    if let Err(e) = &result {
        if needs_session && session_expired(e) {
            eprintln!("Session expired, run `qcjob login` again");
        }
    }
    result
}

fn session_expired(e: &anyhow::Error) -> bool {
    e.downcast_ref::<ApiError>()
        .is_some_and(|e| e.status() == Some(401))
}

async fn dispatch(ctx: &mut Context, command: Commands) -> Result<()> {
    match command {
        Commands::Register(args) => cli::auth::register(ctx, args).await,
        Commands::Login(args) => cli::auth::login(ctx, args).await,
        Commands::Logout => cli::auth::logout(ctx),
        Commands::Whoami => cli::auth::whoami(ctx).await,
        Commands::Profile(cmd) => cli::auth::profile(ctx, cmd).await,
        Commands::Dashboard => cli::dashboard::run(ctx).await,
        Commands::Credentials(cmd) => cli::credentials::run(ctx, cmd).await,
        Commands::Bundles(cmd) => cli::bundles::run(ctx, cmd).await,
        Commands::Molecules(cmd) => cli::molecules::run(ctx, cmd).await,
        Commands::Jobs(cmd) => cli::jobs::run(ctx, cmd).await,
        Commands::Config(cmd) => cli::settings::run(&ctx.config, cmd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "qcjob", "jobs", "log", "12", "--follow", "--interval", "2", "-vv", "--yes",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.yes);
        match cli.command {
            Commands::Jobs(JobCommand::Log { id, follow, interval }) => {
                assert_eq!((id, follow, interval), (12, true, Some(2)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn status_filter_is_checked_by_the_parser() {
        assert!(Cli::try_parse_from(["qcjob", "jobs", "list", "--status", "running"]).is_ok());
        assert!(Cli::try_parse_from(["qcjob", "jobs", "list", "--status", "held"]).is_err());
        assert!(Cli::try_parse_from(["qcjob", "jobs", "log", "3", "--interval", "2"]).is_err());
        assert!(Cli::try_parse_from(["qcjob", "jobs", "update", "3", "--status", "held"]).is_err());

        let cli = Cli::try_parse_from(["qcjob", "jobs", "list", "--status", "Done"]).unwrap();
        match cli.command {
            Commands::Jobs(JobCommand::List { status }) => assert_eq!(status, Some(JobStatus::Done)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_unauthorized_errors_mean_expired() {
        let expired = anyhow::Error::from(ApiError::Status {
            status: 401,
            detail: "Invalid token".into(),
        });
        assert!(session_expired(&expired));

        let missing = anyhow::Error::from(ApiError::Status {
            status: 404,
            detail: "Job not found".into(),
        });
        assert!(!session_expired(&missing));
        assert!(!session_expired(&anyhow::anyhow!("Nothing to update")));
    }
}
