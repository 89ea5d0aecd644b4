use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use super::validation::validate_credential;
use super::{read_text, stdout, value_or_prompt, Context};
use crate::models::{AuthMethod, CredentialCreate, CredentialUpdate};
use crate::render;

#[derive(Args, Debug)]
pub struct ServerArgs {
    #[arg(long)]
    pub host: String,
    #[arg(long, default_value_t = 22)]
    pub port: u16,
    #[arg(long)]
    pub username: String,
    #[arg(long, value_enum, default_value_t = AuthMethod::Password)]
    pub auth: AuthMethod,
    /// Asked for on stdin when password auth is used and this is omitted
    #[arg(long, hide_env_values = true, env = "QCJOB_SERVER_PASSWORD")]
    pub password: Option<String>,
    /// Private key file, `-` for stdin
    #[arg(long)]
    pub ssh_key_file: Option<PathBuf>,
}

impl ServerArgs {
    fn into_credential(self) -> Result<CredentialCreate> {
        let (password, ssh_key) = match self.auth {
            AuthMethod::Password => (
                Some(value_or_prompt(self.password, "Server password: ")?),
                None,
            ),
            AuthMethod::SshKey => {
                let path = self
                    .ssh_key_file
                    .ok_or_else(|| anyhow!("SSH key authentication needs --ssh-key-file"))?;
                (None, Some(read_text(&path)?))
            }
        };
        let credential = CredentialCreate {
            host: self.host.trim().to_string(),
            port: self.port,
            username: self.username.trim().to_string(),
            auth_method: self.auth,
            password,
            ssh_key,
        };
        validate_credential(&credential)?;
        Ok(credential)
    }
}

#[derive(Subcommand, Debug)]
pub enum CredentialCommand {
    /// List stored server credentials
    List,
    /// Show one credential
    Show { id: i64 },
    /// Store access to a compute server
    Add(ServerArgs),
    /// Change a stored credential
    Update {
        id: i64,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long, value_enum)]
        auth: Option<AuthMethod>,
        #[arg(long, hide_env_values = true, env = "QCJOB_SERVER_PASSWORD")]
        password: Option<String>,
        #[arg(long)]
        ssh_key_file: Option<PathBuf>,
    },
    /// Delete a credential
    Delete { id: i64 },
    /// Check that the service can reach a server with these parameters
    Test(ServerArgs),
}

pub async fn run(ctx: &mut Context, cmd: CredentialCommand) -> Result<()> {
    ctx.authenticate().await?;
    let api = &ctx.api;

    match cmd {
        CredentialCommand::List => {
            let credentials = api.credentials().await?;
            render::credentials(&mut stdout(), &credentials)?;
        }
        CredentialCommand::Show { id } => {
            let credential = api.credential(id).await?;
            render::credential(&mut stdout(), &credential)?;
        }
        CredentialCommand::Add(args) => {
            let credential = api.create_credential(&args.into_credential()?).await?;
            println!(
                "Stored credential {} for {}@{}",
                credential.id, credential.username, credential.host
            );
        }
        CredentialCommand::Update {
            id,
            host,
            port,
            username,
            auth,
            password,
            ssh_key_file,
        } => {
            if port == Some(0) {
                return Err(anyhow!("Port must be between 1 and 65535"));
            }
            let ssh_key = match ssh_key_file {
                Some(path) => Some(read_text(&path)?),
                None => None,
            };
            match auth {
                Some(AuthMethod::Password) if password.is_none() => {
                    return Err(anyhow!("Switching to password authentication needs --password"))
                }
                Some(AuthMethod::SshKey) if ssh_key.is_none() => {
                    return Err(anyhow!("Switching to SSH key authentication needs --ssh-key-file"))
                }
                _ => {}
            }
            let update = CredentialUpdate {
                host,
                port,
                username,
                auth_method: auth,
                password,
                ssh_key,
            };
            let credential = api.update_credential(id, &update).await?;
            render::credential(&mut stdout(), &credential)?;
        }
        CredentialCommand::Delete { id } => {
            if !ctx.confirm(&format!("Delete credential {id}?"))? {
                println!("Aborted");
                return Ok(());
            }
            api.delete_credential(id).await?;
            println!("Deleted credential {id}");
        }
        CredentialCommand::Test(args) => {
            let credential = args.into_credential()?;
            let result = api.test_connection(&credential).await?;
            println!("{}@{}:{}: {}", credential.username, credential.host, credential.port, result.result);
        }
    }
    Ok(())
}
