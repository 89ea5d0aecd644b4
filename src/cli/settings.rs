use anyhow::Result;
use clap::Subcommand;

use crate::config::{config_path, read_config_from, write_config_to, Config};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Change a setting in the config file
    Set {
        /// api-url, poll-interval or timeout
        key: String,
        value: String,
    },
}

/// `effective` already has the command-line and environment overrides applied.
pub fn run(effective: &Config, cmd: ConfigCommand) -> Result<()> {
    let path = config_path()?;

    match cmd {
        ConfigCommand::Show => {
            println!("config file:   {}", path.display());
            println!("api-url:       {}", effective.api_url);
            println!("poll-interval: {}s", effective.poll_interval_secs);
            println!("timeout:       {}s", effective.request_timeout_secs);
        }
        ConfigCommand::Set { key, value } => {
            // the stored file is edited, not the overridden view of it
            let mut stored = read_config_from(&path)?;
            stored.set(&key, &value)?;
            write_config_to(&path, &stored)?;
            println!("Saved {key} to {}", path.display());
        }
    }
    Ok(())
}
