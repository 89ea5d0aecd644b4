use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use futures::try_join;
use tracing::{debug, info, warn};

use super::parse::{parse_gjf, parse_settings};
use super::validation::collect_gjf_files;
use super::{stdout, Context};
use crate::models::{BundleCreate, BundleUpdate, Molecule};
use crate::render;

#[derive(Subcommand, Debug)]
pub enum BundleCommand {
    /// List all bundles
    List,
    /// Show a bundle and its molecules
    Show { id: i64 },
    /// Create a bundle
    Create {
        name: String,
        /// Calculation setting as key=value, may be repeated
        #[arg(long = "set", value_name = "KEY=VALUE")]
        settings: Vec<String>,
    },
    /// Rename a bundle or replace its settings
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "set", value_name = "KEY=VALUE")]
        settings: Vec<String>,
    },
    /// Delete a bundle
    Delete { id: i64 },
    /// Upload GJF files into a bundle, creating one molecule per file
    Upload {
        id: i64,
        /// Files or directories to search for .gjf files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

pub async fn run(ctx: &mut Context, cmd: BundleCommand) -> Result<()> {
    ctx.authenticate().await?;
    let api = &ctx.api;

    match cmd {
        BundleCommand::List => {
            let bundles = api.bundles().await?;
            render::bundles(&mut stdout(), &bundles)?;
        }
        BundleCommand::Show { id } => {
            let (bundle, molecules) = try_join!(api.bundle(id), api.molecules())?;
            let members: Vec<&Molecule> = molecules.iter().filter(|m| m.bundle_id == id).collect();
            render::bundle_detail(&mut stdout(), &bundle, &members)?;
        }
        BundleCommand::Create { name, settings } => {
            if name.trim().is_empty() {
                return Err(anyhow!("Bundle name is required"));
            }
            let calc_settings = Some(parse_settings(&settings)?).filter(|s| !s.is_empty());
            let bundle = api
                .create_bundle(&BundleCreate {
                    name,
                    calc_settings,
                })
                .await?;
            info!("Created bundle {}", bundle.id);
            println!("Created bundle {} (id {})", bundle.name, bundle.id);
        }
        BundleCommand::Update { id, name, settings } => {
            let calc_settings = Some(parse_settings(&settings)?).filter(|s| !s.is_empty());
            if name.is_none() && calc_settings.is_none() {
                return Err(anyhow!("Nothing to update"));
            }
            let bundle = api
                .update_bundle(id, &BundleUpdate {
                    name,
                    calc_settings,
                })
                .await?;
            println!("Updated bundle {} (id {})", bundle.name, bundle.id);
        }
        BundleCommand::Delete { id } => {
            if !ctx.confirm(&format!("Delete bundle {id} and its molecules?"))? {
                println!("Aborted");
                return Ok(());
            }
            api.delete_bundle(id).await?;
            println!("Deleted bundle {id}");
        }
        BundleCommand::Upload { id, paths } => {
            let files = collect_gjf_files(paths)?;
            preview(&files);

            info!("Uploading {} files to bundle {id}", files.len());
            let results = api.upload_gjf(id, &files).await?;
            render::upload_results(&mut stdout(), &results)?;
        }
    }
    Ok(())
}

/// Parses each file locally and warns about the ones the service is going to reject.
/// The upload still goes ahead so the service reports on every file.
fn preview(files: &[PathBuf]) {
    for file in files {
        let content = match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot read {}: {e}", file.display());
                continue;
            }
        };
        match parse_gjf(&content) {
            Ok(m) => debug!(
                "{}: charge {}, multiplicity {}, {} atoms",
                file.display(),
                m.charge,
                m.multiplicity,
                m.structure_xyz.lines().count()
            ),
            Err(e) => warn!("{}: {e}", file.display()),
        }
    }
}
