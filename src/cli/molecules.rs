use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use futures::try_join;

use super::validation::validate_charge_multiplicity;
use super::{read_text, stdout, Context};
use crate::models::{Job, MoleculeCreate, MoleculeUpdate};
use crate::render;

#[derive(Subcommand, Debug)]
pub enum MoleculeCommand {
    /// List molecules
    List {
        /// Only molecules of this bundle
        #[arg(long)]
        bundle: Option<i64>,
    },
    /// Show a molecule with its structure and jobs
    Show { id: i64 },
    /// Create a molecule from an XYZ block
    Create {
        #[arg(long)]
        bundle: i64,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        charge: i32,
        #[arg(long, default_value_t = 1)]
        multiplicity: i32,
        /// File holding the XYZ coordinates, `-` for stdin
        #[arg(long)]
        xyz: PathBuf,
    },
    /// Change a molecule
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        charge: Option<i32>,
        #[arg(long)]
        multiplicity: Option<i32>,
        #[arg(long)]
        xyz: Option<PathBuf>,
    },
    /// Delete a molecule
    Delete { id: i64 },
}

pub async fn run(ctx: &mut Context, cmd: MoleculeCommand) -> Result<()> {
    ctx.authenticate().await?;
    let api = &ctx.api;

    match cmd {
        MoleculeCommand::List { bundle } => {
            let (molecules, bundles) = try_join!(api.molecules(), api.bundles())?;
            render::molecules(&mut stdout(), &molecules, &bundles, bundle)?;
        }
        MoleculeCommand::Show { id } => {
            let (molecule, jobs, bundles) = try_join!(api.molecule(id), api.jobs(), api.bundles())?;
            let bundle = bundles.iter().find(|b| b.id == molecule.bundle_id);
            let jobs: Vec<&Job> = jobs.iter().filter(|j| j.molecule_id == id).collect();
            render::molecule_detail(&mut stdout(), &molecule, bundle, &jobs)?;
        }
        MoleculeCommand::Create {
            bundle,
            name,
            charge,
            multiplicity,
            xyz,
        } => {
            if name.trim().is_empty() {
                return Err(anyhow!("Molecule name is required"));
            }
            validate_charge_multiplicity(charge, multiplicity)?;
            let structure_xyz = read_text(&xyz)?.trim_end().to_string();
            if structure_xyz.is_empty() {
                return Err(anyhow!("Structure is empty"));
            }

            let molecule = api
                .create_molecule(&MoleculeCreate {
                    name,
                    charge,
                    multiplicity,
                    structure_xyz,
                    bundle_id: bundle,
                })
                .await?;
            println!("Created molecule {} (id {})", molecule.name, molecule.id);
        }
        MoleculeCommand::Update {
            id,
            name,
            charge,
            multiplicity,
            xyz,
        } => {
            if charge.is_some() || multiplicity.is_some() {
                let current = api.molecule(id).await?;
                validate_charge_multiplicity(
                    charge.unwrap_or(current.charge),
                    multiplicity.unwrap_or(current.multiplicity),
                )?;
            }
            let structure_xyz = match xyz {
                Some(path) => Some(read_text(&path)?.trim_end().to_string()),
                None => None,
            };
            let update = MoleculeUpdate {
                name,
                charge,
                multiplicity,
                structure_xyz,
            };
            if update.name.is_none()
                && update.charge.is_none()
                && update.multiplicity.is_none()
                && update.structure_xyz.is_none()
            {
                return Err(anyhow!("Nothing to update"));
            }

            let molecule = api.update_molecule(id, &update).await?;
            println!("Updated molecule {} (id {})", molecule.name, molecule.id);
        }
        MoleculeCommand::Delete { id } => {
            if !ctx.confirm(&format!("Delete molecule {id}?"))? {
                println!("Aborted");
                return Ok(());
            }
            api.delete_molecule(id).await?;
            println!("Deleted molecule {id}");
        }
    }
    Ok(())
}
