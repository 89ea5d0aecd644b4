use std::future::Future;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use futures::try_join;
use tracing::{info, warn};

use super::validation::validate_path;
use super::{stdout, Context};
use crate::models::{Job, JobCreate, JobStatus, JobUpdate};
use crate::{monitor, render};

#[derive(Subcommand, Debug)]
pub enum JobCommand {
    /// List jobs with a count per status
    List {
        /// queued, running, done, error or cancelled
        #[arg(long, value_parser = JobStatus::from_str)]
        status: Option<JobStatus>,
    },
    /// Show a job and the actions its status allows
    Show { id: i64 },
    /// Submit a calculation for a molecule
    Submit {
        molecule_id: i64,
        /// Path of the GJF input on the service side
        gjf_path: String,
        #[arg(long = "type", default_value = "SP")]
        job_type: String,
        /// Job this one re-runs
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Overwrite the recorded status of a job
    Update {
        id: i64,
        #[arg(long, value_parser = JobStatus::from_str)]
        status: JobStatus,
    },
    /// Cancel a queued or running job
    Cancel { id: i64 },
    /// Resubmit a failed or cancelled job
    Relaunch { id: i64 },
    /// Delete a queued or failed job
    Delete { id: i64 },
    /// Print the tail of a job's output
    Log {
        id: i64,
        /// Keep polling until the calculation completes
        #[arg(short, long)]
        follow: bool,
        /// Seconds between polls, defaults to the configured poll interval
        #[arg(long, requires = "follow")]
        interval: Option<u64>,
    },
}

pub async fn run(ctx: &mut Context, cmd: JobCommand) -> Result<()> {
    ctx.authenticate().await?;
    let api = &ctx.api;

    match cmd {
        JobCommand::List { status } => {
            let jobs = api.jobs().await?;
            render::jobs(&mut stdout(), &jobs, status.as_ref())?;
        }
        JobCommand::Show { id } => {
            let job = api.job(id).await?;
            let molecule = api.molecule(job.molecule_id).await.ok();
            render::job_detail(&mut stdout(), &job, molecule.as_ref())?;
        }
        JobCommand::Submit {
            molecule_id,
            gjf_path,
            job_type,
            parent,
        } => {
            validate_path(&gjf_path, "GJF path")?;
            if job_type.trim().is_empty() {
                return Err(anyhow!("Job type is required"));
            }
            if let Some(parent) = parent {
                let (molecule, parent_job) = try_join!(api.molecule(molecule_id), api.job(parent))?;
                if parent_job.molecule_id != molecule.id {
                    return Err(anyhow!(
                        "Job #{parent} belongs to molecule {}, not {molecule_id}",
                        parent_job.molecule_id
                    ));
                }
            }
            let job = api
                .create_job(&JobCreate {
                    molecule_id,
                    gjf_path,
                    job_type,
                    parent_job_id: parent,
                })
                .await?;
            info!("Submitted job {} for molecule {molecule_id}", job.id);
            println!("Submitted job #{} [{}]", job.id, job.status);
        }
        JobCommand::Update { id, status } => {
            let job = api
                .update_job(id, &JobUpdate {
                    status: Some(status),
                })
                .await?;
            println!("Job #{} is now {}", job.id, job.status);
        }
        JobCommand::Cancel { id } => {
            let job = api.job(id).await?;
            ensure_allowed(&job, "cancel", JobStatus::can_cancel)?;
            if !ctx.confirm(&format!("Cancel job #{id}?"))? {
                println!("Aborted");
                return Ok(());
            }
            let result = api.cancel_job(id).await?;
            println!("Job #{id}: {}", result.result);
        }
        JobCommand::Relaunch { id } => {
            let job = api.job(id).await?;
            ensure_allowed(&job, "relaunch", JobStatus::can_relaunch)?;
            if !ctx.confirm(&format!("Relaunch job #{id}?"))? {
                println!("Aborted");
                return Ok(());
            }
            let new_job = api.relaunch_job(id).await?;
            println!("Relaunched job #{id} as job #{} [{}]", new_job.id, new_job.status);
        }
        JobCommand::Delete { id } => {
            let job = api.job(id).await?;
            ensure_allowed(&job, "delete", JobStatus::can_delete)?;
            if !ctx.confirm(&format!("Delete job #{id}?"))? {
                println!("Aborted");
                return Ok(());
            }
            api.delete_job(id).await?;
            println!("Deleted job #{id}");
        }
        JobCommand::Log {
            id,
            follow: false,
            ..
        } => {
            let log = api.job_log(id).await?;
            render::job_log(&mut stdout(), &log)?;
        }
        JobCommand::Log { id, interval, .. } => {
            let period = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| ctx.config.poll_interval())
                .max(Duration::from_secs(1));
            let stop = until_signal(tokio::signal::ctrl_c());
            let last = monitor::follow_log(api, id, period, &mut stdout(), stop).await?;
            match last {
                Some(log) if log.is_complete => render::write_verdict(&mut stdout(), &log)?,
                Some(_) => println!("Stopped following job #{id}"),
                None => println!("No log received for job #{id}"),
            }
        }
    }
    Ok(())
}

/// Resolves once `signal` fires. If the handler cannot be installed it never resolves.
async fn until_signal<F: Future<Output = io::Result<()>>>(signal: F) {
    if let Err(e) = signal.await {
        warn!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Refuses an action the job's current status does not allow.
fn ensure_allowed(job: &Job, action: &str, allowed: fn(&JobStatus) -> bool) -> Result<()> {
    if allowed(&job.status) {
        return Ok(());
    }
    Err(anyhow!(
        "Cannot {action} job #{} while it is {}; available: {}",
        job.id,
        job.status,
        render::available_actions(&job.status).join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::job_json;

    fn job(status: &str) -> Job {
        serde_json::from_value(job_json(8, 2, status)).unwrap()
    }

    #[test]
    fn status_gates_actions() {
        assert!(ensure_allowed(&job("running"), "cancel", JobStatus::can_cancel).is_ok());
        assert!(ensure_allowed(&job("error"), "relaunch", JobStatus::can_relaunch).is_ok());

        let err = ensure_allowed(&job("done"), "delete", JobStatus::can_delete).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Cannot delete job #8 while it is done"), "{msg}");
        assert!(msg.ends_with("available: log"), "{msg}");
    }

    #[tokio::test]
    async fn failed_signal_handler_keeps_following() {
        let failed = async { Err(io::Error::new(io::ErrorKind::Other, "no signal driver")) };
        let waited = tokio::time::timeout(Duration::from_millis(50), until_signal(failed)).await;
        assert!(waited.is_err());

        let fired = tokio::time::timeout(Duration::from_millis(50), until_signal(async { Ok(()) })).await;
        assert!(fired.is_ok());
    }
}
