use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::models::JobLog;
use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Normal,
    Error,
}

impl Termination {
    /// Only meaningful once the log reports completion.
    pub fn from_log(log: &str) -> Self {
        if log.contains("Normal termination") {
            Termination::Normal
        } else {
            Termination::Error
        }
    }
}

// Consecutive tail windows overlap; skip the longest suffix of `prev` that prefixes `next`.
pub fn new_lines<'a>(prev: &str, next: &'a str) -> Vec<&'a str> {
    let old: Vec<&str> = prev.lines().collect();
    let new: Vec<&str> = next.lines().collect();
    let max = old.len().min(new.len());
    let overlap = (0..=max)
        .rev()
        .find(|&k| old[old.len() - k..] == new[..k])
        .unwrap_or(0);
    new[overlap..].to_vec()
}

/// Returns the last state seen once the log reports completion or `stop` resolves.
pub async fn follow_log<W, F>(
    api: &ApiClient,
    job_id: i64,
    period: Duration,
    out: &mut W,
    stop: F,
) -> Result<Option<JobLog>>
where
    W: Write,
    F: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(stop);

    let mut state: Option<JobLog> = None;

    loop {
        select! {
            _ = &mut stop => {
                info!("Stopped following job {job_id}");
                return Ok(state);
            }
            _ = ticker.tick() => {}
        }

        let fetched = select! {
            _ = &mut stop => {
                info!("Stopped following job {job_id} during a fetch");
                return Ok(state);
            }
            fetched = api.job_log(job_id) => fetched,
        };
        let log = match fetched {
            Ok(log) => log,
            Err(e) if e.is_unauthorized() => return Err(e.into()),
            Err(e) => {
                warn!("Failed to fetch log for job {job_id}: {e}");
                continue;
            }
        };

        let (prev_content, prev_status) = match &state {
            Some(s) => (s.log_content.as_str(), Some(s.system_status.as_str())),
            None => ("", None),
        };
        if prev_status != Some(log.system_status.as_str()) {
            writeln!(out, "{}", render::log_status_line(&log))?;
        }
        let lines = new_lines(prev_content, &log.log_content);
        debug!("Job {job_id}: {} new log lines", lines.len());
        for line in lines {
            writeln!(out, "{line}")?;
        }
        out.flush()?;

        let complete = log.is_complete;
        state = Some(log);
        if complete {
            return Ok(state);
        }
    }
}
