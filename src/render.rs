use std::io::{self, Write};

use chrono::{DateTime, Local, Utc};

use crate::models::{
    Bundle, Credential, GjfUploadResult, Job, JobLog, JobStatus, Molecule, User,
};
use crate::monitor::Termination;

const RECENT: usize = 5;

pub fn local_time(t: &DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn table<W: Write>(out: &mut W, header: &[&str], rows: &[Vec<String>]) -> io::Result<()> {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    writeln!(out, "{}", line(header.to_vec()))?;
    for row in rows {
        writeln!(out, "{}", line(row.iter().map(String::as_str).collect()))?;
    }
    Ok(())
}

fn or_dash(value: Option<&str>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or("-").to_string()
}

pub fn user<W: Write>(out: &mut W, user: &User) -> io::Result<()> {
    writeln!(out, "{} (id {}, {})", user.username, user.id, user.role)?;
    writeln!(out, "  local base dir:  {}", user.local_base_dir)?;
    writeln!(out, "  remote base dir: {}", user.remote_base_dir)?;
    writeln!(out, "  registered:      {}", local_time(&user.created_at))
}

/// Newest first by the given key, limited to the dashboard's recent list length.
fn recent<T, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> Vec<&T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| key(b).cmp(&key(a)));
    sorted.truncate(RECENT);
    sorted
}

pub fn dashboard<W: Write>(
    out: &mut W,
    bundles: &[Bundle],
    molecules: &[Molecule],
    jobs: &[Job],
) -> io::Result<()> {
    let running = jobs.iter().filter(|j| j.status == JobStatus::Running).count();
    writeln!(out, "Bundles: {}", bundles.len())?;
    writeln!(out, "Molecules: {}", molecules.len())?;
    writeln!(out, "Jobs: {}", jobs.len())?;
    writeln!(out, "Running: {running}")?;

    writeln!(out, "\nRecent jobs")?;
    if jobs.is_empty() {
        writeln!(out, "  No jobs yet")?;
    }
    for job in recent(jobs, |j| j.submitted_at) {
        writeln!(
            out,
            "  Job #{} - {}  [{}]  molecule {}  {}",
            job.id,
            job.job_type,
            job.status,
            job.molecule_id,
            local_time(&job.submitted_at)
        )?;
    }

    writeln!(out, "\nRecent bundles")?;
    if bundles.is_empty() {
        writeln!(out, "  No bundles yet")?;
    }
    for bundle in recent(bundles, |b| b.created_at) {
        writeln!(
            out,
            "  {} (id {})  {}",
            bundle.name,
            bundle.id,
            local_time(&bundle.created_at)
        )?;
    }
    Ok(())
}

pub fn bundles<W: Write>(out: &mut W, bundles: &[Bundle]) -> io::Result<()> {
    if bundles.is_empty() {
        return writeln!(out, "No bundles. Create one with `qcjob bundles create <name>`.");
    }
    let rows: Vec<Vec<String>> = bundles
        .iter()
        .map(|b| {
            vec![
                b.id.to_string(),
                b.name.clone(),
                local_time(&b.created_at),
                settings_summary(b),
            ]
        })
        .collect();
    table(out, &["ID", "NAME", "CREATED", "SETTINGS"], &rows)
}

fn settings_summary(bundle: &Bundle) -> String {
    match &bundle.calc_settings {
        Some(settings) if !settings.is_empty() => settings
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(" "),
        _ => "-".to_string(),
    }
}

pub fn bundle_detail<W: Write>(out: &mut W, bundle: &Bundle, molecules: &[&Molecule]) -> io::Result<()> {
    writeln!(out, "{}", bundle.name)?;
    writeln!(out, "ID: {} | Created: {}", bundle.id, local_time(&bundle.created_at))?;
    writeln!(out, "Settings: {}", settings_summary(bundle))?;
    writeln!(out, "\nMolecules ({})", molecules.len())?;
    if molecules.is_empty() {
        return writeln!(
            out,
            "  Upload GJF files with `qcjob bundles upload {} <files>`",
            bundle.id
        );
    }
    for m in molecules {
        writeln!(
            out,
            "  #{} {}  charge {}, multiplicity {}",
            m.id, m.name, m.charge, m.multiplicity
        )?;
    }
    Ok(())
}

pub fn upload_results<W: Write>(out: &mut W, results: &[GjfUploadResult]) -> io::Result<()> {
    for r in results {
        match &r.error_message {
            Some(msg) => writeln!(out, "{}: {} ({msg})", r.name, r.status)?,
            None => writeln!(out, "{}: {}", r.name, r.status)?,
        }
    }
    let ok = results.iter().filter(|r| r.is_success()).count();
    writeln!(out, "{ok} of {} files imported", results.len())
}

/// Display name of a bundle, falling back to its id when the bundle is not known.
pub fn bundle_name(bundles: &[Bundle], id: i64) -> String {
    bundles
        .iter()
        .find(|b| b.id == id)
        .map(|b| b.name.clone())
        .unwrap_or_else(|| format!("Bundle {id}"))
}

/// Molecule count per bundle, `all` first, in the order the bundles are listed.
pub fn bundle_counts(molecules: &[Molecule], bundles: &[Bundle]) -> Vec<(String, usize)> {
    let mut counts = vec![("all".to_string(), molecules.len())];
    for bundle in bundles {
        let n = molecules.iter().filter(|m| m.bundle_id == bundle.id).count();
        counts.push((bundle.name.clone(), n));
    }
    counts
}

pub fn molecules<W: Write>(
    out: &mut W,
    all: &[Molecule],
    bundles: &[Bundle],
    bundle: Option<i64>,
) -> io::Result<()> {
    let counts = bundle_counts(all, bundles)
        .into_iter()
        .map(|(name, n)| format!("{name} ({n})"))
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(out, "{counts}\n")?;

    let shown: Vec<&Molecule> = all
        .iter()
        .filter(|m| bundle.map_or(true, |b| m.bundle_id == b))
        .collect();
    if shown.is_empty() {
        return match bundle {
            Some(id) => writeln!(out, "No molecules in {}", bundle_name(bundles, id)),
            None => writeln!(out, "No molecules"),
        };
    }
    let rows: Vec<Vec<String>> = shown
        .iter()
        .map(|m| {
            vec![
                m.id.to_string(),
                m.name.clone(),
                m.charge.to_string(),
                m.multiplicity.to_string(),
                bundle_name(bundles, m.bundle_id),
                or_dash(m.latest_job_id.as_deref()),
            ]
        })
        .collect();
    table(out, &["ID", "NAME", "CHARGE", "MULT", "BUNDLE", "LATEST JOB"], &rows)
}

pub fn molecule_detail<W: Write>(
    out: &mut W,
    molecule: &Molecule,
    bundle: Option<&Bundle>,
    jobs: &[&Job],
) -> io::Result<()> {
    writeln!(out, "{} (id {})", molecule.name, molecule.id)?;
    match bundle {
        Some(b) => writeln!(out, "Bundle: {} (id {})", b.name, b.id)?,
        None => writeln!(out, "Bundle: {}", molecule.bundle_id)?,
    }
    writeln!(
        out,
        "Charge: {}  Multiplicity: {}",
        molecule.charge, molecule.multiplicity
    )?;
    writeln!(out, "\nStructure (XYZ)")?;
    for line in molecule.structure_xyz.lines() {
        writeln!(out, "  {line}")?;
    }
    writeln!(out, "\nJobs ({})", jobs.len())?;
    if jobs.is_empty() {
        return writeln!(
            out,
            "  Submit one with `qcjob jobs submit {} <gjf-path>`",
            molecule.id
        );
    }
    for job in jobs {
        writeln!(
            out,
            "  Job #{} {}  [{}]  {}",
            job.id,
            job.job_type,
            job.status,
            local_time(&job.submitted_at)
        )?;
    }
    Ok(())
}

pub fn filter_jobs<'a>(jobs: &'a [Job], status: Option<&JobStatus>) -> Vec<&'a Job> {
    jobs.iter()
        .filter(|j| status.map_or(true, |s| &j.status == s))
        .collect()
}

/// Count of jobs per status, `all` first, in the order the statuses are listed.
pub fn status_counts(jobs: &[Job]) -> Vec<(String, usize)> {
    let mut counts = vec![("all".to_string(), jobs.len())];
    for status in JobStatus::KNOWN.iter() {
        let n = jobs.iter().filter(|j| &j.status == status).count();
        counts.push((status.to_string(), n));
    }
    counts
}

pub fn jobs<W: Write>(out: &mut W, all: &[Job], status: Option<&JobStatus>) -> io::Result<()> {
    let counts = status_counts(all)
        .into_iter()
        .map(|(s, n)| format!("{s} ({n})"))
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(out, "{counts}\n")?;

    let shown = filter_jobs(all, status);
    if shown.is_empty() {
        return match status {
            Some(s) => writeln!(out, "No jobs with status {s}"),
            None => writeln!(out, "No jobs"),
        };
    }
    let rows: Vec<Vec<String>> = shown
        .iter()
        .map(|j| {
            vec![
                j.id.to_string(),
                j.status.to_string(),
                j.job_type.clone(),
                j.molecule_id.to_string(),
                local_time(&j.submitted_at),
                or_dash(j.remote_job_id.as_deref()),
            ]
        })
        .collect();
    table(out, &["ID", "STATUS", "TYPE", "MOLECULE", "SUBMITTED", "REMOTE ID"], &rows)
}

pub fn available_actions(status: &JobStatus) -> Vec<&'static str> {
    let mut actions = vec!["log"];
    if status.can_cancel() {
        actions.push("cancel");
    }
    if status.can_relaunch() {
        actions.push("relaunch");
    }
    if status.can_delete() {
        actions.push("delete");
    }
    actions
}

pub fn job_detail<W: Write>(out: &mut W, job: &Job, molecule: Option<&Molecule>) -> io::Result<()> {
    writeln!(out, "Job #{}  [{}]", job.id, job.status)?;
    writeln!(out, "Type:       {}", job.job_type)?;
    match molecule {
        Some(m) => writeln!(out, "Molecule:   {} (id {})", m.name, m.id)?,
        None => writeln!(out, "Molecule:   {}", job.molecule_id)?,
    }
    writeln!(out, "Submitted:  {}", local_time(&job.submitted_at))?;
    writeln!(out, "GJF:        {}", job.gjf_path)?;
    writeln!(out, "Log:        {}", or_dash(job.log_path.as_deref()))?;
    writeln!(out, "Remote ID:  {}", or_dash(job.remote_job_id.as_deref()))?;
    if let Some(parent) = job.parent_job_id {
        writeln!(out, "Relaunch of job #{parent}")?;
    }
    writeln!(out, "Actions:    {}", available_actions(&job.status).join(", "))?;
    if !job.status.is_terminal() {
        writeln!(out, "Follow with `qcjob jobs log {} --follow`", job.id)?;
    }
    Ok(())
}

pub fn log_status_line(log: &JobLog) -> String {
    let remote = log
        .remote_job_id
        .as_deref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default();
    format!(
        "== job #{}{remote}: scheduler {}, {} ==",
        log.job_id,
        log.system_status(),
        if log.is_complete { "complete" } else { "in progress" }
    )
}

pub fn job_log<W: Write>(out: &mut W, log: &JobLog) -> io::Result<()> {
    writeln!(out, "{}", log_status_line(log))?;
    if log.log_content.trim().is_empty() {
        writeln!(out, "(log not available)")?;
    } else {
        writeln!(out, "{}", log.log_content.trim_end())?;
    }
    if log.is_complete {
        write_verdict(out, log)?;
    }
    Ok(())
}

pub fn write_verdict<W: Write>(out: &mut W, log: &JobLog) -> io::Result<()> {
    match Termination::from_log(&log.log_content) {
        Termination::Normal => writeln!(out, "Calculation finished normally"),
        Termination::Error => writeln!(out, "Calculation terminated with an error"),
    }
}

pub fn credentials<W: Write>(out: &mut W, credentials: &[Credential]) -> io::Result<()> {
    if credentials.is_empty() {
        return writeln!(out, "No server credentials");
    }
    let rows: Vec<Vec<String>> = credentials
        .iter()
        .map(|c| {
            vec![
                c.id.to_string(),
                format!("{}@{}:{}", c.username, c.host, c.port),
                c.auth_method.to_string(),
                local_time(&c.created_at),
            ]
        })
        .collect();
    table(out, &["ID", "SERVER", "AUTH", "CREATED"], &rows)
}

pub fn credential<W: Write>(out: &mut W, c: &Credential) -> io::Result<()> {
    writeln!(out, "Credential #{}", c.id)?;
    writeln!(out, "Host:     {}:{}", c.host, c.port)?;
    writeln!(out, "Username: {}", c.username)?;
    writeln!(out, "Auth:     {}", c.auth_method)?;
    writeln!(out, "Created:  {}", local_time(&c.created_at))
}
