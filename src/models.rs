use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub type Settings = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Me {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub local_base_dir: String,
    pub remote_base_dir: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub username: String,
    pub password: String,
    pub role: String,
    pub local_base_dir: String,
    pub remote_base_dir: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_base_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_base_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub calc_settings: Option<Settings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleCreate {
    pub name: String,
    pub calc_settings: Option<Settings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calc_settings: Option<Settings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Molecule {
    pub id: i64,
    pub name: String,
    pub charge: i32,
    pub multiplicity: i32,
    pub structure_xyz: String,
    pub bundle_id: i64,
    #[serde(default)]
    pub latest_job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoleculeCreate {
    pub name: String,
    pub charge: i32,
    pub multiplicity: i32,
    pub structure_xyz: String,
    pub bundle_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoleculeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplicity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure_xyz: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
    Cancelled,
    /// A status this client does not know about, kept verbatim
    Other(String),
}

impl JobStatus {
    pub const KNOWN: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Error,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Other(s) => s,
        }
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn can_relaunch(&self) -> bool {
        matches!(self, JobStatus::Error | JobStatus::Cancelled)
    }

    /// The service refuses to delete running or finished jobs
    pub fn can_delete(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Error)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Cancelled)
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "done" => JobStatus::Done,
            "error" => JobStatus::Error,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Other(s),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match JobStatus::from(s.trim().to_ascii_lowercase()) {
            JobStatus::Other(other) => Err(format!(
                "unknown job status `{other}`; expected queued|running|done|error|cancelled"
            )),
            status => Ok(status),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub molecule_id: i64,
    pub gjf_path: String,
    #[serde(default)]
    pub log_path: Option<String>,
    pub job_type: String,
    pub status: JobStatus,
    #[serde(with = "timestamp")]
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub remote_job_id: Option<String>,
    #[serde(default, deserialize_with = "loose_id::deserialize")]
    pub parent_job_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreate {
    pub molecule_id: i64,
    pub gjf_path: String,
    pub job_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLog {
    pub log_content: String,
    pub is_complete: bool,
    pub system_status: String,
    pub job_id: i64,
    #[serde(default)]
    pub remote_job_id: Option<String>,
}

impl JobLog {
    pub fn system_status(&self) -> SystemStatus {
        SystemStatus::from_code(&self.system_status)
    }
}

/// Scheduler state letter as reported by qstat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Running,
    Queued,
    Completed,
    Unknown,
}

impl SystemStatus {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "R" => SystemStatus::Running,
            "Q" => SystemStatus::Queued,
            "C" => SystemStatus::Completed,
            _ => SystemStatus::Unknown,
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SystemStatus::Running => write!(f, "Running"),
            SystemStatus::Queued => write!(f, "Queued"),
            SystemStatus::Completed => write!(f, "Completed"),
            SystemStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
    #[value(alias = "ssh_key")]
    SshKey,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthMethod::Password => write!(f, "password"),
            AuthMethod::SshKey => write!(f, "ssh_key"),
        }
    }
}

fn default_port() -> u16 {
    22
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: i64,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub auth_method: AuthMethod,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialCreate {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_method: AuthMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<AuthMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GjfUploadResult {
    pub name: String,
    #[serde(default)]
    pub charge: i32,
    #[serde(default)]
    pub multiplicity: i32,
    #[serde(default)]
    pub structure_xyz: String,
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl GjfUploadResult {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub result: String,
}

/// The service emits naive ISO timestamps, but an offset is accepted too.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = <String as serde::Deserialize>::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

/// Job ids arrive as numbers or numeric strings depending on the endpoint.
mod loose_id {
    use serde::Deserializer;
    use serde_json::Value;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        match <Option<Value> as serde::Deserialize>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("job id out of range")),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid job id `{s}`"))),
            Some(other) => Err(serde::de::Error::custom(format!("invalid job id {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    fn job_json(parent: Value) -> Value {
        json!({
            "id": 7,
            "molecule_id": 3,
            "gjf_path": "/data/benzene.gjf",
            "log_path": "/remote/benzene.log",
            "job_type": "Opt",
            "status": "running",
            "submitted_at": "2024-05-01T09:30:15.123456",
            "remote_job_id": "4711.pbs",
            "parent_job_id": parent
        })
    }

    #[test]
    fn job_accepts_numeric_and_string_parent_ids() {
        let job: Job = serde_json::from_value(job_json(json!(5))).unwrap();
        assert_eq!(job.parent_job_id, Some(5));

        let job: Job = serde_json::from_value(job_json(json!("6"))).unwrap();
        assert_eq!(job.parent_job_id, Some(6));

        let job: Job = serde_json::from_value(job_json(Value::Null)).unwrap();
        assert_eq!(job.parent_job_id, None);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.submitted_at.hour(), 9);
    }

    #[test]
    fn timestamps_with_offset_are_normalised_to_utc() {
        let parsed = timestamp::parse("2024-05-01T09:30:00+09:00").unwrap();
        assert_eq!(parsed.hour(), 0);
        assert_eq!(parsed.day(), 1);
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn unknown_status_is_preserved() {
        let status: JobStatus = serde_json::from_value(json!("held")).unwrap();
        assert_eq!(status, JobStatus::Other("held".into()));
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("held"));
        assert!("held".parse::<JobStatus>().is_err());
        assert_eq!("Done".parse::<JobStatus>().unwrap(), JobStatus::Done);
    }

    #[test]
    fn status_actions_follow_lifecycle() {
        assert!(JobStatus::Queued.can_cancel());
        assert!(JobStatus::Running.can_cancel());
        assert!(!JobStatus::Done.can_cancel());
        assert!(JobStatus::Error.can_relaunch());
        assert!(JobStatus::Cancelled.can_relaunch());
        assert!(!JobStatus::Running.can_relaunch());
        assert!(JobStatus::Queued.can_delete());
        assert!(!JobStatus::Running.can_delete());
        assert!(!JobStatus::Done.can_delete());
        assert!(!JobStatus::Other("held".into()).is_terminal());
    }

    #[test]
    fn system_status_letters() {
        assert_eq!(SystemStatus::from_code("R"), SystemStatus::Running);
        assert_eq!(SystemStatus::from_code("Q").to_string(), "Queued");
        assert_eq!(SystemStatus::from_code("C"), SystemStatus::Completed);
        assert_eq!(SystemStatus::from_code(""), SystemStatus::Unknown);
    }

    #[test]
    fn patch_bodies_only_carry_changes() {
        let update = MoleculeUpdate {
            charge: Some(-1),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({ "charge": -1 }));

        let update = CredentialUpdate {
            auth_method: Some(AuthMethod::SshKey),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({ "auth_method": "ssh_key" })
        );
    }

    #[test]
    fn credential_port_defaults_to_ssh() {
        let cred: Credential = serde_json::from_value(json!({
            "id": 1,
            "host": "hpc.example.org",
            "username": "alice",
            "auth_method": "password",
            "created_at": "2024-01-02T03:04:05"
        }))
        .unwrap();
        assert_eq!(cred.port, 22);
        assert_eq!(cred.created_at.year(), 2024);
    }
}
