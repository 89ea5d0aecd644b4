use crate::models::{AuthMethod, CredentialCreate};
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{fs, path::PathBuf};

static USERNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

const PATH_FORBIDDEN: [&str; 6] = ["..", ";", "|", "&", "$", "`"];

pub fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if len < 3 {
        return Err(anyhow!("Username must be at least 3 characters"));
    }
    if len > 50 {
        return Err(anyhow!("Username must be at most 50 characters"));
    }
    if !USERNAME.is_match(username) {
        return Err(anyhow!(
            "Username may only contain letters, digits, underscores and hyphens"
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    match password.chars().count() {
        0..=7 => Err(anyhow!("Password must be at least 8 characters")),
        8..=128 => Ok(()),
        _ => Err(anyhow!("Password must be at most 128 characters")),
    }
}

pub fn validate_role(role: &str) -> Result<()> {
    match role {
        "user" | "admin" => Ok(()),
        _ => Err(anyhow!("Role must be user or admin, got {role}")),
    }
}

pub fn validate_path(path: &str, field: &str) -> Result<()> {
    if path.is_empty() {
        return Err(anyhow!("{field} is required"));
    }
    if path.chars().count() > 512 {
        return Err(anyhow!("{field} must be at most 512 characters"));
    }
    if let Some(bad) = PATH_FORBIDDEN.iter().find(|c| path.contains(*c)) {
        return Err(anyhow!("{field} contains forbidden sequence `{bad}`"));
    }
    Ok(())
}

pub fn validate_charge_multiplicity(charge: i32, multiplicity: i32) -> Result<()> {
    if multiplicity < 1 {
        return Err(anyhow!("Multiplicity must be at least 1"));
    }
    if charge.abs() > 10 {
        return Err(anyhow!("Charge must be between -10 and 10"));
    }
    Ok(())
}

pub fn validate_credential(credential: &CredentialCreate) -> Result<()> {
    if credential.host.trim().is_empty() {
        return Err(anyhow!("Host is required"));
    }
    if credential.port == 0 {
        return Err(anyhow!("Port must be between 1 and 65535"));
    }
    if credential.username.trim().is_empty() {
        return Err(anyhow!("Username is required"));
    }
    let has = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.is_empty());
    match credential.auth_method {
        AuthMethod::Password if !has(&credential.password) => {
            Err(anyhow!("Password authentication needs --password"))
        }
        AuthMethod::SshKey if !has(&credential.ssh_key) => {
            Err(anyhow!("SSH key authentication needs --ssh-key-file"))
        }
        _ => Ok(()),
    }
}

/// Expands upload arguments into the list of GJF files to send.
///
/// Files are taken as given; directories are walked recursively and contribute every `*.gjf`
/// they contain. An empty result is an error so that nothing is uploaded by accident.
pub fn collect_gjf_files(inputs: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        let attr = fs::metadata(&input)
            .map_err(|e| anyhow!("Cannot read {}: {e}", input.display()))?;
        if attr.is_dir() {
            collect_dir(input, &mut files)?;
        } else if is_gjf(&input) {
            files.push(input);
        } else {
            return Err(anyhow!("{} is not a .gjf file", input.display()));
        }
    }

    if files.is_empty() {
        return Err(anyhow!("No .gjf files selected"));
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn collect_dir(dir: PathBuf, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if fs::metadata(&path)?.is_dir() {
            collect_dir(path, files)?;
        } else if is_gjf(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_gjf(path: &std::path::Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gjf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("a-b").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(51)).is_err());
    }

    #[test]
    fn passwords() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password(&"p".repeat(129)).is_err());
    }

    #[test]
    fn paths_reject_shell_metacharacters() {
        assert!(validate_path("/home/alice/calc", "local dir").is_ok());
        assert!(validate_path("", "local dir").is_err());
        let err = validate_path("/work/../etc", "remote dir").unwrap_err();
        assert!(err.to_string().contains(".."));
        assert!(validate_path("/work/a;rm", "remote dir").is_err());
        assert!(validate_path("/work/$HOME", "remote dir").is_err());
    }

    #[test]
    fn charge_and_multiplicity_bounds() {
        assert!(validate_charge_multiplicity(0, 1).is_ok());
        assert!(validate_charge_multiplicity(-10, 2).is_ok());
        assert!(validate_charge_multiplicity(11, 1).is_err());
        assert!(validate_charge_multiplicity(0, 0).is_err());
    }

    #[test]
    fn credential_needs_secret_for_its_method() {
        let mut cred = CredentialCreate {
            host: "hpc.example.org".into(),
            port: 22,
            username: "alice".into(),
            auth_method: AuthMethod::Password,
            password: None,
            ssh_key: Some("-----BEGIN KEY-----".into()),
        };
        assert!(validate_credential(&cred).is_err());
        cred.auth_method = AuthMethod::SshKey;
        assert!(validate_credential(&cred).is_ok());
        cred.port = 0;
        assert!(validate_credential(&cred).is_err());
    }

    #[test]
    fn collects_gjf_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("set").join("conformers");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("set").join("a.gjf"), "").unwrap();
        fs::write(nested.join("b.GJF"), "").unwrap();
        fs::write(nested.join("notes.txt"), "").unwrap();
        let single = dir.path().join("c.gjf");
        fs::write(&single, "").unwrap();

        let files = collect_gjf_files(vec![dir.path().join("set"), single.clone()]).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.contains(&single));
        assert!(files.iter().all(|f| is_gjf(f)));
    }

    #[test]
    fn rejects_empty_or_foreign_selection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_gjf_files(vec![]).is_err());
        assert!(collect_gjf_files(vec![dir.path().to_path_buf()]).is_err());

        let txt = dir.path().join("readme.txt");
        fs::write(&txt, "").unwrap();
        assert!(collect_gjf_files(vec![txt]).is_err());
        assert!(collect_gjf_files(vec![dir.path().join("missing.gjf")]).is_err());
    }
}
