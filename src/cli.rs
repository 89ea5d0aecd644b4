pub mod auth;
pub mod bundles;
pub mod credentials;
pub mod dashboard;
pub mod jobs;
pub mod molecules;
pub mod parse;
pub mod settings;
pub mod validation;

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{anyhow, Context as _, Result};
use tracing::debug;

use crate::api::ApiClient;
use crate::config::Config;
use crate::models::User;
use crate::session::{self, SessionStore};

/// Everything a command handler needs: the configured client and the session store.
pub struct Context {
    pub api: ApiClient,
    pub store: SessionStore,
    pub config: Config,
    pub assume_yes: bool,
}

impl Context {
    pub fn new(config: Config, store: SessionStore, assume_yes: bool) -> Result<Self> {
        let api = ApiClient::new(&config.api_url, config.request_timeout())?;
        Ok(Self {
            api,
            store,
            config,
            assume_yes,
        })
    }

    /// Loads and verifies the stored session; every command behind a login calls this first.
    pub async fn authenticate(&mut self) -> Result<User> {
        debug!("Session file {}", self.store.path().display());
        session::check_auth(&mut self.api, &self.store).await
    }

    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        confirm_with(self.assume_yes, prompt, &mut io::stdin().lock(), &mut io::stdout().lock())
    }
}

/// Asks a yes/no question on `input`; anything but `y` or `yes` declines.
fn confirm_with<R: BufRead, W: Write>(
    assume_yes: bool,
    prompt: &str,
    input: &mut R,
    out: &mut W,
) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    write!(out, "{prompt} [y/N] ")?;
    out.flush()?;

    // end of input reads as an empty answer
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn read_answer<R: BufRead, W: Write>(input: &mut R, out: &mut W, prompt: &str) -> Result<String> {
    write!(out, "{prompt}")?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(anyhow!("No input"));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub fn prompt_line(prompt: &str) -> Result<String> {
    read_answer(&mut io::stdin().lock(), &mut io::stdout().lock(), prompt)
}

/// Returns `value` when given, otherwise asks for it on stdin.
pub fn value_or_prompt(value: Option<String>, prompt: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => prompt_line(prompt),
    }
}

/// Reads a text argument given as a file path, or `-` for stdin.
pub fn read_text(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut content = String::new();
        for line in io::stdin().lock().lines() {
            content.push_str(&line?);
            content.push('\n');
        }
        return Ok(content);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn stdout() -> io::StdoutLock<'static> {
    io::stdout().lock()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(assume_yes: bool, typed: &str) -> (bool, String) {
        let mut out = Vec::new();
        let answer = confirm_with(assume_yes, "Delete job #4?", &mut typed.as_bytes(), &mut out).unwrap();
        (answer, String::from_utf8(out).unwrap())
    }

    #[test]
    fn confirmation_needs_an_explicit_yes() {
        let (answer, shown) = ask(false, "y\n");
        assert!(answer);
        assert_eq!(shown, "Delete job #4? [y/N] ");
        assert!(ask(false, " YES \r\n").0);

        assert!(!ask(false, "\n").0);
        assert!(!ask(false, "n\n").0);
        assert!(!ask(false, "yep\n").0);
        // closed stdin declines
        assert!(!ask(false, "").0);
    }

    #[test]
    fn assume_yes_skips_the_question() {
        let (answer, shown) = ask(true, "");
        assert!(answer);
        assert!(shown.is_empty());
    }

    #[test]
    fn text_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("water.xyz");
        std::fs::write(&path, "O 0 0 0\n").unwrap();
        assert_eq!(read_text(&path).unwrap(), "O 0 0 0\n");
        assert!(read_text(&dir.path().join("missing.xyz")).is_err());
    }
}
