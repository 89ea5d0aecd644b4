use crate::api::{ApiClient, ApiError};
use crate::models::User;
use crate::utils::data_dir;
use anyhow::Result;
use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub api_url: String,
    pub username: String,
    pub access_token: String,
    pub token_type: String,
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(data_dir()?.join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {e}", self.path.display());
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(session)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed session {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the stored token if it was issued by `api_url`.
    pub fn token_for(&self, api_url: &str) -> Result<Option<String>> {
        Ok(self.load()?.and_then(|session| {
            if session.api_url == api_url {
                Some(session.access_token)
            } else {
                debug!(
                    "Stored session belongs to {}, not {api_url}",
                    session.api_url
                );
                None
            }
        }))
    }
}

pub async fn login(
    api: &mut ApiClient,
    store: &SessionStore,
    username: &str,
    password: &str,
) -> Result<User> {
    let token = api.login(username, password).await?;
    api.set_token(token.access_token.clone());

    let user = match api.current_user().await {
        Ok(user) => user,
        Err(e) => {
            api.clear_token();
            return Err(e.into());
        }
    };

    store.save(&Session {
        api_url: api.base_url().to_string(),
        username: user.username.clone(),
        access_token: token.access_token,
        token_type: token.token_type,
    })?;
    info!("Logged in as {}", user.username);
    Ok(user)
}

/// Loads the stored token into `api` and confirms it is still accepted.
/// A token the server rejects with 401 is removed from disk.
pub async fn check_auth(api: &mut ApiClient, store: &SessionStore) -> Result<User> {
    let Some(token) = store.token_for(api.base_url())? else {
        return Err(ApiError::NotLoggedIn.into());
    };
    api.set_token(token);

    match api.current_user().await {
        Ok(user) => Ok(user),
        Err(e) => {
            warn!("Auth check failed: {e}");
            api.clear_token();
            if e.is_unauthorized() {
                store.clear()?;
            }
            Err(e.into())
        }
    }
}

pub fn logout(api: &mut ApiClient, store: &SessionStore) -> Result<()> {
    if api.token().is_some() {
        debug!("Dropping token for {}", api.base_url());
    }
    api.clear_token();
    store.clear()
}
