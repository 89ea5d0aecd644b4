use std::path::PathBuf;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::{
    ActionResult, Bundle, BundleCreate, BundleUpdate, Credential, CredentialCreate,
    CredentialUpdate, GjfUploadResult, Job, JobCreate, JobLog, JobUpdate, Me, Molecule,
    MoleculeCreate, MoleculeUpdate, Token, User, UserCreate, UserUpdate,
};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{detail}")]
    Status { status: u16, detail: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response from server: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Not logged in, run `qcjob login` first")]
    NotLoggedIn,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::NotLoggedIn) || self.status() == Some(401)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        Url::parse(base_url)?;
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("qcjob/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    // Endpoints are appended verbatim so a base URL with a path prefix keeps it.
    fn url(&self, endpoint: &str) -> ApiResult<Url> {
        Ok(Url::parse(&format!("{}{}", self.base, endpoint))?)
    }

    fn builder(&self, method: Method, endpoint: &str) -> ApiResult<RequestBuilder> {
        let url = self.url(endpoint)?;
        debug!("{method} {url}");
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        Ok(req)
    }

    async fn send<T: DeserializeOwned>(req: RequestBuilder, fallback: Option<&str>) -> ApiResult<T> {
        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let detail = error_detail(&body).unwrap_or_else(|| match fallback {
                Some(msg) => msg.to_string(),
                None => format!("HTTP {}", status.as_u16()),
            });
            debug!("Request failed with {status}: {detail}");
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response.bytes().await?;
        if status == StatusCode::NO_CONTENT || body.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        Self::send(self.builder(Method::GET, endpoint)?, None).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> ApiResult<T> {
        Self::send(self.builder(Method::POST, endpoint)?.json(body), None).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        Self::send(self.builder(Method::POST, endpoint)?, None).await
    }

    async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> ApiResult<T> {
        Self::send(self.builder(Method::PATCH, endpoint)?.json(body), None).await
    }

    async fn delete(&self, endpoint: &str) -> ApiResult<()> {
        Self::send(self.builder(Method::DELETE, endpoint)?, None).await
    }

    // auth

    /// Exchanges a username and password for an access token. Does not store it.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<Token> {
        let url = self.url("/auth/login")?;
        debug!("POST {url}");
        let req = self
            .http
            .post(url)
            .form(&[("username", username), ("password", password)]);
        Self::send(req, Some("Login failed")).await
    }

    pub async fn me(&self) -> ApiResult<Me> {
        self.get("/auth/me").await
    }

    // users

    pub async fn register(&self, user: &UserCreate) -> ApiResult<User> {
        self.post("/users/", user).await
    }

    pub async fn current_user(&self) -> ApiResult<User> {
        self.get("/users/me").await
    }

    pub async fn update_current_user(&self, update: &UserUpdate) -> ApiResult<User> {
        self.patch("/users/me", update).await
    }

    pub async fn delete_current_user(&self) -> ApiResult<()> {
        self.delete("/users/me").await
    }

    // bundles

    pub async fn create_bundle(&self, bundle: &BundleCreate) -> ApiResult<Bundle> {
        self.post("/bundles/", bundle).await
    }

    pub async fn bundles(&self) -> ApiResult<Vec<Bundle>> {
        self.get("/bundles/").await
    }

    pub async fn bundle(&self, id: i64) -> ApiResult<Bundle> {
        self.get(&format!("/bundles/{id}")).await
    }

    pub async fn update_bundle(&self, id: i64, update: &BundleUpdate) -> ApiResult<Bundle> {
        self.patch(&format!("/bundles/{id}"), update).await
    }

    pub async fn delete_bundle(&self, id: i64) -> ApiResult<()> {
        self.delete(&format!("/bundles/{id}")).await
    }

    /// Uploads GJF files into a bundle; the service answers with one result per file.
    pub async fn upload_gjf(&self, bundle_id: i64, files: &[PathBuf]) -> ApiResult<Vec<GjfUploadResult>> {
        let mut form = Form::new();
        for path in files {
            let bytes = tokio::fs::read(path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.gjf".to_string());
            let part = Part::bytes(bytes)
                .file_name(name)
                .mime_str("application/octet-stream")?;
            form = form.part("files", part);
        }

        let req = self
            .builder(Method::POST, &format!("/bundles/{bundle_id}/upload-gjf"))?
            .multipart(form);
        Self::send(req, Some("Upload failed")).await
    }

    // molecules

    pub async fn create_molecule(&self, molecule: &MoleculeCreate) -> ApiResult<Molecule> {
        self.post("/molecules/", molecule).await
    }

    pub async fn molecules(&self) -> ApiResult<Vec<Molecule>> {
        self.get("/molecules/").await
    }

    pub async fn molecule(&self, id: i64) -> ApiResult<Molecule> {
        self.get(&format!("/molecules/{id}")).await
    }

    pub async fn update_molecule(&self, id: i64, update: &MoleculeUpdate) -> ApiResult<Molecule> {
        self.patch(&format!("/molecules/{id}"), update).await
    }

    pub async fn delete_molecule(&self, id: i64) -> ApiResult<()> {
        self.delete(&format!("/molecules/{id}")).await
    }

    // jobs

    pub async fn create_job(&self, job: &JobCreate) -> ApiResult<Job> {
        self.post("/jobs/", job).await
    }

    pub async fn jobs(&self) -> ApiResult<Vec<Job>> {
        self.get("/jobs/").await
    }

    pub async fn job(&self, id: i64) -> ApiResult<Job> {
        self.get(&format!("/jobs/{id}")).await
    }

    pub async fn update_job(&self, id: i64, update: &JobUpdate) -> ApiResult<Job> {
        self.patch(&format!("/jobs/{id}"), update).await
    }

    pub async fn delete_job(&self, id: i64) -> ApiResult<()> {
        self.delete(&format!("/jobs/{id}")).await
    }

    pub async fn cancel_job(&self, id: i64) -> ApiResult<ActionResult> {
        self.post_empty(&format!("/jobs/{id}/cancel")).await
    }

    pub async fn relaunch_job(&self, id: i64) -> ApiResult<Job> {
        self.post_empty(&format!("/jobs/{id}/relaunch")).await
    }

    pub async fn job_log(&self, id: i64) -> ApiResult<JobLog> {
        self.get(&format!("/jobs/{id}/log")).await
    }

    // credentials

    pub async fn create_credential(&self, credential: &CredentialCreate) -> ApiResult<Credential> {
        self.post("/credentials/", credential).await
    }

    pub async fn credentials(&self) -> ApiResult<Vec<Credential>> {
        self.get("/credentials/").await
    }

    pub async fn credential(&self, id: i64) -> ApiResult<Credential> {
        self.get(&format!("/credentials/{id}")).await
    }

    pub async fn update_credential(&self, id: i64, update: &CredentialUpdate) -> ApiResult<Credential> {
        self.patch(&format!("/credentials/{id}"), update).await
    }

    pub async fn delete_credential(&self, id: i64) -> ApiResult<()> {
        self.delete(&format!("/credentials/{id}")).await
    }

    pub async fn test_connection(&self, credential: &CredentialCreate) -> ApiResult<ActionResult> {
        self.post("/credentials/test-connection", credential).await
    }
}

// `detail` is a string, or a list of `{loc, msg}` for request validation failures.
fn error_detail(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let lines: Vec<String> = items
                .iter()
                .map(|item| {
                    let msg = item.get("msg").and_then(Value::as_str).unwrap_or("invalid");
                    let field = item
                        .get("loc")
                        .and_then(Value::as_array)
                        .and_then(|loc| loc.last())
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        });
                    match field {
                        Some(field) => format!("{field}: {msg}"),
                        None => msg.to_string(),
                    }
                })
                .collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        Value::Null => None,
        Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bundle_json, serve};
    use axum::extract::{Multipart, Path};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{delete, get, post};
    use axum::{Form, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5)).unwrap()
    }

    async fn bundles_handler(headers: HeaderMap) -> impl IntoResponse {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer secret") => (StatusCode::OK, Json(json!([bundle_json(1, "benzene set")]))),
            _ => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "detail": "Could not validate credentials" })),
            ),
        }
    }

    #[tokio::test]
    async fn sends_bearer_token() {
        let base = serve(Router::new().route("/bundles/", get(bundles_handler))).await;
        let mut api = client(&base);

        let err = api.bundles().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "Could not validate credentials");

        api.set_token("secret");
        let bundles = api.bundles().await.unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].name, "benzene set");
    }

    #[tokio::test]
    async fn error_messages_fall_back_to_status() {
        let app = Router::new()
            .route(
                "/jobs/:id",
                get(|Path(id): Path<i64>| async move {
                    if id == 1 {
                        (StatusCode::NOT_FOUND, r#"{"detail":"Job not found"}"#).into_response()
                    } else {
                        (StatusCode::BAD_GATEWAY, "upstream exploded").into_response()
                    }
                }),
            )
            .route(
                "/molecules/",
                post(|| async {
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(json!({ "detail": [
                            { "loc": ["body", "charge"], "msg": "value is not a valid integer" },
                            { "loc": ["body", "name"], "msg": "field required" }
                        ]})),
                    )
                }),
            );
        let api = client(&serve(app).await);

        let err = api.job(1).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Job not found");

        let err = api.job(2).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 502");

        let create = MoleculeCreate {
            name: "water".into(),
            charge: 0,
            multiplicity: 1,
            structure_xyz: String::new(),
            bundle_id: 1,
        };
        let err = api.create_molecule(&create).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "charge: value is not a valid integer\nname: field required"
        );
    }

    #[tokio::test]
    async fn no_content_is_unit() {
        let app = Router::new().route("/bundles/:id", delete(|| async { StatusCode::NO_CONTENT }));
        let api = client(&serve(app).await);
        api.delete_bundle(3).await.unwrap();
    }

    #[tokio::test]
    async fn login_posts_form_and_uses_its_own_fallback() {
        async fn login(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
            if form.get("username").map(String::as_str) == Some("alice")
                && form.get("password").map(String::as_str) == Some("hunter22")
            {
                (
                    StatusCode::OK,
                    r#"{"access_token":"tok","token_type":"bearer"}"#,
                )
            } else {
                (StatusCode::UNAUTHORIZED, "")
            }
        }
        let api = client(&serve(Router::new().route("/auth/login", post(login))).await);

        let token = api.login("alice", "hunter22").await.unwrap();
        assert_eq!(token.access_token, "tok");

        let err = api.login("alice", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Login failed");
    }

    #[tokio::test]
    async fn upload_sends_every_file_as_a_part() {
        async fn upload(Path(id): Path<i64>, mut multipart: Multipart) -> Json<Value> {
            let mut results = Vec::new();
            while let Some(field) = multipart.next_field().await.unwrap() {
                assert_eq!(field.name(), Some("files"));
                let name = field.file_name().unwrap().to_string();
                let body = field.text().await.unwrap();
                let status = if id == 4 { "success" } else { "error" };
                results.push(json!({
                    "name": name,
                    "charge": 0,
                    "multiplicity": 1,
                    "structure_xyz": body.lines().last().unwrap_or_default(),
                    "status": status,
                }));
            }
            Json(Value::Array(results))
        }
        let api = client(&serve(Router::new().route("/bundles/:id/upload-gjf", post(upload))).await);

        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("h2o.gjf");
        let b = dir.path().join("nh3.gjf");
        std::fs::write(&a, "#p sp\n\nwater\n\n0 1\nO 0 0 0").unwrap();
        std::fs::write(&b, "#p sp\n\nammonia\n\n0 1\nN 0 0 0").unwrap();

        let results = api.upload_gjf(4, &[a, b]).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "h2o.gjf");
        assert_eq!(results[1].structure_xyz, "N 0 0 0");
        assert!(results.iter().all(GjfUploadResult::is_success));
    }

    #[tokio::test]
    async fn base_path_prefix_is_kept() {
        let app = Router::new().route(
            "/api/jobs/:id/cancel",
            post(|| async { Json(json!({ "result": "cancelled" })) }),
        );
        let base = format!("{}/api/", serve(app).await);
        let api = client(&base);
        assert!(api.base_url().ends_with("/api"));
        assert_eq!(api.cancel_job(9).await.unwrap().result, "cancelled");
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = ApiClient::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }
}
