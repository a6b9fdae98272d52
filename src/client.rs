//! HTTP client for the testboard API.
//!
//! All calls go through [`ApiClient::send`], which resolves the base URL,
//! attaches the stored bearer token, serializes JSON bodies and handles an
//! expired session: on `401` the stored token is discarded and
//! [`ClientError::Unauthorized`] tells the caller to log in again.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{
    Created, LoginRequest, LoginResponse, MessageResponse, MonthlyProgress, Project, ProjectInput,
    ProjectProgress, Stats, TestCase, TestInput,
};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_TOKEN_FILE: &str = ".testboard_token";

#[derive(Error, Debug)]
pub enum ClientError {
    /// The server rejected the credentials or the session; the token is gone.
    #[error("not authorized ({message}); please log in again")]
    Unauthorized { message: String },

    #[error("server returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token store error: {0}")]
    TokenStore(#[from] io::Error),
}

/// Where the session token lives between calls.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

/// Token kept in a plain file, one token per file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        fs::read_to_string(&self.path)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    fn save(&self, token: &str) -> io::Result<()> {
        fs::write(&self.path, token)
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn save(&self, token: &str) -> io::Result<()> {
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token.to_string());
        }
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
        Ok(())
    }
}

pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Box<dyn TokenStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, tokens: impl TokenStore + 'static) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: Box::new(tokens),
        }
    }

    pub fn tokens(&self) -> &dyn TokenStore {
        self.tokens.as_ref()
    }

    /// The single request path shared by every operation.
    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "api request");

        let mut request = self.http.request(method, &url);
        if let Some(token) = self.tokens.load() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.clear()?;
            let message = error_message(response).await;
            warn!(%url, %message, "session rejected, token cleared");
            return Err(ClientError::Unauthorized { message });
        }
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(ClientError::Api { status, message });
        }

        Ok(response.json::<T>().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send::<(), T>(Method::GET, path, None).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send::<(), T>(Method::DELETE, path, None).await
    }

    /// Exchange credentials for a token and keep it in the token store.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let body = LoginRequest {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        };
        let response: LoginResponse = self.send(Method::POST, "/login", Some(&body)).await?;
        self.tokens.save(&response.token)?;
        Ok(())
    }

    pub fn logout(&self) -> Result<(), ClientError> {
        self.tokens.clear()?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<MessageResponse, ClientError> {
        self.get("/ping").await
    }

    // --- Projects ---

    pub async fn projects(&self) -> Result<Vec<Project>, ClientError> {
        self.get("/projects").await
    }

    pub async fn create_project(&self, input: &ProjectInput) -> Result<Created, ClientError> {
        self.send(Method::POST, "/projects", Some(input)).await
    }

    pub async fn update_project(&self, id: i64, input: &ProjectInput) -> Result<MessageResponse, ClientError> {
        self.send(Method::PUT, &format!("/projects/{}", id), Some(input)).await
    }

    pub async fn delete_project(&self, id: i64) -> Result<MessageResponse, ClientError> {
        self.delete(&format!("/projects/{}", id)).await
    }

    // --- Tests ---

    pub async fn tests(&self) -> Result<Vec<TestCase>, ClientError> {
        self.get("/tests").await
    }

    pub async fn create_test(&self, input: &TestInput) -> Result<Created, ClientError> {
        self.send(Method::POST, "/tests", Some(input)).await
    }

    pub async fn update_test(&self, id: i64, input: &TestInput) -> Result<MessageResponse, ClientError> {
        self.send(Method::PUT, &format!("/tests/{}", id), Some(input)).await
    }

    pub async fn delete_test(&self, id: i64) -> Result<MessageResponse, ClientError> {
        self.delete(&format!("/tests/{}", id)).await
    }

    // --- Reports ---

    pub async fn stats(&self) -> Result<Stats, ClientError> {
        self.get("/stats").await
    }

    pub async fn monthly_progress(&self) -> Result<Vec<MonthlyProgress>, ClientError> {
        self.get("/monthly-progress").await
    }

    pub async fn project_progress(&self) -> Result<Vec<ProjectProgress>, ClientError> {
        self.get("/project-progress").await
    }
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<MessageResponse>().await {
        Ok(body) => body.message,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    }
}
