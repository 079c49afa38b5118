//! HTTP sync client for communicating with the VaultSync server.

use crate::sync::models::{
    messages, AuthRequest, ErrorResponse, RemoteSecret, SecretIdRequest, SecretRequest,
    SecretVersion, TokenResponse, VersionList, VersionListResponse,
};
use crate::sync::remote::{RemoteError, RemoteResult, SecretRemote};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

/// HTTP client for the VaultSync server.
#[derive(Clone)]
pub struct SyncClient {
    client: reqwest::Client,
    server_url: String,
    token: Option<String>,
}

impl SyncClient {
    /// Create a new client. `timeout` bounds every request.
    pub fn new(server_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Create an account. The returned token is also kept for later calls.
    pub async fn register(&mut self, request: &AuthRequest) -> RemoteResult<String> {
        self.authenticate("/api/user/register", request).await
    }

    /// Log in from this device. The returned token is also kept for later calls.
    pub async fn login(&mut self, request: &AuthRequest) -> RemoteResult<String> {
        self.authenticate("/api/user/login", request).await
    }

    /// Check that the server is reachable and the token is accepted.
    pub async fn ping(&self) -> RemoteResult<()> {
        let resp = self.send(self.authed(Method::GET, "/api/ping")?).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;
        if body.trim() != "ok" {
            return Err(RemoteError::Protocol(format!("unexpected ping reply: {}", body)));
        }
        Ok(())
    }

    // --- Internal helpers ---

    async fn authenticate(&mut self, path: &str, request: &AuthRequest) -> RemoteResult<String> {
        let builder = self
            .client
            .post(format!("{}{}", self.server_url, path))
            .json(request);

        let resp: TokenResponse = read_json(self.send(builder).await?).await?;
        self.token = Some(resp.token.clone());
        Ok(resp.token)
    }

    fn authed(&self, method: Method, path: &str) -> RemoteResult<RequestBuilder> {
        let token = self.token.as_deref().ok_or(RemoteError::Unauthorized)?;
        Ok(self
            .client
            .request(method, format!("{}{}", self.server_url, path))
            .bearer_auth(token))
    }

    async fn send(&self, builder: RequestBuilder) -> RemoteResult<Response> {
        let resp = builder.send().await.map_err(transport_error)?;
        check_status(resp).await
    }
}

impl SecretRemote for SyncClient {
    async fn version_list(&self) -> RemoteResult<VersionList> {
        let resp = self.send(self.authed(Method::GET, "/api/sync")?).await?;
        let body: VersionListResponse = read_json(resp).await?;
        Ok(body.list)
    }

    async fn get(&self, id: Uuid) -> RemoteResult<RemoteSecret> {
        let builder = self
            .authed(Method::GET, "/api/secret")?
            .json(&SecretIdRequest { id });
        read_json(self.send(builder).await?).await
    }

    async fn add(&self, ver: i64, data: &str) -> RemoteResult<SecretVersion> {
        let builder = self.authed(Method::PUT, "/api/secret")?.json(&SecretRequest {
            id: None,
            ver,
            data: data.to_string(),
        });
        read_json(self.send(builder).await?).await
    }

    async fn update(&self, id: Uuid, ver: i64, data: &str) -> RemoteResult<SecretVersion> {
        let builder = self.authed(Method::PUT, "/api/secret")?.json(&SecretRequest {
            id: Some(id),
            ver,
            data: data.to_string(),
        });
        read_json(self.send(builder).await?).await
    }

    async fn delete(&self, id: Uuid) -> RemoteResult<()> {
        let builder = self
            .authed(Method::DELETE, "/api/secret")?
            .json(&SecretIdRequest { id });
        self.send(builder).await?;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(e.to_string())
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> RemoteResult<T> {
    resp.json()
        .await
        .map_err(|e| RemoteError::Protocol(format!("Invalid response body: {}", e)))
}

/// Translate a non-success response into a [`RemoteError`].
async fn check_status(resp: Response) -> RemoteResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or(text);

    Err(error_for_status(status, message))
}

fn error_for_status(status: StatusCode, message: String) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
        StatusCode::UNPROCESSABLE_ENTITY => match message.as_str() {
            messages::NOT_FOUND => RemoteError::NotFound,
            messages::VERSION_TOO_LOW => RemoteError::VersionTooLow,
            messages::ITEM_IS_DELETED => RemoteError::ItemIsDeleted,
            messages::WRONG_AUTH_DATA => RemoteError::WrongAuthData,
            messages::CONFLICT_SAVE_USER => RemoteError::ConflictSaveUser,
            _ => RemoteError::Validation(message),
        },
        StatusCode::BAD_REQUEST => RemoteError::Validation(message),
        s if s.is_server_error() => RemoteError::Server(format!("{}: {}", s, message)),
        s => RemoteError::Protocol(format!("unexpected status {}: {}", s, message)),
    }
}
