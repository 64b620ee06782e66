//! HTTP client for the BrightRoot platform's authentication API.
//!
//! The API is a Django REST backend with SimpleJWT token auth: credentials
//! go in, an access/refresh token pair comes out, and the access token is
//! presented as a bearer authorization on every authenticated call.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::error::{registration_error, server_message, AuthError};
use crate::models::Profile;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Credential request for the token endpoint.
///
/// An email-shaped identifier is sent in both the `username` and `email`
/// fields; the server applies whichever lookup it supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRequest {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
}

impl TokenRequest {
    pub fn for_identifier(identifier: &str, password: &str) -> Self {
        Self {
            username: identifier.to_string(),
            email: identifier
                .contains('@')
                .then(|| identifier.to_string()),
            password: password.to_string(),
        }
    }
}

/// New-account request for the registration endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Access/refresh credential pair issued by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Registration response. Some deployments issue credentials inline, others
/// only acknowledge the new account; both shapes deserialize here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub user: Option<Profile>,
}

impl RegisterResponse {
    /// The inline credential pair, when the server issued one.
    pub fn credentials(&self) -> Option<TokenPair> {
        match (&self.access, &self.refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair {
                access: access.clone(),
                refresh: refresh.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// The remote authentication API as the session controller consumes it.
///
/// The production implementation is [`ApiClient`]; tests substitute a
/// scripted fake.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /api/token/` - exchange credentials for a token pair.
    async fn issue_tokens(&self, request: &TokenRequest) -> Result<TokenPair, AuthError>;

    /// `GET /api/users/profile/` - fetch the profile the access token grants.
    async fn fetch_profile(&self, access: &str) -> Result<Profile, AuthError>;

    /// `POST /api/token/refresh/` - mint a new access credential.
    async fn refresh_access(&self, refresh: &str) -> Result<String, AuthError>;

    /// `POST /api/users/register/` - create an account.
    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, AuthError>;
}

/// reqwest-backed API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport_error(err: reqwest::Error) -> AuthError {
    AuthError::Network(err.to_string())
}

fn malformed(endpoint: &str, err: reqwest::Error) -> AuthError {
    AuthError::Server(format!("Malformed response from {}: {}", endpoint, err))
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn issue_tokens(&self, request: &TokenRequest) -> Result<TokenPair, AuthError> {
        let url = self.url("/api/token/");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| malformed("token", e))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(AuthError::InvalidCredentials)
        } else {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "Token request failed");
            Err(server_message(&body, "Login failed"))
        }
    }

    async fn fetch_profile(&self, access: &str) -> Result<Profile, AuthError> {
        let url = self.url("/api/users/profile/");
        let response = self
            .client
            .get(&url)
            .bearer_auth(access)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| malformed("profile", e))
        } else if status == StatusCode::UNAUTHORIZED {
            // Expired or invalid access credential
            Err(AuthError::InvalidCredentials)
        } else {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "Profile fetch failed");
            Err(server_message(&body, "Profile fetch failed"))
        }
    }

    async fn refresh_access(&self, refresh: &str) -> Result<String, AuthError> {
        let url = self.url("/api/token/refresh/");
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            let body: RefreshResponse = response
                .json()
                .await
                .map_err(|e| malformed("token refresh", e))?;
            Ok(body.access)
        } else if status.is_client_error() {
            debug!(%status, "Refresh credential rejected");
            Err(AuthError::RefreshRejected)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(server_message(&body, "Token refresh failed"))
        }
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, AuthError> {
        let url = self.url("/api/users/register/");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| malformed("register", e))
        } else if status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            Err(registration_error(&body))
        } else {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "Registration failed");
            Err(server_message(&body, "Registration failed"))
        }
    }
}
