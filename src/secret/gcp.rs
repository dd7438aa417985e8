//! Google Secret Manager REST client.

use super::{RemoteSecretError, SecretStore};
use crate::http::http_client;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

/// How the client obtains a bearer token for each request.
#[derive(Clone)]
pub enum TokenSource {
    Static(String),
    /// GCE / Cloud Run metadata server.
    Metadata { base: Url },
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Static([REDACTED])"),
            Self::Metadata { base } => f.debug_struct("Metadata").field("base", base).finish(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    #[serde(default)]
    name: Option<String>,
    payload: Option<SecretPayload>,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: Option<String>,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Secret store backed by the Secret Manager `versions:access` endpoint.
#[derive(Debug, Clone)]
pub struct SecretManagerClient {
    http: reqwest::Client,
    base_url: Url,
    token: TokenSource,
}

impl SecretManagerClient {
    pub fn new(
        base_url: Url,
        token: TokenSource,
        proxy: Option<&Url>,
    ) -> Result<Self, reqwest::Error> {
        let http = http_client(proxy)?;
        info!(base = %base_url, token = ?token, "secret manager client initialized");
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    async fn bearer_token(&self) -> Result<String, RemoteSecretError> {
        let base = match &self.token {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata { base } => base,
        };
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            base.as_str().trim_end_matches('/')
        );
        let resp = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(RemoteSecretError::Transport)?;
        match resp.status().as_u16() {
            200 => {
                let token: MetadataToken =
                    resp.json().await.map_err(RemoteSecretError::Transport)?;
                Ok(token.access_token)
            }
            401 | 403 => Err(RemoteSecretError::PermissionDenied(
                "metadata server refused token request".to_string(),
            )),
            429 | 500..=599 => Err(RemoteSecretError::Unavailable(resp.status().as_u16())),
            other => Err(RemoteSecretError::UnexpectedStatus(other)),
        }
    }
}

/// Resource name of the version to access; bare secrets resolve to `latest`.
pub fn version_name(locator: &str) -> String {
    let trimmed = locator.trim().trim_matches('/');
    if trimmed.contains("/versions/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/versions/latest")
    }
}

fn decode_payload(body: AccessSecretVersionResponse) -> Result<Vec<u8>, RemoteSecretError> {
    let data = body
        .payload
        .and_then(|p| p.data)
        .ok_or_else(|| RemoteSecretError::InvalidPayload("response has no payload".to_string()))?;
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| RemoteSecretError::InvalidPayload(format!("payload is not base64: {e}")))
}

#[async_trait]
impl SecretStore for SecretManagerClient {
    async fn access(&self, locator: &str) -> Result<Vec<u8>, RemoteSecretError> {
        let name = version_name(locator);
        let url = format!(
            "{}/v1/{name}:access",
            self.base_url.as_str().trim_end_matches('/')
        );
        let token = self.bearer_token().await?;

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(RemoteSecretError::Transport)?;

        match resp.status().as_u16() {
            200 => {
                let body: AccessSecretVersionResponse =
                    resp.json().await.map_err(RemoteSecretError::Transport)?;
                debug!(version = body.name.as_deref().unwrap_or(&name), "secret version accessed");
                decode_payload(body)
            }
            401 | 403 => Err(RemoteSecretError::PermissionDenied(name)),
            404 => Err(RemoteSecretError::NotFound(name)),
            429 | 500..=599 => Err(RemoteSecretError::Unavailable(resp.status().as_u16())),
            other => Err(RemoteSecretError::UnexpectedStatus(other)),
        }
    }

    fn store_type(&self) -> &'static str {
        "gcp-secret-manager"
    }
}
