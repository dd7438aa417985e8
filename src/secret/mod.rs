//! Credential sources: a remote secret store addressed by locator, or a local
//! volume-mounted file.

pub mod gcp;

use crate::config::FactoryConfig;
use crate::error::KeywayError;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub use gcp::SecretManagerClient;

/// Errors raised by a remote secret store. Raw response bodies are never kept.
#[derive(Debug, thiserror::Error)]
pub enum RemoteSecretError {
    #[error("network error communicating with secret store")]
    Transport(#[source] reqwest::Error),

    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("permission denied accessing secret: {0}")]
    PermissionDenied(String),

    #[error("secret store unavailable: status {0}")]
    Unavailable(u16),

    #[error("unexpected secret store response: status {0}")]
    UnexpectedStatus(u16),

    #[error("invalid secret payload: {0}")]
    InvalidPayload(String),
}

/// Remote secret service boundary: returns the raw bytes of the latest
/// version of the secret named by `locator`.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn access(&self, locator: &str) -> Result<Vec<u8>, RemoteSecretError>;

    fn store_type(&self) -> &'static str;
}

/// Where one credential load reads its bytes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Remote { locator: String },
    LocalFile { path: PathBuf },
}

impl CredentialSource {
    /// Remote locator wins over a local path; neither is an error.
    pub fn select(config: &FactoryConfig) -> Result<Self, KeywayError> {
        if let Some(locator) = config.remote_locator() {
            return Ok(Self::Remote {
                locator: locator.to_string(),
            });
        }
        if let Some(path) = config.local_path() {
            return Ok(Self::LocalFile {
                path: path.to_path_buf(),
            });
        }
        Err(KeywayError::NoSourceConfigured)
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote { locator } => write!(f, "secret:{locator}"),
            Self::LocalFile { path } => write!(f, "file:{}", path.display()),
        }
    }
}

/// Fetches raw credential bytes from whichever source the hints select.
#[derive(Clone)]
pub struct SecretResolver {
    config: FactoryConfig,
    store: Arc<dyn SecretStore>,
}

impl fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretResolver")
            .field("config", &self.config)
            .field("store", &self.store.store_type())
            .finish()
    }
}

impl SecretResolver {
    pub fn new(config: FactoryConfig, store: Arc<dyn SecretStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn source(&self) -> Result<CredentialSource, KeywayError> {
        CredentialSource::select(&self.config)
    }

    pub async fn resolve(&self) -> Result<Vec<u8>, KeywayError> {
        match self.source()? {
            CredentialSource::Remote { locator } => {
                debug!(store = self.store.store_type(), locator = %locator, "fetching remote secret");
                self.store
                    .access(&locator)
                    .await
                    .map_err(|source| KeywayError::RemoteFetch { locator, source })
            }
            CredentialSource::LocalFile { path } => {
                debug!(path = %path.display(), "reading credentials volume");
                tokio::fs::read(&path)
                    .await
                    .map_err(|source| KeywayError::LocalRead { path, source })
            }
        }
    }
}
