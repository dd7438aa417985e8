use crate::error::KeywayError;
use crate::secret::gcp::TokenSource;
use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default directory holding Cloud SQL unix sockets.
pub const DEFAULT_SOCKET_DIR: &str = "/cloudsql";

const ENV_KEYS: &[&str] = &[
    "secret_path",
    "db_secret_path",
    "mail_secret_path",
    "db_creds_path",
    "mail_creds_path",
    "sqlpath",
    "db_strategy",
    "secret_manager_url",
    "gce_metadata_url",
    "gcp_access_token",
    "mailgun_api_base",
    "proxy",
    "loglevel",
];

/// Which database connection strategy the probe binary exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbStrategy {
    #[default]
    Socket,
    Address,
}

/// Process configuration, read from defaults overlaid with environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote secret locator shared by both factories.
    pub secret_path: Option<String>,
    pub db_secret_path: Option<String>,
    pub mail_secret_path: Option<String>,
    pub db_creds_path: Option<PathBuf>,
    pub mail_creds_path: Option<PathBuf>,
    /// Overrides [`DEFAULT_SOCKET_DIR`].
    pub sqlpath: Option<PathBuf>,
    pub db_strategy: DbStrategy,
    pub secret_manager_url: Url,
    pub gce_metadata_url: Url,
    pub gcp_access_token: Option<String>,
    pub mailgun_api_base: Url,
    pub proxy: Option<Url>,
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret_path: None,
            db_secret_path: None,
            mail_secret_path: None,
            db_creds_path: None,
            mail_creds_path: None,
            sqlpath: None,
            db_strategy: DbStrategy::default(),
            secret_manager_url: Url::parse("https://secretmanager.googleapis.com")
                .expect("valid default secret manager url"),
            gce_metadata_url: Url::parse("http://metadata.google.internal")
                .expect("valid default metadata url"),
            gcp_access_token: None,
            mailgun_api_base: Url::parse("https://api.mailgun.net")
                .expect("valid default mailgun url"),
            proxy: None,
            loglevel: "info".to_string(),
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Env::raw().only(ENV_KEYS))
    }

    pub fn from_env() -> Result<Self, KeywayError> {
        Ok(Self::figment().extract()?)
    }

    /// Factory settings for the database connection factory.
    pub fn database(&self) -> FactoryConfig {
        FactoryConfig {
            remote_secret_locator: non_blank(&self.db_secret_path)
                .or_else(|| non_blank(&self.secret_path)),
            local_creds_path: self.db_creds_path.clone(),
            socket_dir_override: self.sqlpath.clone(),
        }
    }

    /// Factory settings for the email client factory.
    pub fn email(&self) -> FactoryConfig {
        FactoryConfig {
            remote_secret_locator: non_blank(&self.mail_secret_path)
                .or_else(|| non_blank(&self.secret_path)),
            local_creds_path: self.mail_creds_path.clone(),
            socket_dir_override: None,
        }
    }

    pub fn token_source(&self) -> TokenSource {
        match self.gcp_access_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => TokenSource::Static(token.to_string()),
            _ => TokenSource::Metadata {
                base: self.gce_metadata_url.clone(),
            },
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.clone().filter(|s| !s.trim().is_empty())
}

/// Per-instance credential source hints handed to a factory at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactoryConfig {
    pub remote_secret_locator: Option<String>,
    pub local_creds_path: Option<PathBuf>,
    pub socket_dir_override: Option<PathBuf>,
}

impl FactoryConfig {
    pub fn remote(locator: impl Into<String>) -> Self {
        Self {
            remote_secret_locator: Some(locator.into()),
            ..Self::default()
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            local_creds_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_creds_path = Some(path.into());
        self
    }

    pub fn with_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir_override = Some(dir.into());
        self
    }

    /// Remote locator, if set to something other than blanks.
    pub fn remote_locator(&self) -> Option<&str> {
        self.remote_secret_locator
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_creds_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn socket_dir(&self) -> &Path {
        self.socket_dir_override
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(DEFAULT_SOCKET_DIR))
    }
}
