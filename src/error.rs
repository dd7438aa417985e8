use crate::secret::RemoteSecretError;
use reqwest::StatusCode;
use sqlx::Error as SqlxError;
use std::path::PathBuf;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum KeywayError {
    #[error("unable to find a credentials source")]
    NoSourceConfigured,

    #[error("error getting credentials from secret {locator}: {source}")]
    RemoteFetch {
        locator: String,
        #[source]
        source: RemoteSecretError,
    },

    #[error("error getting credentials from {}: {source}", path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error reading {kind} credentials: {source}")]
    Parse {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing configuration variable: {field}")]
    Validation { field: &'static str },

    #[error("missing connection field: {field}")]
    MissingField { field: &'static str },

    #[error("unexpected error connecting to the database: {0}")]
    Connect(#[source] SqlxError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail API rejected request with status {status}: {body}")]
    MailRejected { status: StatusCode, body: String },

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),
}

impl KeywayError {
    /// True for failures raised while resolving, parsing or validating credentials.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            KeywayError::NoSourceConfigured
                | KeywayError::RemoteFetch { .. }
                | KeywayError::LocalRead { .. }
                | KeywayError::Parse { .. }
                | KeywayError::Validation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_failures_are_distinguished_from_builder_failures() {
        assert!(KeywayError::NoSourceConfigured.is_load_failure());
        assert!(KeywayError::Validation { field: "username" }.is_load_failure());
        assert!(!KeywayError::MissingField { field: "host" }.is_load_failure());
        assert!(!KeywayError::Connect(SqlxError::PoolTimedOut).is_load_failure());
    }

    #[test]
    fn display_names_the_field() {
        let err = KeywayError::Validation { field: "database" };
        assert_eq!(err.to_string(), "missing configuration variable: database");

        let err = KeywayError::MissingField {
            field: "private_host",
        };
        assert_eq!(err.to_string(), "missing connection field: private_host");
    }
}
