use crate::error::KeywayError;
use crate::service::credential_loader::{CredentialRecord, require_non_empty};
use serde::Deserialize;
use std::fmt;

/// Database secret payload.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseCredentials {
    /// Cloud SQL instance connection name, used as the socket file name.
    #[serde(rename = "instance")]
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Private network address of the instance.
    #[serde(rename = "private")]
    pub private_host: String,
}

impl fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("private_host", &self.private_host)
            .finish()
    }
}

impl CredentialRecord for DatabaseCredentials {
    const KIND: &'static str = "database";

    fn validate(&self) -> Result<(), KeywayError> {
        require_non_empty(&[
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("database", self.database.as_str()),
        ])
    }
}
