use crate::error::KeywayError;
use crate::service::credential_loader::{CredentialRecord, require_non_empty};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mailgun secret payload.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmailCredentials {
    #[serde(rename = "mailgun_domain")]
    pub domain: String,
    #[serde(rename = "mailgun_key")]
    pub api_key: String,
}

impl fmt::Debug for EmailCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailCredentials")
            .field("domain", &self.domain)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl CredentialRecord for EmailCredentials {
    const KIND: &'static str = "email";

    fn validate(&self) -> Result<(), KeywayError> {
        require_non_empty(&[
            ("domain", self.domain.as_str()),
            ("api_key", self.api_key.as_str()),
        ])
    }
}

/// Outbound message accepted by the messages endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

impl Message {
    pub(crate) fn form_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![("from", self.from.as_str())];
        fields.extend(self.to.iter().map(|to| ("to", to.as_str())));
        fields.push(("subject", self.subject.as_str()));
        fields.push(("text", self.text.as_str()));
        if let Some(html) = self.html.as_deref() {
            fields.push(("html", html));
        }
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub id: String,
    pub message: String,
}
