use crate::config::FactoryConfig;
use crate::email::models::{EmailCredentials, Message, SendResponse};
use crate::error::KeywayError;
use crate::http::http_client;
use crate::secret::{SecretResolver, SecretStore};
use crate::service::credential_loader::CredentialLoader;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Mailgun API client bound to one sending domain.
#[derive(Clone)]
pub struct MailgunClient {
    http: reqwest::Client,
    api_base: Url,
    domain: String,
    api_key: String,
}

impl fmt::Debug for MailgunClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailgunClient")
            .field("api_base", &self.api_base.as_str())
            .field("domain", &self.domain)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl MailgunClient {
    pub fn new(
        http: reqwest::Client,
        api_base: Url,
        domain: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base,
            domain: domain.into(),
            api_key: api_key.into(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/v3/{}/messages",
            self.api_base.as_str().trim_end_matches('/'),
            self.domain
        )
    }

    pub async fn send(&self, message: &Message) -> Result<SendResponse, KeywayError> {
        let resp = self
            .http
            .post(self.messages_url())
            .basic_auth("api", Some(&self.api_key))
            .form(&message.form_fields())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(KeywayError::MailRejected { status, body });
        }
        let sent: SendResponse = resp.json().await?;
        debug!(domain = %self.domain, id = %sent.id, "message queued");
        Ok(sent)
    }
}

/// Hands out Mailgun clients built from lazily loaded credentials.
#[derive(Debug)]
pub struct EmailFactory {
    loader: CredentialLoader<EmailCredentials>,
    http: reqwest::Client,
    api_base: Url,
}

impl EmailFactory {
    pub fn new(
        config: FactoryConfig,
        store: Arc<dyn SecretStore>,
        api_base: Url,
        proxy: Option<&Url>,
    ) -> Result<Self, KeywayError> {
        let http = http_client(proxy)?;
        Ok(Self::with_http_client(config, store, api_base, http))
    }

    pub fn with_http_client(
        config: FactoryConfig,
        store: Arc<dyn SecretStore>,
        api_base: Url,
        http: reqwest::Client,
    ) -> Self {
        Self {
            loader: CredentialLoader::new(SecretResolver::new(config, store)),
            http,
            api_base,
        }
    }

    pub fn loader(&self) -> &CredentialLoader<EmailCredentials> {
        &self.loader
    }

    /// Builds a client without any network I/O; only loading can fail.
    pub async fn client(&self) -> Result<MailgunClient, KeywayError> {
        let creds = self.loader.ensure_loaded().await?;
        info!(domain = %creds.domain, "mailgun client ready");
        Ok(MailgunClient::new(
            self.http.clone(),
            self.api_base.clone(),
            creds.domain.clone(),
            creds.api_key.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::testing::ScriptedStore;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAYLOAD: &str = r#"{"mailgun_domain":"example.com","mailgun_key":"k"}"#;

    fn factory(store: Arc<ScriptedStore>, base: &str) -> EmailFactory {
        EmailFactory::new(
            FactoryConfig::remote("projects/p/secrets/mail"),
            store,
            Url::parse(base).unwrap(),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn client_carries_loaded_credentials() {
        let store = Arc::new(ScriptedStore::ok(PAYLOAD));
        let server = MockServer::start().await;
        let f = factory(store.clone(), &server.uri());

        let client = f.client().await.unwrap();
        assert_eq!(client.domain(), "example.com");
        assert_eq!(client.api_key(), "k");
        f.client().await.unwrap();

        assert_eq!(store.calls(), 1);
        assert!(server.received_requests().await.unwrap().is_empty());
        assert!(!format!("{client:?}").contains("\"k\""));
    }

    #[tokio::test]
    async fn missing_key_fails_at_load() {
        let store = Arc::new(ScriptedStore::ok(r#"{"mailgun_domain":"example.com"}"#));
        let f = factory(store, "https://api.mailgun.net");

        let err = f.client().await.unwrap_err();
        assert!(err.is_load_failure());
        assert!(matches!(err, KeywayError::Validation { field: "api_key" }));
    }

    #[tokio::test]
    async fn send_posts_form_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/example.com/messages"))
            // api:k
            .and(header("authorization", "Basic YXBpOms="))
            .and(body_string_contains("subject=hello"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "<20260101.1@example.com>",
                "message": "Queued. Thank you."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let f = factory(Arc::new(ScriptedStore::ok(PAYLOAD)), &server.uri());
        let sent = f
            .client()
            .await
            .unwrap()
            .send(&Message {
                from: "noreply@example.com".into(),
                to: vec!["user@example.org".into()],
                subject: "hello".into(),
                text: "body".into(),
                html: None,
            })
            .await
            .unwrap();
        assert_eq!(sent.message, "Queued. Thank you.");
    }

    #[tokio::test]
    async fn rejected_send_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Forbidden"))
            .mount(&server)
            .await;

        let f = factory(Arc::new(ScriptedStore::ok(PAYLOAD)), &server.uri());
        let err = f
            .client()
            .await
            .unwrap()
            .send(&Message::default())
            .await
            .unwrap_err();
        match err {
            KeywayError::MailRejected { status, body } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "Forbidden");
            }
            other => panic!("expected MailRejected, got {other:?}"),
        }
    }
}
