use std::time::Duration;
use url::Url;

pub(crate) fn user_agent() -> String {
    format!("keyway/{}", env!("CARGO_PKG_VERSION"))
}

/// Outbound HTTP client shared by the secret store and mail clients.
pub(crate) fn http_client(proxy: Option<&Url>) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(15));
    if let Some(proxy_url) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }
    builder.build()
}
