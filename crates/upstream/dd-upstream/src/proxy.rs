use std::time::Duration;

use async_trait::async_trait;
use dd_common::config::UpstreamCredentials;
use dd_common::types::ProxyHost;
use serde_json::{Value, json};

use crate::error::UpstreamError;
use crate::session::{Authenticator, Credential, SessionClient};

/// Token login against the reverse-proxy manager (`POST /api/tokens`).
pub struct ProxyManagerLogin {
    identity: String,
    secret: String,
}

pub type ProxyManagerClient = SessionClient<ProxyManagerLogin>;

impl ProxyManagerClient {
    pub fn from_credentials(creds: &UpstreamCredentials, timeout: Duration) -> Result<Self, UpstreamError> {
        SessionClient::new(
            &creds.url,
            timeout,
            ProxyManagerLogin {
                identity: creds.identity.clone(),
                secret: creds.secret.clone(),
            },
        )
    }

    pub async fn proxy_hosts(&self) -> Result<Vec<ProxyHost>, UpstreamError> {
        self.fetch_collection("/api/nginx/proxy-hosts").await
    }
}

#[async_trait]
impl Authenticator for ProxyManagerLogin {
    fn name(&self) -> &'static str {
        "proxy-manager"
    }

    async fn login(&self, http: &reqwest::Client, base_url: &str) -> Result<Credential, UpstreamError> {
        let resp = http
            .post(format!("{base_url}/api/tokens"))
            .json(&json!({
                "identity": self.identity,
                "secret": self.secret,
            }))
            .send()
            .await
            .map_err(|e| UpstreamError::Auth(format!("proxy manager unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Auth(format!(
                "token request rejected with HTTP {}",
                status.as_u16()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| UpstreamError::Auth(format!("token response unreadable: {e}")))?;

        body.get("token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(|t| Credential::Bearer(t.to_string()))
            .ok_or_else(|| UpstreamError::Auth("token response carried no token".into()))
    }
}
