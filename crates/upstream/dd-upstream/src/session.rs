use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::UpstreamError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Session credential held between requests.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `name=value` pairs ready for a `Cookie` header.
    Cookie(String),
    Bearer(String),
}

impl Credential {
    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Credential::Cookie(cookie) => req.header(header::COOKIE, cookie),
            Credential::Bearer(token) => req.bearer_auth(token),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Cookie(_) => f.write_str("Cookie(***)"),
            Credential::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

/// Login exchange for one upstream API.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Exchange the configured credentials for a session credential.
    async fn login(&self, http: &reqwest::Client, base_url: &str) -> Result<Credential, UpstreamError>;
}

/// Upstream payloads come either bare or wrapped in `{"data": ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Envelope { data: T },
    Bare(T),
}

impl<T> Payload<T> {
    fn into_inner(self) -> T {
        match self {
            Payload::Envelope { data } => data,
            Payload::Bare(value) => value,
        }
    }
}

/// Authenticated client for one upstream API.
///
/// Logs in lazily on first use. A 401 triggers exactly one re-login and one
/// retry of the request; a second rejection is returned to the caller.
pub struct SessionClient<A> {
    http: reqwest::Client,
    base_url: String,
    auth: A,
    credential: Mutex<Option<Credential>>,
}

impl<A: Authenticator> SessionClient<A> {
    pub fn new(base_url: &str, timeout: Duration, auth: A) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(UpstreamError::request)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            credential: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform only the login exchange.
    pub async fn test_connection(&self) -> Result<(), UpstreamError> {
        let credential = self.auth.login(&self.http, &self.base_url).await?;
        *self.credential.lock().await = Some(credential);
        info!(upstream = self.auth.name(), url = %self.base_url, "Upstream login succeeded");
        Ok(())
    }

    pub async fn fetch_collection<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        self.fetch_with_query(path, &[]).await
    }

    pub async fn fetch_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let credential = self.credential().await?;
        let mut resp = self.send(path, query, &credential).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            debug!(upstream = self.auth.name(), path, "Session rejected, logging in again");
            self.invalidate(&credential).await;
            let credential = self.credential().await?;
            resp = self.send(path, query, &credential).await?;
        }

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Transport {
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(UpstreamError::request)?;
        serde_json::from_slice::<Payload<T>>(&body)
            .map(Payload::into_inner)
            .map_err(|e| UpstreamError::Protocol(format!("{path}: {e}")))
    }

    async fn send(
        &self,
        path: &str,
        query: &[(&str, &str)],
        credential: &Credential,
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut req = self.http.get(format!("{}{}", self.base_url, path));
        if !query.is_empty() {
            req = req.query(query);
        }
        credential
            .apply(req)
            .send()
            .await
            .map_err(UpstreamError::request)
    }

    /// Current credential, logging in first when there is none.
    /// The lock is held across the login so concurrent callers share one exchange.
    async fn credential(&self) -> Result<Credential, UpstreamError> {
        let mut slot = self.credential.lock().await;
        if let Some(credential) = slot.as_ref() {
            return Ok(credential.clone());
        }
        let credential = self.auth.login(&self.http, &self.base_url).await?;
        debug!(upstream = self.auth.name(), "Logged in");
        *slot = Some(credential.clone());
        Ok(credential)
    }

    /// Drop the credential unless another caller already replaced it.
    async fn invalidate(&self, rejected: &Credential) {
        let mut slot = self.credential.lock().await;
        if slot.as_ref() == Some(rejected) {
            *slot = None;
        }
    }
}
