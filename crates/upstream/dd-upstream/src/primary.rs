use std::time::Duration;

use async_trait::async_trait;
use dd_common::config::UpstreamCredentials;
use dd_common::types::{Environment, RawRecord};
use reqwest::header;
use serde_json::{Value, json};

use crate::error::UpstreamError;
use crate::session::{Authenticator, Credential, SessionClient};

/// Username/password login against the container API.
/// The session lives in the `Set-Cookie` response; a `token` in the body is
/// accepted as a bearer token when no cookie is set.
pub struct PrimaryLogin {
    username: String,
    password: String,
}

pub type PrimaryClient = SessionClient<PrimaryLogin>;

impl PrimaryClient {
    pub fn from_credentials(creds: &UpstreamCredentials, timeout: Duration) -> Result<Self, UpstreamError> {
        SessionClient::new(
            &creds.url,
            timeout,
            PrimaryLogin {
                username: creds.identity.clone(),
                password: creds.secret.clone(),
            },
        )
    }

    pub async fn environments(&self) -> Result<Vec<Environment>, UpstreamError> {
        self.fetch_collection("/api/environments").await
    }

    pub async fn containers(&self, environment_id: &str) -> Result<Vec<RawRecord>, UpstreamError> {
        self.fetch_with_query("/api/containers", &[("env", environment_id)])
            .await
    }
}

#[async_trait]
impl Authenticator for PrimaryLogin {
    fn name(&self) -> &'static str {
        "containers"
    }

    async fn login(&self, http: &reqwest::Client, base_url: &str) -> Result<Credential, UpstreamError> {
        let resp = http
            .post(format!("{base_url}/api/auth/login"))
            .json(&json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .await
            .map_err(|e| UpstreamError::Auth(format!("login request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Auth(format!(
                "login rejected with HTTP {}",
                status.as_u16()
            )));
        }

        let cookies: Vec<String> = resp
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(session_pair)
            .collect();
        if !cookies.is_empty() {
            return Ok(Credential::Cookie(cookies.join("; ")));
        }

        let body = resp.bytes().await.unwrap_or_default();
        let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        body_token(&body)
            .map(Credential::Bearer)
            .ok_or_else(|| UpstreamError::Auth("login response carried no session cookie or token".into()))
    }
}

/// `name=value` from a `Set-Cookie` header, skipping cleared cookies.
fn session_pair(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some(pair.to_string())
}

fn body_token(body: &Value) -> Option<String> {
    [&body["token"], &body["data"]["token"]]
        .into_iter()
        .filter_map(|v| v.as_str())
        .find(|t| !t.is_empty())
        .map(String::from)
}
