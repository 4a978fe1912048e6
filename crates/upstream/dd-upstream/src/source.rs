//! Source traits consumed by the cache coordinator. The session clients
//! implement them; tests substitute in-memory fakes.

use async_trait::async_trait;
use dd_common::types::{Environment, ProxyHost, RawRecord};

use crate::error::UpstreamError;
use crate::primary::PrimaryClient;
use crate::proxy::ProxyManagerClient;

#[async_trait]
pub trait ContainerSource: Send + Sync {
    async fn environments(&self) -> Result<Vec<Environment>, UpstreamError>;

    async fn containers(&self, environment_id: &str) -> Result<Vec<RawRecord>, UpstreamError>;
}

#[async_trait]
pub trait ProxyHostSource: Send + Sync {
    async fn proxy_hosts(&self) -> Result<Vec<ProxyHost>, UpstreamError>;
}

#[async_trait]
impl ContainerSource for PrimaryClient {
    async fn environments(&self) -> Result<Vec<Environment>, UpstreamError> {
        PrimaryClient::environments(self).await
    }

    async fn containers(&self, environment_id: &str) -> Result<Vec<RawRecord>, UpstreamError> {
        PrimaryClient::containers(self, environment_id).await
    }
}

#[async_trait]
impl ProxyHostSource for ProxyManagerClient {
    async fn proxy_hosts(&self) -> Result<Vec<ProxyHost>, UpstreamError> {
        ProxyManagerClient::proxy_hosts(self).await
    }
}
