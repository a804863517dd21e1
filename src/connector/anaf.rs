//! `reqwest` implementation of the EDI connector.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ConnectorResponse, EdiConnector};
use crate::company::EdiConfig;
use crate::config::SyncConfig;
use crate::error::ConnectorError;

/// HTTP client for the ANAF e-Factura REST API.
pub struct AnafClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AnafClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("efactura-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConnectorError::ClientBuild(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ConnectorError> {
        Self::new(config.base_url.clone(), config.http_timeout)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl EdiConnector for AnafClient {
    async fn get(
        &self,
        config: &EdiConfig,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<ConnectorResponse, ConnectorError> {
        let token = config.token().ok_or_else(|| ConnectorError::MissingToken {
            name: config.name.clone(),
        })?;

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                ConnectorError::Timeout {
                    path: path.to_string(),
                    timeout: self.timeout,
                }
            } else {
                ConnectorError::RequestFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let resp = self
            .client
            .get(self.api_url(path))
            .query(params)
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_err)?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(map_err)?.to_vec();

        debug!(path = path, status = status, bytes = body.len(), "ANAF call finished");
        Ok(ConnectorResponse { status, body })
    }
}
