//! EDI connector — transport to the ANAF e-Factura REST API.
//!
//! The fetcher and materializer only see the `EdiConnector` trait; the
//! `reqwest`-backed [`AnafClient`] is the production implementation.

pub mod anaf;

pub use anaf::AnafClient;

use async_trait::async_trait;

use crate::company::EdiConfig;
use crate::error::ConnectorError;

/// Lists the e-Factura messages addressed to a tax id.
pub const LIST_MESSAGES_PATH: &str = "/listaMesajeFactura";

/// Downloads the ZIP package for a message id.
pub const DOWNLOAD_PATH: &str = "/descarcare";

/// Raw response of a connector call. Status handling is left to the caller.
#[derive(Debug, Clone)]
pub struct ConnectorResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ConnectorResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Authenticated call primitive against the e-Factura API.
#[async_trait]
pub trait EdiConnector: Send + Sync {
    /// Issue a GET to `path` with the given query parameters, authenticated
    /// with the configuration's access token.
    async fn get(
        &self,
        config: &EdiConfig,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<ConnectorResponse, ConnectorError>;
}
