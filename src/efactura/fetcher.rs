//! Message fetcher — lists the received e-invoices pending for one company.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::model::{Message, MessageList};
use crate::company::Company;
use crate::config::{DEFAULT_DOWNLOAD_LIMIT_DAYS, DOWNLOAD_LIMIT_DAYS_KEY};
use crate::connector::{EdiConnector, LIST_MESSAGES_PATH};
use crate::error::Error;
use crate::params::Parameters;

/// Asks ANAF for a company's message list and keeps its received invoices.
pub struct MessageFetcher {
    connector: Arc<dyn EdiConnector>,
    params: Parameters,
}

impl MessageFetcher {
    pub fn new(connector: Arc<dyn EdiConnector>, params: Parameters) -> Self {
        Self { connector, params }
    }

    /// Received-invoice messages addressed to the company's tax id within the
    /// lookback window, in the order ANAF lists them.
    ///
    /// Missing configuration, a non-200 status or an undecodable body all
    /// yield an empty list. Connector errors are returned as-is.
    pub async fn fetch_messages(&self, company: &Company) -> Result<Vec<Message>, Error> {
        let Some(config) = company.edi_config.as_ref() else {
            warn!(company = %company.name, "No ANAF configuration for company");
            return Ok(Vec::new());
        };
        if config.token().is_none() {
            warn!(company = %company.name, "No access token for company");
            return Ok(Vec::new());
        }
        let Some(tax_id) = company.tax_id() else {
            warn!(company = %company.name, "No tax id for company");
            return Ok(Vec::new());
        };

        let days = self
            .params
            .get_int(DOWNLOAD_LIMIT_DAYS_KEY, DEFAULT_DOWNLOAD_LIMIT_DAYS)
            .await?;

        let params = [("zile", days.to_string()), ("cif", tax_id.to_string())];
        let response = self
            .connector
            .get(config, LIST_MESSAGES_PATH, &params)
            .await?;

        if !response.is_ok() {
            warn!(
                company = %company.name,
                status = response.status,
                "ANAF message list request failed"
            );
            return Ok(Vec::new());
        }

        let list = match MessageList::from_body(&response.body) {
            Ok(list) => list,
            Err(e) => {
                warn!(company = %company.name, "Could not decode ANAF message list: {e}");
                return Ok(Vec::new());
            }
        };
        if let Some(notice) = list.eroare.as_deref() {
            info!(company = %company.name, "ANAF: {notice}");
        }

        let messages = list.received_invoices_for(tax_id);
        debug!(
            company = %company.name,
            days = days,
            count = messages.len(),
            "Fetched received e-invoice messages"
        );
        Ok(messages)
    }
}
