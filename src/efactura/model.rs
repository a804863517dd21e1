//! e-Factura message list — wire types and decoding.

use serde::{Deserialize, Deserializer};
use tracing::warn;

/// Message type of an invoice received from a supplier.
pub const RECEIVED_INVOICE: &str = "FACTURA PRIMITA";

/// One entry of the `/listaMesajeFactura` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    /// Message id, also the download id of its document package.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Upload request id the message belongs to.
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id_solicitare: Option<String>,
    /// Tax id of the addressed party.
    #[serde(default)]
    pub cif: Option<String>,
    /// Message type, e.g. `FACTURA PRIMITA`.
    #[serde(default)]
    pub tip: Option<String>,
    #[serde(default)]
    pub data_creare: Option<String>,
    #[serde(default)]
    pub detalii: Option<String>,
}

impl Message {
    pub fn is_received_invoice(&self) -> bool {
        self.tip.as_deref() == Some(RECEIVED_INVOICE)
    }

    pub fn is_addressed_to(&self, tax_id: &str) -> bool {
        self.cif.as_deref() == Some(tax_id)
    }
}

/// Decoded `/listaMesajeFactura` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageList {
    /// Raw entries; decoded one by one so a single bad entry is not fatal.
    #[serde(default)]
    mesaje: Option<Vec<serde_json::Value>>,
    /// ANAF's explanation when there is nothing to list.
    #[serde(default)]
    pub eroare: Option<String>,
}

impl MessageList {
    /// Decode a response body. Absent or null `mesaje` yields an empty list.
    pub fn from_body(body: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(body)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Messages in source order; entries that are not valid messages are skipped.
    pub fn messages(&self) -> Vec<Message> {
        self.mesaje
            .iter()
            .flatten()
            .filter_map(|raw| match serde_json::from_value::<Message>(raw.clone()) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("Skipping malformed e-Factura message: {e}");
                    None
                }
            })
            .collect()
    }

    /// Received-invoice messages addressed to exactly `tax_id`, in source order.
    pub fn received_invoices_for(&self, tax_id: &str) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| m.is_addressed_to(tax_id) && m.is_received_invoice())
            .collect()
    }
}

/// Why a response body could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("body is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// ANAF sends ids either as strings or as bare numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn opt_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}
