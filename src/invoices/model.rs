//! Invoice records materialized from e-Factura messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Accounting move type. Downloaded e-Factura messages only ever become
/// vendor bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    /// Vendor bill.
    InInvoice,
}

impl MoveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveType::InInvoice => "in_invoice",
        }
    }
}

/// Posting state of an invoice record. Posting happens outside this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceState {
    Draft,
}

impl InvoiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceState::Draft => "draft",
        }
    }
}

/// A persisted invoice record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: Uuid,
    pub company_id: i64,
    pub move_type: MoveType,
    pub state: InvoiceState,
    /// ANAF message id the document package is downloaded from.
    pub download_id: String,
    /// ANAF upload request id (`id_solicitare`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating an invoice record.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub move_type: MoveType,
    pub state: InvoiceState,
    pub download_id: String,
    pub transaction_id: Option<String>,
}

impl NewInvoice {
    /// Draft vendor bill referencing an ANAF message.
    pub fn draft_inbound(download_id: impl Into<String>, transaction_id: Option<String>) -> Self {
        Self {
            move_type: MoveType::InInvoice,
            state: InvoiceState::Draft,
            download_id: download_id.into(),
            transaction_id,
        }
    }
}

/// A file stored against an invoice record.
#[derive(Debug, Clone)]
pub struct DocumentAttachment {
    pub name: String,
    pub mimetype: String,
    pub data: Vec<u8>,
}

impl DocumentAttachment {
    /// ZIP package downloaded for an ANAF message.
    pub fn efactura_zip(download_id: &str, data: Vec<u8>) -> Self {
        Self {
            name: format!("efactura_{download_id}.zip"),
            mimetype: "application/zip".to_string(),
            data,
        }
    }
}
