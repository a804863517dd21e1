//! Inbound invoice records and their downloaded documents.

pub mod model;

pub use model::{DocumentAttachment, InvoiceRecord, InvoiceState, MoveType, NewInvoice};
