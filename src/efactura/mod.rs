//! ANAF e-Factura inbound invoice download.

pub mod fetcher;
pub mod materializer;
pub mod model;
pub mod ticker;

pub use fetcher::MessageFetcher;
pub use materializer::InvoiceMaterializer;
pub use model::{Message, MessageList, RECEIVED_INVOICE};
