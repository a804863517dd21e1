//! e-Factura sync — downloads inbound ANAF e-invoices as draft vendor bills.

pub mod company;
pub mod config;
pub mod connector;
pub mod efactura;
pub mod error;
pub mod invoices;
pub mod params;
pub mod store;
