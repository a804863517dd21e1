//! Companies and their ANAF e-Factura settings.

pub mod model;

pub use model::{Company, CompanyScope, EdiConfig, NewCompany, NewEdiConfig};
