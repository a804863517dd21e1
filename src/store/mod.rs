//! Persistence layer — libSQL-backed storage for parameters, companies and invoices.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
