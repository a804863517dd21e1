//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::company::{Company, CompanyScope, EdiConfig, NewCompany, NewEdiConfig};
use crate::error::DatabaseError;
use crate::invoices::{DocumentAttachment, InvoiceRecord, NewInvoice};

/// Backend-agnostic database trait covering parameters, companies and invoices.
#[async_trait]
pub trait Database: Send + Sync {
    /// Create tables and apply pending migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Parameters ──────────────────────────────────────────────────

    /// Read a global parameter. `None` if the key was never set.
    async fn get_param(&self, key: &str) -> Result<Option<String>, DatabaseError>;

    /// Set a global parameter, replacing any existing value.
    async fn set_param(&self, key: &str, value: &str) -> Result<(), DatabaseError>;

    // ── Companies ───────────────────────────────────────────────────

    /// Register an ANAF configuration.
    async fn insert_edi_config(&self, config: &NewEdiConfig) -> Result<EdiConfig, DatabaseError>;

    /// Register a company.
    async fn insert_company(&self, company: &NewCompany) -> Result<Company, DatabaseError>;

    /// All companies with their linked ANAF configuration, ordered by id.
    async fn list_companies(&self) -> Result<Vec<Company>, DatabaseError>;

    // ── Invoices ────────────────────────────────────────────────────

    /// Look up the scoped company's invoice for an ANAF message id.
    async fn find_invoice_by_download_id(
        &self,
        scope: &CompanyScope<'_>,
        download_id: &str,
    ) -> Result<Option<InvoiceRecord>, DatabaseError>;

    /// Create an invoice for the scoped company.
    ///
    /// Fails with `DatabaseError::Constraint` if the company already has an
    /// invoice with the same download id.
    async fn create_invoice(
        &self,
        scope: &CompanyScope<'_>,
        invoice: &NewInvoice,
    ) -> Result<InvoiceRecord, DatabaseError>;

    /// List the scoped company's invoices, oldest first.
    async fn list_invoices(
        &self,
        scope: &CompanyScope<'_>,
    ) -> Result<Vec<InvoiceRecord>, DatabaseError>;

    /// Store a document against an invoice.
    async fn attach_document(
        &self,
        invoice_id: Uuid,
        attachment: &DocumentAttachment,
    ) -> Result<(), DatabaseError>;

    /// Documents stored against an invoice.
    async fn list_attachments(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<DocumentAttachment>, DatabaseError>;
}
