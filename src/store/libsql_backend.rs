//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use uuid::Uuid;

use crate::company::{Company, CompanyScope, EdiConfig, NewCompany, NewEdiConfig};
use crate::error::DatabaseError;
use crate::invoices::{DocumentAttachment, InvoiceRecord, InvoiceState, MoveType, NewInvoice};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn get_company(&self, id: i64) -> Result<Company, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {COMPANY_COLUMNS} FROM {COMPANY_FROM} WHERE c.id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_company: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                row_to_company(&row).map_err(|e| DatabaseError::Query(format!("row parse: {e}")))
            }
            Ok(None) => Err(DatabaseError::NotFound {
                entity: "company".to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(DatabaseError::Query(format!("get_company: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_integer(i: Option<i64>) -> libsql::Value {
    match i {
        Some(i) => libsql::Value::Integer(i),
        None => libsql::Value::Null,
    }
}

fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

const COMPANY_COLUMNS: &str = "c.id, c.name, c.country_code, c.vat_number, c.edi_residence, c.cius_embed_pdf, c.download_einvoices, e.id, e.name, e.access_token";

const COMPANY_FROM: &str = "companies c LEFT JOIN edi_configs e ON e.id = c.edi_config_id";

const INVOICE_COLUMNS: &str = "id, company_id, download_id, transaction_id, created_at";

/// Map a libsql Row to a Company.
///
/// Column order matches COMPANY_COLUMNS; the EDI columns are NULL when no
/// configuration is linked.
fn row_to_company(row: &libsql::Row) -> Result<Company, libsql::Error> {
    let edi_config = match row.get::<i64>(7).ok() {
        Some(config_id) => Some(EdiConfig {
            id: config_id,
            name: row.get(8)?,
            access_token: row.get::<String>(9).ok().map(SecretString::from),
        }),
        None => None,
    };

    Ok(Company {
        id: row.get(0)?,
        name: row.get(1)?,
        country_code: row.get(2).ok(),
        vat_number: row.get(3).ok(),
        edi_residence: row.get(4)?,
        cius_embed_pdf: row.get::<i64>(5)? != 0,
        download_einvoices: row.get::<i64>(6)? != 0,
        edi_config,
    })
}

/// Map a libsql Row to an InvoiceRecord. Column order matches INVOICE_COLUMNS.
///
/// Only draft vendor bills are ever written, so type and state are not read back.
fn row_to_invoice(row: &libsql::Row) -> Result<InvoiceRecord, libsql::Error> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(4)?;

    Ok(InvoiceRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        company_id: row.get(1)?,
        move_type: MoveType::InInvoice,
        state: InvoiceState::Draft,
        download_id: row.get(2)?,
        transaction_id: row.get(3).ok(),
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Parameters ──────────────────────────────────────────────────

    async fn get_param(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM parameters WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_param: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_param: {e}"))),
        }
    }

    async fn set_param(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO parameters (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_param: {e}")))?;

        debug!(key = key, "Parameter set");
        Ok(())
    }

    // ── Companies ───────────────────────────────────────────────────

    async fn insert_edi_config(&self, config: &NewEdiConfig) -> Result<EdiConfig, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO edi_configs (name, access_token, created_at) VALUES (?1, ?2, ?3)",
            params![
                config.name.as_str(),
                opt_text(config.access_token.as_ref().map(|t| t.expose_secret())),
                now,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_edi_config: {e}")))?;

        Ok(EdiConfig {
            id: conn.last_insert_rowid(),
            name: config.name.clone(),
            access_token: config.access_token.clone(),
        })
    }

    async fn insert_company(&self, company: &NewCompany) -> Result<Company, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO companies (name, country_code, vat_number, edi_residence,
                cius_embed_pdf, download_einvoices, edi_config_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                company.name.as_str(),
                opt_text(company.country_code.as_deref()),
                opt_text(company.vat_number.as_deref()),
                company.edi_residence,
                company.cius_embed_pdf as i64,
                company.download_einvoices as i64,
                opt_integer(company.edi_config_id),
                now,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_company: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(id = id, name = %company.name, "Company inserted into DB");
        self.get_company(id).await
    }

    async fn list_companies(&self) -> Result<Vec<Company>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {COMPANY_COLUMNS} FROM {COMPANY_FROM} ORDER BY c.id ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_companies: {e}")))?;

        let mut companies = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_companies: {e}")))?
        {
            match row_to_company(&row) {
                Ok(company) => companies.push(company),
                Err(e) => {
                    tracing::warn!("Skipping company row: {e}");
                }
            }
        }
        Ok(companies)
    }

    // ── Invoices ────────────────────────────────────────────────────

    async fn find_invoice_by_download_id(
        &self,
        scope: &CompanyScope<'_>,
        download_id: &str,
    ) -> Result<Option<InvoiceRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INVOICE_COLUMNS} FROM invoices WHERE company_id = ?1 AND download_id = ?2"
                ),
                params![scope.company_id(), download_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_invoice_by_download_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let invoice = row_to_invoice(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(invoice))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "find_invoice_by_download_id: {e}"
            ))),
        }
    }

    async fn create_invoice(
        &self,
        scope: &CompanyScope<'_>,
        invoice: &NewInvoice,
    ) -> Result<InvoiceRecord, DatabaseError> {
        let record = InvoiceRecord {
            id: Uuid::new_v4(),
            company_id: scope.company_id(),
            move_type: invoice.move_type,
            state: invoice.state,
            download_id: invoice.download_id.clone(),
            transaction_id: invoice.transaction_id.clone(),
            created_at: Utc::now(),
        };

        self.conn()
            .execute(
                "INSERT INTO invoices (id, company_id, move_type, state, download_id,
                    transaction_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.to_string(),
                    record.company_id,
                    record.move_type.as_str(),
                    record.state.as_str(),
                    record.download_id.as_str(),
                    opt_text(record.transaction_id.as_deref()),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DatabaseError::Constraint(format!(
                        "invoice with download id {} already exists for company {}",
                        record.download_id, record.company_id
                    ))
                } else {
                    DatabaseError::Query(format!("create_invoice: {e}"))
                }
            })?;

        debug!(id = %record.id, download_id = %record.download_id, "Invoice inserted into DB");
        Ok(record)
    }

    async fn list_invoices(
        &self,
        scope: &CompanyScope<'_>,
    ) -> Result<Vec<InvoiceRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INVOICE_COLUMNS} FROM invoices WHERE company_id = ?1 ORDER BY created_at ASC"
                ),
                params![scope.company_id()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_invoices: {e}")))?;

        let mut invoices = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_invoices: {e}")))?
        {
            match row_to_invoice(&row) {
                Ok(invoice) => invoices.push(invoice),
                Err(e) => {
                    tracing::warn!("Skipping invoice row: {e}");
                }
            }
        }
        Ok(invoices)
    }

    async fn attach_document(
        &self,
        invoice_id: Uuid,
        attachment: &DocumentAttachment,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO invoice_attachments (id, invoice_id, name, mimetype, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    invoice_id.to_string(),
                    attachment.name.as_str(),
                    attachment.mimetype.as_str(),
                    libsql::Value::Blob(attachment.data.clone()),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("attach_document: {e}")))?;

        debug!(invoice_id = %invoice_id, name = %attachment.name, "Attachment stored");
        Ok(())
    }

    async fn list_attachments(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<DocumentAttachment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT name, mimetype, data FROM invoice_attachments
                 WHERE invoice_id = ?1 ORDER BY created_at ASC",
                params![invoice_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_attachments: {e}")))?;

        let mut attachments = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_attachments: {e}")))?
        {
            let parsed = (|| -> Result<DocumentAttachment, libsql::Error> {
                Ok(DocumentAttachment {
                    name: row.get(0)?,
                    mimetype: row.get(1)?,
                    data: row.get(2)?,
                })
            })();
            match parsed {
                Ok(attachment) => attachments.push(attachment),
                Err(e) => {
                    tracing::warn!("Skipping attachment row: {e}");
                }
            }
        }
        Ok(attachments)
    }
}
