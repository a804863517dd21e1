//! Invoice materializer — the scheduled e-Factura download job.
//!
//! For every Romanian company with downloads enabled, fetches the received
//! invoice messages and creates one draft vendor bill per message id that the
//! company does not have yet, then downloads the message's ZIP package onto it.
//! Failures are contained: one company cannot stop the others, one message
//! cannot stop its siblings.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::fetcher::MessageFetcher;
use super::model::Message;
use crate::company::{Company, CompanyScope};
use crate::connector::{DOWNLOAD_PATH, EdiConnector};
use crate::error::{DatabaseError, Error};
use crate::invoices::{DocumentAttachment, InvoiceRecord, NewInvoice};
use crate::params::Parameters;
use crate::store::Database;

pub struct InvoiceMaterializer {
    store: Arc<dyn Database>,
    connector: Arc<dyn EdiConnector>,
    fetcher: MessageFetcher,
}

impl InvoiceMaterializer {
    pub fn new(store: Arc<dyn Database>, connector: Arc<dyn EdiConnector>) -> Self {
        let fetcher = MessageFetcher::new(
            Arc::clone(&connector),
            Parameters::new(Arc::clone(&store)),
        );
        Self {
            store,
            connector,
            fetcher,
        }
    }

    /// Run one sync pass over all eligible companies.
    ///
    /// Returns the invoices created in this pass. Only a failure to list
    /// companies is returned as an error; everything below is logged.
    pub async fn sync_all_companies(&self) -> Result<Vec<InvoiceRecord>, DatabaseError> {
        let companies: Vec<Company> = self
            .store
            .list_companies()
            .await?
            .into_iter()
            .filter(Company::is_download_enabled)
            .collect();

        info!(companies = companies.len(), "Starting e-Factura sync");

        let mut created = Vec::new();
        for company in &companies {
            match self.sync_company(company).await {
                Ok(mut invoices) => created.append(&mut invoices),
                Err(e) => {
                    error!(company = %company.name, "e-Factura sync failed for company: {e}");
                }
            }
        }

        info!(created = created.len(), "e-Factura sync finished");
        Ok(created)
    }

    /// Fetch and materialize the pending messages of a single company.
    pub async fn sync_company(&self, company: &Company) -> Result<Vec<InvoiceRecord>, Error> {
        let scope = company.scope();
        let messages = self.fetcher.fetch_messages(company).await?;

        let mut created = Vec::new();
        for message in &messages {
            match self.materialize(&scope, message).await {
                Ok(Some(invoice)) => created.push(invoice),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        company = %company.name,
                        download_id = %message.id,
                        "Failed to materialize e-Factura message: {e}"
                    );
                }
            }
        }

        if !created.is_empty() {
            info!(company = %company.name, created = created.len(), "Created e-Factura invoices");
        }
        Ok(created)
    }

    /// Create the invoice for `message` unless the company already has one.
    async fn materialize(
        &self,
        scope: &CompanyScope<'_>,
        message: &Message,
    ) -> Result<Option<InvoiceRecord>, DatabaseError> {
        if let Some(existing) = self
            .store
            .find_invoice_by_download_id(scope, &message.id)
            .await?
        {
            debug!(download_id = %message.id, invoice = %existing.id, "Already materialized");
            return Ok(None);
        }

        let new_invoice = NewInvoice::draft_inbound(&message.id, message.id_solicitare.clone());
        let invoice = match self.store.create_invoice(scope, &new_invoice).await {
            Ok(invoice) => invoice,
            // Created concurrently by an overlapping run
            Err(DatabaseError::Constraint(reason)) => {
                debug!(download_id = %message.id, "Skipping: {reason}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.download_package(scope.company(), &invoice).await {
            warn!(
                download_id = %invoice.download_id,
                invoice = %invoice.id,
                "e-Factura package download failed: {e}"
            );
        }
        Ok(Some(invoice))
    }

    /// Download the ZIP package of an invoice's message and attach it.
    ///
    /// Returns `Ok(false)` when ANAF did not hand out the package.
    pub async fn download_package(
        &self,
        company: &Company,
        invoice: &InvoiceRecord,
    ) -> Result<bool, Error> {
        let Some(config) = company.edi_config.as_ref() else {
            warn!(company = %company.name, "No ANAF configuration for company");
            return Ok(false);
        };

        let params = [("id", invoice.download_id.clone())];
        let response = self.connector.get(config, DOWNLOAD_PATH, &params).await?;
        if !response.is_ok() {
            warn!(
                download_id = %invoice.download_id,
                status = response.status,
                "ANAF package download request failed"
            );
            return Ok(false);
        }

        let attachment = DocumentAttachment::efactura_zip(&invoice.download_id, response.body);
        self.store.attach_document(invoice.id, &attachment).await?;
        debug!(download_id = %invoice.download_id, name = %attachment.name, "Package attached");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use secrecy::SecretString;
    use uuid::Uuid;

    use super::*;
    use crate::company::{EdiConfig, NewCompany, NewEdiConfig};
    use crate::connector::{ConnectorResponse, LIST_MESSAGES_PATH};
    use crate::efactura::fetcher::tests::StubConnector;
    use crate::error::ConnectorError;
    use crate::store::LibSqlBackend;

    const SCENARIO: &[u8] = br#"{"mesaje":[{"id":"42","id_solicitare":"99","cif":"RO123","tip":"FACTURA PRIMITA"},{"id":"43","cif":"RO999","tip":"FACTURA PRIMITA"}]}"#;

    async fn test_db() -> Arc<LibSqlBackend> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    async fn add_company(
        db: &LibSqlBackend,
        name: &str,
        country: Option<&str>,
        vat: &str,
        token: Option<&str>,
        download: bool,
    ) -> Company {
        let config = db
            .insert_edi_config(&NewEdiConfig {
                name: name.to_string(),
                access_token: token.map(SecretString::from),
            })
            .await
            .unwrap();
        db.insert_company(&NewCompany {
            country_code: country.map(str::to_string),
            vat_number: Some(vat.to_string()),
            download_einvoices: download,
            edi_config_id: Some(config.id),
            ..NewCompany::new(name)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn creates_one_invoice_per_matching_message() {
        let db = test_db().await;
        let company = add_company(&db, "Alfa", Some("RO"), "RO123", Some("tok"), true).await;
        let stub = Arc::new(
            StubConnector::new()
                .respond(LIST_MESSAGES_PATH, 200, SCENARIO)
                .respond(DOWNLOAD_PATH, 200, b"PK\x03\x04"),
        );
        let materializer = InvoiceMaterializer::new(db.clone(), stub.clone());

        let created = materializer.sync_all_companies().await.unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].download_id, "42");
        assert_eq!(created[0].transaction_id.as_deref(), Some("99"));
        assert_eq!(created[0].company_id, company.id);

        let stored = db.list_invoices(&company.scope()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].download_id, "42");

        let attachments = db.list_attachments(created[0].id).await.unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].data, b"PK\x03\x04".to_vec());

        let calls = stub.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, "/descarcare");
        assert_eq!(calls[1].1, vec![("id".to_string(), "42".to_string())]);
    }

    #[tokio::test]
    async fn rerun_creates_nothing() {
        let db = test_db().await;
        let company = add_company(&db, "Alfa", Some("RO"), "RO123", Some("tok"), true).await;
        let stub = Arc::new(
            StubConnector::new()
                .respond(LIST_MESSAGES_PATH, 200, SCENARIO)
                .respond(DOWNLOAD_PATH, 200, b"zip"),
        );
        let materializer = InvoiceMaterializer::new(db.clone(), stub.clone());

        assert_eq!(materializer.sync_all_companies().await.unwrap().len(), 1);
        assert!(materializer.sync_all_companies().await.unwrap().is_empty());
        assert_eq!(db.list_invoices(&company.scope()).await.unwrap().len(), 1);

        // Second pass lists messages but triggers no further download
        let downloads = stub
            .calls()
            .iter()
            .filter(|(path, _)| path == DOWNLOAD_PATH)
            .count();
        assert_eq!(downloads, 1);
    }

    #[tokio::test]
    async fn only_eligible_companies_are_polled() {
        let db = test_db().await;
        add_company(&db, "Foreign", Some("BG"), "RO123", Some("tok"), true).await;
        add_company(&db, "Disabled", Some("RO"), "RO123", Some("tok"), false).await;
        add_company(&db, "NoCountry", None, "RO123", Some("tok"), true).await;
        db.insert_company(&NewCompany {
            country_code: Some("RO".to_string()),
            vat_number: Some("RO123".to_string()),
            download_einvoices: true,
            ..NewCompany::new("NoConfig")
        })
        .await
        .unwrap();

        let stub = Arc::new(StubConnector::new().respond(LIST_MESSAGES_PATH, 200, SCENARIO));
        let materializer = InvoiceMaterializer::new(db.clone(), stub.clone());

        assert!(materializer.sync_all_companies().await.unwrap().is_empty());
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn company_without_token_is_skipped() {
        let db = test_db().await;
        add_company(&db, "NoToken", Some("RO"), "RO123", None, true).await;
        let stub = Arc::new(StubConnector::new().respond(LIST_MESSAGES_PATH, 200, SCENARIO));
        let materializer = InvoiceMaterializer::new(db.clone(), stub.clone());

        assert!(materializer.sync_all_companies().await.unwrap().is_empty());
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn zero_new_invoices_is_success() {
        let db = test_db().await;
        add_company(&db, "Alfa", Some("RO"), "RO123", Some("tok"), true).await;
        let stub = Arc::new(StubConnector::new().respond(
            LIST_MESSAGES_PATH,
            200,
            br#"{"eroare":"Nu exista mesaje","titlu":"Lista Mesaje"}"#,
        ));
        let materializer = InvoiceMaterializer::new(db.clone(), stub);

        assert!(materializer.sync_all_companies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_download_keeps_invoice() {
        for stub in [
            StubConnector::new()
                .respond(LIST_MESSAGES_PATH, 200, SCENARIO)
                .respond(DOWNLOAD_PATH, 500, b""),
            StubConnector::new()
                .respond(LIST_MESSAGES_PATH, 200, SCENARIO)
                .fail(DOWNLOAD_PATH),
        ] {
            let db = test_db().await;
            let company = add_company(&db, "Alfa", Some("RO"), "RO123", Some("tok"), true).await;
            let materializer = InvoiceMaterializer::new(db.clone(), Arc::new(stub));

            let created = materializer.sync_all_companies().await.unwrap();
            assert_eq!(created.len(), 1);
            assert!(db.list_attachments(created[0].id).await.unwrap().is_empty());
            assert_eq!(db.list_invoices(&company.scope()).await.unwrap().len(), 1);
        }
    }

    /// Connector answering the message list per EDI configuration name;
    /// configurations without an entry fail.
    struct PerConfigConnector {
        lists: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl EdiConnector for PerConfigConnector {
        async fn get(
            &self,
            config: &EdiConfig,
            path: &str,
            _params: &[(&str, String)],
        ) -> Result<ConnectorResponse, ConnectorError> {
            if path == DOWNLOAD_PATH {
                return Ok(ConnectorResponse {
                    status: 200,
                    body: b"zip".to_vec(),
                });
            }
            match self.lists.get(&config.name) {
                Some(body) => Ok(ConnectorResponse {
                    status: 200,
                    body: body.clone(),
                }),
                None => Err(ConnectorError::RequestFailed {
                    path: path.to_string(),
                    reason: "connection reset".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn failing_company_does_not_stop_others() {
        let db = test_db().await;
        add_company(&db, "Broken", Some("RO"), "RO111", Some("tok"), true).await;
        let beta = add_company(&db, "Beta", Some("RO"), "RO222", Some("tok"), true).await;

        let connector = PerConfigConnector {
            lists: HashMap::from([(
                "Beta".to_string(),
                br#"{"mesaje":[{"id":"7","id_solicitare":"70","cif":"RO222","tip":"FACTURA PRIMITA"}]}"#
                    .to_vec(),
            )]),
        };
        let materializer = InvoiceMaterializer::new(db.clone(), Arc::new(connector));

        let created = materializer.sync_all_companies().await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].company_id, beta.id);
        assert_eq!(created[0].download_id, "7");
    }

    #[tokio::test]
    async fn same_message_id_is_materialized_per_company() {
        let db = test_db().await;
        let alfa = add_company(&db, "Alfa", Some("RO"), "RO123", Some("tok"), true).await;
        let beta = add_company(&db, "Beta", Some("RO"), "RO123", Some("tok"), true).await;
        let stub = Arc::new(
            StubConnector::new()
                .respond(LIST_MESSAGES_PATH, 200, SCENARIO)
                .respond(DOWNLOAD_PATH, 200, b"zip"),
        );
        let materializer = InvoiceMaterializer::new(db.clone(), stub);

        let created = materializer.sync_all_companies().await.unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(db.list_invoices(&alfa.scope()).await.unwrap().len(), 1);
        assert_eq!(db.list_invoices(&beta.scope()).await.unwrap().len(), 1);
    }

    /// How the wrapped store answers the existence check.
    enum Lookup {
        /// Never sees anything, as when two runs overlap and both pass the
        /// check before either creates.
        Blind,
        /// Fails for one message id and behaves normally for the rest.
        FailOn(&'static str),
    }

    struct FaultyLookup {
        inner: LibSqlBackend,
        lookup: Lookup,
    }

    impl FaultyLookup {
        async fn new(lookup: Lookup) -> Arc<Self> {
            Arc::new(Self {
                inner: LibSqlBackend::new_memory().await.unwrap(),
                lookup,
            })
        }
    }

    #[async_trait]
    impl Database for FaultyLookup {
        async fn init_schema(&self) -> Result<(), DatabaseError> {
            self.inner.init_schema().await
        }
        async fn get_param(&self, key: &str) -> Result<Option<String>, DatabaseError> {
            self.inner.get_param(key).await
        }
        async fn set_param(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
            self.inner.set_param(key, value).await
        }
        async fn insert_edi_config(
            &self,
            config: &NewEdiConfig,
        ) -> Result<EdiConfig, DatabaseError> {
            self.inner.insert_edi_config(config).await
        }
        async fn insert_company(&self, company: &NewCompany) -> Result<Company, DatabaseError> {
            self.inner.insert_company(company).await
        }
        async fn list_companies(&self) -> Result<Vec<Company>, DatabaseError> {
            self.inner.list_companies().await
        }
        async fn find_invoice_by_download_id(
            &self,
            scope: &CompanyScope<'_>,
            download_id: &str,
        ) -> Result<Option<InvoiceRecord>, DatabaseError> {
            match self.lookup {
                Lookup::Blind => Ok(None),
                Lookup::FailOn(id) if id == download_id => {
                    Err(DatabaseError::Query("database is locked".to_string()))
                }
                Lookup::FailOn(_) => {
                    self.inner
                        .find_invoice_by_download_id(scope, download_id)
                        .await
                }
            }
        }
        async fn create_invoice(
            &self,
            scope: &CompanyScope<'_>,
            invoice: &NewInvoice,
        ) -> Result<InvoiceRecord, DatabaseError> {
            self.inner.create_invoice(scope, invoice).await
        }
        async fn list_invoices(
            &self,
            scope: &CompanyScope<'_>,
        ) -> Result<Vec<InvoiceRecord>, DatabaseError> {
            self.inner.list_invoices(scope).await
        }
        async fn attach_document(
            &self,
            invoice_id: Uuid,
            attachment: &DocumentAttachment,
        ) -> Result<(), DatabaseError> {
            self.inner.attach_document(invoice_id, attachment).await
        }
        async fn list_attachments(
            &self,
            invoice_id: Uuid,
        ) -> Result<Vec<DocumentAttachment>, DatabaseError> {
            self.inner.list_attachments(invoice_id).await
        }
    }

    #[tokio::test]
    async fn unique_index_blocks_duplicate_when_check_races() {
        let store = FaultyLookup::new(Lookup::Blind).await;
        let company =
            add_company(&store.inner, "Alfa", Some("RO"), "RO123", Some("tok"), true).await;
        let stub = Arc::new(
            StubConnector::new()
                .respond(LIST_MESSAGES_PATH, 200, SCENARIO)
                .respond(DOWNLOAD_PATH, 200, b"zip"),
        );
        let materializer = InvoiceMaterializer::new(store.clone(), stub);

        assert_eq!(materializer.sync_all_companies().await.unwrap().len(), 1);
        assert!(materializer.sync_all_companies().await.unwrap().is_empty());
        assert_eq!(store.list_invoices(&company.scope()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_message_does_not_stop_siblings() {
        let store = FaultyLookup::new(Lookup::FailOn("42")).await;
        let company =
            add_company(&store.inner, "Alfa", Some("RO"), "RO123", Some("tok"), true).await;
        let stub = Arc::new(
            StubConnector::new()
                .respond(
                    LIST_MESSAGES_PATH,
                    200,
                    br#"{"mesaje":[{"id":"42","cif":"RO123","tip":"FACTURA PRIMITA"},{"id":"45","id_solicitare":"95","cif":"RO123","tip":"FACTURA PRIMITA"}]}"#,
                )
                .respond(DOWNLOAD_PATH, 200, b"zip"),
        );
        let materializer = InvoiceMaterializer::new(store.clone(), stub.clone());

        let created = materializer.sync_company(&company).await.unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].download_id, "45");
        let stored = store.list_invoices(&company.scope()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].download_id, "45");
        let downloads: Vec<_> = stub
            .calls()
            .into_iter()
            .filter(|(path, _)| path == DOWNLOAD_PATH)
            .collect();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].1, vec![("id".to_string(), "45".to_string())]);
    }
}
