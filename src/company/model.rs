//! Company data model — e-Factura settings and the linked ANAF configuration.

use secrecy::{ExposeSecret, SecretString};

/// ISO country code of companies that can receive e-Factura invoices.
pub const ROMANIA_COUNTRY_CODE: &str = "RO";

/// Default residence period, in days.
pub const DEFAULT_EDI_RESIDENCE: i64 = 5;

/// ANAF connector configuration linked to a company.
#[derive(Debug, Clone)]
pub struct EdiConfig {
    pub id: i64,
    pub name: String,
    /// OAuth bearer token issued by ANAF. Obtaining it is handled elsewhere.
    pub access_token: Option<SecretString>,
}

impl EdiConfig {
    /// Token to authenticate with, if one is set and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.access_token
            .as_ref()
            .map(|t| t.expose_secret())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Fields for registering a new ANAF configuration.
#[derive(Debug, Clone)]
pub struct NewEdiConfig {
    pub name: String,
    pub access_token: Option<SecretString>,
}

/// A company with its e-Factura settings.
#[derive(Debug, Clone)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub country_code: Option<String>,
    /// Romanian tax identification number (CIF) of the company's partner.
    pub vat_number: Option<String>,
    /// Period of residence.
    pub edi_residence: i64,
    /// Embed the PDF rendering in outgoing CIUS documents.
    pub cius_embed_pdf: bool,
    /// Download inbound e-invoices from ANAF on schedule.
    pub download_einvoices: bool,
    pub edi_config: Option<EdiConfig>,
}

impl Company {
    /// Tax id used both as a request parameter and as the message filter.
    pub fn tax_id(&self) -> Option<&str> {
        self.vat_number
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Whether the scheduled sync should process this company.
    pub fn is_download_enabled(&self) -> bool {
        self.country_code.as_deref() == Some(ROMANIA_COUNTRY_CODE)
            && self.edi_config.is_some()
            && self.download_einvoices
    }

    /// Scope under which records are looked up and created for this company.
    pub fn scope(&self) -> CompanyScope<'_> {
        CompanyScope { company: self }
    }
}

/// Fields for registering a new company.
#[derive(Debug, Clone)]
pub struct NewCompany {
    pub name: String,
    pub country_code: Option<String>,
    pub vat_number: Option<String>,
    pub edi_residence: i64,
    pub cius_embed_pdf: bool,
    pub download_einvoices: bool,
    pub edi_config_id: Option<i64>,
}

impl NewCompany {
    /// A company with the default e-Factura settings (download disabled).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            country_code: None,
            vat_number: None,
            edi_residence: DEFAULT_EDI_RESIDENCE,
            cius_embed_pdf: false,
            download_einvoices: false,
            edi_config_id: None,
        }
    }
}

/// "Acting as company C": every invoice lookup and creation made under a
/// scope is attributed to, and filtered by, that company.
#[derive(Debug, Clone, Copy)]
pub struct CompanyScope<'a> {
    company: &'a Company,
}

impl<'a> CompanyScope<'a> {
    pub fn company(&self) -> &'a Company {
        self.company
    }

    pub fn company_id(&self) -> i64 {
        self.company.id
    }
}
