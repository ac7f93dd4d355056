use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RecordKind {
    Compound,
    Substance,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Compound => "compound",
            RecordKind::Substance => "substance",
        }
    }
}

/// Anything that can hand over a raw document for an identifier.
pub trait DocumentSource: Send + Sync + 'static {
    fn fetch(&self, id: u64) -> impl Future<Output = Result<Value, FetchError>> + Send;

    /// Whether fetched documents carry PUG View `Reference` blocks to drop.
    fn strips_references(&self) -> bool {
        true
    }
}

/// PUG View client for one record kind.
pub struct PubChemClient {
    http: reqwest::Client,
    base_url: String,
    kind: RecordKind,
}

impl PubChemClient {
    pub fn new(settings: &Settings, kind: RecordKind) -> Result<Self> {
        Ok(Self {
            http: http_client(settings)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            kind,
        })
    }

    pub fn url(&self, id: u64) -> String {
        document_url(&self.base_url, self.kind, id)
    }
}

impl DocumentSource for PubChemClient {
    async fn fetch(&self, id: u64) -> Result<Value, FetchError> {
        get_json(&self.http, &self.url(id)).await
    }
}

/// ChEMBL molecule documents (`CHEMBL<id>`) from the EBI search proxy,
/// returned untouched.
pub struct ChemblClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChemblClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            http: http_client(settings)?,
            base_url: settings.chembl_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, id: u64) -> String {
        format!(
            "{}/chembl/interface_api/es_proxy/es_data/get_es_document/chembl_molecule/CHEMBL{}?source={}",
            self.base_url, id, CHEMBL_SOURCE_FIELDS
        )
    }
}

impl DocumentSource for ChemblClient {
    async fn fetch(&self, id: u64) -> Result<Value, FetchError> {
        get_json(&self.http, &self.url(id)).await
    }

    fn strips_references(&self) -> bool {
        false
    }
}

// image file + structures, comma url-encoded
const CHEMBL_SOURCE_FIELDS: &str = "_metadata.compound_generated.image_file%2Cmolecule_structures";

fn http_client(settings: &Settings) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .user_agent(settings.user_agent.clone())
        .build()?)
}

async fn get_json(http: &reqwest::Client, url: &str) -> Result<Value, FetchError> {
    debug!("GET {}", url);

    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
        });
    }
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn document_url(base_url: &str, kind: RecordKind, id: u64) -> String {
    match kind {
        RecordKind::Compound => format!("{}/rest/pug_view/data/compound/{}/JSON/", base_url, id),
        RecordKind::Substance => {
            format!("{}/rest/pug_view/data/substance/{}/JSON/?version=1", base_url, id)
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_per_kind() {
        let base = "https://pubchem.ncbi.nlm.nih.gov";
        assert_eq!(
            document_url(base, RecordKind::Compound, 702),
            "https://pubchem.ncbi.nlm.nih.gov/rest/pug_view/data/compound/702/JSON/"
        );
        assert_eq!(
            document_url(base, RecordKind::Substance, 1),
            "https://pubchem.ncbi.nlm.nih.gov/rest/pug_view/data/substance/1/JSON/?version=1"
        );
    }

    #[test]
    fn client_trims_trailing_slash() {
        let settings = Settings {
            base_url: "http://localhost:8080/".into(),
            ..Settings::default()
        };
        let client = PubChemClient::new(&settings, RecordKind::Compound).unwrap();
        assert_eq!(client.url(5), "http://localhost:8080/rest/pug_view/data/compound/5/JSON/");
    }

    #[test]
    fn chembl_molecule_url() {
        let client = ChemblClient::new(&Settings::default()).unwrap();
        assert_eq!(
            client.url(4443036),
            "https://www.ebi.ac.uk/chembl/interface_api/es_proxy/es_data/get_es_document/chembl_molecule/CHEMBL4443036?source=_metadata.compound_generated.image_file%2Cmolecule_structures"
        );
        assert!(!client.strips_references());
    }
}
