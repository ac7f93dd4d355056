use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "pubchem";
const ENV_PREFIX: &str = "PUBCHEM";

/// Runtime settings: defaults, then `pubchem.toml` (optional), then
/// `PUBCHEM_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub chembl_base_url: String,
    /// Maximum in-flight fetches.
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub db_path: PathBuf,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://pubchem.ncbi.nlm.nih.gov".to_string(),
            chembl_base_url: "https://www.ebi.ac.uk".to_string(),
            concurrency: 4,
            timeout_secs: 30,
            db_path: PathBuf::from("data/pubchem.sqlite"),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let mut settings: Settings = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.concurrency = settings.concurrency.max(1);
        Ok(settings)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn defaults_when_nothing_set() {
        let s = Settings::from_builder(Config::builder()).unwrap();
        assert_eq!(s.base_url, "https://pubchem.ncbi.nlm.nih.gov");
        assert_eq!(s.chembl_base_url, "https://www.ebi.ac.uk");
        assert_eq!(s.concurrency, 4);
        assert_eq!(s.db_path, PathBuf::from("data/pubchem.sqlite"));
        assert!(s.user_agent.starts_with("pubchem_scraper/"));
    }

    #[test]
    fn file_overrides_defaults() {
        let builder = Config::builder().add_source(File::from_str(
            "concurrency = 0\ntimeout_secs = 5\ndb_path = \"/tmp/x.sqlite\"",
            FileFormat::Toml,
        ));
        let s = Settings::from_builder(builder).unwrap();
        // zero workers would never make progress
        assert_eq!(s.concurrency, 1);
        assert_eq!(s.timeout_secs, 5);
        assert_eq!(s.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(s.base_url, Settings::default().base_url);
    }
}
