//! GCS harvest configuration

use std::path::{Path, PathBuf};

use commonscount_core::{Credential, CredentialRotator};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Query plan artifact, relative to the data directory
pub const PLAN_FILE: &str = "gcs_query_plan.csv";
/// One legal tool path per line, e.g. `licenses/by/4.0/`
pub const TOOL_PATHS_FILE: &str = "legal-tool-paths.txt";
/// YAML list of `{country, cr}`
pub const COUNTRY_COLLECTION_FILE: &str = "gcs_country_collection.yaml";
/// YAML list of `{language, lr}`
pub const LANGUAGE_COLLECTION_FILE: &str = "gcs_language_collection.yaml";

/// Runtime configuration for the GCS source
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    /// Programmable Search Engine id
    pub cx: String,
    /// Developer keys in rotation order
    pub developer_keys: Vec<Credential>,
    /// Plan artifact; defaults to [`PLAN_FILE`] in the data directory
    pub plan_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cx: String::new(),
            developer_keys: Vec::new(),
            plan_file: None,
        }
    }
}

impl Config {
    pub fn credentials(&self) -> CredentialRotator {
        CredentialRotator::new(self.developer_keys.clone())
    }

    /// Default plan artifact location
    pub fn plan_path(data_dir: &Path) -> PathBuf {
        data_dir.join(PLAN_FILE)
    }

    /// Plan artifact this run reads
    pub fn resolve_plan_file(&self, data_dir: &Path) -> PathBuf {
        self.plan_file
            .clone()
            .unwrap_or_else(|| Self::plan_path(data_dir))
    }
}
