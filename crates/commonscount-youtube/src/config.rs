//! YouTube harvest configuration

use commonscount_core::{Credential, CredentialRotator};

pub const DEFAULT_API_URL: &str = "https://youtube.googleapis.com/youtube/v3/search";
pub const DEFAULT_LICENSE_TYPE: &str = "licenses/by/3.0";

/// Runtime configuration for the YouTube source
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// Label written to the `LICENSE_TYPE` column
    pub license_type: String,
    /// API keys in rotation order
    pub api_keys: Vec<Credential>,
    /// Intervals to record before the source counts as done; all by default
    pub goal: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            license_type: DEFAULT_LICENSE_TYPE.to_string(),
            api_keys: Vec::new(),
            goal: None,
        }
    }
}

impl Config {
    pub fn credentials(&self) -> CredentialRotator {
        CredentialRotator::new(self.api_keys.clone())
    }
}
