//! WikiCommons harvest configuration

pub const DEFAULT_API_URL: &str = "https://commons.wikimedia.org/w/api.php";
pub const DEFAULT_ROOT_CATEGORY: &str = "Free_Creative_Commons_licenses";

/// Runtime configuration for the WikiCommons source
#[derive(Debug, Clone)]
pub struct Config {
    /// MediaWiki action API endpoint
    pub api_url: String,
    /// Category the traversal starts from, without `Category:`
    pub root_category: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            root_category: DEFAULT_ROOT_CATEGORY.to_string(),
        }
    }
}
