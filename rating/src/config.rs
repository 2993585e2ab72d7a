use serde::Deserialize;
use url::Url;

fn default_base_url() -> Url {
    Url::parse("https://rating.chgk.info/").expect("static URL is valid")
}

fn default_user_agent() -> String {
    format!("comrades/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

/// Upstream rating API settings
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL every API path is resolved against
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout, covering connect through body download
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for 429/5xx responses, with exponential backoff
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}
