//! Client configuration.

use std::path::Path;
use std::time::Duration;

use fedi_sync::AggregateOptions;
use fedi_types::{host_of, ServiceUrls};
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Settings for talking to one protocol endpoint on behalf of one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the protocol endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Public URL of the application itself
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// `User-Agent` header; derived from the application host when empty
    #[serde(default)]
    pub user_agent: String,

    /// Timeout for a single collection page
    #[serde(default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,

    /// Deadline for a whole repository operation
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Hashes per account lookup
    #[serde(default = "default_author_batch_size")]
    pub author_batch_size: usize,

    /// Page size requested when the caller does not set one
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

fn default_api_url() -> String {
    "http://fedbox.git".to_string()
}

fn default_base_url() -> String {
    "http://littr.git".to_string()
}

fn default_page_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_author_batch_size() -> usize {
    fedi_sync::DEFAULT_AUTHOR_BATCH
}

fn default_max_items() -> usize {
    25
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            base_url: default_base_url(),
            user_agent: String::new(),
            page_timeout_ms: default_page_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            author_batch_size: default_author_batch_size(),
            max_items: default_max_items(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(content: &str) -> SdkResult<Self> {
        toml::from_str(content).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Load config from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> SdkResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn urls(&self) -> SdkResult<ServiceUrls> {
        Ok(ServiceUrls::new(&self.api_url, &self.base_url)?)
    }

    /// The configured user agent, or `<application host>-<version>`.
    pub fn user_agent(&self) -> String {
        if !self.user_agent.is_empty() {
            return self.user_agent.clone();
        }
        let host = host_of(&self.base_url).unwrap_or_else(|| "fedi".to_string());
        format!("{host}-{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            page_timeout: self.page_timeout(),
            author_batch_size: self.author_batch_size.max(1),
        }
    }
}
