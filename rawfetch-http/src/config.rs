//! HTTP transport configuration

use serde::{Deserialize, Serialize};

/// Transport-level settings. Timeouts are not here: they belong to the
/// retry strategy and are passed with every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Maximum number of redirects to follow
    pub max_redirects: u32,

    /// User agent string
    pub user_agent: String,

    /// Whether to verify SSL certificates
    pub verify_ssl: bool,

    /// Forward proxy for all requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_redirects: 30,
            user_agent: concat!("rawfetch/", env!("CARGO_PKG_VERSION")).to_string(),
            verify_ssl: true,
            proxy: None,
        }
    }
}
