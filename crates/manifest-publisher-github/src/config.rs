//! Connection settings for the GitHub API and the artifact registry.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API base URL (GitHub Enterprise uses `https://host/api/v3`)
    pub api_url: String,
    /// Token sent as `Authorization: token …`
    #[serde(skip_serializing)]
    pub token: String,
    pub user_agent: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl GitHubConfig {
    pub fn new(token: &str) -> Self {
        GitHubConfig {
            api_url: DEFAULT_API_URL.to_string(),
            token: token.to_string(),
            user_agent: format!("manifest-publisher/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Artifact registry configuration: the registry base URL plus the
/// password-grant credentials exchanged for a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub base_url: String,
    pub login_url: String,
    pub client_id: String,
    pub grant_type: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub scope: String,
    pub timeout_secs: u64,
}

impl RegistryConfig {
    pub fn artifacts_url(&self) -> String {
        format!("{}/api/products/artifacts", self.base_url.trim_end_matches('/'))
    }

    /// Form fields of the token request.
    pub fn token_form(&self) -> [(&'static str, &str); 5] {
        [
            ("client_id", self.client_id.as_str()),
            ("grant_type", self.grant_type.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("scope", self.scope.as_str()),
        ]
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
