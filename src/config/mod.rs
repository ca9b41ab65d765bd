use serde::Deserialize;
use std::time::Duration;

use crate::tracker::poller::DEFAULT_POLL_INTERVAL_MS;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of the backend API (e.g., "http://localhost:8034/goinkgrid/api")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL that relative result and image paths are served from
    #[serde(default = "default_asset_base_url")]
    pub asset_base_url: String,

    /// Bearer token issued by the auth service. Optional for anonymous access.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Status polling cadence in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request timeout. Unset means the HTTP client default.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_api_base_url() -> String {
    "http://localhost:8034/goinkgrid/api".to_string()
}

fn default_asset_base_url() -> String {
    "http://localhost:8034".to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            asset_base_url: default_asset_base_url(),
            auth_token: None,
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: None,
        }
    }
}
