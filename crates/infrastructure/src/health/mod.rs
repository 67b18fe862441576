//! HTTP health checks and metrics sources

mod http_check;
mod metrics_source;

use std::time::Duration;

use application::ApplicationError;
use serde::{Deserialize, Serialize};

pub use http_check::HttpHealthCheck;
pub use metrics_source::HttpMetricsSource;

/// One HTTP health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCheckSettings {
    /// Name experiments refer to in `health_checks`
    pub name: String,
    pub url: String,
    /// Exact status to expect; any 2xx passes when unset
    #[serde(default)]
    pub expected_status: Option<u16>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// HTTP metrics endpoint; `{target}` in the URL is replaced by the target name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSourceSettings {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    5
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, ApplicationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(concat!("chaos-engine/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ApplicationError::Configuration(format!("failed to build HTTP client: {e}")))
}
