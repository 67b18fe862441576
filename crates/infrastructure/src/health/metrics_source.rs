//! Metrics sampled from a JSON HTTP endpoint

use std::collections::BTreeMap;

use application::ApplicationError;
use application::ports::MetricsSourcePort;
use async_trait::async_trait;
use domain::entities::Target;
use reqwest::Client;
use tracing::{debug, instrument};

use super::{MetricsSourceSettings, build_client};

/// Reads a flat JSON object of numbers; non-numeric fields are ignored
#[derive(Debug, Clone)]
pub struct HttpMetricsSource {
    url: String,
    client: Client,
}

impl HttpMetricsSource {
    pub fn new(settings: &MetricsSourceSettings) -> Result<Self, ApplicationError> {
        Ok(Self {
            url: settings.url.clone(),
            client: build_client(settings.timeout_secs)?,
        })
    }

    fn url_for(&self, target: &Target) -> String {
        self.url.replace("{target}", &target.name)
    }
}

#[async_trait]
impl MetricsSourcePort for HttpMetricsSource {
    #[instrument(skip(self, target), fields(target = %target.name))]
    async fn sample(&self, target: &Target) -> Result<BTreeMap<String, f64>, ApplicationError> {
        let response = self
            .client
            .get(self.url_for(target))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ApplicationError::Backend(format!("metrics source: {e}")))?;

        let body: BTreeMap<String, serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ApplicationError::Backend(format!("metrics source returned invalid JSON: {e}")))?;

        let samples: BTreeMap<String, f64> = body
            .into_iter()
            .filter_map(|(name, value)| value.as_f64().map(|v| (name, v)))
            .collect();
        debug!(metrics = samples.len(), "metrics sampled");
        Ok(samples)
    }
}
