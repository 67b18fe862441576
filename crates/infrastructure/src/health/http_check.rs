//! Health check over HTTP GET

use application::ApplicationError;
use application::ports::HealthCheckPort;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use super::{HttpCheckSettings, build_client};

/// Passes when the endpoint answers with the expected status
#[derive(Debug, Clone)]
pub struct HttpHealthCheck {
    name: String,
    url: String,
    expected: Option<StatusCode>,
    client: Client,
}

impl HttpHealthCheck {
    pub fn new(settings: &HttpCheckSettings) -> Result<Self, ApplicationError> {
        let expected = settings
            .expected_status
            .map(|code| {
                StatusCode::from_u16(code).map_err(|e| {
                    ApplicationError::Configuration(format!(
                        "health check '{}': invalid status {code}: {e}",
                        settings.name
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            name: settings.name.clone(),
            url: settings.url.clone(),
            expected,
            client: build_client(settings.timeout_secs)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, status: StatusCode) -> bool {
        self.expected.map_or_else(|| status.is_success(), |want| status == want)
    }
}

#[async_trait]
impl HealthCheckPort for HttpHealthCheck {
    #[instrument(skip(self), fields(check = %self.name))]
    async fn check(&self) -> Result<(), ApplicationError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ApplicationError::Backend(format!("health check '{}' unreachable: {e}", self.name)))?;

        let status = response.status();
        if self.accepts(status) {
            debug!(%status, "healthy");
            Ok(())
        } else {
            Err(ApplicationError::Backend(format!(
                "health check '{}' returned {status}",
                self.name
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings(url: String, expected_status: Option<u16>) -> HttpCheckSettings {
        HttpCheckSettings {
            name: "api".into(),
            url,
            expected_status,
            timeout_secs: 2,
        }
    }

    #[tokio::test]
    async fn success_status_is_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let check = HttpHealthCheck::new(&settings(format!("{}/healthz", server.uri()), None)).unwrap();
        check.check().await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let check = HttpHealthCheck::new(&settings(server.uri(), None)).unwrap();
        let err = check.check().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn expected_status_must_match_exactly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let check = HttpHealthCheck::new(&settings(server.uri(), Some(202))).unwrap();
        assert!(check.check().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_backend_error() {
        let check = HttpHealthCheck::new(&settings("http://127.0.0.1:9/health".into(), None)).unwrap();
        assert!(matches!(check.check().await, Err(ApplicationError::Backend(_))));
    }

    #[test]
    fn invalid_expected_status_is_rejected() {
        assert!(HttpHealthCheck::new(&settings("http://localhost".into(), Some(42))).is_err());
    }
}
