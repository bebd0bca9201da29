//! HTTP client for the Datadog v1 monitor API.

use std::time::Duration;

use kubemon_rules::Monitor;
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use crate::api::MonitorApi;
use crate::error::{Result, SyncError};

/// Default API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.datadoghq.com";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`DatadogClient`].
#[derive(Debug, Clone)]
pub struct DatadogConfig {
    /// Base URL, without a trailing `/api`.
    pub api_url: String,
    /// `DD-API-KEY` header value.
    pub api_key: String,
    /// `DD-APPLICATION-KEY` header value.
    pub app_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for DatadogConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            app_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl DatadogConfig {
    /// Returns true if both credentials are set.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.app_key.is_empty()
    }
}

/// Monitor store backed by the Datadog HTTP API.
#[derive(Debug, Clone)]
pub struct DatadogClient {
    http: Client,
    config: DatadogConfig,
}

impl DatadogClient {
    /// Builds a client for the given settings.
    pub fn new(config: DatadogConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Transport {
                operation: "connect",
                reason: e.to_string(),
            })?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/monitor{path}", self.config.api_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("DD-API-KEY", &self.config.api_key)
            .header("DD-APPLICATION-KEY", &self.config.app_key)
    }

    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| SyncError::Transport {
                operation,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Api {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T> {
        let body = response.text().await.map_err(|e| SyncError::Decode {
            operation,
            reason: e.to_string(),
        })?;
        parse_body(operation, &body)
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(operation: &'static str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| SyncError::Decode {
        operation,
        reason: e.to_string(),
    })
}

impl MonitorApi for DatadogClient {
    async fn list_by_tags(&self, tags: &[String]) -> Result<Vec<Monitor>> {
        let request = self
            .http
            .get(self.url(""))
            .query(&[("monitor_tags", tags.join(","))]);
        let response = self.send("list", request).await?;
        let monitors: Vec<Monitor> = Self::decode("list", response).await?;
        debug!(tags = ?tags, count = monitors.len(), "listed monitors");
        Ok(monitors)
    }

    async fn create(&self, monitor: &Monitor) -> Result<Monitor> {
        let request = self.http.post(self.url("")).json(monitor);
        let response = self.send("create", request).await?;
        Self::decode("create", response).await
    }

    async fn update(&self, id: i64, monitor: &Monitor) -> Result<()> {
        let request = self.http.put(self.url(&format!("/{id}"))).json(monitor);
        match self.send("update", request).await {
            Err(SyncError::Api { status: 404, .. }) => Err(SyncError::NotFound { id }),
            other => other.map(|_| ()),
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let request = self.http.delete(self.url(&format!("/{id}")));
        match self.send("delete", request).await {
            Err(SyncError::Api { status: 404, .. }) => Err(SyncError::NotFound { id }),
            other => other.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn default_config_targets_public_api() {
        let config = DatadogConfig::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(!config.has_credentials());
    }

    #[test]
    fn credentials_require_both_keys() {
        let config = DatadogConfig {
            api_key: "a".to_string(),
            ..DatadogConfig::default()
        };
        assert!(!config.has_credentials());
        let config = DatadogConfig {
            app_key: "b".to_string(),
            ..config
        };
        assert!(config.has_credentials());
    }

    #[test]
    fn urls_join_cleanly() {
        let client = DatadogClient::new(DatadogConfig {
            api_url: "https://api.datadoghq.eu/".to_string(),
            ..DatadogConfig::default()
        })
        .unwrap();
        assert_eq!(client.url(""), "https://api.datadoghq.eu/api/v1/monitor");
        assert_eq!(client.url("/12"), "https://api.datadoghq.eu/api/v1/monitor/12");
    }

    #[test]
    fn parses_store_monitor_payload() {
        let body = r#"[{
            "id": 41,
            "name": "Alert checkout",
            "type": "metric alert",
            "query": "avg(last_5m):avg:cpu{*} > 90",
            "tags": ["kubemon"],
            "overall_state": "OK",
            "options": {"thresholds": {"critical": 90.0}, "notify_no_data": false},
            "created": "2024-01-01T00:00:00Z"
        }]"#;
        let monitors: Vec<Monitor> = parse_body("list", body).unwrap();
        assert_eq!(monitors.len(), 1);
        assert_eq!(monitors[0].id, Some(41));
        assert_eq!(monitors[0].overall_state.as_deref(), Some("OK"));
    }

    #[test_case("" ; "empty body")]
    #[test_case("{\"errors\": [\"forbidden\"]}" ; "error object")]
    #[test_case("[{\"id\": \"not a number\"}]" ; "wrong field type")]
    fn rejects_malformed_list_payloads(body: &str) {
        let err = parse_body::<Vec<Monitor>>("list", body).unwrap_err();
        assert!(matches!(err, SyncError::Decode { operation: "list", .. }));
    }
}
