//! Request issuer for executing guardrail calls

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use guardload_core::{CoreError, CoreResult, TargetConfig};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::TargetEndpointConfig;

/// Why a single request counted as an error.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("guardrail returned HTTP {0}")]
    Status(u16),
}

impl From<reqwest::Error> for IssueError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Sends one request built from a target template.
///
/// Implementations classify network failures, timeouts and non-2xx statuses
/// as errors and never retry.
#[async_trait]
pub trait RequestIssuer: Send + Sync {
    /// Issue one request. `Ok` carries the body of a 2xx response.
    async fn issue(&self, target: &TargetConfig) -> Result<Bytes, IssueError>;
}

/// Issuer posting JSON to the configured guardrail rule-run URL.
pub struct HttpRequestIssuer {
    client: reqwest::Client,
    url: String,
}

impl HttpRequestIssuer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoreError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &TargetEndpointConfig) -> CoreResult<Self> {
        Self::new(config.url.clone(), config.request_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RequestIssuer for HttpRequestIssuer {
    async fn issue(&self, target: &TargetConfig) -> Result<Bytes, IssueError> {
        let payload = target.build_payload(rand::random());

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        // Drain the body either way so the connection goes back to the pool
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(IssueError::Status(status.as_u16()));
        }

        Ok(body)
    }
}

/// Outcome of a single connectivity check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DryRunResult {
    pub success: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Issue exactly one request and report it; failures are values, not errors.
pub async fn probe(issuer: &dyn RequestIssuer, target: &TargetConfig) -> DryRunResult {
    let start = Instant::now();
    let result = issuer.issue(target).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let parsed = result.map_err(|e| e.to_string()).and_then(|body| {
        serde_json::from_slice::<serde_json::Value>(&body)
            .map_err(|e| format!("invalid JSON response: {}", e))
    });

    match parsed {
        Ok(data) => DryRunResult {
            success: true,
            latency_ms,
            data: Some(data),
            error: None,
        },
        Err(error) => DryRunResult {
            success: false,
            latency_ms,
            data: None,
            error: Some(error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedIssuer(Result<&'static str, u16>);

    #[async_trait]
    impl RequestIssuer for FixedIssuer {
        async fn issue(&self, _target: &TargetConfig) -> Result<Bytes, IssueError> {
            match self.0 {
                Ok(body) => Ok(Bytes::from_static(body.as_bytes())),
                Err(code) => Err(IssueError::Status(code)),
            }
        }
    }

    #[tokio::test]
    async fn test_probe_success_parses_body() {
        let issuer = FixedIssuer(Ok(r#"{"final_decision":{"score":0}}"#));
        let result = probe(&issuer, &TargetConfig::new("app", "p")).await;

        assert!(result.success);
        assert_eq!(result.data.unwrap()["final_decision"]["score"], 0);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_probe_status_error() {
        let issuer = FixedIssuer(Err(503));
        let result = probe(&issuer, &TargetConfig::new("app", "p")).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("guardrail returned HTTP 503"));
        assert!(result.data.is_none());
    }

    #[tokio::test]
    async fn test_probe_invalid_json() {
        let issuer = FixedIssuer(Ok("<html>"));
        let result = probe(&issuer, &TargetConfig::new("app", "p")).await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("invalid JSON response"));
    }

    #[test]
    fn test_dry_run_result_omits_empty_fields() {
        let result = DryRunResult {
            success: false,
            latency_ms: 12,
            data: None,
            error: Some("boom".to_string()),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["error"], "boom");
    }
}
