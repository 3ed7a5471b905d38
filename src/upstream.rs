//! Nextcloud upstream client
//!
//! Performs the single outbound call this service makes: a GET against the
//! platform's `status.php`.

use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::config::NextcloudConfig;
use crate::error::UpstreamError;

#[derive(Debug, Clone)]
pub struct NextcloudClient {
    http: reqwest::Client,
    status_url: String,
    timeout_ms: u64,
}

impl NextcloudClient {
    pub fn new(config: &NextcloudConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.status_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            status_url: format!("{}/status.php", config.base_url.trim_end_matches('/')),
            timeout_ms: config.status_timeout_ms,
        })
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    /// Fetch the upstream status document as opaque JSON.
    ///
    /// A body that is not JSON is passed through as a string.
    pub async fn status(&self) -> Result<serde_json::Value, UpstreamError> {
        debug!("Checking Nextcloud status at {}", self.status_url);

        let response = self
            .http
            .get(&self.status_url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(decode_status_body(&body))
    }

    fn classify(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout_ms)
        } else {
            UpstreamError::Request(err)
        }
    }
}

fn decode_status_body(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(body).into_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_json_body_is_kept_as_text() {
        assert_eq!(
            decode_status_body(b"installed"),
            serde_json::Value::String("installed".to_string())
        );
        assert_eq!(
            decode_status_body(br#"{"installed":true}"#),
            serde_json::json!({"installed": true})
        );
    }

    #[test]
    fn status_url_strips_trailing_slash() {
        let client = NextcloudClient::new(&NextcloudConfig {
            base_url: "http://cloud.local/".to_string(),
            status_timeout_ms: 100,
        })
        .unwrap();
        assert_eq!(client.status_url(), "http://cloud.local/status.php");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_request_error() {
        // Port 9 (discard) is almost never listening locally.
        let client = NextcloudClient::new(&NextcloudConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            status_timeout_ms: 500,
        })
        .unwrap();

        let err = client.status().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Request(_) | UpstreamError::Timeout(_)));
        assert!(!err.to_string().is_empty());
    }
}
