//! HTTP transport for the device API
//!
//! The transport never reports HTTP-level failures as errors. Instead it
//! returns a synthetic `{"success":false,"error":...}` body so that every
//! response flows through the same parsing and validation path.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::config::TimeoutsConfig;
use crate::error::{Result, TRANSPORT_FAILURE_PREFIX};

/// Multipart form field the upload endpoint expects
pub const UPLOAD_FIELD: &str = "syncFile";

/// Transport-agnostic interface for talking to the device API
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET request and return the response body
    async fn get(&self, url: &Url) -> String;

    /// Upload a file as multipart form data and return the response body
    async fn post_file(&self, url: &Url, file_name: &str, bytes: Vec<u8>) -> String;
}

/// Build the synthetic body used when a request fails below the API level
pub fn failure_body(message: impl std::fmt::Display) -> String {
    serde_json::json!({
        "success": false,
        "error": format!("{}: {}", TRANSPORT_FAILURE_PREFIX, message),
    })
    .to_string()
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    upload_timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeouts: &TimeoutsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeouts.request_ms))
            .connect_timeout(Duration::from_millis(timeouts.connect_ms))
            .build()?;

        Ok(Self {
            client,
            upload_timeout: Duration::from_millis(timeouts.upload_ms),
        })
    }

    async fn read_body(response: reqwest::Result<reqwest::Response>) -> String {
        let response = match response.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(e) => {
                warn!("Request failed: {}", e);
                return failure_body(e);
            }
        };

        match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read response body: {}", e);
                failure_body(e)
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> String {
        debug!("GET {}", url);
        Self::read_body(self.client.get(url.clone()).send().await).await
    }

    async fn post_file(&self, url: &Url, file_name: &str, bytes: Vec<u8>) -> String {
        debug!("POST {} ({} bytes as {})", url, bytes.len(), file_name);
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(url.clone())
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await;
        Self::read_body(response).await
    }
}
