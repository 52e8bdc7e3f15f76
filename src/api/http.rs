//! `reqwest`-backed transport for the Cloudflare API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, trace};

use super::transport::{ApiRequest, ApiResponse, ApiTransport};
use crate::config::ApiConfig;
use crate::error::{ProvisionerError, Result};

/// HTTP transport carrying the API root and the credential headers.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a client whose every request carries `X-Auth-Email` and `X-Auth-Key`.
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Auth-Email", header_value("auth email", &api.auth_email)?);
        let mut key = header_value("auth key", &api.auth_key)?;
        key.set_sensitive(true);
        headers.insert("X-Auth-Key", key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ProvisionerError::Config(format!("invalid {} header value: {}", name, e)))
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, query = ?request.query, "Sending API request");

        let mut builder = self.client.request(request.method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        trace!(status, body = %text, "Received API response");

        // Keep non-JSON bodies around as plain strings for diagnostics.
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiResponse { status, body })
    }
}
