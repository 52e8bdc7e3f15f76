//! Transport trait for abstracting the HTTP client away from the reconciliation logic.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ProvisionerError, Result};

/// A single API call, relative to the configured API root.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API root, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = Some(body);
        request
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// The status and decoded JSON body of an API call.
///
/// Non-success statuses are returned as values; callers decide whether a
/// failed status aborts their operation.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail with [`ProvisionerError::Status`] unless the status is 2xx.
    pub fn require_success(self, context: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ProvisionerError::Status {
                status: self.status,
                context: context.to_string(),
            })
        }
    }

    /// Decode the `result` member of the response envelope.
    pub fn result<T: DeserializeOwned>(&self, context: &str) -> Result<T> {
        let result = self
            .body
            .get("result")
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                ProvisionerError::UnexpectedResponse(format!("{}: missing `result`", context))
            })?;

        serde_json::from_value(result.clone()).map_err(|e| {
            ProvisionerError::UnexpectedResponse(format!("{}: malformed `result`: {}", context, e))
        })
    }
}

/// Trait for issuing API calls.
///
/// Implemented by the `reqwest`-backed [`HttpTransport`](super::HttpTransport)
/// and by the recording transport used in tests.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Send a request and return its status and body.
    ///
    /// Only connection-level failures are errors here.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}
