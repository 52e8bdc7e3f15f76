//! Recording transport for tests.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Mutex;

use super::transport::{ApiRequest, ApiResponse, ApiTransport};
use crate::error::{ProvisionerError, Result};

#[derive(Debug, Clone)]
enum Scripted {
    Respond(u16, Value),
    ConnectionFailure,
}

type RouteKey = (Method, String, Vec<(String, String)>);

/// Transport that answers from scripted responses and records every request.
///
/// Responses are matched on method, path and query. Each route replays its
/// queue in order and keeps repeating the last entry once the queue is down
/// to one. Unscripted routes answer `404`.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<RouteKey, VecDeque<Scripted>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for a request without query parameters.
    pub fn on(self, method: Method, path: &str, status: u16, body: Value) -> Self {
        self.on_query(method, path, &[], status, body)
    }

    /// Script a response for a request with exactly these query parameters.
    pub fn on_query(
        self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        status: u16,
        body: Value,
    ) -> Self {
        self.push(method, path, query, Scripted::Respond(status, body));
        self
    }

    /// Script a connection-level failure.
    pub fn fail(self, method: Method, path: &str) -> Self {
        self.push(method, path, &[], Scripted::ConnectionFailure);
        self
    }

    fn push(&self, method: Method, path: &str, query: &[(&str, &str)], scripted: Scripted) {
        let key = (method, path.to_string(), owned_query(query));
        self.routes
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(scripted);
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests with this method and path, any query.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Number of requests with this method whose path ends with `suffix`.
    pub fn count_suffix(&self, method: Method, suffix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path.ends_with(suffix))
            .count()
    }
}

fn owned_query(query: &[(&str, &str)]) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl ApiTransport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let key = (request.method, request.path, request.query);
        let scripted = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match scripted {
            Some(Scripted::Respond(status, body)) => Ok(ApiResponse { status, body }),
            Some(Scripted::ConnectionFailure) => Err(ProvisionerError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
            None => Ok(ApiResponse {
                status: 404,
                body: json!({"success": false, "errors": [{"code": 7003, "message": "not found"}]}),
            }),
        }
    }
}
