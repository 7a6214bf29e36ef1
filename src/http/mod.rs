//! HTTP client abstraction for the ecoMatch API
//!
//! This module provides a clean interface for making HTTP requests,
//! which can be easily mocked for testing.

use async_trait::async_trait;
use reqwest::{
    Method, StatusCode,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ClientResult, api_request_failed, api_response_invalid};

/// Simple HTTP response structure for standardized response handling
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body as text
    pub body: String,
}

impl ApiResponse {
    /// Parse the response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_str(&self.body).map_err(api_response_invalid)
    }

    /// Check if the response is successful (status code 200-299)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Extract the machine-readable error code from the body, if any.
    /// SimpleJWT reports expired access tokens as `"code": "token_not_valid"`.
    pub fn error_code(&self) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| v.get("code").and_then(|c| c.as_str()).map(String::from))
    }

    /// Extract the human-readable `detail` message from the body, if any
    pub fn error_detail(&self) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
    }
}

/// A captured outbound request: method, path, headers, and body.
///
/// The path is resolved against the configured base URL when the request is
/// sent. The `retried` flag marks a request that has already been replayed
/// once after a token refresh; such a request is never retried again.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method, e.g. "GET"
    pub method: String,
    /// Path relative to the API base URL, e.g. "users/me/"
    pub path: String,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Optional request body
    pub body: Option<String>,
    /// Whether this request has already been replayed after a refresh
    pub retried: bool,
}

impl ApiRequest {
    /// Create a new request with the given method and path
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            headers: HashMap::new(),
            body: None,
            retried: false,
        }
    }

    /// Create a GET request
    pub fn get(path: &str) -> Self {
        Self::new("GET", path)
    }

    /// Create a POST request
    pub fn post(path: &str) -> Self {
        Self::new("POST", path)
    }

    /// Create a PUT request
    pub fn put(path: &str) -> Self {
        Self::new("PUT", path)
    }

    /// Create a DELETE request
    pub fn delete(path: &str) -> Self {
        Self::new("DELETE", path)
    }

    /// Create a PATCH request
    pub fn patch(path: &str) -> Self {
        Self::new("PATCH", path)
    }

    /// Add a header to the request
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Attach a JSON body and the matching content type
    pub fn with_json<T: Serialize>(mut self, body: &T) -> ClientResult<Self> {
        self.body = Some(serde_json::to_string(body)?);
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }
}

/// HTTP client trait for abstracting HTTP requests
#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    /// Send an HTTP request with the specified method, URL, headers, and body
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> ClientResult<ApiResponse>;

    /// Send a GET request
    async fn get(
        &self,
        url: &str,
        headers: Option<HashMap<String, String>>,
    ) -> ClientResult<ApiResponse> {
        self.request("GET", url, headers, None).await
    }

    /// Send a POST request
    async fn post(
        &self,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> ClientResult<ApiResponse> {
        self.request("POST", url, headers, body).await
    }
}

/// Implementation of HttpClient using reqwest
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new ReqwestHttpClient
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a client with the given request timeout
    pub fn with_timeout(timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(api_request_failed)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> ClientResult<ApiResponse> {
        // Convert method string to reqwest Method
        let method =
            Method::from_str(method.to_uppercase().as_str()).map_err(api_request_failed)?;

        // Build request with method and URL
        let mut request_builder = self.client.request(method, url);

        // Add headers if provided
        if let Some(headers) = headers {
            let mut header_map = HeaderMap::new();
            for (key, value) in headers {
                let header_name = HeaderName::from_str(&key).map_err(api_request_failed)?;
                let header_value = HeaderValue::from_str(&value).map_err(api_request_failed)?;
                header_map.insert(header_name, header_value);
            }
            request_builder = request_builder.headers(header_map);
        }

        // Add body if provided
        if let Some(body) = body {
            request_builder = request_builder.body(body);
        }

        // Send request and get response
        let response = request_builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// A request observed by the mock client, for assertions in tests
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

/// Mock HTTP client for testing
///
/// Responses are queued per URL so a test can stage a 401 followed by a
/// success for the same endpoint; the last response for a URL is repeated
/// once the queue empties. Every outbound request is recorded.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, VecDeque<ApiResponse>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    /// Create a new MockHttpClient
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a mock response for a URL
    pub fn push_response(&self, url: &str, response: ApiResponse) {
        self.responses
            .lock()
            .expect("mock responses lock poisoned")
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue a mock JSON response for a URL
    pub fn push_json_response<T: Serialize>(&self, url: &str, status: StatusCode, data: &T) {
        let body = serde_json::to_string(data).expect("mock response must serialize");
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );

        self.push_response(
            url,
            ApiResponse {
                status,
                headers,
                body,
            },
        );
    }

    /// All requests observed so far
    pub fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .expect("mock requests lock poisoned")
            .clone()
    }

    /// Requests observed for a specific URL
    pub fn requests_for(&self, url: &str) -> Vec<RecordedRequest> {
        self.recorded_requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<String>,
    ) -> ClientResult<ApiResponse> {
        self.requests
            .lock()
            .expect("mock requests lock poisoned")
            .push(RecordedRequest {
                method: method.to_string(),
                url: url.to_string(),
                headers: headers.unwrap_or_default(),
                body,
            });

        let mut responses = self.responses.lock().expect("mock responses lock poisoned");
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().expect("queue not empty")),
            Some(queue) => queue.front().cloned().ok_or_else(|| {
                crate::error::api_error_response(404, Some(format!("No mock response for {url}")))
            }),
            None => Err(crate::error::api_error_response(
                404,
                Some(format!("No mock response for {url}")),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_http_client() {
        let client = MockHttpClient::new();

        let mock_response = ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: r#"{"name":"test"}"#.to_string(),
        };
        client.push_response("https://example.com/api", mock_response);

        let response = client.get("https://example.com/api", None).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, r#"{"name":"test"}"#);

        let data: serde_json::Value = response.json().unwrap();
        assert_eq!(data["name"], "test");
    }

    #[tokio::test]
    async fn test_mock_client_queues_responses_in_order() {
        let client = MockHttpClient::new();
        let url = "https://example.com/api/requests/";

        client.push_json_response(
            url,
            StatusCode::UNAUTHORIZED,
            &json!({"detail": "Given token not valid", "code": "token_not_valid"}),
        );
        client.push_json_response(url, StatusCode::OK, &json!({"ok": true}));

        let first = client.get(url, None).await.unwrap();
        assert_eq!(first.status, StatusCode::UNAUTHORIZED);
        assert_eq!(first.error_code().as_deref(), Some("token_not_valid"));

        let second = client.get(url, None).await.unwrap();
        assert_eq!(second.status, StatusCode::OK);

        // The final response is repeated once the queue empties
        let third = client.get(url, None).await.unwrap();
        assert_eq!(third.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mock_client_records_requests() {
        let client = MockHttpClient::new();
        let url = "https://example.com/api/token/";
        client.push_json_response(url, StatusCode::OK, &json!({"access": "A1"}));

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        client
            .post(url, Some(headers), Some(r#"{"refresh":"R1"}"#.to_string()))
            .await
            .unwrap();

        let recorded = client.requests_for(url);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(recorded[0].body.as_deref(), Some(r#"{"refresh":"R1"}"#));
    }

    #[test]
    fn test_api_request_builders() {
        let req = ApiRequest::post("requests/")
            .with_json(&json!({"service": 3}))
            .unwrap();
        assert_eq!(req.method, "POST");
        assert!(!req.retried);
        assert_eq!(
            req.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }
}
