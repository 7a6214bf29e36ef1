//! Authenticated request gateway
//!
//! An explicit decorator around the HTTP client: attaches the bearer token
//! before send, and on a 401 with code `token_not_valid` performs one
//! refresh-and-replay cycle. A request is retried at most once; a second
//! authorization failure on the replay is returned to the caller unchanged.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, api_error_response, token_not_valid};
use crate::http::{ApiRequest, ApiResponse, HttpClient};
use crate::session::refresh::RefreshCoordinator;
use crate::store::{TokenKind, TokenStore};

const AUTHORIZATION: &str = "Authorization";
const TOKEN_NOT_VALID: &str = "token_not_valid";

/// Wraps outbound API calls with bearer-token attachment and the
/// refresh-and-retry cycle
#[derive(Debug)]
pub struct AuthGateway {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    config: ClientConfig,
}

impl AuthGateway {
    /// Create a new gateway
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: Arc<dyn TokenStore>,
        coordinator: Arc<RefreshCoordinator>,
        config: ClientConfig,
    ) -> Self {
        Self {
            http,
            store,
            coordinator,
            config,
        }
    }

    /// Send a request, attaching the access token when present.
    ///
    /// Requests issued without a stored access token pass through unchanged,
    /// behaving as anonymous calls.
    pub async fn send(&self, mut request: ApiRequest) -> ClientResult<ApiResponse> {
        let access = self.store.get(TokenKind::Access).await?;
        if let Some(token) = &access {
            request
                .headers
                .insert(AUTHORIZATION.to_string(), format!("Bearer {}", token));
        }

        let url = self.config.resolve(&request.path);
        let response = self
            .http
            .request(
                &request.method,
                &url,
                Some(request.headers.clone()),
                request.body.clone(),
            )
            .await?;

        if !request.retried && is_token_not_valid(&response) {
            debug!(path = %request.path, "Access token rejected, refreshing");
            request.retried = true;

            // Terminal refresh failure propagates here; the coordinator has
            // already cleared the session. The rejected response's detail
            // rides along so the caller still sees the failure that started
            // the cycle.
            let new_access = match self.coordinator.refresh(access.as_deref()).await {
                Ok(token) => token,
                Err(e) => {
                    let e = match (response.error_detail(), &e.context) {
                        (Some(detail), Some(ctx)) => {
                            let combined = format!("{}; rejected request: {}", ctx, detail);
                            e.with_context(combined)
                        }
                        (Some(detail), None) => e.with_context(detail),
                        (None, _) => e,
                    };
                    return Err(e);
                }
            };
            request
                .headers
                .insert(AUTHORIZATION.to_string(), format!("Bearer {}", new_access));

            // Replay once; whatever comes back is the final answer
            return self
                .http
                .request(
                    &request.method,
                    &url,
                    Some(request.headers),
                    request.body,
                )
                .await;
        }

        Ok(response)
    }

    /// Send a request and decode a successful JSON response.
    /// Non-success statuses become errors carrying the server's `detail`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> ClientResult<T> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(response_error(&response));
        }
        response.json()
    }

    /// GET a JSON resource
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send_json(ApiRequest::post(path).with_json(body)?).await
    }

    /// PUT a JSON body and decode the JSON response
    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send_json(ApiRequest::put(path).with_json(body)?).await
    }

    /// DELETE a resource, expecting a success status
    pub async fn delete(&self, path: &str) -> ClientResult<()> {
        let response = self.send(ApiRequest::delete(path)).await?;
        if !response.is_success() {
            return Err(response_error(&response));
        }
        Ok(())
    }
}

/// Turn a non-success response into the matching error. A 401 that still
/// carries `token_not_valid` here means the replay was rejected too; it is
/// typed as an invalid-token error rather than a generic API failure.
fn response_error(response: &ApiResponse) -> ClientError {
    if is_token_not_valid(response) {
        token_not_valid(response.error_detail())
    } else {
        api_error_response(response.status.as_u16(), response.error_detail())
    }
}

/// An authorization failure that one refresh-and-retry cycle can recover from
fn is_token_not_valid(response: &ApiResponse) -> bool {
    response.status == reqwest::StatusCode::UNAUTHORIZED
        && response.error_code().as_deref() == Some(TOKEN_NOT_VALID)
}
