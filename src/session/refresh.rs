//! Session refresh coordination
//!
//! Exchanges the stored refresh token for a new access token. Concurrent
//! refresh attempts coalesce into a single in-flight exchange: the exchange
//! runs under a mutex, and a waiter that acquires the lock after another
//! refresh already rotated the token returns the rotated token without a
//! second network call.
//!
//! The refresh call goes straight to the inner HTTP client, never through
//! the authenticated gateway, so a refresh can never trigger another
//! refresh attempt.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{ClientResult, auth_refresh_failed};
use crate::http::HttpClient;
use crate::session::events::{SessionEvent, SessionEvents};
use crate::store::{TokenKind, TokenStore};

/// Refresh exchange state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No refresh in flight
    Idle,
    /// A refresh exchange is in flight
    Refreshing,
}

/// Wire format of the refresh request body
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Wire format of a successful refresh response
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Coordinates refresh-token exchanges for the session
pub struct RefreshCoordinator {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn TokenStore>,
    refresh_url: String,
    state: RwLock<RefreshState>,
    exchange: Mutex<()>,
    events: SessionEvents,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refresh_url", &self.refresh_url)
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Create a new coordinator
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: Arc<dyn TokenStore>,
        refresh_url: String,
        events: SessionEvents,
    ) -> Self {
        Self {
            http,
            store,
            refresh_url,
            state: RwLock::new(RefreshState::Idle),
            exchange: Mutex::new(()),
            events,
        }
    }

    /// Whether a refresh exchange is currently in flight
    pub async fn is_refreshing(&self) -> bool {
        *self.state.read().await == RefreshState::Refreshing
    }

    /// Obtain a fresh access token for a request that failed authorization.
    ///
    /// `observed_access` is the access token the caller saw fail. If the
    /// stored token already differs when the caller gets its turn, another
    /// refresh completed in the meantime and the stored token is returned
    /// as-is.
    ///
    /// On terminal failure both tokens are cleared, `SessionExpired` is
    /// emitted, and the error propagates as a logout.
    pub async fn refresh(&self, observed_access: Option<&str>) -> ClientResult<String> {
        let _guard = self.exchange.lock().await;

        // Another caller may have rotated the token while we waited
        if let Some(current) = self.store.get(TokenKind::Access).await? {
            if observed_access != Some(current.as_str()) {
                debug!("Access token already rotated by a concurrent refresh");
                return Ok(current);
            }
        }

        *self.state.write().await = RefreshState::Refreshing;
        let result = self.exchange_refresh_token().await;
        *self.state.write().await = RefreshState::Idle;

        match result {
            Ok(access) => {
                self.store.set(TokenKind::Access, &access).await?;
                self.events.publish(SessionEvent::token_refreshed());
                info!("Access token refreshed");
                Ok(access)
            }
            Err(reason) => {
                warn!(reason = %reason, "Refresh failed, clearing session");
                self.store.clear().await?;
                self.events
                    .publish(SessionEvent::session_expired(reason.clone()));
                Err(auth_refresh_failed(reason))
            }
        }
    }

    /// Perform the actual refresh exchange. Returns the new access token or
    /// a human-readable failure reason.
    async fn exchange_refresh_token(&self) -> Result<String, String> {
        let refresh = match self.store.get(TokenKind::Refresh).await {
            Ok(Some(token)) => token,
            Ok(None) => return Err("no refresh token present".to_string()),
            Err(e) => return Err(format!("token store unavailable: {}", e)),
        };

        let body = serde_json::to_string(&RefreshRequest { refresh: &refresh })
            .map_err(|e| format!("failed to encode refresh request: {}", e))?;
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        let response = self
            .http
            .post(&self.refresh_url, Some(headers), Some(body))
            .await
            .map_err(|e| format!("refresh request failed: {}", e))?;

        if !response.is_success() {
            return Err(response
                .error_detail()
                .unwrap_or_else(|| format!("refresh endpoint returned {}", response.status)));
        }

        let parsed: RefreshResponse = response
            .json()
            .map_err(|e| format!("invalid refresh response: {}", e))?;
        Ok(parsed.access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockHttpClient;
    use crate::store::MemoryTokenStore;
    use reqwest::StatusCode;
    use serde_json::json;

    const REFRESH_URL: &str = "https://ecomatch.example/api/token/refresh/";

    fn coordinator(http: MockHttpClient, store: MemoryTokenStore) -> RefreshCoordinator {
        RefreshCoordinator::new(
            Arc::new(http),
            Arc::new(store),
            REFRESH_URL.to_string(),
            SessionEvents::new(8),
        )
    }

    #[tokio::test]
    async fn test_successful_refresh_stores_new_access_token() {
        let http = MockHttpClient::new();
        http.push_json_response(REFRESH_URL, StatusCode::OK, &json!({"access": "A2"}));

        let store = MemoryTokenStore::new();
        store.set(TokenKind::Access, "A1").await.unwrap();
        store.set(TokenKind::Refresh, "R1").await.unwrap();

        let coordinator = coordinator(http.clone(), store.clone());
        let access = coordinator.refresh(Some("A1")).await.unwrap();

        assert_eq!(access, "A2");
        assert_eq!(
            store.get(TokenKind::Access).await.unwrap().as_deref(),
            Some("A2")
        );
        // The refresh token is untouched
        assert_eq!(
            store.get(TokenKind::Refresh).await.unwrap().as_deref(),
            Some("R1")
        );

        let sent = http.requests_for(REFRESH_URL);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"refresh":"R1"}"#));
        // The refresh call carries no Authorization header
        assert!(!sent[0].headers.contains_key("Authorization"));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_terminal() {
        let http = MockHttpClient::new();
        let store = MemoryTokenStore::new();
        store.set(TokenKind::Access, "A1").await.unwrap();

        let coordinator = coordinator(http.clone(), store.clone());
        let mut rx = coordinator.events.subscribe();

        let err = coordinator.refresh(Some("A1")).await.unwrap_err();
        assert!(err.is_session_ending());
        assert_eq!(store.get(TokenKind::Access).await.unwrap(), None);
        // No network call was made
        assert!(http.recorded_requests().is_empty());

        match rx.recv().await.unwrap() {
            SessionEvent::SessionExpired { reason, .. } => {
                assert!(reason.contains("no refresh token"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_both_tokens() {
        let http = MockHttpClient::new();
        http.push_json_response(
            REFRESH_URL,
            StatusCode::UNAUTHORIZED,
            &json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
        );

        let store = MemoryTokenStore::new();
        store.set(TokenKind::Access, "A1").await.unwrap();
        store.set(TokenKind::Refresh, "R1").await.unwrap();

        let coordinator = coordinator(http, store.clone());
        let err = coordinator.refresh(Some("A1")).await.unwrap_err();

        assert!(err.is_session_ending());
        assert_eq!(store.get(TokenKind::Access).await.unwrap(), None);
        assert_eq!(store.get(TokenKind::Refresh).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_coalesce() {
        let http = MockHttpClient::new();
        http.push_json_response(REFRESH_URL, StatusCode::OK, &json!({"access": "A2"}));

        let store = MemoryTokenStore::new();
        store.set(TokenKind::Access, "A1").await.unwrap();
        store.set(TokenKind::Refresh, "R1").await.unwrap();

        let coordinator = Arc::new(coordinator(http.clone(), store));

        let a = tokio::spawn({
            let c = Arc::clone(&coordinator);
            async move { c.refresh(Some("A1")).await }
        });
        let b = tokio::spawn({
            let c = Arc::clone(&coordinator);
            async move { c.refresh(Some("A1")).await }
        });

        assert_eq!(a.await.unwrap().unwrap(), "A2");
        assert_eq!(b.await.unwrap().unwrap(), "A2");
        // Only one exchange hit the wire
        assert_eq!(http.requests_for(REFRESH_URL).len(), 1);
    }
}
