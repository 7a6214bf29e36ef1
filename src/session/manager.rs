//! Session state facade
//!
//! An explicit, injectable session object with a defined lifecycle
//! (`initialize`, `login`, `logout`) owning the token store, the
//! authenticated gateway, and the cached user projection.

use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientResult, credentials_rejected};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::session::events::{SessionEvent, SessionEvents};
use crate::session::gateway::AuthGateway;
use crate::session::refresh::RefreshCoordinator;
use crate::session::user::AuthenticatedUser;
use crate::store::{FileTokenStore, MemoryTokenStore, TokenKind, TokenStore};

const LOGIN_PATH: &str = "token/";
const REFRESH_PATH: &str = "token/refresh/";
const CURRENT_USER_PATH: &str = "users/me/";

/// Wire format of a successful login response
#[derive(Debug, Deserialize)]
struct TokenPairResponse {
    access: String,
    refresh: String,
}

/// The session facade exposed to the UI layer
pub struct SessionManager {
    config: ClientConfig,
    http: Arc<dyn HttpClient>,
    store: Arc<dyn TokenStore>,
    gateway: Arc<AuthGateway>,
    current_user: RwLock<Option<AuthenticatedUser>>,
    events: SessionEvents,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a session manager with explicit collaborators
    pub fn new(
        config: ClientConfig,
        http: Arc<dyn HttpClient>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let events = SessionEvents::default();
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&http),
            Arc::clone(&store),
            config.resolve(REFRESH_PATH),
            events.clone(),
        ));
        let gateway = Arc::new(AuthGateway::new(
            Arc::clone(&http),
            Arc::clone(&store),
            coordinator,
            config.clone(),
        ));

        Self {
            config,
            http,
            store,
            gateway,
            current_user: RwLock::new(None),
            events,
        }
    }

    /// Create a session manager from configuration alone, using the reqwest
    /// client and the file-backed store when a token file is configured
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::with_timeout(
            std::time::Duration::from_secs(config.request_timeout_seconds),
        )?);
        let store: Arc<dyn TokenStore> = match &config.token_file {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        Ok(Self::new(config, http, store))
    }

    /// Restore session state from durable storage at application start.
    ///
    /// When an access token is present the user projection is fetched
    /// best-effort; a failure here does not prevent startup.
    pub async fn initialize(&self) -> ClientResult<()> {
        if !self.is_authenticated().await {
            debug!("No stored session to restore");
            return Ok(());
        }

        info!("Restoring session from durable storage");
        if let Err(e) = self.refresh_current_user().await {
            if e.is_session_ending() {
                debug!("Stored session no longer valid");
            } else {
                warn!(error = %e, "Could not fetch user during session restore");
            }
        }
        Ok(())
    }

    /// Exchange credentials for a token pair and fetch the user projection.
    ///
    /// On rejection the server's `detail` message is surfaced, falling back
    /// to a generic message when the server gives none.
    pub async fn login(&self, identifier: &str, secret: &str) -> ClientResult<()> {
        let body = serde_json::to_string(&json!({
            "username": identifier.trim(),
            "password": secret,
        }))?;
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        // The login endpoint is unauthenticated; call the client directly
        let response = self
            .http
            .post(&self.config.resolve(LOGIN_PATH), Some(headers), Some(body))
            .await?;

        if !response.is_success() {
            return Err(credentials_rejected(response.error_detail()));
        }

        let tokens: TokenPairResponse = response.json()?;
        self.store.set(TokenKind::Access, &tokens.access).await?;
        self.store.set(TokenKind::Refresh, &tokens.refresh).await?;
        info!("Login succeeded, session established");

        if let Err(e) = self.refresh_current_user().await {
            warn!(error = %e, "Login succeeded but fetching the user failed");
        }
        self.events.publish(SessionEvent::logged_in(identifier));
        Ok(())
    }

    /// Clear the session; subsequent authenticated calls behave as anonymous
    pub async fn logout(&self) -> ClientResult<()> {
        self.store.clear().await?;
        *self.current_user.write().await = None;
        self.events.publish(SessionEvent::logged_out());
        info!("Logged out, session cleared");
        Ok(())
    }

    /// True iff an access token is present in the store
    pub async fn is_authenticated(&self) -> bool {
        matches!(self.store.get(TokenKind::Access).await, Ok(Some(_)))
    }

    /// The cached user projection, or None when no session exists
    pub async fn current_user(&self) -> Option<AuthenticatedUser> {
        if !self.is_authenticated().await {
            // The session may have been ended by a failed refresh; drop the
            // stale projection
            let mut user = self.current_user.write().await;
            if user.is_some() {
                debug!("Dropping cached user for ended session");
                *user = None;
            }
            return None;
        }
        self.current_user.read().await.clone()
    }

    /// Re-fetch the user projection through the authenticated gateway
    pub async fn refresh_current_user(&self) -> ClientResult<AuthenticatedUser> {
        let user: AuthenticatedUser = self.gateway.get_json(CURRENT_USER_PATH).await?;
        *self.current_user.write().await = Some(user.clone());
        Ok(user)
    }

    /// The authenticated request gateway, for the UI's REST calls
    pub fn gateway(&self) -> &Arc<AuthGateway> {
        &self.gateway
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The event channel itself, for wiring into other components
    pub fn events(&self) -> &SessionEvents {
        &self.events
    }
}
