//! Durable storage for session tokens
//!
//! Tokens are opaque strings; no validation of their contents happens here.
//! The file-backed store keeps two named slots (`accessToken` /
//! `refreshToken`) so a session survives restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ClientResult;

/// The two token slots of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Short-lived credential attached to authenticated requests
    Access,
    /// Longer-lived credential used only to obtain a new access token
    Refresh,
}

impl TokenKind {
    /// Name of the durable storage slot for this token
    pub fn slot_name(&self) -> &'static str {
        match self {
            TokenKind::Access => "accessToken",
            TokenKind::Refresh => "refreshToken",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slot_name())
    }
}

/// Store for session tokens
#[async_trait]
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// Retrieve a token, or None if absent
    async fn get(&self, kind: TokenKind) -> ClientResult<Option<String>>;

    /// Store a token
    async fn set(&self, kind: TokenKind, value: &str) -> ClientResult<()>;

    /// Remove both tokens
    async fn clear(&self) -> ClientResult<()>;
}

/// In-memory token store, mainly for tests and short-lived sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    tokens: Arc<RwLock<HashMap<TokenKind, String>>>,
}

impl MemoryTokenStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, kind: TokenKind) -> ClientResult<Option<String>> {
        Ok(self.tokens.read().await.get(&kind).cloned())
    }

    async fn set(&self, kind: TokenKind, value: &str) -> ClientResult<()> {
        self.tokens.write().await.insert(kind, value.to_string());
        Ok(())
    }

    async fn clear(&self) -> ClientResult<()> {
        self.tokens.write().await.clear();
        Ok(())
    }
}

/// On-disk token payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access: Option<String>,
    #[serde(rename = "refreshToken", skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
    /// When this payload was last written
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

impl StoredTokens {
    fn slot(&self, kind: TokenKind) -> Option<&String> {
        match kind {
            TokenKind::Access => self.access.as_ref(),
            TokenKind::Refresh => self.refresh.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: TokenKind) -> &mut Option<String> {
        match kind {
            TokenKind::Access => &mut self.access,
            TokenKind::Refresh => &mut self.refresh,
        }
    }
}

/// File-backed token store with an in-memory cache
///
/// The cache is consulted first; the file is only read once per process
/// unless it has never been loaded. Every mutation is persisted immediately.
/// Mutations run entirely under the cache write lock, so a concurrent pair
/// of `set` calls cannot load the same snapshot and erase each other's slot.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
    cache: Arc<RwLock<Option<StoredTokens>>>,
}

impl FileTokenStore {
    /// Create a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Read the token payload from disk, without touching the cache
    async fn read_file(&self) -> ClientResult<StoredTokens> {
        if self.path.exists() {
            let raw = fs::read_to_string(&self.path).await?;
            Ok(serde_json::from_str(&raw)?)
        } else {
            debug!(path = %self.path.display(), "No token file found, starting empty");
            Ok(StoredTokens::default())
        }
    }

    /// Write the token payload to disk, without touching the cache
    async fn write_file(&self, tokens: &StoredTokens) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(tokens)?;
        fs::write(&self.path, raw).await?;
        debug!(path = %self.path.display(), "Persisted session tokens");
        Ok(())
    }

    /// Load, mutate, and persist under a single cache write guard
    async fn update(
        &self,
        mutate: impl FnOnce(&mut StoredTokens),
    ) -> ClientResult<()> {
        let mut cache = self.cache.write().await;
        let mut tokens = match cache.clone() {
            Some(tokens) => tokens,
            None => self.read_file().await?,
        };
        mutate(&mut tokens);
        tokens.saved_at = Some(Utc::now());
        self.write_file(&tokens).await?;
        *cache = Some(tokens);
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, kind: TokenKind) -> ClientResult<Option<String>> {
        if let Some(tokens) = self.cache.read().await.as_ref() {
            return Ok(tokens.slot(kind).cloned());
        }

        // Not loaded yet; fill the cache under the write guard, re-checking
        // in case another task got there first
        let mut cache = self.cache.write().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache
            .as_ref()
            .and_then(|tokens| tokens.slot(kind).cloned()))
    }

    async fn set(&self, kind: TokenKind, value: &str) -> ClientResult<()> {
        self.update(|tokens| {
            *tokens.slot_mut(kind) = Some(value.to_string());
        })
        .await
    }

    async fn clear(&self) -> ClientResult<()> {
        self.update(|tokens| {
            tokens.access = None;
            tokens.refresh = None;
        })
        .await?;
        info!(path = %self.path.display(), "Cleared session tokens");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get_clear() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.get(TokenKind::Access).await.unwrap(), None);

        store.set(TokenKind::Access, "A1").await.unwrap();
        store.set(TokenKind::Refresh, "R1").await.unwrap();
        assert_eq!(
            store.get(TokenKind::Access).await.unwrap().as_deref(),
            Some("A1")
        );
        assert_eq!(
            store.get(TokenKind::Refresh).await.unwrap().as_deref(),
            Some("R1")
        );

        store.clear().await.unwrap();
        assert_eq!(store.get(TokenKind::Access).await.unwrap(), None);
        assert_eq!(store.get(TokenKind::Refresh).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileTokenStore::new(&path);
        store.set(TokenKind::Access, "A1").await.unwrap();
        store.set(TokenKind::Refresh, "R1").await.unwrap();

        // A fresh store over the same file sees the persisted tokens
        let reopened = FileTokenStore::new(&path);
        assert_eq!(
            reopened.get(TokenKind::Access).await.unwrap().as_deref(),
            Some("A1")
        );
        assert_eq!(
            reopened.get(TokenKind::Refresh).await.unwrap().as_deref(),
            Some("R1")
        );
    }

    #[tokio::test]
    async fn test_file_store_clear_empties_both_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileTokenStore::new(&path);
        store.set(TokenKind::Access, "A1").await.unwrap();
        store.clear().await.unwrap();

        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.get(TokenKind::Access).await.unwrap(), None);
        assert_eq!(reopened.get(TokenKind::Refresh).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_concurrent_sets_keep_both_slots() {
        // Both writers start against an unloaded store; each mutation must
        // run its whole load-modify-persist cycle under one guard or the
        // slower writer erases the faster one's slot
        for round in 0..16 {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("session.json");
            let store = FileTokenStore::new(&path);

            let a = tokio::spawn({
                let store = store.clone();
                async move { store.set(TokenKind::Access, "A1").await }
            });
            let b = tokio::spawn({
                let store = store.clone();
                async move { store.set(TokenKind::Refresh, "R1").await }
            });
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();

            let reopened = FileTokenStore::new(&path);
            assert_eq!(
                reopened.get(TokenKind::Access).await.unwrap().as_deref(),
                Some("A1"),
                "round {}: access token lost",
                round
            );
            assert_eq!(
                reopened.get(TokenKind::Refresh).await.unwrap().as_deref(),
                Some("R1"),
                "round {}: refresh token lost",
                round
            );
        }
    }

    #[test]
    fn test_slot_names() {
        assert_eq!(TokenKind::Access.slot_name(), "accessToken");
        assert_eq!(TokenKind::Refresh.slot_name(), "refreshToken");
    }
}
