//! Session lifecycle events
//!
//! The UI shell subscribes to these to react to session changes, most
//! importantly navigating to the sign-in page when the session expires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Events emitted by the session layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SessionEvent {
    /// A login completed and tokens were stored
    LoggedIn {
        /// Identifier the user signed in with
        username: String,
        /// When the login completed
        timestamp: DateTime<Utc>,
    },
    /// The user signed out; tokens were cleared
    LoggedOut {
        /// When the logout happened
        timestamp: DateTime<Utc>,
    },
    /// A refresh exchange produced a new access token
    TokenRefreshed {
        /// When the token was rotated
        timestamp: DateTime<Utc>,
    },
    /// The refresh token was rejected; the session is over.
    /// Subscribers should navigate to the sign-in entry point.
    SessionExpired {
        /// Why the session ended
        reason: String,
        /// When the session ended
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Create a login event stamped with the current time
    pub fn logged_in(username: &str) -> Self {
        Self::LoggedIn {
            username: username.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Create a logout event stamped with the current time
    pub fn logged_out() -> Self {
        Self::LoggedOut {
            timestamp: Utc::now(),
        }
    }

    /// Create a token refresh event stamped with the current time
    pub fn token_refreshed() -> Self {
        Self::TokenRefreshed {
            timestamp: Utc::now(),
        }
    }

    /// Create a session-expired event stamped with the current time
    pub fn session_expired(reason: impl Into<String>) -> Self {
        Self::SessionExpired {
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast channel for session events
///
/// Publishing never blocks and never fails: if no subscriber is listening
/// the event is dropped.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    /// Create a new event channel with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SessionEvent) {
        match self.tx.send(event) {
            Ok(receivers) => trace!(receivers, "Published session event"),
            Err(_) => trace!("Dropped session event, no subscribers"),
        }
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let events = SessionEvents::new(8);
        let mut rx = events.subscribe();

        events.publish(SessionEvent::logged_in("alice"));

        match rx.recv().await.unwrap() {
            SessionEvent::LoggedIn { username, .. } => assert_eq!(username, "alice"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_fail() {
        let events = SessionEvents::new(8);
        assert_eq!(events.subscriber_count(), 0);
        events.publish(SessionEvent::logged_out());
    }
}
