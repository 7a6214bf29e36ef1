//! Authenticated session management
//!
//! The session layer is built from four pieces, leaves first: the token
//! store holds the `{access, refresh}` pair, the refresh coordinator
//! exchanges the refresh token for a new access token (at most one exchange
//! in flight), the gateway wraps outbound requests with bearer attachment
//! and the retry-once cycle, and the manager is the facade the UI calls.

pub mod events;
pub mod gateway;
pub mod manager;
pub mod refresh;
pub mod user;

pub use events::{SessionEvent, SessionEvents};
pub use gateway::AuthGateway;
pub use manager::SessionManager;
pub use refresh::{RefreshCoordinator, RefreshState};
pub use user::AuthenticatedUser;
