pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod store;

// Re-export core components
pub use crate::config::ClientConfig;
pub use crate::error::{ClientError, ClientResult, ErrorCode, ErrorSeverity};
pub use crate::http::{ApiRequest, ApiResponse, HttpClient, MockHttpClient, ReqwestHttpClient};
pub use crate::session::{
    AuthGateway, AuthenticatedUser, SessionEvent, SessionEvents, SessionManager,
};
pub use crate::store::{FileTokenStore, MemoryTokenStore, TokenKind, TokenStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
