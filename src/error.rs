use std::fmt;
use thiserror::Error;

/// Main error type for the ecoMatch client
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct ClientError {
    /// Error code for categorization and identification
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional context for more detailed error information
    pub context: Option<String>,
    /// Error severity level
    pub severity: ErrorSeverity,
}

/// Type alias for ecoMatch client results
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Attach additional context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Whether the error ends the session (forces a logout)
    pub fn is_session_ending(&self) -> bool {
        self.code == ErrorCode::AuthRefreshFailed
    }
}

/// Enumeration of error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // General errors
    Unknown,
    ConfigInvalid,

    // Authentication errors
    AuthorizationFailed,
    AuthTokenInvalid,
    AuthRefreshFailed,

    // API errors
    ApiRequestFailed,
    ApiResponseInvalid,

    // Storage errors
    StorageFailed,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code_str = match self {
            ErrorCode::Unknown => "UNKNOWN",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
            ErrorCode::AuthorizationFailed => "AUTH_FAILED",
            ErrorCode::AuthTokenInvalid => "AUTH_TOKEN_INVALID",
            ErrorCode::AuthRefreshFailed => "AUTH_REFRESH_FAILED",
            ErrorCode::ApiRequestFailed => "API_REQUEST_FAILED",
            ErrorCode::ApiResponseInvalid => "API_RESPONSE_INVALID",
            ErrorCode::StorageFailed => "STORAGE_FAILED",
        };
        write!(f, "{}", code_str)
    }
}

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Warning that doesn't prevent operation
    Warning,
    /// Error that affects functionality but allows continued operation
    Error,
    /// Severe error that prevents further operation
    Critical,
}

// Helper functions to create standard errors

/// Create a login rejection error, carrying the server's `detail` message
pub fn credentials_rejected(detail: Option<String>) -> ClientError {
    ClientError {
        code: ErrorCode::AuthorizationFailed,
        message: detail.unwrap_or_else(|| "Login failed".to_string()),
        context: None,
        severity: ErrorSeverity::Warning,
    }
}

/// Create an invalid access token error (the recoverable `token_not_valid` case)
pub fn token_not_valid(detail: Option<String>) -> ClientError {
    ClientError {
        code: ErrorCode::AuthTokenInvalid,
        message: "Access token is expired or invalid".to_string(),
        context: detail,
        severity: ErrorSeverity::Warning,
    }
}

/// Create a terminal refresh failure error; the session has been cleared
pub fn auth_refresh_failed(reason: impl Into<String>) -> ClientError {
    ClientError {
        code: ErrorCode::AuthRefreshFailed,
        message: "Session expired, sign-in required".to_string(),
        context: Some(reason.into()),
        severity: ErrorSeverity::Error,
    }
}

/// Create an API request failed error (transport level)
pub fn api_request_failed(error: impl std::error::Error) -> ClientError {
    ClientError {
        code: ErrorCode::ApiRequestFailed,
        message: "API request failed".to_string(),
        context: Some(error.to_string()),
        severity: ErrorSeverity::Error,
    }
}

/// Create an error for a non-success API response
pub fn api_error_response(status: u16, detail: Option<String>) -> ClientError {
    ClientError {
        code: ErrorCode::ApiRequestFailed,
        message: detail.unwrap_or_else(|| format!("API request failed with status {}", status)),
        context: Some(format!("status {}", status)),
        severity: ErrorSeverity::Error,
    }
}

/// Create an invalid API response error (decode failure)
pub fn api_response_invalid(error: impl std::error::Error) -> ClientError {
    ClientError {
        code: ErrorCode::ApiResponseInvalid,
        message: "Failed to decode API response".to_string(),
        context: Some(error.to_string()),
        severity: ErrorSeverity::Error,
    }
}

/// Create a token storage error
pub fn storage_failed(error: impl std::error::Error) -> ClientError {
    ClientError {
        code: ErrorCode::StorageFailed,
        message: "Token storage operation failed".to_string(),
        context: Some(error.to_string()),
        severity: ErrorSeverity::Error,
    }
}

/// Create an invalid configuration error
pub fn config_invalid(reason: impl Into<String>) -> ClientError {
    ClientError {
        code: ErrorCode::ConfigInvalid,
        message: "Invalid client configuration".to_string(),
        context: Some(reason.into()),
        severity: ErrorSeverity::Critical,
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        api_request_failed(err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        api_response_invalid(err)
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        storage_failed(err)
    }
}
