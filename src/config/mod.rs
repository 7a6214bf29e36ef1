use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ClientResult, config_invalid};

// Default configuration values
const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Main configuration struct for the ecoMatch client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the ecoMatch REST API, always normalized to end with '/'
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds for outbound API calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Optional path of the durable token file; in-memory storage when absent
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

fn default_base_url() -> String {
    std::env::var("ECOMATCH_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn default_request_timeout() -> u64 {
    std::env::var("ECOMATCH_REQUEST_TIMEOUT")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS)
}

fn default_token_file() -> Option<PathBuf> {
    std::env::var("ECOMATCH_TOKEN_FILE").ok().map(PathBuf::from)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
            token_file: default_token_file(),
        }
        .normalized()
    }
}

impl ClientConfig {
    /// Create a configuration for the given API base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            token_file: None,
        }
        .normalized()
    }

    /// Build the configuration from environment variables, loading `.env` if present
    pub fn from_env() -> Self {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();
        Self::default()
    }

    /// Set the durable token file path
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Set the request timeout in seconds
    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_seconds = seconds;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ClientResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(config_invalid(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.request_timeout_seconds == 0 {
            return Err(config_invalid("request_timeout_seconds must be non-zero"));
        }
        Ok(())
    }

    /// Resolve a relative API path against the base URL
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    // The base URL must end with '/' so relative paths resolve under it
    fn normalized(mut self) -> Self {
        if !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }
        self
    }
}

/// Load configuration from a file, falling back to defaults when it does not exist
pub async fn load_config(path: &Path) -> ClientResult<ClientConfig> {
    if !path.exists() {
        info!(
            path = %path.display(),
            "No configuration file found, using defaults"
        );
        return Ok(ClientConfig::default());
    }

    let config_str = fs::read_to_string(path).await?;
    let config: ClientConfig = serde_json::from_str(&config_str)
        .map_err(|e| config_invalid(format!("failed to parse {}: {}", path.display(), e)))?;
    let config = config.normalized();
    config.validate()?;
    debug!(path = %path.display(), "Loaded configuration");

    Ok(config)
}

/// Save configuration to a file
pub async fn save_config(path: &Path, config: &ClientConfig) -> ClientResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str).await?;
    debug!(path = %path.display(), "Saved configuration");

    Ok(())
}
