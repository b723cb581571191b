//! Application configuration loaded from environment variables.
//!
//! Secrets (Strava client secret, JWT signing key) arrive through Cloud Run
//! secret bindings as environment variables and are never compiled in.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default Strava OAuth token endpoint.
pub const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";

/// Which persistence backend the stores use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local maps; for local development and tests
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::Invalid {
                name: "STORE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Token endpoint used for refresh grants
    pub strava_token_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    /// Refresh credentials expiring within this window
    pub token_refresh_margin: chrono::Duration,
    /// Bound on each call to the token endpoint
    pub http_timeout: Duration,
    /// Bound on each store read or write
    pub store_timeout: Duration,

    // --- Secrets ---
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// JWT signing key for inbound bearer tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_token_url: STRAVA_TOKEN_URL.to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            token_refresh_margin: chrono::Duration::seconds(3600),
            http_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(10),
            strava_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            strava_client_id: required("STRAVA_CLIENT_ID")?,
            strava_token_url: env::var("STRAVA_TOKEN_URL")
                .unwrap_or_else(|_| STRAVA_TOKEN_URL.to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parsed("PORT", 8080)?,
            store_backend: match env::var("STORE_BACKEND") {
                Ok(v) => v.parse()?,
                Err(_) => StoreBackend::Firestore,
            },
            token_refresh_margin: chrono::Duration::seconds(parsed(
                "TOKEN_REFRESH_MARGIN_SECS",
                3600,
            )?),
            http_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS", 10)?),
            store_timeout: Duration::from_secs(parsed("STORE_TIMEOUT_SECS", 10)?),

            strava_client_secret: required("STRAVA_CLIENT_SECRET")?,
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
