//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `ACROPOLIS_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `ACROPOLIS_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `ACROPOLIS_AUTH__SESSION__COOKIE_SECURE=true` sets the `auth.session.cookie_secure` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use acropolis::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **Authentication**: `auth.session` - Session cookie lifetime and attributes
//! - **Security**: `auth.security.cors` - CORS settings for browser clients
//! - **Identity provider**: `identity_provider.firebase` or `identity_provider.in_memory` (required)
//! - **Features**: `enable_metrics`, `enable_otel_export` - Optional feature toggles
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! ACROPOLIS_PORT=8080
//!
//! # Point at a Firebase project
//! ACROPOLIS_IDENTITY_PROVIDER__FIREBASE__PROJECT_ID=my-project
//! ACROPOLIS_IDENTITY_PROVIDER__FIREBASE__CREDENTIALS_FILE=/etc/acropolis/service-account.json
//!
//! # Revoke provider sessions on sign-out
//! ACROPOLIS_AUTH__SESSION__REVOKE_ON_SIGN_OUT=true
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Shortest session the identity provider will issue
pub const MIN_SESSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Longest session the identity provider will issue
pub const MAX_SESSION_TIMEOUT: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "ACROPOLIS_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Session and CORS configuration
    pub auth: AuthConfig,
    /// Which identity provider owns user accounts and sessions. Required; there is no default.
    pub identity_provider: Option<IdentityProviderConfig>,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Export traces over OTLP (configured through the standard `OTEL_*` environment variables)
    pub enable_otel_export: bool,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Session cookie configuration
    pub session: SessionConfig,
    /// Security settings (CORS)
    pub security: SecurityConfig,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Session lifetime requested from the identity provider, also used as the cookie Max-Age
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Cookie name for session token
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
    /// Path attribute of the session cookie
    pub cookie_path: String,
    /// Revoke every provider session of the user when they sign out
    pub revoke_on_sign_out: bool,
}

/// Security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// Identity provider configuration.
///
/// Exactly one provider is active. Credentials should be supplied through a key file mounted at
/// runtime, never inline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityProviderConfig {
    /// Firebase Authentication via the Identity Toolkit REST API
    /// Set credentials via:
    /// - `ACROPOLIS_IDENTITY_PROVIDER__FIREBASE__PROJECT_ID`
    /// - `ACROPOLIS_IDENTITY_PROVIDER__FIREBASE__CREDENTIALS_FILE` - service-account key JSON
    Firebase(FirebaseConfig),
    /// Users held in process memory, for development and tests
    InMemory(InMemoryConfig),
}

/// Firebase Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FirebaseConfig {
    /// Firebase project ID. Falls back to the `project_id` in the credentials file.
    pub project_id: Option<String>,
    /// Path to a service-account key JSON file (required unless `emulator_host` is set)
    pub credentials_file: Option<PathBuf>,
    /// `host:port` of a running Auth emulator. Overrides `api_base_url` when set.
    pub emulator_host: Option<String>,
    /// Identity Toolkit API root
    pub api_base_url: Url,
    /// JWKS used to verify session cookies
    pub session_keys_url: Url,
    /// Timeout for each request to the provider
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How long fetched session keys are trusted before refetching
    #[serde(with = "humantime_serde")]
    pub keys_cache_ttl: Duration,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            credentials_file: None,
            emulator_host: None,
            api_base_url: Url::parse("https://identitytoolkit.googleapis.com/").expect("valid default URL"),
            session_keys_url: Url::parse("https://identitytoolkit.googleapis.com/v1/sessionCookiePublicKeys").expect("valid default URL"),
            request_timeout: Duration::from_secs(10),
            keys_cache_ttl: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// In-memory identity provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InMemoryConfig {
    /// Users present at startup
    pub users: Vec<SeedUser>,
    /// Number of users returned per enumeration page
    pub page_size: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            page_size: 1000,
        }
    }
}

/// A user created when the in-memory provider starts.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedUser {
    /// Fixed user id; generated when omitted
    pub uid: Option<String>,
    pub email: String,
    /// Enables email/password sign-in for this user
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: bool,
    pub disabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1323,
            auth: AuthConfig::default(),
            identity_provider: None,
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5 * 24 * 60 * 60), // 5 days
            cookie_name: "acropolis-session".to_string(),
            cookie_secure: false,
            cookie_same_site: "lax".to_string(),
            cookie_path: "/".to_string(),
            revoke_on_sign_out: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                CorsOrigin::Url(Url::parse("http://localhost:3000").expect("valid default URL")), // Development frontend
            ],
            allow_credentials: true,
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let session = &self.auth.session;

        if session.cookie_name.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: auth.session.cookie_name cannot be empty".to_string(),
            });
        }

        if session.timeout < MIN_SESSION_TIMEOUT || session.timeout > MAX_SESSION_TIMEOUT {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: auth.session.timeout ({:?}) must be between {:?} and {:?}",
                    session.timeout, MIN_SESSION_TIMEOUT, MAX_SESSION_TIMEOUT
                ),
            });
        }

        if !matches!(session.cookie_same_site.to_lowercase().as_str(), "strict" | "lax" | "none") {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: auth.session.cookie_same_site must be one of strict, lax or none (got '{}')",
                    session.cookie_same_site
                ),
            });
        }

        if session.cookie_same_site.eq_ignore_ascii_case("none") && !session.cookie_secure {
            return Err(Error::Internal {
                operation: "Config validation: auth.session.cookie_same_site 'none' requires cookie_secure".to_string(),
            });
        }

        let cors = &self.auth.security.cors;
        if cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: auth.security.cors.allowed_origins cannot be empty".to_string(),
            });
        }

        if cors.allow_credentials && cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
            return Err(Error::Internal {
                operation: "Config validation: CORS wildcard origin '*' cannot be combined with allow_credentials".to_string(),
            });
        }

        let Some(identity_provider) = &self.identity_provider else {
            return Err(Error::Internal {
                operation: "Config validation: identity_provider must be configured (firebase or in_memory)".to_string(),
            });
        };

        if let IdentityProviderConfig::Firebase(firebase) = identity_provider
            && firebase.emulator_host.is_none()
            && firebase.credentials_file.is_none()
        {
            return Err(Error::Internal {
                operation: "Config validation: identity_provider.firebase requires credentials_file unless emulator_host is set"
                    .to_string(),
            });
        }

        if let IdentityProviderConfig::InMemory(in_memory) = identity_provider
            && in_memory.page_size == 0
        {
            return Err(Error::Internal {
                operation: "Config validation: identity_provider.in_memory.page_size must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("ACROPOLIS_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
