//! Identity provider abstraction layer
//!
//! This module defines the `IdentityProvider` trait which abstracts the hosted identity service
//! that owns user accounts and session artifacts (Firebase Authentication, or an in-memory
//! stand-in for development and tests).
//!
//! The session codec and the user directory only ever talk to a provider through this trait. A
//! single provider is constructed at startup by [`create_provider`] and shared read-only through
//! `AppState`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

use crate::config::IdentityProviderConfig;

pub mod firebase;
pub mod in_memory;

/// Create an identity provider from configuration
///
/// This is the single point where we convert config into provider instances. Failure here is a
/// startup failure.
pub fn create_provider(config: &IdentityProviderConfig) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    match config {
        IdentityProviderConfig::Firebase(firebase_config) => Ok(Arc::new(firebase::FirebaseProvider::from_config(firebase_config)?)),
        IdentityProviderConfig::InMemory(in_memory_config) => Ok(Arc::new(in_memory::InMemoryProvider::from(in_memory_config.clone()))),
    }
}

/// Result type for identity provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur when talking to an identity provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The bearer credential was rejected (bad signature, expired, unknown user...)
    #[error("Credential rejected by identity provider: {0}")]
    InvalidCredential(String),

    /// The session token failed signature or claim verification
    #[error("Invalid session token: {0}")]
    InvalidSession(String),

    /// The session was issued before the user's sessions were revoked
    #[error("Session has been revoked")]
    SessionRevoked,

    #[error("User account is disabled")]
    UserDisabled,

    #[error("No user record found")]
    UserNotFound,

    /// The provider rejected the request arguments (duplicate email, weak password...)
    #[error("Invalid request to identity provider: {0}")]
    InvalidArgument(String),

    /// Transport failure or 5xx from the provider
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    /// Any other unexpected provider response
    #[error("Identity provider API error: {0}")]
    Api(String),
}

/// Account metadata timestamps, in milliseconds since the Unix epoch. Zero means "never".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub creation_timestamp: i64,
    pub last_log_in_timestamp: i64,
    pub last_refresh_timestamp: i64,
}

/// A user record as the provider stores it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
    pub disabled: bool,
    pub email_verified: bool,
    pub metadata: UserMetadata,
    /// Sessions authenticated before this instant (seconds since the epoch) are revoked
    pub tokens_valid_after: Option<i64>,
}

/// Result of verifying a session token
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSession {
    /// Subject of the session (the user id)
    pub uid: String,
    /// When the user originally authenticated, seconds since the epoch
    pub auth_time: i64,
    /// When the session token expires, seconds since the epoch
    pub expires_at: i64,
    /// Remaining claims carried by the token
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// Request to create a user account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// One page of a user enumeration
#[derive(Debug, Clone, Default)]
pub struct UserPage {
    pub users: Vec<ProviderUser>,
    /// Token for the following page, `None` once the enumeration is exhausted
    pub next_page_token: Option<String>,
}

/// Abstract identity provider interface
///
/// Implementations own their connection pooling and key caches; callers never retry.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Exchange a short-lived bearer credential for a session token valid for `valid_for`
    async fn issue_session(&self, credential: &str, valid_for: Duration) -> Result<String>;

    /// Verify a session token's signature and claims, then check that the session has not been
    /// revoked and the user is neither disabled nor deleted
    async fn verify_session_and_check_revoked(&self, session: &str) -> Result<VerifiedSession>;

    async fn get_user(&self, uid: &str) -> Result<ProviderUser>;

    async fn get_user_by_email(&self, email: &str) -> Result<ProviderUser>;

    async fn create_user(&self, user: &NewUser) -> Result<ProviderUser>;

    /// Fetch one page of users. Pass the previous page's `next_page_token` to continue.
    async fn list_users_page(&self, page_token: Option<&str>) -> Result<UserPage>;

    /// Revoke every session issued to `uid` so far
    async fn revoke_sessions(&self, uid: &str) -> Result<()>;
}
