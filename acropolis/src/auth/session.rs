//! Session token exchange and verification.
//!
//! A [`SessionCodec`] turns a short-lived bearer credential into a long-lived session token, and
//! a session token back into the identity of the user it was issued to. Tokens are opaque here:
//! signing, expiry and revocation are all the identity provider's business.

use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument, warn};

use crate::{
    api::models::users::UserRecord,
    config::SessionConfig,
    errors::Error,
    identity::{IdentityProvider, ProviderError},
    types::{MAX_USER_ID_LEN, abbrev_uid},
};

/// Why a session operation failed
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The bearer credential was rejected by the provider
    #[error("Credential rejected: {0}")]
    CredentialInvalid(String),

    /// The provider could not be reached or failed unexpectedly
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The session token failed verification for any reason
    #[error("Session invalid: {0}")]
    SessionInvalid(String),
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionInvalid(_) => Error::Unauthenticated { message: None },
            // Exchange failures of either kind answer with the same generic 500
            SessionError::CredentialInvalid(detail) | SessionError::ProviderUnavailable(detail) => Error::Internal {
                operation: format!("create session: {detail}"),
            },
        }
    }
}

/// Exchanges bearer credentials for session tokens and verifies them
#[derive(Clone)]
pub struct SessionCodec {
    provider: Arc<dyn IdentityProvider>,
    valid_for: Duration,
}

impl SessionCodec {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: &SessionConfig) -> Self {
        Self {
            provider,
            valid_for: config.timeout,
        }
    }

    /// Exchange a bearer credential for a session token valid for the configured session timeout
    #[instrument(skip_all)]
    pub async fn exchange(&self, credential: &str) -> Result<String, SessionError> {
        if credential.trim().is_empty() {
            return Err(SessionError::CredentialInvalid("empty credential".to_string()));
        }

        self.provider
            .issue_session(credential, self.valid_for)
            .await
            .map_err(|e| match e {
                ProviderError::InvalidCredential(_)
                | ProviderError::InvalidArgument(_)
                | ProviderError::UserDisabled
                | ProviderError::UserNotFound
                | ProviderError::SessionRevoked => {
                    debug!("Bearer credential rejected by {}: {}", self.provider.name(), e);
                    SessionError::CredentialInvalid(e.to_string())
                }
                ProviderError::InvalidSession(_) | ProviderError::Unavailable(_) | ProviderError::Api(_) => {
                    warn!("Failed to issue session with {}: {}", self.provider.name(), e);
                    SessionError::ProviderUnavailable(e.to_string())
                }
            })
    }

    /// Verify a session token, including revocation, and resolve the user it belongs to
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<UserRecord, SessionError> {
        if token.is_empty() {
            return Err(SessionError::SessionInvalid("empty session token".to_string()));
        }

        let session = self
            .provider
            .verify_session_and_check_revoked(token)
            .await
            .map_err(|e| SessionError::SessionInvalid(e.to_string()))?;

        if session.uid.is_empty() || session.uid.len() > MAX_USER_ID_LEN {
            return Err(SessionError::SessionInvalid("subject out of bounds".to_string()));
        }

        let user = self
            .provider
            .get_user(&session.uid)
            .await
            .map_err(|e| SessionError::SessionInvalid(e.to_string()))?;

        debug!("Verified session for user {}", abbrev_uid(&user.uid));
        Ok(UserRecord::from(user))
    }
}

fn same_site_attribute(value: &str) -> &'static str {
    match value.to_lowercase().as_str() {
        "strict" => "Strict",
        "none" => "None",
        _ => "Lax",
    }
}

/// `Set-Cookie` value delivering a session token
pub fn session_cookie(token: &str, config: &SessionConfig) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite={}",
        config.cookie_name,
        token,
        config.cookie_path,
        config.timeout.as_secs(),
        same_site_attribute(&config.cookie_same_site)
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that makes the browser discard the session cookie
pub fn cleared_session_cookie(config: &SessionConfig) -> String {
    let mut cookie = format!(
        "{}=; Path={}; Max-Age=-1; HttpOnly; SameSite={}",
        config.cookie_name,
        config.cookie_path,
        same_site_attribute(&config.cookie_same_site)
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}
