//! In-memory identity provider for development and testing.
//!
//! Users, bearer credentials and sessions live in process memory. Bearer credentials stand in for
//! the ID token a client SDK would obtain after sign-in: [`InMemoryProvider::sign_in_with_password`]
//! checks an email and password the way the hosted sign-in endpoint would, and
//! [`InMemoryProvider::mint_credential`] skips the password for tests. Session tokens are opaque
//! random strings. Expired credentials are dropped when they are presented and whenever a new one
//! is minted.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use dashmap::DashMap;
use rand::prelude::RngExt;
use rand::rng;
use std::time::Duration;

use super::{IdentityProvider, NewUser, ProviderError, ProviderUser, Result, UserMetadata, UserPage, VerifiedSession};
use crate::config::{InMemoryConfig, SeedUser};

/// Lifetime of a minted bearer credential, matching a Firebase ID token
const CREDENTIAL_TTL_SECS: i64 = 60 * 60;

const UID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const UID_LEN: usize = 28;

#[derive(Debug, Clone)]
struct Credential {
    uid: String,
    issued_at: i64,
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct Session {
    uid: String,
    auth_time: i64,
    expires_at: i64,
}

pub struct InMemoryProvider {
    users: DashMap<String, ProviderUser>,
    passwords: DashMap<String, String>,
    credentials: DashMap<String, Credential>,
    sessions: DashMap<String, Session>,
    page_size: usize,
}

impl From<InMemoryConfig> for InMemoryProvider {
    fn from(config: InMemoryConfig) -> Self {
        let provider = Self::with_page_size(config.page_size);
        for seed in config.users {
            provider.seed(seed);
        }
        provider
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::from(InMemoryConfig::default())
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rng().fill(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn generate_uid() -> String {
    let mut rng = rng();
    (0..UID_LEN)
        .map(|_| UID_ALPHABET[rng.random_range(0..UID_ALPHABET.len())] as char)
        .collect()
}

impl InMemoryProvider {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            users: DashMap::new(),
            passwords: DashMap::new(),
            credentials: DashMap::new(),
            sessions: DashMap::new(),
            page_size: page_size.max(1),
        }
    }

    /// Insert a user directly, bypassing validation. Returns the user id.
    pub fn seed(&self, seed: SeedUser) -> String {
        let uid = seed.uid.unwrap_or_else(generate_uid);
        if let Some(password) = seed.password {
            self.passwords.insert(uid.clone(), password);
        }
        let user = ProviderUser {
            uid: uid.clone(),
            email: Some(seed.email),
            display_name: seed.display_name,
            phone_number: seed.phone_number,
            photo_url: seed.photo_url,
            disabled: seed.disabled,
            email_verified: seed.email_verified,
            metadata: UserMetadata {
                creation_timestamp: Utc::now().timestamp_millis(),
                ..Default::default()
            },
            tokens_valid_after: None,
        };
        self.users.insert(uid.clone(), user);
        uid
    }

    /// Mint a bearer credential for `uid`, as if the user had just signed in on a client
    pub fn mint_credential(&self, uid: &str) -> Result<String> {
        if !self.users.contains_key(uid) {
            return Err(ProviderError::UserNotFound);
        }
        let now = Utc::now().timestamp();
        self.credentials.retain(|_, c| c.expires_at > now);

        let credential = random_token();
        self.credentials.insert(
            credential.clone(),
            Credential {
                uid: uid.to_string(),
                issued_at: now,
                expires_at: now + CREDENTIAL_TTL_SECS,
            },
        );
        Ok(credential)
    }

    /// Email/password sign-in. Returns a bearer credential on success.
    pub fn sign_in_with_password(&self, email: &str, password: &str) -> Result<String> {
        let uid = self
            .users
            .iter()
            .find(|entry| entry.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .map(|entry| entry.key().clone())
            .ok_or_else(|| ProviderError::InvalidCredential("EMAIL_NOT_FOUND".to_string()))?;

        let matches = self.passwords.get(&uid).is_some_and(|stored| *stored == password);
        if !matches {
            return Err(ProviderError::InvalidCredential("INVALID_PASSWORD".to_string()));
        }

        self.mint_credential(&uid)
    }

    pub fn set_disabled(&self, uid: &str, disabled: bool) -> Result<()> {
        let mut user = self.users.get_mut(uid).ok_or(ProviderError::UserNotFound)?;
        user.disabled = disabled;
        Ok(())
    }

    pub fn delete_user(&self, uid: &str) -> Result<()> {
        self.users.remove(uid).ok_or(ProviderError::UserNotFound)?;
        self.passwords.remove(uid);
        Ok(())
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryProvider {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    async fn issue_session(&self, credential: &str, valid_for: Duration) -> Result<String> {
        let now = Utc::now();
        let cred = self
            .credentials
            .get(credential)
            .map(|c| c.clone())
            .ok_or_else(|| ProviderError::InvalidCredential("INVALID_ID_TOKEN".to_string()))?;

        if cred.expires_at <= now.timestamp() {
            self.credentials.remove(credential);
            return Err(ProviderError::InvalidCredential("TOKEN_EXPIRED".to_string()));
        }

        {
            let mut user = self
                .users
                .get_mut(&cred.uid)
                .ok_or_else(|| ProviderError::InvalidCredential("USER_NOT_FOUND".to_string()))?;
            if user.disabled {
                return Err(ProviderError::InvalidCredential("USER_DISABLED".to_string()));
            }
            if user.tokens_valid_after.is_some_and(|after| cred.issued_at < after) {
                return Err(ProviderError::InvalidCredential("TOKEN_EXPIRED".to_string()));
            }
            user.metadata.last_log_in_timestamp = now.timestamp_millis();
        }

        let token = random_token();
        self.sessions.insert(
            token.clone(),
            Session {
                uid: cred.uid,
                auth_time: cred.issued_at,
                expires_at: now.timestamp() + valid_for.as_secs() as i64,
            },
        );
        Ok(token)
    }

    async fn verify_session_and_check_revoked(&self, session: &str) -> Result<VerifiedSession> {
        let found = self
            .sessions
            .get(session)
            .map(|s| s.clone())
            .ok_or_else(|| ProviderError::InvalidSession("unknown session token".to_string()))?;

        if found.expires_at <= Utc::now().timestamp() {
            self.sessions.remove(session);
            return Err(ProviderError::InvalidSession("session token has expired".to_string()));
        }

        let user = self.users.get(&found.uid).ok_or(ProviderError::UserNotFound)?;
        if user.disabled {
            return Err(ProviderError::UserDisabled);
        }
        if user.tokens_valid_after.is_some_and(|after| found.auth_time < after) {
            return Err(ProviderError::SessionRevoked);
        }

        Ok(VerifiedSession {
            uid: found.uid,
            auth_time: found.auth_time,
            expires_at: found.expires_at,
            claims: serde_json::Map::new(),
        })
    }

    async fn get_user(&self, uid: &str) -> Result<ProviderUser> {
        self.users.get(uid).map(|u| u.clone()).ok_or(ProviderError::UserNotFound)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<ProviderUser> {
        self.users
            .iter()
            .find(|entry| entry.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .map(|entry| entry.value().clone())
            .ok_or(ProviderError::UserNotFound)
    }

    async fn create_user(&self, new_user: &NewUser) -> Result<ProviderUser> {
        if new_user.password.len() < 6 {
            return Err(ProviderError::InvalidArgument("WEAK_PASSWORD".to_string()));
        }
        if self.get_user_by_email(&new_user.email).await.is_ok() {
            return Err(ProviderError::InvalidArgument("EMAIL_EXISTS".to_string()));
        }

        let uid = generate_uid();
        let user = ProviderUser {
            uid: uid.clone(),
            email: Some(new_user.email.clone()),
            display_name: Some(new_user.display_name.clone()),
            metadata: UserMetadata {
                creation_timestamp: Utc::now().timestamp_millis(),
                ..Default::default()
            },
            ..Default::default()
        };
        self.users.insert(uid.clone(), user.clone());
        self.passwords.insert(uid, new_user.password.clone());
        Ok(user)
    }

    async fn list_users_page(&self, page_token: Option<&str>) -> Result<UserPage> {
        let mut uids: Vec<String> = self.users.iter().map(|entry| entry.key().clone()).collect();
        uids.sort();

        let start = match page_token {
            Some(token) => uids.partition_point(|uid| uid.as_str() <= token),
            None => 0,
        };
        let page: Vec<&String> = uids[start..].iter().take(self.page_size).collect();
        let next_page_token = if start + page.len() < uids.len() {
            page.last().map(|uid| (*uid).clone())
        } else {
            None
        };

        let users = page
            .into_iter()
            .filter_map(|uid| self.users.get(uid).map(|u| u.clone()))
            .collect();

        Ok(UserPage { users, next_page_token })
    }

    async fn revoke_sessions(&self, uid: &str) -> Result<()> {
        let mut user = self.users.get_mut(uid).ok_or(ProviderError::UserNotFound)?;
        user.tokens_valid_after = Some(Utc::now().timestamp());
        drop(user);
        // Second-granularity timestamps cannot separate sessions from the same second
        self.sessions.retain(|_, session| session.uid != uid);
        Ok(())
    }
}
