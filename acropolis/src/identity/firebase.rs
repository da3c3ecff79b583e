//! Firebase Authentication provider.
//!
//! Talks to the Identity Toolkit v1 REST API directly with `reqwest`:
//!
//! - Admin calls carry an OAuth2 access token obtained from a service-account key through the
//!   JWT-bearer grant. The token is cached until shortly before it expires.
//! - Session cookies are RS256 JWTs signed with Google's session-cookie keys. Verification checks
//!   the signature against the published JWKS (cached with `moka`), then the `aud`, `iss`, `exp`
//!   and `sub` claims, then looks the user up to reject disabled, deleted and revoked sessions.
//! - When `emulator_host` is configured, requests go to the Auth emulator, which accepts the
//!   `owner` bearer token and issues unsigned session cookies.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode, jwk::JwkSet};
use moka::future::Cache;
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace};
use url::Url;

use super::{IdentityProvider, NewUser, ProviderError, ProviderUser, Result, UserMetadata, UserPage, VerifiedSession};
use crate::config::FirebaseConfig;
use crate::types::{MAX_USER_ID_LEN, abbrev_uid};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const OAUTH_SCOPES: &str = "https://www.googleapis.com/auth/cloud-platform https://www.googleapis.com/auth/identitytoolkit";
const SESSION_ISSUER_PREFIX: &str = "https://session.firebase.google.com/";
const EMULATOR_TOKEN: &str = "owner";
const LIST_PAGE_SIZE: u32 = 1000;
/// Refresh the access token when less than this much lifetime remains
const ACCESS_TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Lifetime requested for the signed assertion (the maximum Google accepts)
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// The subset of a Google service-account key file we need
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Signs JWT-bearer assertions for the OAuth2 token endpoint
struct AssertionSigner {
    client_email: String,
    token_uri: String,
    header: Header,
    key: EncodingKey,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedAccessToken {
    token: String,
    expires_at: Instant,
}

/// Claims carried by a session cookie. `aud` and `iss` are validated by `jsonwebtoken` and end
/// up in `extra` together with any custom claims.
#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    #[serde(default)]
    auth_time: i64,
    exp: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// User record as returned by `accounts:lookup` and `accounts:batchGet`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfoRecord {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    phone_number: Option<String>,
    photo_url: Option<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    email_verified: bool,
    /// Milliseconds since the epoch, as a decimal string
    created_at: Option<String>,
    /// Milliseconds since the epoch, as a decimal string
    last_login_at: Option<String>,
    /// RFC 3339 timestamp
    last_refresh_at: Option<String>,
    /// Seconds since the epoch, as a decimal string
    valid_since: Option<String>,
}

fn parse_i64(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.parse().ok())
}

impl From<UserInfoRecord> for ProviderUser {
    fn from(record: UserInfoRecord) -> Self {
        let last_refresh_timestamp = record
            .last_refresh_at
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.timestamp_millis())
            .unwrap_or(0);

        ProviderUser {
            uid: record.local_id,
            email: record.email,
            display_name: record.display_name,
            phone_number: record.phone_number,
            photo_url: record.photo_url,
            disabled: record.disabled,
            email_verified: record.email_verified,
            metadata: UserMetadata {
                creation_timestamp: parse_i64(record.created_at.as_deref()).unwrap_or(0),
                last_log_in_timestamp: parse_i64(record.last_login_at.as_deref()).unwrap_or(0),
                last_refresh_timestamp,
            },
            tokens_valid_after: parse_i64(record.valid_since.as_deref()),
        }
    }
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<UserInfoRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    users: Vec<UserInfoRecord>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionCookieResponse {
    session_cookie: String,
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
}

/// Extract the leading error code from a Google API error body, e.g. `INVALID_ID_TOKEN` from
/// `{"error": {"message": "INVALID_ID_TOKEN : The token is malformed"}}`
fn error_code(body: &str) -> String {
    serde_json::from_str::<GoogleErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message.split([' ', ':']).next().map(str::to_string))
        .unwrap_or_default()
}

fn classify_error(status: StatusCode, body: &str) -> ProviderError {
    let code = error_code(body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::Unavailable(format!("HTTP {status}: {code}"));
    }
    match code.as_str() {
        "USER_NOT_FOUND" => ProviderError::UserNotFound,
        "USER_DISABLED" => ProviderError::UserDisabled,
        _ if status == StatusCode::BAD_REQUEST => ProviderError::InvalidArgument(code),
        _ => ProviderError::Api(format!("HTTP {status}: {code}")),
    }
}

pub struct FirebaseProvider {
    client: reqwest::Client,
    project_id: String,
    api_base: Url,
    session_keys_url: Url,
    emulator: bool,
    signer: Option<AssertionSigner>,
    access_token: Mutex<Option<CachedAccessToken>>,
    session_keys: Cache<String, Arc<JwkSet>>,
    validation: Validation,
}

impl FirebaseProvider {
    /// Build a provider from configuration, reading the service-account key file if one is set
    pub fn from_config(config: &FirebaseConfig) -> anyhow::Result<Self> {
        let key = match &config.credentials_file {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("Failed to read Firebase credentials file {}: {e}", path.display()))?;
                Some(serde_json::from_str::<ServiceAccountKey>(&contents)?)
            }
            None => None,
        };
        Self::new(config, key)
    }

    pub fn new(config: &FirebaseConfig, key: Option<ServiceAccountKey>) -> anyhow::Result<Self> {
        let emulator = config.emulator_host.is_some();
        if !emulator && key.is_none() {
            anyhow::bail!("Firebase provider requires credentials_file unless emulator_host is set");
        }

        let project_id = config
            .project_id
            .clone()
            .or_else(|| key.as_ref().and_then(|k| k.project_id.clone()))
            .ok_or_else(|| anyhow::anyhow!("Firebase project_id is not configured and not present in the credentials file"))?;

        let api_base = match &config.emulator_host {
            Some(host) => Url::parse(&format!("http://{host}/identitytoolkit.googleapis.com/"))?,
            None => config.api_base_url.clone(),
        };

        let signer = key
            .map(|key| -> anyhow::Result<AssertionSigner> {
                let mut header = Header::new(Algorithm::RS256);
                header.kid = key.private_key_id.clone();
                Ok(AssertionSigner {
                    key: EncodingKey::from_rsa_pem(key.private_key.as_bytes())?,
                    client_email: key.client_email,
                    token_uri: key.token_uri,
                    header,
                })
            })
            .transpose()?;

        let client = reqwest::Client::builder().timeout(config.request_timeout).build()?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[project_id.as_str()]);
        validation.set_issuer(&[format!("{SESSION_ISSUER_PREFIX}{project_id}")]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        Ok(Self {
            client,
            project_id,
            api_base,
            session_keys_url: config.session_keys_url.clone(),
            emulator,
            signer,
            access_token: Mutex::new(None),
            session_keys: Cache::builder().max_capacity(4).time_to_live(config.keys_cache_ttl).build(),
            validation,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(&format!("v1/projects/{}{}", self.project_id, path))
            .map_err(|e| ProviderError::Api(format!("invalid endpoint URL: {e}")))
    }

    /// Current OAuth2 access token, refreshing it when close to expiry
    async fn access_token(&self) -> Result<String> {
        let Some(signer) = &self.signer else {
            return Ok(EMULATOR_TOKEN.to_string());
        };

        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now() + ACCESS_TOKEN_REFRESH_MARGIN
        {
            return Ok(token.token.clone());
        }

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &signer.client_email,
            scope: OAUTH_SCOPES,
            aud: &signer.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let assertion =
            encode(&signer.header, &claims, &signer.key).map_err(|e| ProviderError::Api(format!("failed to sign token assertion: {e}")))?;

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", &assertion)
            .finish();

        debug!("Requesting OAuth2 access token for {}", signer.client_email);
        let response = self
            .client
            .post(&signer.token_uri)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match classify_error(status, &body) {
                ProviderError::Unavailable(detail) => ProviderError::Unavailable(detail),
                _ => ProviderError::Api(format!("token endpoint returned HTTP {status}")),
            });
        }

        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("malformed token response: {e}")))?;

        let value = token.access_token.clone();
        *cached = Some(CachedAccessToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    /// Send an authenticated admin request and decode the JSON response
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Api(format!("malformed response: {e}")))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = self.endpoint(path)?;
        self.send(self.client.post(url).json(body)).await
    }

    async fn lookup(&self, body: Value) -> Result<ProviderUser> {
        let response: LookupResponse = self.post("/accounts:lookup", &body).await?;
        response
            .users
            .into_iter()
            .next()
            .map(ProviderUser::from)
            .ok_or(ProviderError::UserNotFound)
    }

    async fn fetch_session_keys(&self) -> Result<Arc<JwkSet>> {
        trace!("Fetching session cookie keys from {}", self.session_keys_url);
        let response = self
            .client
            .get(self.session_keys_url.clone())
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("session keys unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!("session keys endpoint returned HTTP {status}")));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("malformed session keys: {e}")))?;
        Ok(Arc::new(keys))
    }

    async fn session_keys(&self) -> Result<Arc<JwkSet>> {
        self.session_keys
            .try_get_with(self.session_keys_url.to_string(), self.fetch_session_keys())
            .await
            .map_err(|e| match e.as_ref() {
                ProviderError::Api(detail) => ProviderError::Api(detail.clone()),
                other => ProviderError::Unavailable(other.to_string()),
            })
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        let mut keys = self.session_keys().await?;
        if keys.find(kid).is_none() {
            // Keys rotate; refetch once before giving up
            self.session_keys.invalidate(self.session_keys_url.as_str()).await;
            keys = self.session_keys().await?;
        }
        let jwk = keys
            .find(kid)
            .ok_or_else(|| ProviderError::InvalidSession(format!("no session key with kid {kid}")))?;
        DecodingKey::from_jwk(jwk).map_err(|e| ProviderError::InvalidSession(format!("unusable session key: {e}")))
    }

    /// Verify the session cookie's signature and standard claims
    async fn verify_session_claims(&self, session: &str) -> Result<SessionClaims> {
        let claims = if self.emulator {
            self.decode_emulator_session(session)?
        } else {
            let header = decode_header(session).map_err(|e| ProviderError::InvalidSession(format!("malformed header: {e}")))?;
            if header.alg != Algorithm::RS256 {
                return Err(ProviderError::InvalidSession(format!("unexpected algorithm {:?}", header.alg)));
            }
            let kid = header
                .kid
                .ok_or_else(|| ProviderError::InvalidSession("missing kid header".to_string()))?;
            let key = self.decoding_key(&kid).await?;
            decode::<SessionClaims>(session, &key, &self.validation)
                .map_err(|e| ProviderError::InvalidSession(e.to_string()))?
                .claims
        };

        if claims.sub.is_empty() || claims.sub.len() > MAX_USER_ID_LEN {
            return Err(ProviderError::InvalidSession("sub must be a non-empty string of at most 128 characters".to_string()));
        }
        Ok(claims)
    }

    /// The Auth emulator signs nothing, so only the claims are checked
    fn decode_emulator_session(&self, session: &str) -> Result<SessionClaims> {
        let payload = session
            .split('.')
            .nth(1)
            .ok_or_else(|| ProviderError::InvalidSession("not a JWT".to_string()))?;
        let bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ProviderError::InvalidSession(format!("malformed payload: {e}")))?;
        let claims: SessionClaims = serde_json::from_slice(&bytes).map_err(|e| ProviderError::InvalidSession(format!("malformed claims: {e}")))?;

        let expected_issuer = format!("{SESSION_ISSUER_PREFIX}{}", self.project_id);
        if claims.extra.get("aud").and_then(Value::as_str) != Some(self.project_id.as_str()) {
            return Err(ProviderError::InvalidSession("InvalidAudience".to_string()));
        }
        if claims.extra.get("iss").and_then(Value::as_str) != Some(expected_issuer.as_str()) {
            return Err(ProviderError::InvalidSession("InvalidIssuer".to_string()));
        }
        if claims.exp <= Utc::now().timestamp() {
            return Err(ProviderError::InvalidSession("ExpiredSignature".to_string()));
        }
        Ok(claims)
    }
}

#[async_trait]
impl IdentityProvider for FirebaseProvider {
    fn name(&self) -> &'static str {
        "firebase"
    }

    #[instrument(skip_all)]
    async fn issue_session(&self, credential: &str, valid_for: Duration) -> Result<String> {
        let body = json!({
            "idToken": credential,
            "validDuration": valid_for.as_secs().to_string(),
        });
        let response: SessionCookieResponse = self.post(":createSessionCookie", &body).await.map_err(|e| match e {
            ProviderError::InvalidArgument(code) => ProviderError::InvalidCredential(code),
            ProviderError::UserNotFound => ProviderError::InvalidCredential("USER_NOT_FOUND".to_string()),
            ProviderError::UserDisabled => ProviderError::InvalidCredential("USER_DISABLED".to_string()),
            other => other,
        })?;
        Ok(response.session_cookie)
    }

    #[instrument(skip_all)]
    async fn verify_session_and_check_revoked(&self, session: &str) -> Result<VerifiedSession> {
        let claims = self.verify_session_claims(session).await?;
        let user = self.get_user(&claims.sub).await?;

        if user.disabled {
            return Err(ProviderError::UserDisabled);
        }
        if let Some(valid_since) = user.tokens_valid_after
            && claims.auth_time < valid_since
        {
            debug!("Session for {} predates revocation at {}", abbrev_uid(&claims.sub), valid_since);
            return Err(ProviderError::SessionRevoked);
        }

        Ok(VerifiedSession {
            uid: claims.sub,
            auth_time: claims.auth_time,
            expires_at: claims.exp,
            claims: claims.extra,
        })
    }

    async fn get_user(&self, uid: &str) -> Result<ProviderUser> {
        self.lookup(json!({ "localId": [uid] })).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<ProviderUser> {
        self.lookup(json!({ "email": [email] })).await
    }

    #[instrument(skip_all)]
    async fn create_user(&self, user: &NewUser) -> Result<ProviderUser> {
        let body = json!({
            "email": user.email,
            "password": user.password,
            "displayName": user.display_name,
        });
        let created: SignUpResponse = self.post("/accounts", &body).await?;
        self.get_user(&created.local_id).await
    }

    async fn list_users_page(&self, page_token: Option<&str>) -> Result<UserPage> {
        let mut url = self.endpoint("/accounts:batchGet")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("maxResults", &LIST_PAGE_SIZE.to_string());
            if let Some(token) = page_token {
                query.append_pair("nextPageToken", token);
            }
        }

        let response: BatchGetResponse = self.send(self.client.get(url)).await?;
        Ok(UserPage {
            users: response.users.into_iter().map(ProviderUser::from).collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    #[instrument(skip_all)]
    async fn revoke_sessions(&self, uid: &str) -> Result<()> {
        let body = json!({
            "localId": uid,
            "validSince": Utc::now().timestamp().to_string(),
        });
        let _: Value = self.post("/accounts:update", &body).await?;
        Ok(())
    }
}
