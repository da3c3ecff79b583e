use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    errors::Error,
    identity::{NewUser, ProviderUser},
    types::UserId,
    validation::{validate_display_name, validate_email, validate_password},
};

/// Public projection of a user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// Stable identity provider user id
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub photo_url: String,
}

/// Full user record: the public projection plus account state and metadata timestamps.
///
/// This is also the identity bound to requests that pass the auth gate (see [`CurrentUser`]).
/// It is built fresh from the provider on every request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(flatten)]
    pub info: UserInfo,
    pub disabled: bool,
    pub email_verified: bool,
    /// Milliseconds since the Unix epoch
    pub creation_timestamp: i64,
    /// Milliseconds since the Unix epoch, 0 if the user never signed in
    pub last_log_in_timestamp: i64,
    /// Milliseconds since the Unix epoch, 0 if the user never refreshed a token
    pub last_refresh_timestamp: i64,
}

impl From<ProviderUser> for UserInfo {
    fn from(user: ProviderUser) -> Self {
        Self {
            id: user.uid,
            display_name: user.display_name.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            phone_number: user.phone_number.filter(|p| !p.is_empty()),
            photo_url: user.photo_url.unwrap_or_default(),
        }
    }
}

impl From<ProviderUser> for UserRecord {
    fn from(user: ProviderUser) -> Self {
        let disabled = user.disabled;
        let email_verified = user.email_verified;
        let metadata = user.metadata;
        Self {
            info: UserInfo::from(user),
            disabled,
            email_verified,
            creation_timestamp: metadata.creation_timestamp,
            last_log_in_timestamp: metadata.last_log_in_timestamp,
            last_refresh_timestamp: metadata.last_refresh_timestamp,
        }
    }
}

/// The authenticated user of the current request, bound by the auth gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub UserRecord);

/// Request to create a user account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCreate {
    /// Email address, must contain exactly one `@`
    pub email: String,
    /// Password, at least 6 characters
    pub password: String,
    pub display_name: String,
}

impl UserCreate {
    /// Check every field locally. No side effects.
    pub fn validate(&self) -> Result<(), Error> {
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        validate_display_name(&self.display_name)?;
        Ok(())
    }
}

impl From<UserCreate> for NewUser {
    fn from(request: UserCreate) -> Self {
        Self {
            email: request.email,
            password: request.password,
            display_name: request.display_name,
        }
    }
}
