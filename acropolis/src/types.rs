//! Common type definitions and the permission catalogue.
//!
//! # ID Types
//!
//! - [`UserId`]: the identity provider's stable user identifier (an opaque string, at most 128
//!   characters)
//!
//! # Permissions
//!
//! [`Permission`] enumerates the user-management capabilities. Routes declare which permission
//! they require by attaching [`DeclaredPermissions`] to their wiring. Declarations are recorded in
//! traces by the auth gate; they are not checked against the user record.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Identity provider user identifier
pub type UserId = String;

/// Maximum length of a [`UserId`], as enforced by the identity provider
pub const MAX_USER_ID_LEN: usize = 128;

/// Abbreviate a user id for more readable logs and traces
pub fn abbrev_uid(uid: &str) -> String {
    uid.chars().take(8).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// Access to all user management features and resources
    #[serde(rename = "USER_MANAGEMENT_ALL")]
    UserManagement,
    /// View user management features and user info
    UserManagementRead,
    /// Edit user information
    UserManagementEditUserInfo,
    /// Create user accounts and send account invites
    UserManagementCreateUser,
    /// Disable user accounts
    UserManagementDisableUser,
    /// Delete user accounts
    UserManagementDeleteUser,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::UserManagement,
        Permission::UserManagementRead,
        Permission::UserManagementEditUserInfo,
        Permission::UserManagementCreateUser,
        Permission::UserManagementDisableUser,
        Permission::UserManagementDeleteUser,
    ];

    /// Wire name, e.g. `USER_MANAGEMENT_READ`
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::UserManagement => "USER_MANAGEMENT_ALL",
            Permission::UserManagementRead => "USER_MANAGEMENT_READ",
            Permission::UserManagementEditUserInfo => "USER_MANAGEMENT_EDIT_USER_INFO",
            Permission::UserManagementCreateUser => "USER_MANAGEMENT_CREATE_USER",
            Permission::UserManagementDisableUser => "USER_MANAGEMENT_DISABLE_USER",
            Permission::UserManagementDeleteUser => "USER_MANAGEMENT_DELETE_USER",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permissions a route declares in its wiring. Inserted into request extensions by an
/// `axum::Extension` layer so the auth gate can record them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredPermissions(pub Vec<Permission>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_wire_names_round_trip() {
        for permission in Permission::ALL {
            let json = serde_json::to_string(&permission).unwrap();
            assert_eq!(json, format!("\"{}\"", permission.as_str()));
            let parsed: Permission = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, permission);
        }
    }

    #[test]
    fn test_permission_all_uses_legacy_name() {
        assert_eq!(Permission::UserManagement.to_string(), "USER_MANAGEMENT_ALL");
        assert!(serde_json::from_str::<Permission>("\"USER_MANAGEMENT\"").is_err());
    }

    #[test]
    fn test_abbrev_uid() {
        assert_eq!(abbrev_uid("abcdefghijkl"), "abcdefgh");
        assert_eq!(abbrev_uid("abc"), "abc");
    }
}
