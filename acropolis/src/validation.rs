//! Local input validation, applied before any call to the identity provider.

use crate::{errors::Error, types::MAX_USER_ID_LEN};

/// Minimum password length accepted by the identity provider
pub const MIN_PASSWORD_LEN: usize = 6;

fn bad_request(message: impl Into<String>) -> Error {
    Error::BadRequest { message: message.into() }
}

/// An email must contain exactly one `@` with non-empty text on both sides
pub fn validate_email(email: &str) -> Result<(), Error> {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(bad_request(format!("invalid email: {email:?}"))),
    }
}

pub fn validate_password(password: &str) -> Result<(), Error> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(bad_request(format!("password must be at least {MIN_PASSWORD_LEN} characters")));
    }
    Ok(())
}

pub fn validate_display_name(display_name: &str) -> Result<(), Error> {
    if display_name.is_empty() {
        return Err(bad_request("display name must not be empty"));
    }
    Ok(())
}

/// A user id must be non-empty and at most 128 characters
pub fn validate_user_id(id: &str) -> Result<(), Error> {
    if id.is_empty() {
        return Err(bad_request("user id must not be empty"));
    }
    if id.chars().count() > MAX_USER_ID_LEN {
        return Err(bad_request(format!("user id must be at most {MAX_USER_ID_LEN} characters")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@b").is_ok());
        assert!(validate_email("x@y.com").is_ok());

        for invalid in ["", "ab", "a@", "@b", "a@b@c", "@"] {
            assert!(validate_email(invalid).is_err(), "{invalid:?} should be rejected");
        }
    }

    #[test]
    fn test_validate_password_length() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name("X").is_ok());
    }

    #[test]
    fn test_validate_user_id_bounds() {
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id(&"a".repeat(128)).is_ok());
        assert!(validate_user_id(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let err = validate_email("nope").unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
