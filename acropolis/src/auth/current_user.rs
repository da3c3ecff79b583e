use crate::{
    AppState,
    api::models::users::CurrentUser,
    errors::{Error, Result},
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tracing::{debug, instrument, trace};

/// Find the session token in the request's `Cookie` headers
pub fn session_token_from_headers<'h>(headers: &'h HeaderMap, cookie_name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value)
}

/// Verify the session cookie carried by `headers` and resolve the user it belongs to
#[instrument(skip_all)]
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser> {
    let cookie_name = &state.config.auth.session.cookie_name;
    let Some(token) = session_token_from_headers(headers, cookie_name).filter(|t| !t.is_empty()) else {
        trace!("No {} cookie present", cookie_name);
        return Err(Error::Unauthenticated { message: None });
    };

    let user = state.session_codec().verify(token).await.map_err(|e| {
        debug!("Session verification failed: {}", e);
        Error::from(e)
    })?;
    Ok(CurrentUser(user))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Bound by the auth gate earlier in this request
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let user = authenticate(state, &parts.headers).await?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; acropolis-session=tok123; other=x"),
        );

        assert_eq!(session_token_from_headers(&headers, "acropolis-session"), Some("tok123"));
        assert_eq!(session_token_from_headers(&headers, "missing"), None);
    }

    #[test]
    fn test_session_token_across_multiple_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("acropolis-session=tok; b=2"));

        assert_eq!(session_token_from_headers(&headers, "acropolis-session"), Some("tok"));
    }

    #[test]
    fn test_no_cookie_header() {
        assert_eq!(session_token_from_headers(&HeaderMap::new(), "acropolis-session"), None);
    }

    #[test]
    fn test_token_value_may_contain_equals() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("acropolis-session=abc=="));
        assert_eq!(session_token_from_headers(&headers, "acropolis-session"), Some("abc=="));
    }
}
