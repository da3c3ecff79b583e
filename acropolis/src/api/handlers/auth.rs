use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use tracing::{debug, info, warn};

use crate::{
    AppState,
    api::models::{
        auth::{AuthSuccessResponse, SessionRequest, SessionResponse, SignOutResponse},
        users::{CurrentUser, UserInfo},
    },
    auth::{
        current_user::authenticate,
        session::{cleared_session_cookie, session_cookie},
    },
    errors::Error,
    types::abbrev_uid,
};

/// Exchange a bearer credential for a session cookie
#[utoipa::path(
    post,
    path = "/session",
    request_body = SessionRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Session created, cookie set", body = AuthSuccessResponse),
        (status = 400, description = "Malformed request body"),
        (status = 500, description = "Credential rejected or identity provider failure"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_session(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SessionRequest>, JsonRejection>,
) -> Result<SessionResponse, Error> {
    let Json(request) = payload.map_err(|e| Error::BadRequest {
        message: format!("error parsing access token: {}", e.body_text()),
    })?;

    let token = state.session_codec().exchange(&request.token).await?;
    debug!("Issued session cookie");

    Ok(SessionResponse {
        body: AuthSuccessResponse {
            message: "Session created".to_string(),
        },
        cookie: session_cookie(&token, &state.config.auth.session),
    })
}

/// Get the authenticated user
#[utoipa::path(
    get,
    path = "/me",
    tag = "authentication",
    responses(
        (status = 200, description = "The authenticated user", body = UserInfo),
        (status = 401, description = "Missing or invalid session"),
    ),
    security(("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn me(CurrentUser(user): CurrentUser) -> Result<Json<UserInfo>, Error> {
    Ok(Json(user.info))
}

/// Sign out (clear session cookie)
#[utoipa::path(
    post,
    path = "/signout",
    tag = "authentication",
    responses(
        (status = 200, description = "Signed out, cookie cleared", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Result<SignOutResponse, Error> {
    if state.config.auth.session.revoke_on_sign_out {
        // Only a session that still verifies identifies whose sessions to revoke
        match authenticate(&state, &headers).await {
            Ok(CurrentUser(user)) => match state.identity.revoke_sessions(&user.info.id).await {
                Ok(()) => info!("Revoked sessions for user {}", abbrev_uid(&user.info.id)),
                Err(e) => warn!("Failed to revoke sessions for user {}: {}", abbrev_uid(&user.info.id), e),
            },
            Err(_) => debug!("Sign-out without a valid session, nothing to revoke"),
        }
    }

    Ok(SignOutResponse {
        body: AuthSuccessResponse {
            message: "Signed out".to_string(),
        },
        cookie: cleared_session_cookie(&state.config.auth.session),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_USER_ID, create_test_app_state, create_test_config};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;

    fn router(state: AppState) -> axum::Router {
        axum::Router::new()
            .route("/session", axum::routing::post(create_session))
            .route("/me", axum::routing::get(me))
            .route("/signout", axum::routing::post(sign_out))
            .with_state(state)
    }

    fn cookie_value(set_cookie: &str) -> String {
        set_cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, value)| value.to_string())
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_session_sets_cookie() {
        let (state, provider) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();
        let credential = provider.mint_credential(TEST_USER_ID).unwrap();

        let response = server.post("/session").json(&json!({ "token": credential })).await;

        response.assert_status(StatusCode::OK);
        let set_cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("acropolis-session="));
        assert!(set_cookie.contains("Max-Age=432000"));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(!cookie_value(&set_cookie).is_empty());

        let body: AuthSuccessResponse = response.json();
        assert_eq!(body.message, "Session created");
    }

    #[tokio::test]
    async fn test_create_session_malformed_body() {
        let (state, _) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();

        let response = server.post("/session").json(&json!({ "credential": "wrong-field" })).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.headers().get("set-cookie").is_none());

        let response = server.post("/session").text("not json").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_session_rejected_credential() {
        let (state, _) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();

        let response = server.post("/session").json(&json!({ "token": "forged" })).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text(), "Internal server error");
        assert!(response.headers().get("set-cookie").is_none());

        // Empty credentials never reach the provider but answer the same way
        let response = server.post("/session").json(&json!({ "token": "" })).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("set-cookie").is_none());
    }

    #[tokio::test]
    async fn test_me_requires_session() {
        let (state, _) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();

        let response = server.get("/me").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.text(), "You must be authenticated to access this resource");

        let response = server.get("/me").add_header("cookie", "acropolis-session=bogus").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.text(), "You must be authenticated to access this resource");
    }

    #[tokio::test]
    async fn test_me_returns_user_info() {
        let (state, provider) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();
        let credential = provider.mint_credential(TEST_USER_ID).unwrap();

        let response = server.post("/session").json(&json!({ "token": credential })).await;
        let token = cookie_value(response.headers().get("set-cookie").unwrap().to_str().unwrap());

        let response = server.get("/me").add_header("cookie", format!("acropolis-session={token}")).await;
        response.assert_status(StatusCode::OK);
        let user: UserInfo = response.json();
        assert_eq!(user.id, TEST_USER_ID);
        assert_eq!(user.email, "test@example.com");
    }

    #[tokio::test]
    async fn test_sign_out_clears_cookie_without_revoking() {
        let (state, provider) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();
        let credential = provider.mint_credential(TEST_USER_ID).unwrap();

        let response = server.post("/session").json(&json!({ "token": credential })).await;
        let token = cookie_value(response.headers().get("set-cookie").unwrap().to_str().unwrap());
        let cookie = format!("acropolis-session={token}");

        let response = server.post("/signout").add_header("cookie", &cookie).await;
        response.assert_status(StatusCode::OK);
        let set_cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("acropolis-session=;"));
        assert!(set_cookie.contains("Max-Age=-1"));

        // The captured token is still honoured by the provider
        server.get("/me").add_header("cookie", &cookie).await.assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sign_out_revokes_when_configured() {
        let mut config = create_test_config();
        config.auth.session.revoke_on_sign_out = true;
        let (state, provider) = create_test_app_state(config);
        let server = TestServer::new(router(state)).unwrap();
        let credential = provider.mint_credential(TEST_USER_ID).unwrap();

        let response = server.post("/session").json(&json!({ "token": credential })).await;
        let token = cookie_value(response.headers().get("set-cookie").unwrap().to_str().unwrap());
        let cookie = format!("acropolis-session={token}");

        server.post("/signout").add_header("cookie", &cookie).await.assert_status(StatusCode::OK);
        server.get("/me").add_header("cookie", &cookie).await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sign_out_without_cookie() {
        let mut config = create_test_config();
        config.auth.session.revoke_on_sign_out = true;
        let (state, _) = create_test_app_state(config);
        let server = TestServer::new(router(state)).unwrap();

        let response = server.post("/signout").await;
        response.assert_status(StatusCode::OK);
        assert!(response.headers().get("set-cookie").unwrap().to_str().unwrap().contains("Max-Age=-1"));
    }
}
