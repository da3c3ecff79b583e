use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use tracing::debug;

use crate::{
    AppState,
    api::models::users::{CurrentUser, UserCreate, UserInfo, UserRecord},
    directory::UserDirectory,
    errors::Error,
    types::abbrev_uid,
};

/// List all users
#[utoipa::path(
    get,
    path = "/users/all",
    tag = "users",
    summary = "List users",
    responses(
        (status = 200, description = "Every user known to the identity provider", body = Vec<UserRecord>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(current_user): CurrentUser,
) -> Result<Json<Vec<UserRecord>>, Error> {
    debug!("Listing users for {}", abbrev_uid(&current_user.info.id));
    let users = UserDirectory::new(state.identity.as_ref()).list_all().await?;
    Ok(Json(users))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Get user",
    params(
        ("user_id" = String, Path, description = "Identity provider user id"),
    ),
    responses(
        (status = 200, description = "User found", body = UserInfo),
        (status = 404, description = "User not found or malformed user id"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uid(&user_id)))]
pub async fn get_user(State(state): State<AppState>, Path(user_id): Path<String>) -> Result<Json<UserInfo>, Error> {
    let user = UserDirectory::new(state.identity.as_ref()).get(&user_id).await?;
    Ok(Json(user))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    summary = "Create user",
    request_body = UserCreate,
    responses(
        (status = 200, description = "User created", body = UserInfo),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    payload: std::result::Result<Json<UserCreate>, JsonRejection>,
) -> Result<Json<UserInfo>, Error> {
    let Json(request) = payload.map_err(|e| Error::BadRequest {
        message: format!("invalid request: {}", e.body_text()),
    })?;

    let user = UserDirectory::new(state.identity.as_ref()).create(request).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_USER_ID, create_test_app_state, create_test_config, session_cookie_for};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;

    fn router(state: AppState) -> axum::Router {
        axum::Router::new()
            .route("/users/all", axum::routing::get(list_users))
            .route("/users/{user_id}", axum::routing::get(get_user))
            .route("/users", axum::routing::post(create_user))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_get_user() {
        let (state, _) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();

        let response = server.get(&format!("/users/{TEST_USER_ID}")).await;
        response.assert_status(StatusCode::OK);
        let user: UserInfo = response.json();
        assert_eq!(user.id, TEST_USER_ID);
        assert_eq!(user.display_name, "Test User");
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let (state, _) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();

        server.get("/users/nobody").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_user_id_too_long() {
        let (state, _) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();

        let response = server.get(&format!("/users/{}", "a".repeat(129))).await;
        response.assert_status(StatusCode::NOT_FOUND);

        let response = server.get(&format!("/users/{}", "a".repeat(128))).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_user() {
        let (state, provider) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();

        let response = server
            .post("/users")
            .json(&json!({ "email": "x@y.com", "password": "secret", "displayName": "X" }))
            .await;

        response.assert_status(StatusCode::OK);
        let user: UserInfo = response.json();
        assert!(!user.id.is_empty());
        assert_eq!(user.email, "x@y.com");
        assert_eq!(provider.user_count(), 2);
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let (state, provider) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();

        for body in [
            json!({ "email": "a@b@c", "password": "secret", "displayName": "X" }),
            json!({ "email": "x@y.com", "password": "12345", "displayName": "X" }),
            json!({ "email": "x@y.com", "password": "secret", "displayName": "" }),
            json!({ "email": "x@y.com" }),
        ] {
            server.post("/users").json(&body).await.assert_status(StatusCode::BAD_REQUEST);
        }
        assert_eq!(provider.user_count(), 1);
    }

    #[tokio::test]
    async fn test_create_user_duplicate_email_is_provider_error() {
        let (state, _) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();

        let response = server
            .post("/users")
            .json(&json!({ "email": "test@example.com", "password": "secret", "displayName": "Dup" }))
            .await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_list_users_requires_session() {
        let (state, _) = create_test_app_state(create_test_config());
        let server = TestServer::new(router(state)).unwrap();

        server.get("/users/all").await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_users_returns_records() {
        let (state, provider) = create_test_app_state(create_test_config());
        let cookie = session_cookie_for(&state, &provider, TEST_USER_ID).await;
        let server = TestServer::new(router(state)).unwrap();

        let response = server.get("/users/all").add_header("cookie", &cookie).await;
        response.assert_status(StatusCode::OK);

        let users: Vec<UserRecord> = response.json();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].info.id, TEST_USER_ID);
        assert!(users[0].last_log_in_timestamp > 0);
    }

    #[tokio::test]
    async fn test_list_users_wire_format_is_camel_case() {
        let (state, provider) = create_test_app_state(create_test_config());
        let cookie = session_cookie_for(&state, &provider, TEST_USER_ID).await;
        let server = TestServer::new(router(state)).unwrap();

        let users: serde_json::Value = server.get("/users/all").add_header("cookie", &cookie).await.json();
        let record = users[0].as_object().unwrap();
        for key in [
            "id",
            "displayName",
            "email",
            "photoUrl",
            "disabled",
            "emailVerified",
            "creationTimestamp",
            "lastLogInTimestamp",
            "lastRefreshTimestamp",
        ] {
            assert!(record.contains_key(key), "missing {key}");
        }
        assert!(!record.contains_key("EmailVerified"));
        assert!(!record.contains_key("email_verified"));
    }
}
