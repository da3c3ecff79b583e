use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request to exchange a bearer credential for a session cookie
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionRequest {
    /// Short-lived bearer credential (e.g. a Firebase ID token)
    pub token: String,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthSuccessResponse {
    pub message: String,
}

/// Response carrying a `Set-Cookie` header alongside a JSON body
pub struct CookieResponse {
    pub body: AuthSuccessResponse,
    pub cookie: String,
}

impl IntoResponse for CookieResponse {
    fn into_response(self) -> Response {
        match HeaderValue::from_str(&self.cookie) {
            Ok(cookie) => (StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(self.body)).into_response(),
            Err(e) => {
                tracing::error!("Session cookie is not a valid header value: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

/// Structured response for a successful session exchange
pub type SessionResponse = CookieResponse;

/// Structured response for sign-out
pub type SignOutResponse = CookieResponse;
