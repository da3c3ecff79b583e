use crate::{
    AppState,
    auth::current_user::authenticate,
    errors::Error,
    types::{DeclaredPermissions, abbrev_uid},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, trace};

/// Auth gate for protected routes.
///
/// Requests without a session cookie, or whose session fails verification, are answered with a
/// 401 and never reach the handler. Otherwise the verified user is bound into the request
/// extensions as [`crate::api::models::users::CurrentUser`] and the handler's response is
/// returned unchanged.
pub async fn require_session(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, Error> {
    let user = authenticate(&state, request.headers()).await?;

    if let Some(DeclaredPermissions(permissions)) = request.extensions().get::<DeclaredPermissions>() {
        trace!(?permissions, "Route declares permissions (not enforced)");
    }

    debug!("Authenticated request to {} as {}", request.uri().path(), abbrev_uid(&user.0.info.id));
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
