//! OpenAPI documentation for the HTTP surface, served at `/api-docs/openapi.json`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;

/// Security scheme for cookie-authenticated routes.
struct CookieSecurityAddon;

impl Modify for CookieSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "acropolis-session",
                    "Session cookie issued by `POST /session`. The cookie name is configurable via \
                     `auth.session.cookie_name`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::create_session,
        api::handlers::auth::me,
        api::handlers::auth::sign_out,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::create_user,
    ),
    components(
        schemas(
            api::models::auth::SessionRequest,
            api::models::auth::AuthSuccessResponse,
            api::models::users::UserInfo,
            api::models::users::UserRecord,
            api::models::users::UserCreate,
            crate::types::Permission,
        )
    ),
    modifiers(&CookieSecurityAddon),
    tags(
        (name = "authentication", description = "Session cookie exchange and sign-out"),
        (name = "users", description = "User directory backed by the identity provider"),
    ),
    info(
        title = "Acropolis API",
        description = "Session-cookie authentication and user management on top of a hosted identity provider.",
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_routes_and_cookie_scheme() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();

        for path in ["/session", "/me", "/signout", "/users", "/users/all", "/users/{user_id}"] {
            assert!(json["paths"].get(path).is_some(), "missing path {path}");
        }
        assert_eq!(json["components"]["securitySchemes"]["CookieAuth"]["in"], "cookie");
    }
}
