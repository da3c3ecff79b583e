//! # acropolis: Session Authentication and User Management
//!
//! `acropolis` is the backend of a web application that delegates identity to a hosted identity
//! provider. It turns short-lived bearer credentials into long-lived HTTP-only session cookies,
//! gates protected routes on those cookies, and exposes a small user directory on top of the
//! provider's account store.
//!
//! ## Overview
//!
//! Browsers sign in with the identity provider directly (for Firebase, via the client SDK) and
//! receive a short-lived ID token. They hand that token to `POST /session`, which asks the provider
//! to mint a session token and returns it in a `Set-Cookie` header. Every later request carries the
//! cookie; protected routes verify it with the provider, including revocation and disabled-account
//! checks, before the handler runs.
//!
//! Nothing is persisted locally. Users, sessions and revocation state all live in the provider.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). The pieces, bottom up:
//!
//! - **Identity providers** ([`identity`]): the [`IdentityProvider`](identity::IdentityProvider)
//!   trait and its two implementations, Firebase Authentication and an in-memory store used for
//!   development and tests.
//! - **Session codec** ([`auth::session`]): credential to session token exchange and session
//!   verification.
//! - **Auth gate** ([`auth::middleware`]): middleware that rejects requests without a valid session
//!   and binds the verified user for the handler.
//! - **User directory** ([`directory`]): lookups, creation and full enumeration of users.
//! - **API** ([`api`]): route handlers and wire models.
//!
//! ### Routes
//!
//! | Method | Path | Auth | Purpose |
//! |--------|------|------|---------|
//! | POST | `/session`, `/auth/session` | none | Exchange a credential for a session cookie |
//! | GET | `/me` | session | The authenticated user |
//! | POST | `/signout`, `/auth/signout` | none | Clear the session cookie |
//! | GET | `/users/all` | session | Every user in the provider |
//! | GET | `/users/{user_id}` | none | Look up one user |
//! | POST | `/users` | none | Create a user |
//! | GET | `/healthz` | none | Liveness |
//! | GET | `/api-docs/openapi.json` | none | OpenAPI document |
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use acropolis::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = acropolis::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     acropolis::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod directory;
pub mod errors;
pub mod identity;
mod openapi;
pub mod telemetry;
pub mod types;
pub mod validation;

#[cfg(test)]
pub mod test_utils;

use crate::{
    auth::{middleware::require_session, session::SessionCodec},
    config::CorsOrigin,
    identity::IdentityProvider,
    openapi::ApiDoc,
    types::{DeclaredPermissions, Permission},
};
use axum::{
    Extension, Json, Router,
    http::{self, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;

pub use types::UserId;

/// Application state shared across all request handlers.
///
/// The identity provider is constructed once at startup and shared read-only; handlers never
/// mutate shared state.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .identity(provider)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Session codec bound to this state's provider and session settings
    pub fn session_codec(&self) -> SessionCodec {
        SessionCodec::new(self.identity.clone(), &self.config.auth.session)
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(config.auth.security.cors.allow_credentials);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// `/me` and `/users/all` sit behind the auth gate. `/users/all` additionally declares the
/// user-management read permission; declarations are recorded by the gate but not enforced.
///
/// # Errors
///
/// Returns an error if the CORS configuration can't be turned into header values.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let gate = from_fn_with_state(state.clone(), require_session);

    let auth_routes = Router::new()
        .route("/session", post(api::handlers::auth::create_session))
        .route("/auth/session", post(api::handlers::auth::create_session))
        .route("/me", get(api::handlers::auth::me).route_layer(gate.clone()))
        .route("/signout", post(api::handlers::auth::sign_out))
        .route("/auth/signout", post(api::handlers::auth::sign_out));

    let user_routes = Router::new()
        .route(
            "/users/all",
            get(api::handlers::users::list_users)
                .route_layer(gate)
                .layer(Extension(DeclaredPermissions(vec![Permission::UserManagementRead]))),
        )
        .route("/users/{user_id}", get(api::handlers::users::get_user))
        .route("/users", post(api::handlers::users::create_user));

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(auth_routes)
        .merge(user_routes)
        .with_state(state.clone())
        .layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router and configuration.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] builds the identity provider and the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown future resolves, in-flight requests drain and telemetry is
///    flushed
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application, constructing the identity provider named in `config`
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting acropolis with configuration: {:#?}", config);

        let provider_config = config
            .identity_provider
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No identity provider configured"))?;
        let identity = identity::create_provider(provider_config)?;
        info!("Using {} identity provider", identity.name());

        Self::with_provider(config, identity)
    }

    /// Create an application around an already-constructed identity provider
    pub fn with_provider(config: Config, identity: Arc<dyn IdentityProvider>) -> anyhow::Result<Self> {
        let app_state = AppState::builder().config(config.clone()).identity(identity).build();
        let router = build_router(&app_state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "acropolis listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
