//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Authentication** (`/session`, `/me`, `/signout`): Session cookie exchange and sign-out
//! - **Users** (`/users/*`): Directory lookups, account creation, and listing
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with `utoipa` annotations. The generated document is served at
//! `/api-docs/openapi.json`.

pub mod handlers;
pub mod models;
