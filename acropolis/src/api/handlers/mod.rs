//! HTTP request handlers for all API endpoints.
//!
//! - [`auth`]: Session creation, the current user, and sign-out
//! - [`users`]: User lookup, creation, and listing
//!
//! # Authentication
//!
//! Protected routes sit behind [`crate::auth::middleware::require_session`], which binds the
//! verified user so handlers can take [`crate::api::models::users::CurrentUser`] directly.
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to an HTTP status and a short
//! plain-text message that never exposes provider internals.

pub mod auth;
pub mod users;
