//! API request and response data models.
//!
//! These structures define the public API contract. They are distinct from the identity
//! provider's own record types ([`crate::identity::ProviderUser`]) so the two can evolve
//! independently. All models are annotated with `utoipa` for the OpenAPI document.
//!
//! - [`auth`]: Session exchange request and cookie-carrying responses
//! - [`users`]: User projections, the authenticated-user claim, and creation requests

pub mod auth;
pub mod users;
