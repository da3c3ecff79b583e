//! Session authentication.
//!
//! Browsers authenticate with a session cookie obtained by exchanging a short-lived bearer
//! credential (for example a Firebase ID token) at `POST /session`. Every protected request
//! carries the cookie; the auth gate verifies it with the identity provider, including
//! revocation and disabled-account checks, and binds the resulting user to the request.
//!
//! # Modules
//!
//! - [`session`]: Bearer credential to session token exchange, verification, and cookie builders
//! - [`middleware`]: The auth gate applied to protected routes
//! - [`current_user`]: Cookie parsing and the [`CurrentUser`](crate::api::models::users::CurrentUser)
//!   extractor
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use acropolis::api::models::users::CurrentUser;
//!
//! async fn protected_handler(CurrentUser(user): CurrentUser) -> String {
//!     format!("Hello, {}!", user.info.display_name)
//! }
//! ```

pub mod current_user;
pub mod middleware;
pub mod session;
