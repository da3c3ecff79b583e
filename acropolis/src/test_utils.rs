//! Shared fixtures for handler and router tests.

use std::sync::Arc;

use crate::{
    AppState,
    config::{Config, IdentityProviderConfig, InMemoryConfig, SeedUser},
    identity::in_memory::InMemoryProvider,
};

pub const TEST_USER_ID: &str = "test-user-0001";
pub const TEST_USER_EMAIL: &str = "test@example.com";

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        identity_provider: Some(IdentityProviderConfig::InMemory(InMemoryConfig::default())),
        ..Default::default()
    }
}

/// App state backed by an in-memory provider holding a single seeded user, [`TEST_USER_ID`].
///
/// The provider handle is returned alongside so tests can mint credentials and flip account state.
pub fn create_test_app_state(config: Config) -> (AppState, Arc<InMemoryProvider>) {
    let provider = Arc::new(InMemoryProvider::default());
    provider.seed(SeedUser {
        uid: Some(TEST_USER_ID.to_string()),
        email: TEST_USER_EMAIL.to_string(),
        display_name: Some("Test User".to_string()),
        ..Default::default()
    });

    let state = AppState::builder().config(config).identity(provider.clone()).build();
    (state, provider)
}

/// Sign `uid` in through the session codec and return a `Cookie` header value carrying the session
pub async fn session_cookie_for(state: &AppState, provider: &InMemoryProvider, uid: &str) -> String {
    let credential = provider.mint_credential(uid).expect("user should exist");
    let token = state
        .session_codec()
        .exchange(&credential)
        .await
        .expect("credential should be accepted");
    format!("{}={}", state.config.auth.session.cookie_name, token)
}
