//! User directory: list, look up and create accounts held by the identity provider.
//!
//! The directory validates input locally, then delegates to the provider. It holds no state of
//! its own; uniqueness and persistence are the provider's concern.

use tracing::{debug, instrument};

use crate::{
    api::models::users::{UserCreate, UserInfo, UserRecord},
    errors::{Error, Result},
    identity::{IdentityProvider, ProviderError},
    types::abbrev_uid,
    validation::{validate_email, validate_user_id},
};

pub struct UserDirectory<'a> {
    provider: &'a dyn IdentityProvider,
}

fn not_found(id: &str) -> impl FnOnce(ProviderError) -> Error + '_ {
    move |e| match e {
        ProviderError::UserNotFound => Error::NotFound {
            resource: "User".to_string(),
            id: id.to_string(),
        },
        other => Error::Provider(other),
    }
}

impl<'a> UserDirectory<'a> {
    pub fn new(provider: &'a dyn IdentityProvider) -> Self {
        Self { provider }
    }

    /// Enumerate every user, following page tokens until the provider is exhausted. A failure on
    /// any page fails the whole listing.
    #[instrument(skip_all)]
    pub async fn list_all(&self) -> Result<Vec<UserRecord>> {
        let mut users = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.provider.list_users_page(page_token.as_deref()).await?;
            users.extend(page.users.into_iter().map(UserRecord::from));

            match page.next_page_token {
                Some(next) if page_token.as_deref() != Some(next.as_str()) => page_token = Some(next),
                _ => break,
            }
        }

        debug!("Listed {} users", users.len());
        Ok(users)
    }

    #[instrument(skip_all, fields(user_id = %abbrev_uid(id)))]
    pub async fn get(&self, id: &str) -> Result<UserInfo> {
        if let Err(e) = validate_user_id(id) {
            debug!("Rejecting malformed user id: {}", e);
            return Err(Error::NotFound {
                resource: "User".to_string(),
                id: id.to_string(),
            });
        }
        let user = self.provider.get_user(id).await.map_err(not_found(id))?;
        Ok(UserInfo::from(user))
    }

    #[instrument(skip_all)]
    pub async fn get_by_email(&self, email: &str) -> Result<UserInfo> {
        validate_email(email)?;
        let user = self.provider.get_user_by_email(email).await.map_err(not_found(email))?;
        Ok(UserInfo::from(user))
    }

    #[instrument(skip_all)]
    pub async fn create(&self, request: UserCreate) -> Result<UserInfo> {
        request.validate()?;
        let user = self.provider.create_user(&request.into()).await?;
        debug!("Created user {}", abbrev_uid(&user.uid));
        Ok(UserInfo::from(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedUser;
    use crate::identity::{NewUser, ProviderUser, UserPage, VerifiedSession, in_memory::InMemoryProvider};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn seeded(count: usize, page_size: usize) -> InMemoryProvider {
        let provider = InMemoryProvider::with_page_size(page_size);
        for i in 0..count {
            provider.seed(SeedUser {
                uid: Some(format!("user-{i:02}")),
                email: format!("user{i}@example.com"),
                display_name: Some(format!("User {i}")),
                ..Default::default()
            });
        }
        provider
    }

    #[tokio::test]
    async fn test_list_all_materializes_every_page() {
        let provider = seeded(7, 3);
        let users = UserDirectory::new(&provider).list_all().await.unwrap();

        assert_eq!(users.len(), 7);
        let ids: Vec<_> = users.iter().map(|u| u.info.id.as_str()).collect();
        assert_eq!(ids, vec!["user-00", "user-01", "user-02", "user-03", "user-04", "user-05", "user-06"]);
    }

    /// Serves one page, then fails
    struct FailingSecondPage {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for FailingSecondPage {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn issue_session(&self, _: &str, _: Duration) -> crate::identity::Result<String> {
            unimplemented!()
        }
        async fn verify_session_and_check_revoked(&self, _: &str) -> crate::identity::Result<VerifiedSession> {
            unimplemented!()
        }
        async fn get_user(&self, _: &str) -> crate::identity::Result<ProviderUser> {
            Err(ProviderError::Unavailable("down".to_string()))
        }
        async fn get_user_by_email(&self, _: &str) -> crate::identity::Result<ProviderUser> {
            unimplemented!()
        }
        async fn create_user(&self, _: &NewUser) -> crate::identity::Result<ProviderUser> {
            unimplemented!()
        }
        async fn list_users_page(&self, _: Option<&str>) -> crate::identity::Result<UserPage> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(UserPage {
                    users: vec![ProviderUser {
                        uid: "first".to_string(),
                        ..Default::default()
                    }],
                    next_page_token: Some("first".to_string()),
                })
            } else {
                Err(ProviderError::Unavailable("connection reset".to_string()))
            }
        }
        async fn revoke_sessions(&self, _: &str) -> crate::identity::Result<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_list_all_fails_without_partial_results() {
        let provider = FailingSecondPage { calls: AtomicUsize::new(0) };
        let err = UserDirectory::new(&provider).list_all().await.unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::Unavailable(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_validates_before_calling_provider() {
        let provider = FailingSecondPage { calls: AtomicUsize::new(0) };
        let directory = UserDirectory::new(&provider);

        assert!(matches!(directory.get("").await, Err(Error::NotFound { .. })));
        assert!(matches!(directory.get(&"a".repeat(129)).await, Err(Error::NotFound { .. })));
        // A valid id reaches the provider, whose failure is not a 404
        assert!(matches!(directory.get(&"a".repeat(128)).await, Err(Error::Provider(_))));
    }

    #[tokio::test]
    async fn test_get_missing_user_is_not_found() {
        let provider = seeded(1, 10);
        let err = UserDirectory::new(&provider).get("nobody").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_by_email() {
        let provider = seeded(2, 10);
        let directory = UserDirectory::new(&provider);

        let user = directory.get_by_email("user1@example.com").await.unwrap();
        assert_eq!(user.id, "user-01");

        assert!(matches!(directory.get_by_email("not-an-email").await, Err(Error::BadRequest { .. })));
        assert!(matches!(directory.get_by_email("ghost@example.com").await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_create_returns_public_projection() {
        let provider = InMemoryProvider::default();
        let directory = UserDirectory::new(&provider);

        let created = directory
            .create(UserCreate {
                email: "x@y.com".to_string(),
                password: "secret".to_string(),
                display_name: "X".to_string(),
            })
            .await
            .unwrap();

        assert!(!created.id.is_empty());
        assert_eq!(created.email, "x@y.com");
        assert_eq!(created.display_name, "X");
        assert_eq!(provider.user_count(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input_without_side_effects() {
        let provider = InMemoryProvider::default();
        let directory = UserDirectory::new(&provider);

        let err = directory
            .create(UserCreate {
                email: "x@y.com".to_string(),
                password: "12345".to_string(),
                display_name: "X".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BadRequest { .. }));
        assert_eq!(provider.user_count(), 0);
    }
}
