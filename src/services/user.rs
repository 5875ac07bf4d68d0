use std::sync::Arc;

use bson::DateTime as BsonDateTime;
use uuid::Uuid;

use crate::db::UserStore;
use crate::error::{ApiError, ApiResult};
use crate::models::user::{AuthParams, NewUserInput, User, UserDocument};
use crate::services::password::{hash_password, verify_password, HASH_COST};
use crate::util::{system_clock, Clock};

/// The login, creation and deletion rules for users.
///
/// Holds no connection of its own; every call is handed the store for the
/// current request.
#[derive(Clone)]
pub struct UserService {
    clock: Arc<dyn Clock>,
    hash_cost: u32,
}

impl Default for UserService {
    fn default() -> Self {
        Self::new()
    }
}

impl UserService {
    pub fn new() -> Self {
        Self {
            clock: system_clock(),
            hash_cost: HASH_COST,
        }
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    pub fn with_hash_cost(self, hash_cost: u32) -> Self {
        Self { hash_cost, ..self }
    }

    /// Checks the credentials and records the login.
    ///
    /// Failing to record the login does not fail the login: the profile is
    /// returned with the previous last-login time instead.
    pub async fn login(&self, users: &dyn UserStore, params: &AuthParams) -> ApiResult<User> {
        let user = users
            .find_by_username_or_email(&params.username_or_email)
            .await?
            .ok_or(ApiError::UserNotFound)?;

        verify_password(&params.password, &user.password_hash)?;

        let now = self.clock.now();
        match users.update_last_login(&user.user_id, now).await {
            Ok(()) => {
                tracing::info!(user_id = %user.user_id, "user logged in");
                Ok(user.profile_with_last_login(Some(now)))
            }
            Err(err) => {
                tracing::warn!(user_id = %user.user_id, error = %err, "failed to record last login");
                Ok(user.profile())
            }
        }
    }

    pub async fn create_user(&self, users: &dyn UserStore, input: NewUserInput) -> ApiResult<User> {
        if users
            .count_by_email_or_username(&input.email, &input.user_name)
            .await?
            > 0
        {
            return Err(ApiError::UserAlreadyExists);
        }

        let password_hash = hash_password(&input.password, self.hash_cost)?;
        let now = BsonDateTime::from_time_0_3(self.clock.now());
        let user = UserDocument {
            user_id: Uuid::new_v4().to_string(),
            email: input.email,
            user_name: input.user_name,
            password_hash,
            first_name: input.first_name,
            last_name: input.last_name,
            role: input.role.unwrap_or_default(),
            creation_date: now,
            last_update_date: now,
            last_login_date: None,
        };

        users.insert(&user).await?;
        tracing::info!(user_id = %user.user_id, role = ?user.role, "created user");

        Ok(user.profile())
    }

    pub async fn delete_user(&self, users: &dyn UserStore, user_id: &str) -> ApiResult<bool> {
        if users.delete_by_id(user_id).await? == 0 {
            return Err(ApiError::UserNotFound);
        }

        tracing::info!(user_id, "deleted user");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::{always, eq};
    use time::macros::datetime;
    use time::OffsetDateTime;

    use super::*;
    use crate::db::store::MockUserStore;
    use crate::db::memory::store_failure;
    use crate::db::InMemoryUserStore;
    use crate::models::user::Role;
    use crate::util::FixedClock;

    const NOW: OffsetDateTime = datetime!(2024-08-30 23:41:18 UTC);
    const EARLIER: OffsetDateTime = datetime!(2024-08-01 09:00:00 UTC);

    fn service() -> UserService {
        UserService::new()
            .with_clock(Arc::new(FixedClock(NOW)))
            .with_hash_cost(4)
    }

    fn stored_user(password: &str, last_login: Option<OffsetDateTime>) -> UserDocument {
        let created = BsonDateTime::from_time_0_3(EARLIER);
        UserDocument {
            user_id: "dfb8fe7f-56e4-47dc-b5bc-f6f0f524402b".to_owned(),
            email: "mock_email@gmail.com".to_owned(),
            user_name: "mock_username".to_owned(),
            password_hash: hash_password(password, 4).unwrap(),
            first_name: "Test".to_owned(),
            last_name: "User".to_owned(),
            role: Role::User,
            creation_date: created,
            last_update_date: created,
            last_login_date: last_login.map(BsonDateTime::from_time_0_3),
        }
    }

    fn credentials(identifier: &str, password: &str) -> AuthParams {
        AuthParams {
            username_or_email: identifier.to_owned(),
            password: password.to_owned(),
        }
    }

    fn new_user(email: &str, user_name: &str) -> NewUserInput {
        NewUserInput {
            email: email.to_owned(),
            first_name: "Test".to_owned(),
            last_name: "User".to_owned(),
            user_name: user_name.to_owned(),
            role: None,
            password: "Passw0rd!".to_owned(),
        }
    }

    #[tokio::test]
    async fn login_records_the_login_time() {
        let store = InMemoryUserStore::with_users(vec![stored_user("Passw0rd!", None)]);

        let user = service()
            .login(&store, &credentials("mock_username", "Passw0rd!"))
            .await
            .unwrap();

        assert_eq!(user.user_name, "mock_username");
        assert_eq!(user.last_login_date.map(|date| date.0), Some(NOW));
        let stored = store.get("dfb8fe7f-56e4-47dc-b5bc-f6f0f524402b").unwrap();
        assert_eq!(stored.last_login(), Some(NOW));
    }

    #[tokio::test]
    async fn login_accepts_email_as_identifier() {
        let store = InMemoryUserStore::with_users(vec![stored_user("Passw0rd!", None)]);

        let user = service()
            .login(&store, &credentials("mock_email@gmail.com", "Passw0rd!"))
            .await
            .unwrap();

        assert_eq!(user.email, "mock_email@gmail.com");
    }

    #[tokio::test]
    async fn unknown_identifier_is_not_found() {
        let store = InMemoryUserStore::new();

        let result = service()
            .login(&store, &credentials("nobody", "Passw0rd!"))
            .await;

        assert!(matches!(result, Err(ApiError::UserNotFound)));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_without_touching_last_login() {
        let mut store = MockUserStore::new();
        store
            .expect_find_by_username_or_email()
            .with(eq("mock_username"))
            .returning(|_| Ok(Some(stored_user("Passw0rd!", None))));
        store.expect_update_last_login().never();

        let result = service()
            .login(&store, &credentials("mock_username", "wrong-password"))
            .await;

        assert!(matches!(result, Err(ApiError::InvalidPassword)));
    }

    #[tokio::test]
    async fn failed_last_login_update_still_logs_in() {
        let mut store = MockUserStore::new();
        store
            .expect_find_by_username_or_email()
            .returning(|_| Ok(Some(stored_user("Passw0rd!", Some(EARLIER)))));
        store
            .expect_update_last_login()
            .with(eq("dfb8fe7f-56e4-47dc-b5bc-f6f0f524402b"), eq(NOW))
            .times(1)
            .returning(|_, _| Err(store_failure("write refused")));

        let user = service()
            .login(&store, &credentials("mock_username", "Passw0rd!"))
            .await
            .unwrap();

        assert_eq!(user.last_login_date.map(|date| date.0), Some(EARLIER));
    }

    #[tokio::test]
    async fn lookup_failure_fails_the_login() {
        let mut store = MockUserStore::new();
        store
            .expect_find_by_username_or_email()
            .returning(|_| Err(store_failure("lookup refused")));
        store.expect_update_last_login().never();

        let result = service()
            .login(&store, &credentials("mock_username", "Passw0rd!"))
            .await;

        assert!(matches!(result, Err(ApiError::Database(_))));
    }

    #[tokio::test]
    async fn in_memory_last_login_failure_keeps_previous_value() {
        let store = InMemoryUserStore::with_users(vec![stored_user("Passw0rd!", Some(EARLIER))]);
        store.fail_last_login_updates(true);

        let user = service()
            .login(&store, &credentials("mock_username", "Passw0rd!"))
            .await
            .unwrap();

        assert_eq!(user.last_login_date.map(|date| date.0), Some(EARLIER));
        let stored = store.get("dfb8fe7f-56e4-47dc-b5bc-f6f0f524402b").unwrap();
        assert_eq!(stored.last_login(), Some(EARLIER));
    }

    #[tokio::test]
    async fn created_user_defaults_to_user_role() {
        let store = InMemoryUserStore::new();

        let user = service()
            .create_user(&store, new_user("a@b.com", "abc"))
            .await
            .unwrap();

        assert_eq!(user.role, Role::User);
        assert_eq!(user.last_login_date, None);
        assert!(Uuid::parse_str(user.id.as_str()).is_ok());

        let stored = store.get(user.id.as_str()).unwrap();
        assert_ne!(stored.password_hash, "Passw0rd!");
        assert!(verify_password("Passw0rd!", &stored.password_hash).is_ok());
        assert_eq!(stored.creation_date.to_time_0_3(), NOW);
        assert_eq!(stored.last_update_date, stored.creation_date);
    }

    #[tokio::test]
    async fn requested_role_is_kept() {
        let store = InMemoryUserStore::new();
        let input = NewUserInput {
            role: Some(Role::Admin),
            ..new_user("admin@b.com", "admin")
        };

        let user = service().create_user(&store, input).await.unwrap();

        assert_eq!(user.role, Role::Admin);
    }

    #[tokio::test]
    async fn duplicate_email_or_username_is_rejected_before_insert() {
        let mut store = MockUserStore::new();
        store
            .expect_count_by_email_or_username()
            .with(eq("mock_email@gmail.com"), eq("someone_else"))
            .returning(|_, _| Ok(1));
        store.expect_insert().with(always()).never();

        let result = service()
            .create_user(&store, new_user("mock_email@gmail.com", "someone_else"))
            .await;

        assert!(matches!(result, Err(ApiError::UserAlreadyExists)));
    }

    #[tokio::test]
    async fn insert_conflict_after_check_is_a_duplicate() {
        let mut store = MockUserStore::new();
        store
            .expect_count_by_email_or_username()
            .returning(|_, _| Ok(0));
        store
            .expect_insert()
            .times(1)
            .returning(|_| Err(ApiError::UserAlreadyExists));

        let result = service()
            .create_user(&store, new_user("race@b.com", "race"))
            .await;

        assert!(matches!(result, Err(ApiError::UserAlreadyExists)));
    }

    #[tokio::test]
    async fn created_users_get_distinct_ids() {
        let store = InMemoryUserStore::new();
        let first = service()
            .create_user(&store, new_user("one@b.com", "one"))
            .await
            .unwrap();
        let second = service()
            .create_user(&store, new_user("two@b.com", "two"))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn delete_removes_the_user() {
        let store = InMemoryUserStore::with_users(vec![stored_user("Passw0rd!", None)]);

        let deleted = service()
            .delete_user(&store, "dfb8fe7f-56e4-47dc-b5bc-f6f0f524402b")
            .await
            .unwrap();

        assert!(deleted);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_missing_user_is_not_found() {
        let store = InMemoryUserStore::with_users(vec![stored_user("Passw0rd!", None)]);

        let result = service().delete_user(&store, "no-such-id").await;

        assert!(matches!(result, Err(ApiError::UserNotFound)));
        assert_eq!(store.len(), 1);
    }
}
