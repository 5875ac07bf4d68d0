use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bson::DateTime as BsonDateTime;
use time::OffsetDateTime;

use crate::db::store::UserStore;
use crate::error::{ApiError, ApiResult};
use crate::models::user::UserDocument;

/// The error a store reports when the database drops the connection mid-operation.
pub fn store_failure(message: &str) -> ApiError {
    ApiError::Database(std::io::Error::new(std::io::ErrorKind::ConnectionReset, message).into())
}

/// A [UserStore] kept in process memory.
///
/// Inserts enforce the same uniqueness the MongoDB indexes do, so a
/// duplicate that slips past the service's pre-check still fails with
/// [ApiError::UserAlreadyExists].
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<Vec<UserDocument>>,
    fail_last_login_updates: AtomicBool,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<UserDocument>) -> Self {
        Self {
            users: Mutex::new(users),
            ..Self::default()
        }
    }

    /// Makes every later `update_last_login` call fail.
    pub fn fail_last_login_updates(&self, fail: bool) {
        self.fail_last_login_updates.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, user_id: &str) -> Option<UserDocument> {
        self.lock()
            .iter()
            .find(|user| user.user_id == user_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UserDocument>> {
        // a poisoned lock only means another test thread panicked mid-write
        self.users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_username_or_email(
        &self,
        identifier: &str,
    ) -> ApiResult<Option<UserDocument>> {
        Ok(self
            .lock()
            .iter()
            .find(|user| user.email == identifier || user.user_name == identifier)
            .cloned())
    }

    async fn count_by_email_or_username(&self, email: &str, user_name: &str) -> ApiResult<u64> {
        let count = self
            .lock()
            .iter()
            .filter(|user| user.email == email || user.user_name == user_name)
            .count();

        Ok(count as u64)
    }

    async fn insert(&self, user: &UserDocument) -> ApiResult<()> {
        let mut users = self.lock();
        if users.iter().any(|existing| {
            existing.user_id == user.user_id
                || existing.email == user.email
                || existing.user_name == user.user_name
        }) {
            return Err(ApiError::UserAlreadyExists);
        }

        users.push(user.clone());
        Ok(())
    }

    async fn update_last_login(&self, user_id: &str, at: OffsetDateTime) -> ApiResult<()> {
        if self.fail_last_login_updates.load(Ordering::SeqCst) {
            return Err(store_failure("last-login update interrupted"));
        }

        if let Some(user) = self.lock().iter_mut().find(|user| user.user_id == user_id) {
            user.last_login_date = Some(BsonDateTime::from_time_0_3(at));
        }

        Ok(())
    }

    async fn delete_by_id(&self, user_id: &str) -> ApiResult<u64> {
        let mut users = self.lock();
        let before = users.len();
        users.retain(|user| user.user_id != user_id);

        Ok((before - users.len()) as u64)
    }
}
