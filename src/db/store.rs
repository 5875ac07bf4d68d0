use async_trait::async_trait;
use bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Collection, IndexModel};
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};
use crate::models::user::UserDocument;

/// MongoDB's server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// Record access for the users collection.
///
/// Every method is a single database round trip; callers compose them
/// without transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// The user whose email or username equals `identifier`.
    async fn find_by_username_or_email(&self, identifier: &str)
        -> ApiResult<Option<UserDocument>>;

    /// How many users have this email or this username.
    async fn count_by_email_or_username(&self, email: &str, user_name: &str) -> ApiResult<u64>;

    async fn insert(&self, user: &UserDocument) -> ApiResult<()>;

    async fn update_last_login(&self, user_id: &str, at: OffsetDateTime) -> ApiResult<()>;

    /// Returns how many users were removed (zero or one).
    async fn delete_by_id(&self, user_id: &str) -> ApiResult<u64>;
}

pub fn identifier_filter(identifier: &str) -> Document {
    doc! {
        "$or": [
            { "email": identifier },
            { "user_name": identifier },
        ]
    }
}

pub fn uniqueness_filter(email: &str, user_name: &str) -> Document {
    doc! {
        "$or": [
            { "email": email },
            { "user_name": user_name },
        ]
    }
}

pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[derive(Clone, Debug)]
pub struct MongoUserStore {
    collection: Collection<UserDocument>,
}

impl MongoUserStore {
    pub fn new(collection: Collection<UserDocument>) -> Self {
        Self { collection }
    }

    /// Creates the unique indexes backing the identifier, email and username invariants.
    pub async fn ensure_indexes(&self) -> ApiResult<()> {
        let unique = |field: &str| {
            IndexModel::builder()
                .keys(doc! { field: 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };

        self.collection
            .create_indexes(
                [unique("user_id"), unique("email"), unique("user_name")],
                None,
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn find_by_username_or_email(
        &self,
        identifier: &str,
    ) -> ApiResult<Option<UserDocument>> {
        self.collection
            .find_one(identifier_filter(identifier), None)
            .await
            .map_err(Into::into)
    }

    async fn count_by_email_or_username(&self, email: &str, user_name: &str) -> ApiResult<u64> {
        self.collection
            .count_documents(uniqueness_filter(email, user_name), None)
            .await
            .map_err(Into::into)
    }

    async fn insert(&self, user: &UserDocument) -> ApiResult<()> {
        match self.collection.insert_one(user, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(ApiError::UserAlreadyExists),
            Err(err) => Err(ApiError::Database(err)),
        }
    }

    async fn update_last_login(&self, user_id: &str, at: OffsetDateTime) -> ApiResult<()> {
        self.collection
            .update_one(
                doc! { "user_id": user_id },
                doc! { "$set": { "last_login_date": BsonDateTime::from_time_0_3(at) } },
                None,
            )
            .await?;

        Ok(())
    }

    async fn delete_by_id(&self, user_id: &str) -> ApiResult<u64> {
        let result = self
            .collection
            .delete_one(doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}
