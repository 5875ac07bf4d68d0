use async_graphql::{Enum, InputObject, SimpleObject, ID};
use bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::graphql::validators::{EmailAddress, NotBlank, PasswordLength};
use crate::models::DateTimeScalar;
use crate::services::password::MAX_PASSWORD_BYTES;

/// The shortest password a new user may choose.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// What a user is allowed to do.
#[derive(Enum, Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// ADMIN Role
    Admin,
    /// USER Role
    #[default]
    User,
}

/// The privileged operations a role check can be asked about.
#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Create User Action
    CreateUser,
    /// Delete User Action
    DeleteUser,
}

/// An individual user
#[derive(SimpleObject, Clone, Debug, PartialEq)]
pub struct User {
    /// The user's unique user ID
    pub id: ID,
    /// The user's e-mail address
    pub email: String,
    /// The user's first name
    pub first_name: String,
    /// The user's last name
    pub last_name: String,
    /// The user's username
    pub user_name: String,
    /// The user's role
    pub role: Role,
    /// When the user last logged in, if ever
    pub last_login_date: Option<DateTimeScalar>,
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
pub struct UserObject {
    /// The user object pertaining to the given user.
    pub user: User,
}

impl From<User> for UserObject {
    fn from(user: User) -> Self {
        Self { user }
    }
}

/// A user as stored in the `users` collection.
///
/// This is the only type that carries the password hash; it never reaches
/// the GraphQL layer.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDocument {
    pub user_id: String,
    pub email: String,
    pub user_name: String,
    #[serde(rename = "password")]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: Role,
    pub creation_date: BsonDateTime,
    pub last_update_date: BsonDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_date: Option<BsonDateTime>,
}

impl std::fmt::Debug for UserDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDocument")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("user_name", &self.user_name)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("last_login_date", &self.last_login_date)
            .finish_non_exhaustive()
    }
}

impl UserDocument {
    pub fn last_login(&self) -> Option<OffsetDateTime> {
        self.last_login_date.map(BsonDateTime::to_time_0_3)
    }

    /// The public profile of this user, with the given last-login time.
    pub fn profile_with_last_login(&self, last_login: Option<OffsetDateTime>) -> User {
        User {
            id: ID(self.user_id.clone()),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            user_name: self.user_name.clone(),
            role: self.role,
            last_login_date: last_login.map(DateTimeScalar),
        }
    }

    pub fn profile(&self) -> User {
        self.profile_with_last_login(self.last_login())
    }
}

/// The input needed to authenticate a user.
#[derive(InputObject, Clone)]
pub struct AuthParams {
    /// The user's username or email address
    pub username_or_email: String,
    /// The user's password
    pub password: String,
}

/// The input required to create a new user.
#[derive(InputObject, Clone)]
pub struct NewUserInput {
    /// The user's e-mail address
    #[graphql(validator(custom = "EmailAddress"))]
    pub email: String,
    /// The user's first name
    #[graphql(validator(custom = "NotBlank(\"firstName\")"))]
    pub first_name: String,
    /// The user's last name
    #[graphql(validator(custom = "NotBlank(\"lastName\")"))]
    pub last_name: String,
    /// The user's username
    #[graphql(validator(custom = "NotBlank(\"userName\")"))]
    pub user_name: String,
    /// The user's role
    pub role: Option<Role>,
    /// The user's password
    #[graphql(validator(custom = "PasswordLength { min_chars: MIN_PASSWORD_LENGTH, max_bytes: MAX_PASSWORD_BYTES }"))]
    pub password: String,
}
