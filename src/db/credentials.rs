//! Temporary database credentials from an assumed IAM role.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use bson::doc;
use mongodb::options::{AuthMechanism, Credential};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::error::{ApiError, ApiResult};
use crate::util::Clock;

/// Credentials are refreshed this long before they actually expire.
pub const REFRESH_MARGIN: Duration = Duration::minutes(5);
pub const DEFAULT_SESSION_NAME: &str = "user-auth-api";

#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: OffsetDateTime,
}

impl std::fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl TemporaryCredentials {
    pub fn needs_refresh(&self, now: OffsetDateTime) -> bool {
        now + REFRESH_MARGIN >= self.expires_at
    }

    /// The MONGODB-AWS credential the driver authenticates with.
    pub fn to_mongo_credential(&self) -> Credential {
        Credential::builder()
            .mechanism(AuthMechanism::MongoDbAws)
            .source("$external".to_owned())
            .username(self.access_key_id.clone())
            .password(self.secret_access_key.clone())
            .mechanism_properties(doc! { "AWS_SESSION_TOKEN": self.session_token.clone() })
            .build()
    }
}

/// Exchanges a role ARN for a set of temporary credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self, role_arn: &str, session_name: &str)
        -> ApiResult<TemporaryCredentials>;
}

pub struct StsRoleAssumer {
    client: aws_sdk_sts::Client,
}

impl StsRoleAssumer {
    pub async fn from_env() -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;

        Self {
            client: aws_sdk_sts::Client::new(&shared),
        }
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> ApiResult<TemporaryCredentials> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .send()
            .await
            .map_err(|err| {
                ApiError::Credentials(format!(
                    "{}",
                    aws_sdk_sts::error::DisplayErrorContext(&err)
                ))
            })?;

        let credentials = output.credentials().ok_or_else(|| {
            ApiError::Credentials(format!("no credentials returned for role {role_arn}"))
        })?;
        let expires_at = OffsetDateTime::from_unix_timestamp(credentials.expiration().secs())
            .map_err(|err| ApiError::Credentials(format!("bad expiration: {err}")))?;

        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id().to_owned(),
            secret_access_key: credentials.secret_access_key().to_owned(),
            session_token: credentials.session_token().to_owned(),
            expires_at,
        })
    }
}

struct CachedRole {
    role_arn: String,
    session_name: String,
    credentials: TemporaryCredentials,
}

/// Caches the credentials of the most recently assumed role until they are
/// close to expiring. Asking for a different role or session assumes it anew.
pub struct RoleCredentials {
    assumer: Arc<dyn RoleAssumer>,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedRole>>,
}

impl RoleCredentials {
    pub fn new(assumer: Arc<dyn RoleAssumer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            assumer,
            clock,
            cached: Mutex::new(None),
        }
    }

    pub async fn get(&self, role_arn: &str, app_name: &str) -> ApiResult<TemporaryCredentials> {
        let session_name = if app_name.is_empty() {
            DEFAULT_SESSION_NAME
        } else {
            app_name
        };

        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.role_arn == role_arn
                && entry.session_name == session_name
                && !entry.credentials.needs_refresh(self.clock.now())
            {
                return Ok(entry.credentials.clone());
            }
        }

        tracing::info!(role_arn, session_name, "assuming database role");
        let fresh = self.assumer.assume_role(role_arn, session_name).await?;
        *cached = Some(CachedRole {
            role_arn: role_arn.to_owned(),
            session_name: session_name.to_owned(),
            credentials: fresh.clone(),
        });

        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use time::macros::datetime;

    use super::*;
    use crate::util::FixedClock;

    fn credentials(expires_at: OffsetDateTime) -> TemporaryCredentials {
        TemporaryCredentials {
            access_key_id: "AKIAEXAMPLE".to_owned(),
            secret_access_key: "secret".to_owned(),
            session_token: "token".to_owned(),
            expires_at,
        }
    }

    #[test]
    fn refresh_happens_inside_the_margin() {
        let expiry = datetime!(2024-01-01 12:00 UTC);
        let creds = credentials(expiry);

        assert!(!creds.needs_refresh(datetime!(2024-01-01 11:50 UTC)));
        assert!(creds.needs_refresh(datetime!(2024-01-01 11:56 UTC)));
        assert!(creds.needs_refresh(datetime!(2024-01-01 12:30 UTC)));
    }

    #[test]
    fn mongo_credential_carries_session_token() {
        let credential = credentials(datetime!(2024-01-01 12:00 UTC)).to_mongo_credential();

        assert_eq!(credential.mechanism, Some(AuthMechanism::MongoDbAws));
        assert_eq!(credential.source.as_deref(), Some("$external"));
        assert_eq!(credential.username.as_deref(), Some("AKIAEXAMPLE"));
        assert_eq!(
            credential.mechanism_properties,
            Some(doc! { "AWS_SESSION_TOKEN": "token" })
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let debug = format!("{:?}", credentials(datetime!(2024-01-01 12:00 UTC)));
        assert!(!debug.contains("secret"));
        assert!(!debug.contains("token"));
    }

    #[tokio::test]
    async fn fresh_credentials_are_reused() {
        let mut assumer = MockRoleAssumer::new();
        assumer
            .expect_assume_role()
            .with(eq("arn:role"), eq("user-auth-api"))
            .times(1)
            .returning(|_, _| Ok(credentials(datetime!(2024-01-01 13:00 UTC))));
        let cache = RoleCredentials::new(
            Arc::new(assumer),
            Arc::new(FixedClock(datetime!(2024-01-01 12:00 UTC))),
        );

        let first = cache.get("arn:role", "").await.unwrap();
        let second = cache.get("arn:role", "").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn expiring_credentials_are_replaced() {
        let mut assumer = MockRoleAssumer::new();
        assumer
            .expect_assume_role()
            .with(eq("arn:role"), eq("my-app"))
            .times(2)
            .returning(|_, _| Ok(credentials(datetime!(2024-01-01 12:02 UTC))));
        let cache = RoleCredentials::new(
            Arc::new(assumer),
            Arc::new(FixedClock(datetime!(2024-01-01 12:00 UTC))),
        );

        cache.get("arn:role", "my-app").await.unwrap();
        cache.get("arn:role", "my-app").await.unwrap();
    }

    #[tokio::test]
    async fn switching_roles_assumes_the_new_role() {
        let mut assumer = MockRoleAssumer::new();
        assumer
            .expect_assume_role()
            .with(eq("arn:old"), eq("user-auth-api"))
            .times(1)
            .returning(|_, _| {
                Ok(TemporaryCredentials {
                    access_key_id: "OLD".to_owned(),
                    ..credentials(datetime!(2024-01-01 13:00 UTC))
                })
            });
        assumer
            .expect_assume_role()
            .with(eq("arn:new"), eq("user-auth-api"))
            .times(1)
            .returning(|_, _| {
                Ok(TemporaryCredentials {
                    access_key_id: "NEW".to_owned(),
                    ..credentials(datetime!(2024-01-01 13:00 UTC))
                })
            });
        let cache = RoleCredentials::new(
            Arc::new(assumer),
            Arc::new(FixedClock(datetime!(2024-01-01 12:00 UTC))),
        );

        assert_eq!(cache.get("arn:old", "").await.unwrap().access_key_id, "OLD");
        assert_eq!(cache.get("arn:new", "").await.unwrap().access_key_id, "NEW");
    }

    #[tokio::test]
    async fn switching_session_names_assumes_again() {
        let mut assumer = MockRoleAssumer::new();
        assumer
            .expect_assume_role()
            .with(eq("arn:role"), eq("first-app"))
            .times(1)
            .returning(|_, _| Ok(credentials(datetime!(2024-01-01 13:00 UTC))));
        assumer
            .expect_assume_role()
            .with(eq("arn:role"), eq("second-app"))
            .times(1)
            .returning(|_, _| Ok(credentials(datetime!(2024-01-01 13:00 UTC))));
        let cache = RoleCredentials::new(
            Arc::new(assumer),
            Arc::new(FixedClock(datetime!(2024-01-01 12:00 UTC))),
        );

        cache.get("arn:role", "first-app").await.unwrap();
        cache.get("arn:role", "second-app").await.unwrap();
    }
}
