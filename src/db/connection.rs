use std::sync::Arc;

use async_trait::async_trait;
use mongodb::options::ClientOptions;
use mongodb::Client;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use time::OffsetDateTime;
use tokio::sync::{OnceCell, RwLock};

use crate::config::{Config, ConfigSupplier};
use crate::context::{ContextProvider, RequestContext};
use crate::db::credentials::{RoleCredentials, StsRoleAssumer, TemporaryCredentials};
use crate::db::store::{MongoUserStore, UserStore};
use crate::error::{ApiError, ApiResult};
use crate::models::user::UserDocument;
use crate::util::{system_clock, Clock};

pub const AUTH_DB: &str = "auth";
pub const USERS_COLLECTION: &str = "users";

const CONNECTION_OPTIONS: &str = "retryWrites=true&w=majority";

/// The connection string for the given configuration.
///
/// `DB_URI` wins when set. Otherwise the Atlas SRV address is built from
/// the cluster and domain, with either the username and password in the
/// userinfo or the MONGODB-AWS mechanism when authenticating through IAM.
pub fn connection_string(config: &Config) -> String {
    if let Some(uri) = &config.db_uri {
        return uri.clone();
    }

    let host = format!("{}.{}", config.db_cluster_name, config.db_domain);
    if config.uses_iam_auth() {
        format!(
            "mongodb+srv://{host}/?authSource=%24external&authMechanism=MONGODB-AWS&{CONNECTION_OPTIONS}"
        )
    } else {
        format!(
            "mongodb+srv://{}:{}@{host}/?{CONNECTION_OPTIONS}",
            encode_userinfo(&config.db_user_name),
            encode_userinfo(&config.db_password),
        )
    }
}

/// Everything outside the RFC 3986 unreserved set.
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode_userinfo(raw: &str) -> String {
    utf8_percent_encode(raw, USERINFO).to_string()
}

/// Opens a users store for a resolved configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &Config,
        credentials: Option<TemporaryCredentials>,
    ) -> ApiResult<Arc<dyn UserStore>>;
}

/// Connects to MongoDB and makes sure the users indexes exist.
pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(
        &self,
        config: &Config,
        credentials: Option<TemporaryCredentials>,
    ) -> ApiResult<Arc<dyn UserStore>> {
        let mut options = ClientOptions::parse(connection_string(config))
            .await
            .map_err(ApiError::Connection)?;
        if !config.app_name.is_empty() {
            options.app_name = Some(config.app_name.clone());
        }
        if let Some(credentials) = &credentials {
            options.credential = Some(credentials.to_mongo_credential());
        }

        let client = Client::with_options(options).map_err(ApiError::Connection)?;
        let users = MongoUserStore::new(
            client
                .database(AUTH_DB)
                .collection::<UserDocument>(USERS_COLLECTION),
        );
        users.ensure_indexes().await.map_err(|err| match err {
            ApiError::Database(err) => ApiError::Connection(err),
            other => other,
        })?;

        tracing::info!(
            database = AUTH_DB,
            collection = USERS_COLLECTION,
            iam_auth = credentials.is_some(),
            "connected to database"
        );

        Ok(Arc::new(users))
    }
}

struct CachedClient {
    config: Arc<Config>,
    users: Arc<dyn UserStore>,
    /// The temporary credentials this client authenticated with, if any.
    credentials: Option<TemporaryCredentials>,
}

impl CachedClient {
    fn is_usable(&self, config: &Config, now: OffsetDateTime) -> bool {
        *self.config == *config
            && self
                .credentials
                .as_ref()
                .map_or(true, |credentials| !credentials.needs_refresh(now))
    }
}

/// Owns the process-wide database client.
///
/// The client is created on first use and shared by every request after
/// that. It is rebuilt when the configuration changes or when the temporary
/// credentials it was authenticated with are about to expire.
pub struct ConnectionManager {
    supplier: Arc<dyn ConfigSupplier>,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    role_credentials: OnceCell<RoleCredentials>,
    cached: RwLock<Option<CachedClient>>,
}

impl ConnectionManager {
    pub fn new(supplier: Arc<dyn ConfigSupplier>) -> Self {
        Self {
            supplier,
            connector: Arc::new(MongoConnector),
            clock: system_clock(),
            role_credentials: OnceCell::new(),
            cached: RwLock::new(None),
        }
    }

    pub fn with_connector(self, connector: Arc<dyn Connector>) -> Self {
        Self { connector, ..self }
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    /// Uses a prepared credential cache instead of one backed by STS.
    pub fn with_role_credentials(self, role_credentials: RoleCredentials) -> Self {
        Self {
            role_credentials: OnceCell::new_with(Some(role_credentials)),
            ..self
        }
    }

    pub async fn users(&self) -> ApiResult<(Arc<dyn UserStore>, Arc<Config>)> {
        let config = self.supplier.config().await?;
        let now = self.clock.now();

        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.is_usable(&config, now) {
                return Ok((cached.users.clone(), cached.config.clone()));
            }
        }

        let mut cached = self.cached.write().await;
        // another request may have reconnected while this one waited
        if let Some(existing) = cached.as_ref() {
            if existing.is_usable(&config, now) {
                return Ok((existing.users.clone(), existing.config.clone()));
            }
        }

        // requests still holding the old store finish on the old client
        if cached.take().is_some() {
            tracing::info!("discarding stale database client");
        }

        let fresh = self.connect(config).await?;
        let result = (fresh.users.clone(), fresh.config.clone());
        *cached = Some(fresh);

        Ok(result)
    }

    async fn connect(&self, config: Arc<Config>) -> ApiResult<CachedClient> {
        config.validate()?;

        let credentials = if config.uses_iam_auth() {
            Some(
                self.role_credentials()
                    .await
                    .get(&config.iam_role_arn, &config.app_name)
                    .await?,
            )
        } else {
            None
        };
        let users = self.connector.connect(&config, credentials.clone()).await?;

        Ok(CachedClient {
            config,
            users,
            credentials,
        })
    }

    async fn role_credentials(&self) -> &RoleCredentials {
        self.role_credentials
            .get_or_init(|| async {
                RoleCredentials::new(
                    Arc::new(StsRoleAssumer::from_env().await),
                    self.clock.clone(),
                )
            })
            .await
    }
}

#[async_trait]
impl ContextProvider for ConnectionManager {
    async fn request_context(&self) -> ApiResult<RequestContext> {
        let (users, config) = self.users().await?;
        Ok(RequestContext::new(users, config))
    }
}
